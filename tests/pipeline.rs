//! Integration tests for the document pipeline.
//!
//! The OCR engine and the extractor are replaced by recording mocks, so these
//! tests need neither pdfium nor an API key. Every reader writes its
//! transient files into a private `TempDir`, which lets the tests check that
//! nothing is left behind.

use async_trait::async_trait;
use doc_reader::{
    AiFailure, BoundingBox, DocumentReader, EngineError, ErrorKind, ExtractionRequest,
    ExtractionResult, Extractor, OcrEngine, PipelineOutcome, ReaderConfig, ReaderError,
    Recognition, RecognitionOptions, TextRegion,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const PDF_BYTES: &[u8] = b"%PDF-1.7\n%mock document\n";
const INSTRUCTION: &str = "Return the invoice number as JSON";

// ── Mocks ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum EngineBehaviour {
    Text(&'static str, Vec<f32>),
    Layout(&'static str),
    Fail(EngineError),
    /// Never finishes within any reasonable request limit.
    Stall(Duration),
}

/// Engine that records every path it was handed and whether the file
/// existed at that moment.
struct RecordingEngine {
    behaviour: EngineBehaviour,
    calls: AtomicUsize,
    seen: Mutex<Vec<(PathBuf, bool)>>,
    languages: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn new(behaviour: EngineBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            languages: Mutex::new(Vec::new()),
        })
    }

    fn text(text: &'static str) -> Arc<Self> {
        Self::new(EngineBehaviour::Text(text, vec![0.9, 0.7]))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn record(&self, path: &Path, options: &RecognitionOptions) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((path.to_path_buf(), path.exists()));
        self.languages.lock().unwrap().push(options.language.clone());
    }
}

fn region(page: usize, text: &str, confidence: f32, with_box: bool) -> TextRegion {
    TextRegion {
        page,
        text: text.to_string(),
        confidence,
        bounding_box: with_box.then_some(BoundingBox {
            x: 72.0,
            y: 90.0,
            width: 200.0,
            height: 14.0,
        }),
    }
}

#[async_trait]
impl OcrEngine for RecordingEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        self.record(path, options);
        match &self.behaviour {
            EngineBehaviour::Text(text, confidences) => Ok(Recognition {
                text: text.to_string(),
                page_count: 1,
                regions: confidences
                    .iter()
                    .map(|c| region(1, text, *c, false))
                    .collect(),
            }),
            EngineBehaviour::Layout(text) => Ok(Recognition {
                text: text.to_string(),
                page_count: 1,
                regions: vec![region(1, text, 1.0, false)],
            }),
            EngineBehaviour::Fail(e) => Err(e.clone()),
            EngineBehaviour::Stall(d) => {
                tokio::time::sleep(*d).await;
                Ok(Recognition::default())
            }
        }
    }

    async fn recognize_layout(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        match &self.behaviour {
            EngineBehaviour::Layout(text) => {
                self.record(path, options);
                Ok(Recognition {
                    text: text.to_string(),
                    page_count: 2,
                    regions: vec![region(1, "Invoice", 1.0, true), region(2, "Total", 0.5, true)],
                })
            }
            _ => Err(EngineError::LayoutUnsupported),
        }
    }
}

/// Extractor that counts calls and returns a fixed answer or error.
struct CountingExtractor {
    answer: Result<String, AiFailure>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl CountingExtractor {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(kind: AiFailure) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(kind),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for CountingExtractor {
    async fn extract(
        &self,
        text: &str,
        instruction: &str,
    ) -> Result<ExtractionResult, ReaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((text.to_string(), instruction.to_string()));
        match &self.answer {
            Ok(a) => Ok(ExtractionResult {
                extracted_data: a.clone(),
            }),
            Err(kind) => Err(ReaderError::Ai {
                kind: *kind,
                message: "HTTP 401: invalid x-api-key".to_string(),
            }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config_in(dir: &TempDir) -> ReaderConfig {
    ReaderConfig::builder()
        .temp_dir(dir.path())
        .build()
        .expect("valid config")
}

fn reader(
    config: ReaderConfig,
    engine: &Arc<RecordingEngine>,
    extractor: Option<&Arc<CountingExtractor>>,
) -> DocumentReader {
    DocumentReader::new(
        config,
        Arc::clone(engine) as Arc<dyn OcrEngine>,
        extractor.map(|e| Arc::clone(e) as Arc<dyn Extractor>),
    )
}

fn is_empty_dir(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path())
        .expect("temp dir readable")
        .next()
        .is_none()
}

fn assert_released(dir: &TempDir, engine: &RecordingEngine) {
    for (path, existed) in engine.seen.lock().unwrap().iter() {
        assert!(existed, "engine saw a missing file: {}", path.display());
        assert!(!path.exists(), "artifact left behind: {}", path.display());
    }
    assert!(is_empty_dir(dir), "temp dir not empty");
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_is_rejected_before_any_io() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = reader(config_in(&dir), &engine, None);

    let outcome = r
        .process(ExtractionRequest::new("notes.docx", PDF_BYTES.to_vec()))
        .await;

    assert_eq!(outcome.status_code(), 400);
    match &outcome {
        PipelineOutcome::Failed { kind, message, .. } => {
            assert_eq!(*kind, ErrorKind::Validation);
            assert!(message.contains("notes.docx"), "got: {message}");
            assert!(message.contains(".pdf"), "got: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(engine.calls(), 0);
    assert!(is_empty_dir(&dir));

    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "validation");
}

#[tokio::test]
async fn extension_check_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = reader(config_in(&dir), &engine, None);

    let outcome = r
        .process(ExtractionRequest::new("SCAN.PDF", PDF_BYTES.to_vec()))
        .await;
    assert!(outcome.is_success());
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn missing_filename_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = reader(config_in(&dir), &engine, None);

    let request = ExtractionRequest {
        filename: None,
        bytes: PDF_BYTES.to_vec(),
        ..Default::default()
    };
    let err = r.run(request).await.unwrap_err();
    assert!(matches!(err, ReaderError::MissingFilename));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn oversize_payload_is_413_before_any_io() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let extractor = CountingExtractor::answering("X");
    let config = ReaderConfig::builder()
        .temp_dir(dir.path())
        .max_file_size(8)
        .build()
        .unwrap();
    let r = reader(config, &engine, Some(&extractor));

    let outcome = r
        .process(ExtractionRequest::new("big.pdf", vec![0u8; 9]).with_instruction(INSTRUCTION))
        .await;

    assert_eq!(outcome.status_code(), 413);
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed {
            kind: ErrorKind::Validation,
            ..
        }
    ));
    assert_eq!(engine.calls(), 0);
    assert_eq!(extractor.calls(), 0);
    assert!(is_empty_dir(&dir));
}

#[tokio::test]
async fn short_instruction_fails_before_ocr() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let err = r
        .extract("invoice.pdf", PDF_BYTES.to_vec(), "total?")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReaderError::InstructionTooShort { min: 10, actual: 6 }
    ));
    assert_eq!(err.status_code(), 400);
    assert_eq!(engine.calls(), 0);
    assert_eq!(extractor.calls(), 0);
    assert!(is_empty_dir(&dir));
}

#[tokio::test]
async fn blank_instruction_fails_before_ocr() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let err = r
        .extract("invoice.pdf", PDF_BYTES.to_vec(), "   \n ")
        .await
        .unwrap_err();
    assert!(matches!(err, ReaderError::EmptyInstruction));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn instruction_without_extractor_fails_before_ocr() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = reader(config_in(&dir), &engine, None);

    let outcome = r
        .process(ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()).with_instruction(INSTRUCTION))
        .await;

    assert_eq!(outcome.status_code(), 500);
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed {
            kind: ErrorKind::Ai,
            ..
        }
    ));
    assert_eq!(engine.calls(), 0);
    assert!(is_empty_dir(&dir));
}

// ── Success paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_only_request_never_calls_the_extractor() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Invoice 42\nTotal: 19.99");
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let outcome = r
        .process(ExtractionRequest::new("invoice.pdf", PDF_BYTES.to_vec()))
        .await;

    assert!(outcome.is_success());
    assert_eq!(extractor.calls(), 0);
    assert_eq!(engine.calls(), 1);
    assert_released(&dir, &engine);

    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["text"], "Invoice 42\nTotal: 19.99");
    assert_eq!(json["text_length"], 23);
    let confidence = json["confidence_score"].as_f64().unwrap();
    assert!((confidence - 0.8).abs() < 1e-6, "got {confidence}");
    assert!(json.get("extracted_data").is_none());
}

#[tokio::test]
async fn extraction_returns_the_answer_verbatim() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Invoice 42");
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let outcome = r
        .process(
            ExtractionRequest::new("invoice.pdf", PDF_BYTES.to_vec())
                .with_instruction(format!("  {INSTRUCTION}  ")),
        )
        .await;

    assert!(outcome.is_success());
    assert_eq!(extractor.calls(), 1);
    let (text, instruction) = extractor.seen.lock().unwrap()[0].clone();
    assert_eq!(text, "Invoice 42");
    assert_eq!(instruction, INSTRUCTION);
    assert_released(&dir, &engine);

    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["extracted_data"], "X");
    let confidence = json["confidence_score"].as_f64().unwrap();
    assert!((confidence - 0.8).abs() < 1e-6, "got {confidence}");
}

#[tokio::test]
async fn engine_without_regions_reports_zero_confidence() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::new(EngineBehaviour::Text("scanned", vec![]));
    let r = reader(config_in(&dir), &engine, None);

    let ocr = r
        .read_text("scan.pdf", PDF_BYTES.to_vec())
        .await
        .unwrap();
    assert_eq!(ocr.confidence, 0.0);
    assert_eq!(ocr.text_length, 7);
    assert!(ocr.layout.is_none());
}

#[tokio::test]
async fn language_hint_reaches_the_engine() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Bonjour");
    let config = ReaderConfig::builder()
        .temp_dir(dir.path())
        .language("fr")
        .build()
        .unwrap();
    let r = reader(config, &engine, None);

    r.read_text("lettre.pdf", PDF_BYTES.to_vec()).await.unwrap();
    assert_eq!(engine.languages.lock().unwrap().as_slice(), ["fr"]);
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn layout_request_degrades_to_text_when_unsupported() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Plain text only");
    let r = reader(config_in(&dir), &engine, None);

    let outcome = r
        .process(ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()).with_layout())
        .await;

    assert!(outcome.is_success());
    assert_eq!(engine.calls(), 1);
    assert_released(&dir, &engine);

    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["text"], "Plain text only");
    assert_eq!(json["bounding_boxes"].as_array().unwrap().len(), 0);
    assert_eq!(json["confidence_scores"].as_array().unwrap().len(), 0);
    assert_eq!(json["layout_info"]["mode"], "text_fallback");
    assert_eq!(json["layout_info"]["region_count"], 0);
}

#[tokio::test]
async fn layout_request_returns_regions_when_supported() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::new(EngineBehaviour::Layout("Invoice\n\nTotal"));
    let r = reader(config_in(&dir), &engine, None);

    let ocr = r
        .read_layout("a.pdf", PDF_BYTES.to_vec())
        .await
        .unwrap();
    let layout = ocr.layout.as_ref().expect("layout present");
    assert!(!layout.fallback);
    assert_eq!(layout.regions.len(), 2);
    assert_eq!(layout.regions[1].page, 2);
    assert!((ocr.confidence - 0.75).abs() < 1e-6);
    assert_released(&dir, &engine);

    let outcome = PipelineOutcome::Succeeded {
        ocr,
        extraction: None,
    };
    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["layout_info"]["mode"], "layout");
    assert_eq!(json["layout_info"]["page_count"], 2);
    assert_eq!(json["bounding_boxes"][0]["x"], 72.0);
    assert_eq!(json["confidence_scores"].as_array().unwrap().len(), 2);
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_failure_releases_the_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::new(EngineBehaviour::Fail(EngineError::Corrupt(
        "FormatError".into(),
    )));
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let outcome = r
        .process(ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()).with_instruction(INSTRUCTION))
        .await;

    assert_eq!(outcome.status_code(), 500);
    match &outcome {
        PipelineOutcome::Failed { kind, message, .. } => {
            assert_eq!(*kind, ErrorKind::Ocr);
            assert!(message.contains("corrupted"), "got: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(engine.calls(), 1);
    assert_eq!(extractor.calls(), 0);
    assert_released(&dir, &engine);
}

#[tokio::test]
async fn ai_failure_releases_the_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Invoice 42");
    let extractor = CountingExtractor::failing(AiFailure::Authentication);
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let err = r
        .extract("a.pdf", PDF_BYTES.to_vec(), INSTRUCTION)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Ai);
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("API key"), "got: {err}");
    assert_eq!(extractor.calls(), 1);
    assert_released(&dir, &engine);
}

#[tokio::test]
async fn storage_failure_is_classified() {
    let engine = RecordingEngine::text("Hello");
    let config = ReaderConfig::builder()
        .temp_dir("/definitely/not/a/real/dir")
        .build()
        .unwrap();
    let r = reader(config, &engine, None);

    let outcome = r
        .process(ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()))
        .await;
    assert_eq!(outcome.status_code(), 500);
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed {
            kind: ErrorKind::Storage,
            ..
        }
    ));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn slow_request_times_out_and_releases_the_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::new(EngineBehaviour::Stall(Duration::from_secs(30)));
    let extractor = CountingExtractor::answering("X");
    let r = reader(config_in(&dir), &engine, Some(&extractor));

    let outcome = r
        .process_within(
            ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()).with_instruction(INSTRUCTION),
            Duration::from_millis(100),
        )
        .await;

    assert_eq!(outcome.status_code(), 504);
    match &outcome {
        PipelineOutcome::Failed { kind, message, .. } => {
            assert_eq!(*kind, ErrorKind::Timeout);
            assert!(message.contains("100ms"), "got: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let json = serde_json::to_value(outcome.response()).unwrap();
    assert_eq!(json["error"], "timeout");
    assert_eq!(json["success"], false);

    assert_eq!(engine.calls(), 1);
    assert_eq!(extractor.calls(), 0);
    assert_released(&dir, &engine);
}

#[tokio::test]
async fn fast_request_is_unaffected_by_the_limit() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Invoice 42");
    let r = reader(config_in(&dir), &engine, None);

    let outcome = r
        .process_within(
            ExtractionRequest::new("a.pdf", PDF_BYTES.to_vec()),
            Duration::from_secs(30),
        )
        .await;

    assert_eq!(outcome.status_code(), 200);
    assert_released(&dir, &engine);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_requests_use_distinct_artifacts() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = reader(config_in(&dir), &engine, None);

    let (a, b, c) = tokio::join!(
        r.read_text("a.pdf", PDF_BYTES.to_vec()),
        r.read_text("b.pdf", PDF_BYTES.to_vec()),
        r.read_text("c.pdf", PDF_BYTES.to_vec()),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let mut paths = engine.seen_paths();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3);
    assert_released(&dir, &engine);
}

#[tokio::test]
async fn reader_can_be_shared_across_tasks() {
    let dir = TempDir::new().unwrap();
    let engine = RecordingEngine::text("Hello");
    let r = Arc::new(reader(config_in(&dir), &engine, None));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let r = Arc::clone(&r);
            tokio::spawn(async move { r.read_text(format!("doc{i}.pdf"), PDF_BYTES.to_vec()).await })
        })
        .collect();
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }
    assert_eq!(engine.calls(), 4);
    assert_released(&dir, &engine);
}
