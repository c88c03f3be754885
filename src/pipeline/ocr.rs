//! OCR stage: the engine contract and the adapter the orchestrator calls.
//!
//! An [`OcrEngine`] turns a file path into text plus scorable regions. The
//! engine is opaque to the pipeline; concrete engines live in
//! [`crate::pipeline::text_layer`] and [`crate::pipeline::vision`], and
//! [`AutoEngine`] combines the two.
//!
//! [`OcrAdapter`] wraps an engine and normalizes its output into an
//! [`OcrResult`]. Layout-mode requests on a document the engine cannot lay
//! out degrade to text-only recognition instead of failing.

use crate::config::{EnhancementPolicy, OcrMode};
use crate::error::{OcrFailure, ReaderError};
use crate::output::{BoundingBox, Layout, LayoutRegion, OcrResult};
use crate::pipeline::artifact::TransientArtifact;
use crate::pipeline::text_layer::{assemble, PageText};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Per-call recognition options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Language hint, e.g. `"en"`.
    pub language: String,
    pub enhancement: EnhancementPolicy,
    pub password: Option<String>,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            enhancement: EnhancementPolicy::Auto,
            password: None,
        }
    }
}

/// A recognized piece of text. Bounding boxes are present in layout mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    /// 1-indexed page number.
    pub page: usize,
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// Raw engine output for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub page_count: usize,
    /// Scorable regions; may be empty when the engine reports no confidence.
    pub regions: Vec<TextRegion>,
}

impl Recognition {
    /// Mean region confidence, or 0.0 when there are no regions.
    pub fn average_confidence(&self) -> f32 {
        if self.regions.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.regions.iter().map(|r| r.confidence).sum();
        sum / self.regions.len() as f32
    }
}

/// Failures reported by an engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The engine cannot produce layout for this document. Not a failure
    /// for the pipeline: the adapter falls back to text mode.
    #[error("layout output is not supported for this document")]
    LayoutUnsupported,

    /// The engine library or backing service could not be loaded.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The document could not be parsed.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// The document is encrypted and the password is missing or wrong.
    #[error("document is password protected")]
    PasswordRequired,

    /// Anything else; the message is classified heuristically.
    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    fn into_reader_error(self) -> ReaderError {
        let kind = match &self {
            EngineError::Unavailable(_) => OcrFailure::EngineUnavailable,
            EngineError::Corrupt(_) => OcrFailure::CorruptDocument,
            EngineError::PasswordRequired => OcrFailure::PasswordProtected,
            EngineError::Failed(msg) => OcrFailure::classify(msg),
            EngineError::LayoutUnsupported => OcrFailure::Other,
        };
        ReaderError::Ocr {
            kind,
            message: self.to_string(),
        }
    }
}

/// Contract every OCR engine implements.
///
/// Implementations do their blocking work off the async executor
/// (`spawn_blocking`) and must be safe to share between requests.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine identifier, e.g. `"text-layer"`.
    fn name(&self) -> &'static str;

    /// Text-only recognition.
    async fn recognize(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError>;

    /// Recognition with a bounding box on every region.
    ///
    /// Engines without layout support keep the default.
    async fn recognize_layout(
        &self,
        _path: &Path,
        _options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        Err(EngineError::LayoutUnsupported)
    }
}

/// Normalizes engine output for the orchestrator.
#[derive(Clone)]
pub struct OcrAdapter {
    engine: Arc<dyn OcrEngine>,
    options: RecognitionOptions,
}

impl OcrAdapter {
    pub fn new(engine: Arc<dyn OcrEngine>, options: RecognitionOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Recognize the artifact's document in the requested mode.
    pub async fn recognize(
        &self,
        artifact: &TransientArtifact,
        mode: OcrMode,
    ) -> Result<OcrResult, ReaderError> {
        let start = Instant::now();
        let path = artifact.path();
        let name = self.engine.name();

        let result = match mode {
            OcrMode::Text => {
                let rec = self
                    .engine
                    .recognize(path, &self.options)
                    .await
                    .map_err(EngineError::into_reader_error)?;
                let confidence = rec.average_confidence();
                OcrResult::new(rec.text, confidence, rec.page_count, name, None)
            }
            OcrMode::Layout => match self.engine.recognize_layout(path, &self.options).await {
                Ok(rec) => {
                    let confidence = rec.average_confidence();
                    let regions = rec
                        .regions
                        .into_iter()
                        .filter_map(|r| {
                            r.bounding_box.map(|bounding_box| LayoutRegion {
                                page: r.page,
                                text: r.text,
                                bounding_box,
                                confidence: r.confidence,
                            })
                        })
                        .collect();
                    let layout = Layout {
                        regions,
                        fallback: false,
                    };
                    OcrResult::new(rec.text, confidence, rec.page_count, name, Some(layout))
                }
                Err(EngineError::LayoutUnsupported) => {
                    info!("Engine '{}' has no layout for this document; using text mode", name);
                    let rec = self
                        .engine
                        .recognize(path, &self.options)
                        .await
                        .map_err(EngineError::into_reader_error)?;
                    let confidence = rec.average_confidence();
                    let layout = Layout {
                        regions: Vec::new(),
                        fallback: true,
                    };
                    OcrResult::new(rec.text, confidence, rec.page_count, name, Some(layout))
                }
                Err(e) => return Err(e.into_reader_error()),
            },
        };

        debug!(
            "OCR ({}): {} chars over {} pages, confidence {:.3}, {:?}",
            name,
            result.text_length,
            result.page_count,
            result.confidence,
            start.elapsed()
        );
        Ok(result)
    }
}

// ── Auto engine ──────────────────────────────────────────────────────────

/// Pages whose text layer has fewer non-whitespace characters than this are
/// treated as scanned images.
pub const MIN_TEXT_LAYER_CHARS: usize = 16;

/// Per-page text source: the embedded text layer.
#[async_trait]
pub trait PageReader: Send + Sync {
    /// Read every page, with positioned segments when `with_segments`.
    async fn read_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        with_segments: bool,
    ) -> Result<Vec<PageText>, EngineError>;
}

/// Per-page transcription of rendered pages.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    /// Transcribe the 0-indexed `indices`, returning `(index, text)` pairs.
    async fn transcribe_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        indices: &[usize],
    ) -> Result<Vec<(usize, String)>, EngineError>;
}

/// Text layer first; scanned pages go to the transcriber when present.
///
/// Layout is only produced when every page has a usable text layer.
pub struct AutoEngine {
    text_layer: Arc<dyn PageReader>,
    vision: Option<Arc<dyn PageTranscriber>>,
}

impl AutoEngine {
    pub fn new(text_layer: Arc<dyn PageReader>, vision: Option<Arc<dyn PageTranscriber>>) -> Self {
        Self { text_layer, vision }
    }
}

/// True when a page's text layer is too thin to be real content.
pub fn looks_scanned(page_text: &str) -> bool {
    page_text.chars().filter(|c| !c.is_whitespace()).count() < MIN_TEXT_LAYER_CHARS
}

#[async_trait]
impl OcrEngine for AutoEngine {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn recognize(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let mut pages = self.text_layer.read_pages(path, options, false).await?;
        let scanned: Vec<usize> = pages
            .iter()
            .filter(|p| looks_scanned(&p.text))
            .map(|p| p.index)
            .collect();

        if let (Some(vision), false) = (&self.vision, scanned.is_empty()) {
            info!(
                "{} of {} pages have no usable text layer; transcribing with vision engine",
                scanned.len(),
                pages.len()
            );
            let transcribed = vision.transcribe_pages(path, options, &scanned).await?;
            for (index, text) in transcribed {
                if let Some(page) = pages.iter_mut().find(|p| p.index == index) {
                    page.text = text;
                    page.segments.clear();
                    page.from_text_layer = false;
                }
            }
        }

        Ok(assemble(pages, false))
    }

    async fn recognize_layout(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let pages = self.text_layer.read_pages(path, options, true).await?;
        if pages.iter().any(|p| looks_scanned(&p.text)) {
            return Err(EngineError::LayoutUnsupported);
        }
        Ok(assemble(pages, true))
    }
}
