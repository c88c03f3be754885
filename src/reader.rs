//! The pipeline orchestrator.
//!
//! [`DocumentReader`] sequences one request through its stages:
//!
//! ```text
//! Validating ─▶ Materializing ─▶ Recognizing ─▶ (Extracting) ─▶ Finalizing
//!     │               │               │               │              │
//!     └───────────────┴───── Failed ──┴───────────────┘        Succeeded
//! ```
//!
//! Validation happens entirely before any I/O. Once an artifact exists it is
//! released in `Finalizing` whatever the outcome, and again by `Drop` if the
//! request future is cancelled part-way.

use crate::config::{OcrEngineKind, OcrMode, ReaderConfig};
use crate::error::{AiFailure, ReaderError};
use crate::output::{OcrResult, PipelineOutcome, ReadOutput};
use crate::pipeline::artifact::{FileLifecycle, TransientArtifact};
use crate::pipeline::extract::{resolve_provider, Extractor, LlmExtractor};
use crate::pipeline::ocr::{
    AutoEngine, OcrAdapter, OcrEngine, PageTranscriber, RecognitionOptions,
};
use crate::pipeline::text_layer::TextLayerEngine;
use crate::pipeline::vision::VisionOcrEngine;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One document to process.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    /// Original upload name; used only to check the document type.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    /// When present, the OCR text is passed to the extractor with it.
    pub instruction: Option<String>,
    pub mode: OcrMode,
}

impl ExtractionRequest {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            bytes,
            instruction: None,
            mode: OcrMode::Text,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Request per-region bounding boxes and confidences.
    pub fn with_layout(mut self) -> Self {
        self.mode = OcrMode::Layout;
        self
    }
}

/// Pipeline stage, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Materializing,
    Recognizing,
    Extracting,
    Finalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::Materializing => "materializing",
            Stage::Recognizing => "recognizing",
            Stage::Extracting => "extracting",
            Stage::Finalizing => "finalizing",
        };
        f.write_str(s)
    }
}

/// Runs requests through validation, OCR, and optional extraction.
///
/// Holds only immutable configuration and shared handles, so one reader can
/// serve concurrent requests.
#[derive(Clone)]
pub struct DocumentReader {
    config: ReaderConfig,
    files: FileLifecycle,
    ocr: OcrAdapter,
    extractor: Option<Arc<dyn Extractor>>,
}

impl fmt::Debug for DocumentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentReader")
            .field("config", &self.config)
            .field("engine", &self.ocr.engine_name())
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

impl DocumentReader {
    /// Assemble a reader from explicit parts.
    pub fn new(
        config: ReaderConfig,
        engine: Arc<dyn OcrEngine>,
        extractor: Option<Arc<dyn Extractor>>,
    ) -> Self {
        let options = RecognitionOptions {
            language: config.language.clone(),
            enhancement: config.enhancement,
            password: config.password.clone(),
        };
        Self {
            files: FileLifecycle::new(
                config.supported_extensions.clone(),
                config.temp_dir.clone(),
            ),
            ocr: OcrAdapter::new(engine, options),
            extractor,
            config,
        }
    }

    /// Build engines and the extractor from configuration and the environment.
    ///
    /// Without a resolvable LLM provider the reader still serves OCR-only
    /// requests: `auto` degrades to the text layer and extraction requests
    /// fail validation. `vision` has no such fallback and is an error.
    pub fn from_config(config: ReaderConfig) -> Result<Self, ReaderError> {
        let provider = match resolve_provider(&config) {
            Ok(p) => Some(p),
            Err(e) if config.engine == OcrEngineKind::Vision => return Err(e),
            Err(e) => {
                info!("No LLM provider available; OCR-only mode ({})", e);
                None
            }
        };

        let vision = provider.as_ref().map(|p| {
            VisionOcrEngine::new(
                Arc::clone(p),
                config.max_rendered_pixels,
                config.vision_concurrency,
            )
            .with_max_tokens(config.max_tokens)
        });

        let engine: Arc<dyn OcrEngine> = match (config.engine, vision) {
            (OcrEngineKind::TextLayer, _) => Arc::new(TextLayerEngine::new()),
            (OcrEngineKind::Vision, Some(v)) => Arc::new(v),
            (OcrEngineKind::Vision, None) => {
                return Err(ReaderError::Ai {
                    kind: AiFailure::ProviderNotConfigured,
                    message: "the vision engine needs an LLM provider".into(),
                })
            }
            (OcrEngineKind::Auto, v) => Arc::new(AutoEngine::new(
                Arc::new(TextLayerEngine::new()),
                v.map(|v| Arc::new(v) as Arc<dyn PageTranscriber>),
            )),
        };

        let extractor = provider
            .map(|p| Arc::new(LlmExtractor::new(p, &config)) as Arc<dyn Extractor>);

        info!(
            "Reader ready: engine={}, extraction={}",
            engine.name(),
            if extractor.is_some() { "on" } else { "off" }
        );
        Ok(Self::new(config, engine, extractor))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.ocr.engine_name()
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Run one request to a terminal outcome.
    pub async fn process(&self, request: ExtractionRequest) -> PipelineOutcome {
        self.run(request).await.into()
    }

    /// Run one request, giving up after `limit`.
    ///
    /// On expiry the in-flight future is dropped, which releases its
    /// artifact, and the outcome is a [`ReaderError::Timeout`] failure.
    pub async fn process_within(
        &self,
        request: ExtractionRequest,
        limit: Duration,
    ) -> PipelineOutcome {
        match tokio::time::timeout(limit, self.run(request)).await {
            Ok(result) => result.into(),
            Err(_) => {
                let err = ReaderError::Timeout { limit };
                warn!("{}", err);
                Err::<ReadOutput, _>(err).into()
            }
        }
    }

    /// Run one request, returning the typed error on failure.
    pub async fn run(&self, request: ExtractionRequest) -> Result<ReadOutput, ReaderError> {
        let start = Instant::now();
        let name = request.filename.clone().unwrap_or_default();

        let result = self.execute(request).await;
        match &result {
            Ok(out) => info!(
                "Processed '{}': {} chars, {} pages, confidence {:.3}, extraction={}, {:?}",
                name,
                out.ocr.text_length,
                out.ocr.page_count,
                out.ocr.confidence,
                out.extraction.is_some(),
                start.elapsed()
            ),
            Err(e) => warn!(
                "Failed '{}' ({}, status {}): {}",
                name,
                e.kind(),
                e.status_code(),
                e
            ),
        }
        result
    }

    /// Text-only OCR of one document.
    pub async fn read_text(
        &self,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<OcrResult, ReaderError> {
        let out = self.run(ExtractionRequest::new(filename, bytes)).await?;
        Ok(out.ocr)
    }

    /// Layout-aware OCR of one document.
    pub async fn read_layout(
        &self,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<OcrResult, ReaderError> {
        let out = self
            .run(ExtractionRequest::new(filename, bytes).with_layout())
            .await?;
        Ok(out.ocr)
    }

    /// OCR followed by instruction-guided extraction.
    pub async fn extract(
        &self,
        filename: impl Into<String>,
        bytes: Vec<u8>,
        instruction: impl Into<String>,
    ) -> Result<ReadOutput, ReaderError> {
        self.run(ExtractionRequest::new(filename, bytes).with_instruction(instruction))
            .await
    }

    async fn execute(&self, request: ExtractionRequest) -> Result<ReadOutput, ReaderError> {
        let ExtractionRequest {
            filename,
            bytes,
            instruction,
            mode,
        } = request;

        enter(Stage::Validating);
        let instruction =
            self.validate(filename.as_deref(), bytes.len() as u64, instruction.as_deref())?;

        enter(Stage::Materializing);
        let mut artifact = self.files.materialize(bytes).await?;

        let result = self.recognize_and_extract(&artifact, mode, instruction).await;

        enter(Stage::Finalizing);
        self.files.release(&mut artifact);
        result
    }

    async fn recognize_and_extract(
        &self,
        artifact: &TransientArtifact,
        mode: OcrMode,
        instruction: Option<&str>,
    ) -> Result<ReadOutput, ReaderError> {
        enter(Stage::Recognizing);
        let ocr = self.ocr.recognize(artifact, mode).await?;

        let extraction = match (instruction, &self.extractor) {
            (Some(instruction), Some(extractor)) => {
                enter(Stage::Extracting);
                Some(extractor.extract(&ocr.text, instruction).await?)
            }
            _ => None,
        };

        Ok(ReadOutput { ocr, extraction })
    }

    /// Check everything that can be checked without touching the disk.
    ///
    /// Returns the trimmed instruction, if any.
    fn validate<'a>(
        &self,
        filename: Option<&str>,
        size: u64,
        instruction: Option<&'a str>,
    ) -> Result<Option<&'a str>, ReaderError> {
        let filename = filename
            .filter(|f| !f.trim().is_empty())
            .ok_or(ReaderError::MissingFilename)?;

        if !self.files.validate(filename) {
            return Err(ReaderError::UnsupportedFileType {
                filename: filename.to_string(),
                supported: self.config.supported_list(),
            });
        }

        if size > self.config.max_file_size {
            return Err(ReaderError::PayloadTooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        let Some(instruction) = instruction else {
            return Ok(None);
        };

        let trimmed = instruction.trim();
        if trimmed.is_empty() {
            return Err(ReaderError::EmptyInstruction);
        }
        let actual = trimmed.chars().count();
        if actual < self.config.min_instruction_chars {
            return Err(ReaderError::InstructionTooShort {
                min: self.config.min_instruction_chars,
                actual,
            });
        }

        if self.extractor.is_none() {
            return Err(ReaderError::Ai {
                kind: AiFailure::ProviderNotConfigured,
                message: "an instruction was given but no extractor is configured".into(),
            });
        }

        Ok(Some(trimmed))
    }
}

fn enter(stage: Stage) {
    debug!("Pipeline stage: {}", stage);
}
