//! # doc-reader
//!
//! Read PDF documents and extract information from them with an LLM.
//!
//! A request carries a document and, optionally, a free-form instruction.
//! The reader recognizes the document's text (embedded text layer first,
//! vision-model transcription for scanned pages) and, when an instruction is
//! given, asks a language model to apply it to that text. The model's answer
//! is returned verbatim.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate     filename, extension, size, instruction (no I/O)
//!  ├─ 2. Materialize  bytes → uniquely named temp file
//!  ├─ 3. Recognize    text layer / VLM transcription (text or layout mode)
//!  ├─ 4. Extract      one LLM call: instruction + OCR text (optional)
//!  └─ 5. Finalize     temp file released on every path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc_reader::{DocumentReader, ExtractionRequest, ReaderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let reader = DocumentReader::from_config(ReaderConfig::default())?;
//!     let bytes = std::fs::read("invoice.pdf")?;
//!
//!     let request = ExtractionRequest::new("invoice.pdf", bytes)
//!         .with_instruction("Return the invoice number and total as JSON");
//!     let outcome = reader.process(request).await;
//!
//!     println!("{}", serde_json::to_string_pretty(&outcome.response())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docreader` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc-reader = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Both engines need the pdfium shared library at runtime. Set
//! `PDFIUM_LIB_PATH` to the library file, or place it in the working
//! directory, or install it system-wide.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod reader;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    EnhancementPolicy, OcrEngineKind, OcrMode, ReaderConfig, ReaderConfigBuilder, ReaderSettings,
};
pub use error::{AiFailure, ErrorKind, OcrFailure, ReaderError};
pub use output::{
    BoundingBox, ExtractionResult, Layout, LayoutRegion, OcrResult, PipelineOutcome, ReadOutput,
    Response,
};
pub use pipeline::artifact::{FileLifecycle, TransientArtifact};
pub use pipeline::extract::{Extractor, LlmExtractor};
pub use pipeline::ocr::{
    AutoEngine, EngineError, OcrAdapter, OcrEngine, PageReader, PageTranscriber, Recognition,
    RecognitionOptions, TextRegion,
};
pub use pipeline::text_layer::{PageText, TextLayerEngine};
pub use pipeline::vision::VisionOcrEngine;
pub use reader::{DocumentReader, ExtractionRequest, Stage};
