//! Pipeline stages for reading a PDF and extracting information from it.
//!
//! Each submodule owns exactly one concern so it can be tested on its own and
//! swapped (e.g. a different OCR engine) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ artifact ──▶ ocr ──────────────▶ extract
//! (bytes)    (temp file)  (text-layer/vision) (LLM, optional)
//! ```
//!
//! 1. [`artifact`]: validate the filename, write the bytes to a unique
//!    temp file, and guarantee its deletion
//! 2. [`ocr`]: the engine contract plus the adapter that normalizes
//!    engine output and degrades layout requests to text mode
//! 3. [`text_layer`]: read the embedded PDF text via pdfium
//! 4. [`vision`]: render pages and transcribe them with a VLM
//! 5. [`extract`]: one instruction-guided LLM call over the OCR text

pub mod artifact;
pub mod extract;
pub mod ocr;
pub mod text_layer;
pub mod vision;
