//! Prompts sent to the language model.
//!
//! Callers can override the extraction system prompt via
//! [`crate::config::ReaderConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for instruction-guided extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a document information extractor. Return structured output as JSON.";

/// Marker placed on the line before the OCR text.
pub const DOCUMENT_BEGIN: &str = "--- Begin Document ---";

/// Marker placed on the line after the OCR text.
pub const DOCUMENT_END: &str = "--- End Document ---";

/// System prompt for the vision OCR engine: plain transcription, nothing else.
pub const TRANSCRIPTION_SYSTEM_PROMPT: &str = r#"You are a meticulous OCR engine. Transcribe all text visible in the page image.

Rules:
- Preserve the reading order a human would follow
- Keep line breaks between paragraphs, list items and table rows
- Do not summarise, translate, correct, or add commentary
- Do not wrap the output in code fences
- If the page contains no text, answer with an empty message"#;

/// Build the single user prompt for the extraction stage.
///
/// The caller's instruction comes first, followed by the OCR text wrapped
/// in explicit boundary markers so the model can tell them apart.
pub fn extraction_prompt(instruction: &str, document_text: &str) -> String {
    format!("{instruction}\n\n{DOCUMENT_BEGIN}\n{document_text}\n{DOCUMENT_END}")
}

/// Language hint appended to the transcription request.
pub fn transcription_hint(language: &str) -> String {
    format!("The document language is most likely '{language}'.")
}
