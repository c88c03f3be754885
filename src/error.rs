//! Error types for the doc-reader library.
//!
//! Every request-level failure is a [`ReaderError`]. Each variant belongs to
//! exactly one coarse [`ErrorKind`], which is what an HTTP layer needs to pick
//! a status code:
//!
//! | Kind | Status | Typical cause |
//! |------|--------|---------------|
//! | [`ErrorKind::Validation`] | 400 (413 for oversize) | wrong file type, short instruction |
//! | [`ErrorKind::Storage`] | 500 | temp file could not be written |
//! | [`ErrorKind::Ocr`] | 500 | engine failed on the document |
//! | [`ErrorKind::Ai`] | 500 | language-model call failed |
//! | [`ErrorKind::Timeout`] | 504 | request did not finish within the caller's limit |
//!
//! OCR and AI failures carry a finer sub-kind ([`OcrFailure`], [`AiFailure`])
//! so the message can tell the caller what to do next. The sub-kind is
//! picked from typed engine errors where they exist and from message
//! signatures otherwise.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// All request-level errors returned by the doc-reader pipeline.
#[derive(Debug, Error)]
pub enum ReaderError {
    // ── Validation errors ────────────────────────────────────────────────
    /// The upload carried no filename, so its type cannot be checked.
    #[error("A filename is required to determine the document type")]
    MissingFilename,

    /// The filename extension is not in the supported set.
    #[error("Unsupported file type '{filename}'. Supported: {supported}")]
    UnsupportedFileType { filename: String, supported: String },

    /// The instruction was present but blank after trimming.
    #[error("Instruction is required and must not be blank")]
    EmptyInstruction,

    /// The instruction is shorter than the configured minimum.
    #[error("Instruction too short: {actual} characters (minimum {min})")]
    InstructionTooShort { min: usize, actual: usize },

    /// The payload exceeds the configured size ceiling.
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: u64, limit: u64 },

    // ── Storage errors ───────────────────────────────────────────────────
    /// The transient artifact could not be created or written.
    #[error("Failed to save uploaded file: {source}")]
    Storage {
        #[source]
        source: std::io::Error,
    },

    // ── Processing errors ────────────────────────────────────────────────
    /// The OCR engine failed on the document.
    #[error("OCR processing failed: {}", .kind.describe(.message))]
    Ocr { kind: OcrFailure, message: String },

    /// The language-model extraction call failed.
    #[error("AI extraction failed: {}", .kind.describe(.message))]
    Ai { kind: AiFailure, message: String },

    /// The whole request did not finish within the caller's time limit.
    #[error("Request did not finish within {limit:?}")]
    Timeout { limit: Duration },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ReaderError {
    /// The coarse classification used for status mapping and reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::MissingFilename
            | ReaderError::UnsupportedFileType { .. }
            | ReaderError::EmptyInstruction
            | ReaderError::InstructionTooShort { .. }
            | ReaderError::PayloadTooLarge { .. }
            | ReaderError::InvalidConfig(_) => ErrorKind::Validation,
            ReaderError::Storage { .. } => ErrorKind::Storage,
            ReaderError::Ocr { .. } => ErrorKind::Ocr,
            ReaderError::Ai { .. } => ErrorKind::Ai,
            ReaderError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// HTTP status an outer service layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ReaderError::PayloadTooLarge { .. } => 413,
            other => other.kind().status_code(),
        }
    }
}

/// Coarse failure classification carried by a failed pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: file type, size, or instruction. Client error.
    Validation,
    /// Transient artifact could not be materialized.
    Storage,
    /// OCR engine failure.
    Ocr,
    /// Language-model failure.
    Ai,
    /// The request outlived its time limit, whichever stage it was in.
    Timeout,
}

impl ErrorKind {
    /// Default HTTP status for the kind. Oversize payloads override this with 413.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Storage | ErrorKind::Ocr | ErrorKind::Ai => 500,
            ErrorKind::Timeout => 504,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Storage => "storage_error",
            ErrorKind::Ocr => "ocr_error",
            ErrorKind::Ai => "ai_error",
            ErrorKind::Timeout => "timeout_error",
        };
        f.write_str(s)
    }
}

// ── OCR sub-classification ───────────────────────────────────────────────

/// Advisory sub-kind of an OCR failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrFailure {
    /// The document is damaged or not a format the engine can read.
    CorruptDocument,
    /// The document is encrypted and no (or a wrong) password was configured.
    PasswordProtected,
    /// The engine ran out of memory or another resource.
    ResourceExhausted,
    /// The engine itself could not be loaded.
    EngineUnavailable,
    /// Anything not matched above.
    Other,
}

static RE_OCR_PASSWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password|encrypt").unwrap());
static RE_OCR_CORRUPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)corrupt|malformed|damaged|invalid pdf|not a pdf|format ?error|unsupported|xref|trailer|header")
        .unwrap()
});
static RE_OCR_RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)out of memory|memory|alloc|resource|exhaust|too large|no space").unwrap()
});

impl OcrFailure {
    /// Pick a sub-kind from a rendered engine message.
    pub fn classify(message: &str) -> Self {
        if RE_OCR_PASSWORD.is_match(message) {
            OcrFailure::PasswordProtected
        } else if RE_OCR_CORRUPT.is_match(message) {
            OcrFailure::CorruptDocument
        } else if RE_OCR_RESOURCE.is_match(message) {
            OcrFailure::ResourceExhausted
        } else {
            OcrFailure::Other
        }
    }

    fn describe(&self, message: &str) -> String {
        match self {
            OcrFailure::CorruptDocument => format!(
                "the document appears to be corrupted or in an unsupported format ({message})"
            ),
            OcrFailure::PasswordProtected => {
                format!("the document is password protected ({message})")
            }
            OcrFailure::ResourceExhausted => format!(
                "the engine ran out of resources; try a smaller document ({message})"
            ),
            OcrFailure::EngineUnavailable => {
                format!("the OCR engine is not available ({message})")
            }
            OcrFailure::Other => message.to_string(),
        }
    }
}

// ── AI sub-classification ────────────────────────────────────────────────

/// Sub-kind of a language-model failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFailure {
    /// Credentials were rejected (401/403, bad API key).
    Authentication,
    /// The request was malformed or too large for the model.
    InvalidRequest,
    /// The model does not exist or is not available to this account.
    ModelUnavailable,
    /// The call did not complete in time.
    Timeout,
    /// The provider throttled the call (429, overloaded).
    RateLimited,
    /// The service itself is down or unreachable (502, 503).
    ServiceUnavailable,
    /// No provider could be built from the configuration.
    ProviderNotConfigured,
    /// Anything not matched above.
    Other,
}

static RE_AI_AUTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b40[13]\b|unauthori[sz]ed|authenticat|invalid[ _-]?(x-)?api[ _-]?key|permission[ _-]?denied|forbidden")
        .unwrap()
});
static RE_AI_RATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b429\b|\b529\b|rate[ _-]?limit|overloaded|quota").unwrap());
static RE_AI_TIMEOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)timed? ?out|timeout|deadline exceeded").unwrap());
static RE_AI_UNAVAILABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b50[23]\b|service[ _-]?unavailable|bad gateway|temporarily unavailable|connection refused")
        .unwrap()
});
static RE_AI_NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b404\b|not[ _-]?found|\bmodel\b.{0,60}?\b(not[ _-]?available|unavailable)|unknown model|does not exist")
        .unwrap()
});
static RE_AI_INVALID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b400\b|\b422\b|invalid[ _-]?request|bad request|context length|too many tokens|max_tokens")
        .unwrap()
});

impl AiFailure {
    /// Pick a sub-kind from a rendered provider error message.
    ///
    /// Order matters: a "401 ... request timed out" is still an auth error.
    pub fn classify(message: &str) -> Self {
        if RE_AI_AUTH.is_match(message) {
            AiFailure::Authentication
        } else if RE_AI_RATE.is_match(message) {
            AiFailure::RateLimited
        } else if RE_AI_TIMEOUT.is_match(message) {
            AiFailure::Timeout
        } else if RE_AI_UNAVAILABLE.is_match(message) {
            AiFailure::ServiceUnavailable
        } else if RE_AI_NOT_FOUND.is_match(message) {
            AiFailure::ModelUnavailable
        } else if RE_AI_INVALID.is_match(message) {
            AiFailure::InvalidRequest
        } else {
            AiFailure::Other
        }
    }

    fn describe(&self, message: &str) -> String {
        match self {
            AiFailure::Authentication => format!(
                "the language-model service rejected the credentials; check the configured API key ({message})"
            ),
            AiFailure::InvalidRequest => format!(
                "the language-model service rejected the request; the document may be too long ({message})"
            ),
            AiFailure::ModelUnavailable => format!(
                "the configured model was not found or is unavailable ({message})"
            ),
            AiFailure::Timeout => format!(
                "the language-model service did not respond in time; try again later ({message})"
            ),
            AiFailure::RateLimited => format!(
                "the language-model service is rate limiting requests; try again later ({message})"
            ),
            AiFailure::ServiceUnavailable => format!(
                "the language-model service is temporarily unavailable; try again later ({message})"
            ),
            AiFailure::ProviderNotConfigured => format!(
                "no language-model provider is configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY ({message})"
            ),
            AiFailure::Other => message.to_string(),
        }
    }
}
