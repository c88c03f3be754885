//! Configuration types for the document reader.
//!
//! Everything the pipeline reads but does not own (size ceiling, supported
//! extensions, instruction policy, OCR and LLM settings) lives in
//! [`ReaderConfig`], built via its [`ReaderConfigBuilder`]. The config is
//! injected into [`crate::reader::DocumentReader`] explicitly; there is no
//! ambient global state.

use crate::error::ReaderError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default size ceiling: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default minimum instruction length, in characters after trimming.
pub const DEFAULT_MIN_INSTRUCTION_CHARS: usize = 10;

/// Model used when a provider is named but no model is given.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Configuration for a [`crate::reader::DocumentReader`].
///
/// # Example
/// ```rust
/// use doc_reader::{ReaderConfig, OcrEngineKind};
///
/// let config = ReaderConfig::builder()
///     .max_file_size(10 * 1024 * 1024)
///     .min_instruction_chars(5)
///     .engine(OcrEngineKind::TextLayer)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ReaderConfig {
    /// Upper bound on the uploaded payload, in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Accepted filename extensions, lowercase with leading dot. Default: `[".pdf"]`.
    pub supported_extensions: Vec<String>,

    /// Minimum trimmed instruction length. `0` only rejects blank instructions. Default: 10.
    pub min_instruction_chars: usize,

    /// Language hint passed to the OCR engine. Default: `"en"`.
    pub language: String,

    /// Page preprocessing policy for image-based recognition. Default: [`EnhancementPolicy::Auto`].
    pub enhancement: EnhancementPolicy,

    /// Which OCR engine to build in [`crate::reader::DocumentReader::from_config`].
    pub engine: OcrEngineKind,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory for transient artifacts. If None, uses the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.2.
    ///
    /// Kept low so the model answers in a stable, structured shape.
    pub temperature: f32,

    /// Maximum tokens the model may generate per extraction. Default: 4096.
    pub max_tokens: usize,

    /// Custom extraction system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Longest rendered page edge for the vision engine, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Concurrent page transcriptions in the vision engine. Default: 4.
    pub vision_concurrency: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            supported_extensions: vec![".pdf".to_string()],
            min_instruction_chars: DEFAULT_MIN_INSTRUCTION_CHARS,
            language: "en".to_string(),
            enhancement: EnhancementPolicy::default(),
            engine: OcrEngineKind::default(),
            password: None,
            temp_dir: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            system_prompt: None,
            max_rendered_pixels: 2000,
            vision_concurrency: 4,
        }
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("max_file_size", &self.max_file_size)
            .field("supported_extensions", &self.supported_extensions)
            .field("min_instruction_chars", &self.min_instruction_chars)
            .field("language", &self.language)
            .field("enhancement", &self.enhancement)
            .field("engine", &self.engine)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("temp_dir", &self.temp_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("vision_concurrency", &self.vision_concurrency)
            .finish()
    }
}

impl ReaderConfig {
    /// Create a new builder for `ReaderConfig`.
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Human-readable list of supported extensions, e.g. `".pdf"`.
    pub fn supported_list(&self) -> String {
        self.supported_extensions.join(", ")
    }
}

/// Builder for [`ReaderConfig`].
#[derive(Debug)]
pub struct ReaderConfigBuilder {
    config: ReaderConfig,
}

impl ReaderConfigBuilder {
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Replace the supported extension set. Entries are normalised to
    /// lowercase with a leading dot.
    pub fn supported_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.supported_extensions = exts
            .into_iter()
            .map(|e| normalise_extension(e.as_ref()))
            .filter(|e| e.len() > 1)
            .collect();
        self
    }

    pub fn min_instruction_chars(mut self, n: usize) -> Self {
        self.config.min_instruction_chars = n;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn enhancement(mut self, policy: EnhancementPolicy) -> Self {
        self.config.enhancement = policy;
        self
    }

    pub fn engine(mut self, kind: OcrEngineKind) -> Self {
        self.config.engine = kind;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn vision_concurrency(mut self, n: usize) -> Self {
        self.config.vision_concurrency = n.max(1);
        self
    }

    /// Overlay every field present in a settings file.
    pub fn settings(mut self, settings: &ReaderSettings) -> Self {
        if let Some(v) = settings.max_file_size {
            self.config.max_file_size = v;
        }
        if let Some(ref v) = settings.supported_extensions {
            self = self.supported_extensions(v);
        }
        if let Some(v) = settings.min_instruction_chars {
            self.config.min_instruction_chars = v;
        }
        if let Some(ref v) = settings.language {
            self.config.language = v.clone();
        }
        if let Some(v) = settings.enhancement {
            self.config.enhancement = v;
        }
        if let Some(v) = settings.engine {
            self.config.engine = v;
        }
        if let Some(ref v) = settings.model {
            self.config.model = Some(v.clone());
        }
        if let Some(ref v) = settings.provider {
            self.config.provider_name = Some(v.clone());
        }
        if let Some(v) = settings.temperature {
            self = self.temperature(v);
        }
        if let Some(v) = settings.max_tokens {
            self.config.max_tokens = v;
        }
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReaderConfig, ReaderError> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(ReaderError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.supported_extensions.is_empty() {
            return Err(ReaderError::InvalidConfig(
                "at least one supported extension is required".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ReaderError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.language.trim().is_empty() {
            return Err(ReaderError::InvalidConfig(
                "language hint must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn normalise_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

// ── Settings file ────────────────────────────────────────────────────────

/// Optional JSON settings overlay.
///
/// Accepts either a flat object or the service layout with the values
/// nested under `"settings"`:
///
/// ```json
/// { "settings": { "max_file_size": 10485760, "min_instruction_chars": 0 } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderSettings {
    pub max_file_size: Option<u64>,
    pub supported_extensions: Option<Vec<String>>,
    pub min_instruction_chars: Option<usize>,
    pub language: Option<String>,
    pub enhancement: Option<EnhancementPolicy>,
    pub engine: Option<OcrEngineKind>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Deserialize)]
struct SettingsEnvelope {
    settings: ReaderSettings,
}

impl ReaderSettings {
    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ReaderError> {
        if let Ok(envelope) = serde_json::from_str::<SettingsEnvelope>(text) {
            return Ok(envelope.settings);
        }
        serde_json::from_str(text)
            .map_err(|e| ReaderError::InvalidConfig(format!("settings file: {e}")))
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self, ReaderError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page images are preprocessed before image-based recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementPolicy {
    /// The engine decides per page (default).
    #[default]
    Auto,
    /// No preprocessing.
    Off,
    /// Always convert to grayscale and stretch contrast.
    Grayscale,
}

/// Which OCR engine the reader builds from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngineKind {
    /// Embedded text layer, vision transcription for scanned pages (default).
    #[default]
    Auto,
    /// Embedded text layer only.
    TextLayer,
    /// Vision-model transcription of every page.
    Vision,
}

/// Recognition mode for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Text and confidence only (default, cheaper).
    #[default]
    Text,
    /// Text plus per-region bounding boxes and confidences.
    Layout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_values() {
        let c = ReaderConfig::default();
        assert_eq!(c.max_file_size, 52_428_800);
        assert_eq!(c.supported_extensions, vec![".pdf"]);
        assert_eq!(c.min_instruction_chars, 10);
        assert_eq!(c.language, "en");
        assert_eq!(c.enhancement, EnhancementPolicy::Auto);
        assert_eq!(c.max_tokens, 4096);
        assert!((c.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn extensions_are_normalised() {
        let c = ReaderConfig::builder()
            .supported_extensions(["PDF", ".Tiff", " "])
            .build()
            .unwrap();
        assert_eq!(c.supported_extensions, vec![".pdf", ".tiff"]);
    }

    #[test]
    fn empty_extension_set_is_rejected() {
        let err = ReaderConfig::builder()
            .supported_extensions(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ReaderError::InvalidConfig(_)));
    }

    #[test]
    fn zero_size_ceiling_is_rejected() {
        assert!(ReaderConfig::builder().max_file_size(0).build().is_err());
    }

    #[test]
    fn settings_nested_under_envelope() {
        let s = ReaderSettings::from_json(
            r#"{"api_keys": ["k"], "settings": {"max_file_size": 1024, "port": 8000}}"#,
        )
        .unwrap();
        assert_eq!(s.max_file_size, Some(1024));
    }

    #[test]
    fn settings_flat_overlay() {
        let s = ReaderSettings::from_json(
            r#"{"min_instruction_chars": 0, "engine": "text_layer", "enhancement": "off"}"#,
        )
        .unwrap();
        let c = ReaderConfig::builder().settings(&s).build().unwrap();
        assert_eq!(c.min_instruction_chars, 0);
        assert_eq!(c.engine, OcrEngineKind::TextLayer);
        assert_eq!(c.enhancement, EnhancementPolicy::Off);
        assert_eq!(c.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn settings_rejects_garbage() {
        assert!(ReaderSettings::from_json("not json").is_err());
    }
}
