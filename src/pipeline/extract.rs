//! Extraction stage: one language-model call per request.
//!
//! The [`Extractor`] trait is the seam the orchestrator calls; the production
//! implementation, [`LlmExtractor`], sends the caller's instruction and the
//! OCR text to an `edgequake-llm` provider and hands back the model's answer
//! unmodified. Callers that ask for JSON parse it themselves.

use crate::config::{ReaderConfig, DEFAULT_MODEL};
use crate::error::{AiFailure, ReaderError};
use crate::output::ExtractionResult;
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Instruction-guided extraction over recognized text.
///
/// Implementations make a single attempt and report failures as
/// [`ReaderError::Ai`].
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Apply `instruction` to `text`.
    async fn extract(&self, text: &str, instruction: &str)
        -> Result<ExtractionResult, ReaderError>;
}

/// [`Extractor`] backed by an `edgequake-llm` chat provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    system_prompt: String,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ReaderConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(
        &self,
        text: &str,
        instruction: &str,
    ) -> Result<ExtractionResult, ReaderError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(extraction_prompt(instruction, text)),
        ];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "Extraction: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(ExtractionResult {
                    extracted_data: response.content,
                })
            }
            Err(e) => {
                let message = e.to_string();
                let kind = AiFailure::classify(&message);
                warn!("Extraction failed ({:?}) — {}", kind, message);
                Err(ReaderError::Ai { kind, message })
            }
        }
    }
}

/// Build `CompletionOptions` from the reader config.
fn build_options(config: &ReaderConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReaderError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| ReaderError::Ai {
        kind: AiFailure::ProviderNotConfigured,
        message: format!("provider '{name}': {e}"),
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. A pre-built `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. `ANTHROPIC_API_KEY` present: Anthropic with the configured model.
/// 5. `OPENAI_API_KEY` present: OpenAI with the configured model.
/// 6. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &ReaderConfig) -> Result<Arc<dyn LLMProvider>, ReaderError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if env_non_empty("ANTHROPIC_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider("anthropic", model);
    }

    if env_non_empty("OPENAI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| ReaderError::Ai {
        kind: AiFailure::ProviderNotConfigured,
        message: format!("no provider could be auto-detected from the environment: {e}"),
    })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let config = ReaderConfig::builder()
            .temperature(0.7)
            .max_tokens(512)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, Some(512));
    }

    #[test]
    fn default_options_are_low_temperature() {
        let opts = build_options(&ReaderConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
