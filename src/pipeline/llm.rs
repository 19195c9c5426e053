//! LLM interaction: one system + one user message in, one reply out.
//!
//! [`ChatModel`] is the seam the reorganize and answer stages call through.
//! [`ProviderChat`] adapts any `edgequake_llm` provider to it; tests swap in
//! a recording mock. Calls are stateless: no conversation memory is carried
//! between calls, and no retries are attempted: a failure is reported to
//! the caller as [`DocQaError::ExternalService`].

use crate::config::PipelineConfig;
use crate::error::DocQaError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A model reply with token accounting.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Single-shot chat completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, DocQaError>;
}

/// [`ChatModel`] backed by an `edgequake_llm` provider.
pub struct ProviderChat {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl ProviderChat {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl ChatModel for ProviderChat {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, DocQaError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            warn!("LLM call timed out after {}s", self.timeout_secs);
            DocQaError::Timeout {
                service: "llm".into(),
                secs: self.timeout_secs,
            }
        })?
        .map_err(|e| {
            warn!("LLM call failed: {}", e);
            DocQaError::external("llm", e)
        })?;

        let duration = start.elapsed();
        debug!(
            "LLM: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens, response.completion_tokens, duration
        );

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`; the
///    factory reads the matching API key (`OPENAI_API_KEY`, …).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, with `config.model`.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DocQaError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocQaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocQaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocQaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
