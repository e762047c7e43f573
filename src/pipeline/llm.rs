//! LLM interaction: the chat seam used by the document workflow.
//!
//! [`ChatBackend`] is the only thing the workflow knows about models: one
//! instruction, one user message, one reply. [`ProviderChat`] implements it
//! on top of an `edgequake_llm` provider and owns the retry policy, so the
//! workflow never sees a transient failure it could have ridden out.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spaces the attempts out: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s.

use crate::config::AskConfig;
use crate::error::Pdf2DocError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// One model reply with its token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Something that answers a single-turn chat.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, instruction: &str, message: &str) -> Result<ChatReply, Pdf2DocError>;
}

/// [`ChatBackend`] over an `edgequake_llm` provider, with retries.
pub struct ProviderChat {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl ProviderChat {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AskConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider described by `config` and wrap it.
    pub fn from_config(config: &AskConfig) -> Result<Self, Pdf2DocError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl ChatBackend for ProviderChat {
    async fn complete(&self, instruction: &str, message: &str) -> Result<ChatReply, Pdf2DocError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(instruction), ChatMessage::user(message)];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "LLM retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "LLM call: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ChatReply {
                        content: response.content,
                        prompt_tokens: response.prompt_tokens as usize,
                        completion_tokens: response.completion_tokens as usize,
                    });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("LLM attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(Pdf2DocError::LlmApiError {
            retries: self.max_retries,
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build `CompletionOptions` from the workflow config.
fn build_options(config: &AskConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Pick the LLM provider for `config`.
///
/// Order: explicit provider, named provider with the configured model,
/// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, OpenAI when
/// `OPENAI_API_KEY` is set, then whatever `ProviderFactory::from_env` finds.
pub fn resolve_provider(config: &AskConfig) -> Result<Arc<dyn LLMProvider>, Pdf2DocError> {
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

    // With several provider keys present, OpenAI wins unless asked otherwise.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2DocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2DocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2DocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
