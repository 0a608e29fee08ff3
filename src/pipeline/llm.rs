//! Remote language-model access: the [`LanguageModel`] port, its
//! edgequake-llm adapter, failure classification and bounded retry.
//!
//! Prompt wording lives in [`crate::prompts`]; this module only moves text
//! and images to the provider and errors back.
//!
//! ## Retry Strategy
//!
//! Only network-class failures (timeouts, generic service errors) are
//! retried, with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`).
//! Authentication, quota and model errors surface on the first failure:
//! retrying them only delays the message the operator needs to see.

use crate::config::{PipelineConfig, DEFAULT_MODEL};
use crate::error::{AutofillError, ErrorCategory, ExtractionError, RemoteError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// A text (and image) completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in error messages.
    fn model_name(&self) -> &str;

    /// Single-turn text completion.
    async fn complete(&self, prompt: &str) -> Result<String, RemoteError>;

    /// Answer `prompt` about an inline image.
    async fn transcribe_image(&self, prompt: &str, image: ImageData) -> Result<String, RemoteError>;
}

/// [`LanguageModel`] over any edgequake-llm provider.
pub struct EdgequakeModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl EdgequakeModel {
    pub fn new(resolved: ResolvedProvider, config: &PipelineConfig) -> Self {
        Self {
            provider: resolved.provider,
            model: resolved.model,
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AutofillError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, RemoteError> {
        let start = Instant::now();
        let call = self.provider.chat(&messages, Some(&self.options));
        match timeout(Duration::from_secs(self.timeout_secs), call).await {
            Err(_) => Err(RemoteError::Timeout {
                secs: self.timeout_secs,
            }),
            Ok(Err(e)) => Err(RemoteError::Service(e.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    self.model,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
        }
    }
}

#[async_trait]
impl LanguageModel for EdgequakeModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, RemoteError> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }

    async fn transcribe_image(&self, prompt: &str, image: ImageData) -> Result<String, RemoteError> {
        self.chat(vec![ChatMessage::user_with_images(prompt, vec![image])])
            .await
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

// ── Failure classification ───────────────────────────────────────────────

/// Ordered `(patterns, category)` rules matched against the lowercased
/// error text; the first rule with any matching pattern wins.
///
/// This is a heuristic over free-form provider messages, not an
/// authoritative classification. Replace it with a status/code check if
/// the provider ever exposes structured errors.
const CLASSIFICATION_RULES: &[(&[&str], ErrorCategory)] = &[
    (
        &["api key", "api_key", "authentication", "unauthorized", "permission denied"],
        ErrorCategory::Authentication,
    ),
    (
        &["quota", "rate limit", "rate-limit", "resource_exhausted", "too many requests"],
        ErrorCategory::Quota,
    ),
    (&["model"], ErrorCategory::InvalidModel),
];

/// Category for a raw error message.
pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Generic)
}

/// Turn a remote failure into the user-facing extraction error.
pub fn classify_remote_error(err: &RemoteError, model: &str) -> ExtractionError {
    if let RemoteError::Timeout { secs } = err {
        return ExtractionError::Timeout { secs: *secs };
    }
    let detail = err.to_string();
    match categorize(&detail) {
        ErrorCategory::Authentication => ExtractionError::Authentication { detail },
        ErrorCategory::Quota => ExtractionError::Quota { detail },
        ErrorCategory::InvalidModel => ExtractionError::InvalidModel {
            model: model.to_string(),
            detail,
        },
        _ => ExtractionError::Service { detail },
    }
}

// ── Retry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1)))
    }
}

/// `complete` with bounded retry on network-class failures.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String, ExtractionError> {
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let backoff = policy.delay(attempt);
            warn!(
                "Extraction call: retry {}/{} after {}ms",
                attempt,
                policy.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        match model.complete(prompt).await {
            Ok(text) => {
                if attempt > 0 {
                    info!("Extraction call succeeded after {} retries", attempt);
                }
                return Ok(text);
            }
            Err(e) => {
                let classified = classify_remote_error(&e, model.model_name());
                if !classified.is_transient() || attempt >= policy.max_retries {
                    return Err(classified);
                }
                warn!("Extraction call: attempt {} failed: {}", attempt + 1, e);
            }
        }
        attempt += 1;
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// A provider plus the model it will actually be called with.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: Arc<dyn LLMProvider>,
    pub model: String,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Model used for `provider` when none is configured.
pub fn default_model_for(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some(DEFAULT_MODEL),
        "openai" => Some("gpt-4.1-nano"),
        "anthropic" => Some("claude-3-5-haiku-latest"),
        "ollama" => Some("llama3.2-vision"),
        _ => None,
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<ResolvedProvider, AutofillError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AutofillError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(ResolvedProvider {
        provider,
        model: model.to_string(),
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Model for a named provider: the configured one, else its default.
fn named_model(config: &PipelineConfig, provider: &str) -> Result<String, AutofillError> {
    if let Some(model) = config.model.as_deref().filter(|m| !m.trim().is_empty()) {
        return Ok(model.to_string());
    }
    default_model_for(provider)
        .map(str::to_string)
        .ok_or_else(|| AutofillError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: format!(
                "No default model is known for provider '{provider}'.\n\
                Set --model or EDGEQUAKE_MODEL."
            ),
        })
}

/// Resolve the LLM provider and its model, from most-specific to
/// least-specific:
///
/// 1. **Pre-built provider** (`config.provider`); model from `config.model`
///    or the provider itself.
/// 2. **Named provider** (`config.provider_name`) with `config.model`, or
///    that provider's default from [`default_model_for`].
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when a Gemini key is configured or `GEMINI_API_KEY` is set.
///    The gemini provider reads its key from `GEMINI_API_KEY`.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`); model as
///    reported by the detected provider.
pub fn resolve_provider(config: &PipelineConfig) -> Result<ResolvedProvider, AutofillError> {
    if let Some(ref provider) = config.provider {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| provider.model().to_string());
        return Ok(ResolvedProvider {
            provider: Arc::clone(provider),
            model,
        });
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &named_model(config, name)?);
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if config.gemini_api_key.is_some() || non_empty_env("GEMINI_API_KEY").is_some() {
        return create_provider("gemini", &named_model(config, "gemini")?);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AutofillError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    let model = config
        .model
        .clone()
        .unwrap_or_else(|| llm_provider.model().to_string());
    Ok(ResolvedProvider {
        provider: llm_provider,
        model,
    })
}
