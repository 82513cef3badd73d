//! Text Generation Orchestrator
//!
//! One logical "generate" call runs estimate → admit → execute → normalize.
//! Callers (flashcard, quiz or free-text use cases) only see typed results:
//! every failure path comes back as `success = false` with a classified
//! [`ErrorKind`] and a human-readable message, never as an `Err` or a panic.
//!
//! The admission controller is shared process-wide; a retried call is
//! admitted once, and its retries are paced by the executor's backoff.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::cancel::CallContext;
use super::limiter::{AdmissionController, RateLimitStats};
use super::provider::{
    CompletionRequest, HttpTransport, Pricing, RequestExecutor, SharedTransport, TokenUsage,
    UsageRecord,
};
use super::tokenizer::{estimate_exchange, estimate_tokens};
use super::validation::{ItemSchema, ParsedItem, normalize};
use crate::config::Config;
use crate::types::{ErrorKind, ForgeError, LlmError, Result};

// =============================================================================
// Request / Result
// =============================================================================

/// Prompt plus optional per-call overrides
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Check overrides against the ranges configuration enforces
    pub fn validate(&self) -> Result<()> {
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ForgeError::Config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }
        if self.max_output_tokens == Some(0) {
            return Err(ForgeError::Config(
                "max output tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings used when a request does not override them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_output_tokens: crate::constants::llm::DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: crate::constants::llm::DEFAULT_TEMPERATURE,
        }
    }
}

/// Outcome of a free-text generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    /// Generated text, or the user-facing error message on failure
    pub content: String,
    pub usage: UsageRecord,
    pub error: Option<ErrorKind>,
    /// Endpoint attempts made (0 when the call never left)
    pub attempts: u32,
}

/// Outcome of a structured generation
#[derive(Debug, Clone, Serialize)]
pub struct StructuredResult {
    /// The reply parsed; zero items is still a success
    pub success: bool,
    pub items: Vec<ParsedItem>,
    pub usage: UsageRecord,
    pub error: Option<ErrorKind>,
    /// User-facing error message, set on failure
    pub message: Option<String>,
    /// Whether the reply needed JSON repair
    pub repaired: bool,
    /// Entries dropped for a missing mandatory field
    pub skipped: usize,
    pub attempts: u32,
}

/// Raw completion after admission and retries
struct Completed {
    text: String,
    usage: UsageRecord,
    attempts: u32,
}

/// A failure plus whatever usage it had already incurred
struct Failed {
    error: ForgeError,
    usage: UsageRecord,
    attempts: u32,
}

impl From<ForgeError> for Failed {
    fn from(error: ForgeError) -> Self {
        Self {
            error,
            usage: UsageRecord::empty(),
            attempts: 0,
        }
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Entry point for every generation use case
pub struct TextGenerator {
    limiter: Arc<AdmissionController>,
    executor: RequestExecutor,
    pricing: Pricing,
    defaults: GenerationDefaults,
}

impl TextGenerator {
    pub fn new(limiter: Arc<AdmissionController>, executor: RequestExecutor) -> Self {
        Self {
            limiter,
            executor,
            pricing: Pricing::default(),
            defaults: GenerationDefaults::default(),
        }
    }

    /// Build the full pipeline from configuration, over HTTP
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport: SharedTransport = Arc::new(HttpTransport::new(&config.llm)?);
        let limiter = Arc::new(AdmissionController::new(config.limits));
        let executor = RequestExecutor::new(transport, config.retry.to_policy());

        Ok(Self::new(limiter, executor)
            .with_pricing(config.llm.pricing)
            .with_defaults(GenerationDefaults {
                max_output_tokens: config.llm.max_output_tokens,
                temperature: config.llm.temperature,
            }))
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn limiter(&self) -> &Arc<AdmissionController> {
        &self.limiter
    }

    pub fn transport(&self) -> &SharedTransport {
        self.executor.transport()
    }

    /// Generate free text
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    pub async fn generate_text(
        &self,
        request: &GenerationRequest,
        ctx: &CallContext,
    ) -> GenerationResult {
        match self.complete(request, false, ctx).await {
            Ok(done) => {
                info!(
                    attempts = done.attempts,
                    total_tokens = done.usage.total_tokens,
                    "Text generated"
                );
                GenerationResult {
                    success: true,
                    content: done.text,
                    usage: done.usage,
                    error: None,
                    attempts: done.attempts,
                }
            }
            Err(failed) => GenerationResult {
                success: false,
                content: failure_message(&failed.error),
                usage: failed.usage,
                error: Some(failed.error.kind()),
                attempts: failed.attempts,
            },
        }
    }

    /// Generate and parse items of `schema`'s kind
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), array_key = %schema.array_key)
    )]
    pub async fn generate_structured(
        &self,
        request: &GenerationRequest,
        schema: &ItemSchema,
        ctx: &CallContext,
    ) -> StructuredResult {
        let done = match self.complete(request, true, ctx).await {
            Ok(done) => done,
            Err(failed) => {
                return structured_failure(&failed.error, failed.usage, failed.attempts);
            }
        };

        match normalize(&done.text, schema) {
            Ok(batch) => {
                info!(
                    items = batch.items.len(),
                    skipped = batch.skipped,
                    repaired = batch.repaired,
                    "Structured reply parsed"
                );
                StructuredResult {
                    success: true,
                    items: batch.items,
                    usage: done.usage,
                    error: None,
                    message: None,
                    repaired: batch.repaired,
                    skipped: batch.skipped,
                    attempts: done.attempts,
                }
            }
            Err(e) => {
                error!(error = %e, "Structured reply could not be parsed");
                structured_failure(&e, done.usage, done.attempts)
            }
        }
    }

    /// Limiter usage, refreshed the same way admission refreshes it
    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.limiter.stats()
    }

    async fn complete(
        &self,
        request: &GenerationRequest,
        json_mode: bool,
        ctx: &CallContext,
    ) -> std::result::Result<Completed, Failed> {
        if request.prompt.trim().is_empty() {
            return Err(ForgeError::from(LlmError::new(
                ErrorKind::Fatal,
                "The prompt is empty; nothing was sent",
            ))
            .into());
        }
        request.validate()?;

        let estimated = estimate_tokens(&request.prompt);
        let admission = self.limiter.admit(estimated, ctx).await?;
        if admission.waits > 0 {
            debug!(
                waited_ms = admission.waited.as_millis() as u64,
                waits = admission.waits,
                "Admission delayed by rate limits"
            );
        }

        let completion = CompletionRequest {
            prompt: request.prompt.clone(),
            max_output_tokens: request
                .max_output_tokens
                .unwrap_or(self.defaults.max_output_tokens),
            temperature: request.temperature.unwrap_or(self.defaults.temperature),
            json_mode,
        };

        let outcome = self
            .executor
            .execute(&completion, ctx)
            .await
            .map_err(|failure| Failed {
                // The estimate is what this call was admitted against
                usage: UsageRecord::from_usage(TokenUsage::new(estimated, 0), &self.pricing),
                attempts: failure.attempts,
                error: failure.error,
            })?;

        if outcome.backoff > Duration::ZERO {
            debug!(
                backoff_ms = outcome.backoff.as_millis() as u64,
                "Completion needed retries"
            );
        }

        let usage = outcome.response.usage.unwrap_or_else(|| {
            let (prompt_tokens, completion_tokens) =
                estimate_exchange(&request.prompt, &outcome.response.text);
            debug!(
                prompt_tokens,
                completion_tokens, "Endpoint omitted usage, using estimates"
            );
            TokenUsage::new(prompt_tokens, completion_tokens)
        });

        Ok(Completed {
            usage: UsageRecord::from_usage(usage, &self.pricing),
            text: outcome.response.text,
            attempts: outcome.attempts,
        })
    }
}

fn failure_message(error: &ForgeError) -> String {
    let message = error.user_message();
    if message.trim().is_empty() {
        format!("Generation failed ({})", error.kind())
    } else {
        message
    }
}

fn structured_failure(error: &ForgeError, usage: UsageRecord, attempts: u32) -> StructuredResult {
    StructuredResult {
        success: false,
        items: Vec::new(),
        usage,
        error: Some(error.kind()),
        message: Some(failure_message(error)),
        repaired: false,
        skipped: 0,
        attempts,
    }
}
