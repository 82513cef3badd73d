//! Request Executor
//!
//! Drives a bounded retry loop around single transport attempts.
//!
//! ## Strategy
//!
//! 1. Issue the call (interruptible by the caller's context)
//! 2. On success, return the payload
//! 3. Classify failures by HTTP status: 429 is throttled, 5xx transient,
//!    other 4xx fatal (never retried). A 429 reporting an exhausted quota
//!    stays throttled but is never retried
//! 4. Throttled/transient/network failures wait `base * 2^attempt` and retry
//!    while attempts remain
//! 5. Once attempts run out, surface the last classified failure

use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use super::{CompletionRequest, CompletionResponse, SharedTransport, TransportError};
use crate::ai::cancel::CallContext;
use crate::constants::retry as retry_constants;
use crate::types::{ErrorClassifier, ErrorKind, ForgeError, LlmError};

// =============================================================================
// Retry Policy
// =============================================================================

/// Retry configuration for the executor
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Whether HTTP 429 responses are retried
    pub retry_on_throttle: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::MAX_ATTEMPTS,
            base_delay: Duration::from_secs_f64(retry_constants::BASE_DELAY_SECS),
            max_delay: Duration::from_secs(retry_constants::MAX_DELAY_SECS),
            retry_on_throttle: true,
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn should_retry(&self, failure: &LlmError) -> bool {
        failure.is_retryable() && (failure.kind != ErrorKind::Throttled || self.retry_on_throttle)
    }
}

/// Successful execution with retry bookkeeping
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub response: CompletionResponse,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Total time spent in backoff waits
    pub backoff: Duration,
}

/// Failed execution with the number of attempts it took
#[derive(Debug)]
pub struct ExecutionFailure {
    pub error: ForgeError,
    /// Attempts made before giving up (the interrupted one included)
    pub attempts: u32,
}

impl ExecutionFailure {
    fn new(error: ForgeError, attempts: u32) -> Self {
        Self { error, attempts }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn user_message(&self) -> String {
        self.error.user_message()
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Issues completion calls with classified, bounded retries
pub struct RequestExecutor {
    transport: SharedTransport,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: SharedTransport, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Execute `request`, retrying throttled and transient failures.
    #[instrument(
        skip(self, request, ctx),
        fields(transport = %self.transport.name(), max_attempts = self.policy.max_attempts)
    )]
    pub async fn execute(
        &self,
        request: &CompletionRequest,
        ctx: &CallContext,
    ) -> std::result::Result<ExecutionOutcome, ExecutionFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = Duration::ZERO;
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                warn!(attempt = attempt + 1, max_attempts, "Retrying completion request");
            } else {
                debug!(model = %self.transport.model(), "Sending completion request");
            }

            let result = match ctx.run(self.transport.complete(request)).await {
                Ok(result) => result,
                Err(reason) => {
                    // The request may already have reached the endpoint; its
                    // admission stays counted.
                    warn!(attempt = attempt + 1, %reason, "Completion request abandoned in flight");
                    return Err(ExecutionFailure::new(reason.into(), attempt + 1));
                }
            };

            let (failure, network) = match result {
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "Completion succeeded after retry");
                    }
                    return Ok(ExecutionOutcome {
                        response,
                        attempts: attempt + 1,
                        backoff,
                    });
                }
                Err(TransportError::Network(message)) => (
                    LlmError::new(
                        ErrorKind::Transient,
                        format!("Could not reach the completion endpoint: {}", message),
                    ),
                    true,
                ),
                Err(TransportError::Status {
                    status,
                    body,
                    retry_after,
                }) => (
                    ErrorClassifier::classify_http_status(status, &body).retry_after(retry_after),
                    false,
                ),
                Err(TransportError::Decode(message)) => {
                    error!(%message, "Completion endpoint returned an unusable envelope");
                    return Err(ExecutionFailure::new(
                        ForgeError::MalformedResponse(format!(
                            "The completion endpoint returned an unreadable reply: {}",
                            message
                        )),
                        attempt + 1,
                    ));
                }
            };

            let attempts_left = attempt + 1 < max_attempts;
            if !attempts_left || !self.policy.should_retry(&failure) {
                let failure = if network {
                    LlmError::new(
                        ErrorKind::Fatal,
                        format!("{} (after {} attempts)", failure.message, attempt + 1),
                    )
                } else {
                    failure
                };
                error!(
                    attempts = attempt + 1,
                    kind = %failure.kind,
                    message = %failure.message,
                    "Completion request failed"
                );
                return Err(ExecutionFailure::new(failure.into(), attempt + 1));
            }

            let delay = self
                .policy
                .delay_for(attempt)
                .max(failure.retry_after.unwrap_or_default())
                .min(self.policy.max_delay);
            warn!(
                attempt = attempt + 1,
                kind = %failure.kind,
                delay_ms = delay.as_millis() as u64,
                "Completion attempt failed, backing off"
            );
            ctx.sleep(delay)
                .await
                .map_err(|reason| ExecutionFailure::new(reason.into(), attempt + 1))?;
            backoff += delay;
            attempt += 1;
        }
    }
}
