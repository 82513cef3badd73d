//! Completion Endpoint Abstraction
//!
//! Defines the `CompletionTransport` trait: one attempt of "send prompt +
//! settings, receive text + usage" against an external endpoint. Retry and
//! classification live in [`RequestExecutor`], not in transports.
//!
//! ## Modules
//!
//! - `http`: OpenAI-compatible chat completions over HTTPS
//! - `executor`: bounded retry loop with exponential backoff

mod executor;
mod http;

pub use executor::{ExecutionFailure, ExecutionOutcome, RequestExecutor, RetryPolicy};
pub use http::HttpTransport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Request / Response
// =============================================================================

/// One outbound completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Ask the endpoint for a JSON-only reply
    pub json_mode: bool,
}

/// Raw reply from the endpoint
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    /// Usage as reported by the endpoint, if any
    pub usage: Option<TokenUsage>,
}

/// Token usage metrics as reported by the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub prompt_tokens: u64,
    /// Output tokens (response)
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Total tokens used (prompt + completion)
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

// =============================================================================
// Usage Telemetry
// =============================================================================

/// Price per 1K tokens used for cost estimates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl Pricing {
    pub fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 / 1000.0 * self.prompt_per_1k
            + usage.completion_tokens as f64 / 1000.0 * self.completion_per_1k
    }
}

/// Usage record attached to every generation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn from_usage(usage: TokenUsage, pricing: &Pricing) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total(),
            estimated_cost_usd: pricing.estimate_cost(&usage),
            timestamp: Utc::now(),
        }
    }

    /// Record for a call that never reached the endpoint
    pub fn empty() -> Self {
        Self::from_usage(TokenUsage::default(), &Pricing::default())
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Failure of a single transport attempt, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure; the call may not have left
    Network(String),
    /// Endpoint answered with a non-success status
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    /// Success status but the envelope was unusable
    Decode(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {}", msg),
            Self::Status { status, body, .. } => write!(f, "HTTP {}: {}", status, body),
            Self::Decode(msg) => write!(f, "invalid response envelope: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// One attempt against a completion endpoint
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the endpoint is reachable with the configured key
    async fn health_check(&self) -> bool;
}

/// Shared transport for concurrent callers.
pub type SharedTransport = Arc<dyn CompletionTransport>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_pricing_estimate() {
        let pricing = Pricing {
            prompt_per_1k: 0.5,
            completion_per_1k: 1.5,
        };
        let cost = pricing.estimate_cost(&TokenUsage::new(2000, 1000));
        assert!((cost - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_usage_record_totals() {
        let record = UsageRecord::from_usage(TokenUsage::new(3, 4), &Pricing::default());
        assert_eq!(record.total_tokens, 7);
        assert_eq!(record.estimated_cost_usd, 0.0);
        assert_eq!(UsageRecord::empty().total_tokens, 0);
    }
}
