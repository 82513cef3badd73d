//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/studyforge/) and project (.studyforge/) level configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ai::limiter::RateLimits;
use crate::ai::provider::{Pricing, RetryPolicy};
use crate::constants::{llm as llm_constants, network, retry as retry_constants};
use crate::types::{ForgeError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Completion endpoint settings
    pub llm: LlmConfig,

    /// Admission ceilings shared by every call
    pub limits: RateLimits,

    /// Retry behavior for a single call
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            limits: RateLimits::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ForgeError::Config(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(ForgeError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_output_tokens == 0 {
            return Err(ForgeError::Config(
                "llm.max_output_tokens must be greater than 0".to_string(),
            ));
        }

        if self.llm.api_base.trim().is_empty() {
            return Err(ForgeError::Config("llm.api_base must be set".to_string()));
        }

        if self.llm.pricing.prompt_per_1k < 0.0 || self.llm.pricing.completion_per_1k < 0.0 {
            return Err(ForgeError::Config(
                "llm.pricing values must not be negative".to_string(),
            ));
        }

        self.limits.validate()?;
        self.retry.validate()
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub api_base: String,

    /// Model name
    pub model: String,

    /// API key; prefer the STUDYFORGE_API_KEY environment variable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Default output token limit per call
    pub max_output_tokens: u32,

    /// Default sampling temperature
    pub temperature: f32,

    /// Price per 1K tokens, for cost estimates
    pub pricing: Pricing,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: llm_constants::DEFAULT_API_BASE.to_string(),
            model: llm_constants::DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            max_output_tokens: llm_constants::DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: llm_constants::DEFAULT_TEMPERATURE,
            pricing: Pricing::default(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("pricing", &self.pricing)
            .finish()
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per call, the first one included
    pub max_retry_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    pub retry_base_delay_seconds: f64,

    /// Ceiling for a single backoff wait
    pub max_retry_delay_seconds: u64,

    /// Retry HTTP 429 responses (transient 5xx are always retried)
    pub enable_retry_on_throttle: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: retry_constants::MAX_ATTEMPTS,
            retry_base_delay_seconds: retry_constants::BASE_DELAY_SECS,
            max_retry_delay_seconds: retry_constants::MAX_DELAY_SECS,
            enable_retry_on_throttle: true,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_retry_attempts == 0 {
            return Err(ForgeError::Config(
                "retry.max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry_base_delay_seconds.is_finite() || self.retry_base_delay_seconds <= 0.0 {
            return Err(ForgeError::Config(format!(
                "retry.retry_base_delay_seconds must be a positive number, got {}",
                self.retry_base_delay_seconds
            )));
        }
        if self.max_retry_delay_seconds == 0 {
            return Err(ForgeError::Config(
                "retry.max_retry_delay_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Executor policy; call after `validate`
    pub fn to_policy(&self) -> RetryPolicy {
        let base = Duration::try_from_secs_f64(self.retry_base_delay_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs_f64(retry_constants::BASE_DELAY_SECS));

        RetryPolicy {
            max_attempts: self.max_retry_attempts.max(1),
            base_delay: base,
            max_delay: Duration::from_secs(self.max_retry_delay_seconds.max(1)),
            retry_on_throttle: self.enable_retry_on_throttle,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
