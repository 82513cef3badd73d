//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Rate limit constants
pub mod limits {
    /// Default ceiling on requests admitted in any 60-second window
    pub const REQUESTS_PER_MINUTE: u32 = 15;

    /// Default ceiling on requests admitted per calendar day (UTC)
    pub const REQUESTS_PER_DAY: u32 = 1500;

    /// Default ceiling on estimated tokens admitted per minute
    pub const TOKENS_PER_MINUTE: u64 = 1_000_000;

    /// Length of the sliding request window (seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Length of the daily counter period (seconds)
    pub const DAY_SECS: u64 = 24 * 60 * 60;
}

/// Retry constants
pub mod retry {
    /// Total attempts per call (first attempt included)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (seconds)
    pub const BASE_DELAY_SECS: f64 = 1.0;

    /// Upper bound on a single backoff wait (seconds)
    pub const MAX_DELAY_SECS: u64 = 300;
}

/// Response repair constants
pub mod repair {
    /// Maximum closing characters the truncation repair may append
    pub const MAX_REPAIR_CLOSERS: usize = 64;

    /// Characters of a failed payload quoted in error messages
    pub const PREVIEW_CHARS: usize = 200;
}

/// Generated item defaults
pub mod items {
    /// Confidence assigned when the model omits one
    pub const DEFAULT_CONFIDENCE: f64 = 0.8;

    /// Points assigned to a quiz question when the model omits them
    pub const DEFAULT_POINTS: u32 = 1;
}

/// LLM request constants
pub mod llm {
    /// Default OpenAI-compatible endpoint
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

    /// Default model name
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    /// Default cap on generated tokens
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Environment variable consulted when no key is configured
    pub const API_KEY_ENV: &str = "STUDYFORGE_API_KEY";
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}
