//! Unified Error Type System
//!
//! Centralized error types for the generation pipeline.
//! Provides error classification for retry and surfacing decisions.
//!
//! ## Error Kinds
//!
//! - **DailyLimitExceeded**: Local daily ceiling reached (hard stop)
//! - **Throttled**: Provider rejected the call for rate/quota reasons (retry with backoff)
//! - **InvalidCredential**: API key rejected (fail fast)
//! - **InsufficientPermission**: Model or plan access denied (fail fast)
//! - **Transient**: Server-side failure (retry with backoff)
//! - **MalformedResponse**: Payload unusable even after repair (surface)
//! - **Canceled**: Caller canceled or deadline passed

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Failure taxonomy surfaced to callers of the generation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local daily request ceiling reached - never retried
    DailyLimitExceeded,
    /// Provider-side rate or quota rejection (HTTP 429)
    Throttled,
    /// Authentication rejected - user must fix the key
    InvalidCredential,
    /// Model/plan access denied
    InsufficientPermission,
    /// Server-side failure (HTTP 5xx)
    Transient,
    /// Payload could not be parsed even after repair
    MalformedResponse,
    /// Caller-initiated cancellation or deadline
    Canceled,
    /// Local configuration is unusable (missing key, bad endpoint)
    Configuration,
    /// Anything else that is not worth retrying
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyLimitExceeded => write!(f, "DAILY_LIMIT_EXCEEDED"),
            Self::Throttled => write!(f, "THROTTLED"),
            Self::InvalidCredential => write!(f, "INVALID_CREDENTIAL"),
            Self::InsufficientPermission => write!(f, "INSUFFICIENT_PERMISSION"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::MalformedResponse => write!(f, "MALFORMED_RESPONSE"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

impl ErrorKind {
    /// Check if a failure of this kind may be retried with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Classified endpoint error with a user-facing message and retry hint
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error kind for routing decisions
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Wait suggested by the provider (Retry-After)
    pub retry_after: Option<Duration>,
    /// Whether backoff may help; false for exhausted quotas even though
    /// they are reported as throttling
    pub retryable: bool,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            retryable: kind.is_retryable(),
        }
    }

    /// Mark as never worth retrying, keeping the kind
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Option<Duration>) -> Self {
        self.retry_after = duration;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps endpoint responses onto the error taxonomy
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-success HTTP status, inspecting the body to tell
    /// credential, quota and model-access failures apart.
    pub fn classify_http_status(status: u16, body: &str) -> LlmError {
        let lower = body.to_lowercase();
        let detail = Self::summarize_body(body);

        let credential_hint = lower.contains("api key")
            || lower.contains("api_key")
            || lower.contains("invalid_api_key")
            || lower.contains("unauthenticated")
            || lower.contains("expired");

        match status {
            429 if lower.contains("quota")
                || lower.contains("billing")
                || lower.contains("resource_exhausted") =>
            {
                LlmError::new(
                    ErrorKind::Throttled,
                    format!(
                        "The API quota for this key is exhausted. Check the plan or billing limits and try again later. ({})",
                        detail
                    ),
                )
                .non_retryable()
            }
            429 => LlmError::new(
                ErrorKind::Throttled,
                format!(
                    "The provider is rate limiting requests. Wait a moment and try again. ({})",
                    detail
                ),
            ),
            401 => LlmError::new(
                ErrorKind::InvalidCredential,
                format!(
                    "The API key was rejected. It may be invalid or expired; update the configured key. ({})",
                    detail
                ),
            ),
            400 if credential_hint => LlmError::new(
                ErrorKind::InvalidCredential,
                format!(
                    "The API key was rejected. It may be invalid or expired; update the configured key. ({})",
                    detail
                ),
            ),
            403 => LlmError::new(
                ErrorKind::InsufficientPermission,
                format!(
                    "This key does not have permission to use the configured model. Choose another model or upgrade the plan. ({})",
                    detail
                ),
            ),
            404 if lower.contains("model") => LlmError::new(
                ErrorKind::InsufficientPermission,
                format!(
                    "The configured model is not available to this key. ({})",
                    detail
                ),
            ),
            500..=599 => LlmError::new(
                ErrorKind::Transient,
                format!(
                    "The provider failed with HTTP {}. Try again later. ({})",
                    status, detail
                ),
            ),
            _ => LlmError::new(
                ErrorKind::Fatal,
                format!("The provider rejected the request with HTTP {}: {}", status, detail),
            ),
        }
    }

    fn summarize_body(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return "no details".to_string();
        }
        // Prefer the provider's own message when the body is an error envelope
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
            && let Some(message) = value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
        trimmed.chars().take(200).collect()
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Classified endpoint error
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("Daily request limit reached; it resets in {}", format_remaining(*.resets_in))]
    DailyLimitExceeded { resets_in: Duration },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Canceled: {0}")]
    Canceled(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<LlmError> for ForgeError {
    fn from(err: LlmError) -> Self {
        ForgeError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Llm(e) => e.kind,
            Self::DailyLimitExceeded { .. } => ErrorKind::DailyLimitExceeded,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::Canceled(_) => ErrorKind::Canceled,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Json(_) => ErrorKind::Fatal,
        }
    }

    /// Message suitable for end users (no error-type prefixes)
    pub fn user_message(&self) -> String {
        match self {
            Self::Llm(e) => e.message.clone(),
            Self::DailyLimitExceeded { resets_in } => format!(
                "The daily request limit has been reached. It resets in {}.",
                format_remaining(*resets_in)
            ),
            other => other.to_string(),
        }
    }
}

/// Render a duration as "Xh Ym" for user-facing messages
pub fn format_remaining(duration: Duration) -> String {
    let total_minutes = duration.as_secs().div_ceil(60);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Throttled.to_string(), "THROTTLED");
        assert_eq!(ErrorKind::DailyLimitExceeded.to_string(), "DAILY_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_error_kind_retryable() {
        assert!(ErrorKind::Throttled.is_retryable());
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::InvalidCredential.is_retryable());
        assert!(!ErrorKind::InsufficientPermission.is_retryable());
        assert!(!ErrorKind::MalformedResponse.is_retryable());
        assert!(!ErrorKind::DailyLimitExceeded.is_retryable());
    }

    #[test]
    fn test_classify_throttled_vs_quota() {
        let throttled = ErrorClassifier::classify_http_status(429, "Too Many Requests");
        assert_eq!(throttled.kind, ErrorKind::Throttled);
        assert!(throttled.message.contains("rate limiting"));

        let quota = ErrorClassifier::classify_http_status(
            429,
            r#"{"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}}"#,
        );
        assert_eq!(quota.kind, ErrorKind::Throttled);
        assert!(!quota.is_retryable());
        assert!(throttled.is_retryable());
        assert!(quota.message.contains("quota"));
        assert!(quota.message.contains("You exceeded your current quota"));
    }

    #[test]
    fn test_classify_credentials_and_permission() {
        let unauthorized = ErrorClassifier::classify_http_status(401, "");
        assert_eq!(unauthorized.kind, ErrorKind::InvalidCredential);

        let bad_key = ErrorClassifier::classify_http_status(400, "API key not valid. API_KEY_INVALID");
        assert_eq!(bad_key.kind, ErrorKind::InvalidCredential);

        let forbidden = ErrorClassifier::classify_http_status(403, "model access denied");
        assert_eq!(forbidden.kind, ErrorKind::InsufficientPermission);

        let missing_model = ErrorClassifier::classify_http_status(404, "The model `x` does not exist");
        assert_eq!(missing_model.kind, ErrorKind::InsufficientPermission);
    }

    #[test]
    fn test_classify_server_and_client_errors() {
        assert_eq!(
            ErrorClassifier::classify_http_status(503, "overloaded").kind,
            ErrorKind::Transient
        );
        assert_eq!(
            ErrorClassifier::classify_http_status(422, "bad payload").kind,
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_forge_error_kind_mapping() {
        let err = ForgeError::DailyLimitExceeded {
            resets_in: Duration::from_secs(3 * 3600 + 120),
        };
        assert_eq!(err.kind(), ErrorKind::DailyLimitExceeded);
        assert!(err.user_message().contains("3h 2m"));

        assert_eq!(
            ForgeError::MalformedResponse("x".into()).kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(ForgeError::Config("x".into()).kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_serialization_error_is_not_a_content_failure() {
        let err: ForgeError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_secs(59)), "1m");
        assert_eq!(format_remaining(Duration::from_secs(3600)), "1h 0m");
        assert_eq!(format_remaining(Duration::from_secs(0)), "0m");
    }
}
