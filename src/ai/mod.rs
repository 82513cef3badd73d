//! AI Integration Layer
//!
//! Rate-limited, retrying LLM calls and normalization of their output into
//! study items.
//!
//! A call flows estimate → admission → execution → normalization:
//!
//! - [`tokenizer`]: heuristic token counts for admission and usage fallback
//! - [`limiter`]: per-minute, per-day and token-per-minute admission control
//! - [`provider`]: completion transport plus the bounded retry executor
//! - [`validation`]: JSON repair and flashcard/quiz normalization
//! - [`generator`]: public entry points tying the stages together

pub mod cancel;
pub mod generator;
pub mod limiter;
pub mod prompt;
pub mod provider;
pub mod tokenizer;
pub mod validation;

pub use cancel::{CallContext, CancelHandle, Interrupted};
pub use generator::{
    GenerationDefaults, GenerationRequest, GenerationResult, StructuredResult, TextGenerator,
};
pub use limiter::{Admission, AdmissionController, RateLimitStats, RateLimits};
pub use prompt::{PromptBuilder, PromptTemplates};
pub use provider::{
    CompletionRequest, CompletionResponse, CompletionTransport, ExecutionFailure,
    ExecutionOutcome, HttpTransport, Pricing, RequestExecutor, RetryPolicy, SharedTransport,
    TokenUsage, TransportError, UsageRecord,
};
pub use tokenizer::{estimate_exchange, estimate_tokens};
pub use validation::{
    ItemKind, ItemSchema, JsonRepairer, NormalizedBatch, ParsedItem, extract_json_with_repair_status,
    normalize,
};
