//! StudyForge - Rate-Limited LLM Generation for Study Material
//!
//! Turns source material into flashcards and quiz questions through a
//! hosted LLM while staying inside the provider's rate limits.
//!
//! ## Core Features
//!
//! - **Admission Control**: sliding-minute, daily and token-per-minute limits
//!   shared by every concurrent caller
//! - **Bounded Retry**: exponential backoff on throttling and transient errors
//! - **Response Repair**: code-fence stripping and truncation repair before
//!   items are normalized
//! - **Usage Accounting**: token counts and cost per call
//!
//! ## Quick Start
//!
//! ```ignore
//! use studyforge::{CallContext, ConfigLoader, GenerationRequest, ItemSchema, TextGenerator};
//! use studyforge::ai::PromptTemplates;
//!
//! let config = ConfigLoader::load()?;
//! let generator = TextGenerator::from_config(&config)?;
//! let request = GenerationRequest::new(PromptTemplates::flashcards(&notes, 10));
//! let result = generator
//!     .generate_structured(&request, &ItemSchema::flashcards(), &CallContext::new())
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: admission, execution, repair and the generation entry points
//! - [`config`]: layered configuration
//! - [`cli`]: command implementations for the `studyforge` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, LlmConfig, RetrySettings};

// Error Types
pub use types::error::{ErrorClassifier, ErrorKind, ForgeError, LlmError, Result};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    // Admission
    AdmissionController,
    // Cancellation
    CallContext,
    CancelHandle,
    // Transport
    CompletionTransport,
    // Generation
    GenerationRequest,
    GenerationResult,
    HttpTransport,
    // Items
    ItemSchema,
    ParsedItem,
    Pricing,
    RateLimitStats,
    RateLimits,
    StructuredResult,
    TextGenerator,
    UsageRecord,
};
