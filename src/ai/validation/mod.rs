//! Response Normalization and Repair
//!
//! Turns a model reply that should be JSON into typed study items:
//! - JSON repair for fenced, prose-wrapped or truncated replies
//! - Item extraction with field aliases, defaults and skip-on-invalid
//!
//! ## Design Philosophy
//! - Fail on payload shape (missing top-level array), skip on item shape
//! - Repair is bounded; past the cap the reply is reported as malformed

mod items;
mod json_repair;

pub use items::{
    CorrectAnswer, Difficulty, GeneratedFlashcard, GeneratedQuizQuestion, ItemKind, ItemSchema,
    NormalizedBatch, ParsedItem, QuestionType, normalize,
};
pub use json_repair::{JsonRepairer, extract_json_with_repair_status, repair_truncation};
