pub mod error;
pub mod utils;

pub use error::{ErrorClassifier, ErrorKind, ForgeError, LlmError, Result, format_remaining};
pub use utils::{json_f64_any, json_string_any, json_string_array_any, json_u64_any};
