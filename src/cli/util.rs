//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::ai::cancel::CallContext;
use crate::ai::generator::TextGenerator;
use crate::config::{Config, ConfigLoader};
use crate::types::{ErrorKind, ForgeError, LlmError, Result};

/// Command execution context
///
/// Loaded configuration plus the generation pipeline built from it.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub generator: Arc<TextGenerator>,
}

impl CommandContext {
    /// Load config from every source and build the HTTP pipeline
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        let generator = Arc::new(TextGenerator::from_config(&config)?);
        Ok(Self { config, generator })
    }
}

/// Call context canceled by Ctrl-C and, when given, bounded by `timeout_secs`.
///
/// Must be called inside a Tokio runtime.
pub fn interactive_context(timeout_secs: Option<u64>) -> CallContext {
    let (ctx, handle) = CallContext::cancellable();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, canceling pending generation");
            handle.cancel();
        }
    });

    match timeout_secs {
        Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
        None => ctx,
    }
}

/// Error for a failed generation result, keeping its classification
pub fn generation_failure(kind: ErrorKind, message: impl Into<String>) -> ForgeError {
    ForgeError::Llm(LlmError::new(kind, message))
}
