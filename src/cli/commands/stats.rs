//! Stats Command
//!
//! Show the configured rate limits and retry settings and, with `--check`,
//! whether the completion endpoint accepts the configured key.
//!
//! Admission counters live in the process that makes the calls, so usage is
//! reported by the generate commands, not here.

use chrono::Utc;
use serde_json::{Value, json};

use crate::ai::limiter::until_next_utc_midnight;
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::config::Config;
use crate::types::{Result, format_remaining};

pub async fn run(check: bool, json_output: bool) -> Result<()> {
    let context = CommandContext::load()?;
    let transport = context.generator.transport();

    let healthy = if check {
        Some(transport.health_check().await)
    } else {
        None
    };

    if json_output {
        let status = status_json(&context.config, transport.model(), healthy);
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let output = Output::new();
    output.header("studyforge status");

    output.section("Endpoint");
    output.field("API base", &context.config.llm.api_base);
    output.field("Model", transport.model());
    match healthy {
        Some(true) => output.success("Endpoint reachable, key accepted"),
        Some(false) => output.error("Endpoint check failed (see log for details)"),
        None => {}
    }

    output.section("Rate limits");
    output.limits(&context.config.limits);
    output.field(
        "Daily reset in",
        format_remaining(until_next_utc_midnight(Utc::now())),
    );

    output.section("Retry");
    let retry = &context.config.retry;
    output.field("Max attempts", retry.max_retry_attempts);
    output.field("Base delay", format!("{}s", retry.retry_base_delay_seconds));
    output.field("Retry on 429", retry.enable_retry_on_throttle);

    Ok(())
}

fn status_json(config: &Config, model: &str, healthy: Option<bool>) -> Value {
    json!({
        "endpoint": {
            "api_base": config.llm.api_base,
            "model": model,
            "healthy": healthy,
        },
        "limits": config.limits,
        "retry": config.retry,
    })
}
