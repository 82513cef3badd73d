//! Generate Commands
//!
//! Free-text generation and study-item generation from material files.
//!
//! Usage:
//!   studyforge generate "<prompt>" [--max-tokens N] [--temperature T]
//!   studyforge flashcards --file notes.md [--file more.md] [--count 10]
//!   studyforge quiz --file notes.md [--count 5]

use std::path::PathBuf;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::ai::generator::{GenerationRequest, StructuredResult};
use crate::ai::prompt::PromptTemplates;
use crate::ai::validation::{ItemKind, ItemSchema, ParsedItem};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, generation_failure, interactive_context};
use crate::types::{ErrorKind, Result};

/// Per-call settings shared by every generate command
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Give up after this many seconds, waits included
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

impl GenerateOptions {
    fn build(&self, prompt: String) -> GenerationRequest {
        let mut request = GenerationRequest::new(prompt);
        request.max_output_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request
    }

    fn request(&self, prompt: String) -> Result<GenerationRequest> {
        let request = self.build(prompt);
        request.validate()?;
        Ok(request)
    }
}

/// Generate free text for `prompt`
pub async fn run_text(prompt: &str, options: &GenerateOptions) -> Result<()> {
    let request = options.request(prompt.to_string())?;
    let context = CommandContext::load()?;
    let ctx = interactive_context(options.timeout_secs);

    let result = context.generator.generate_text(&request, &ctx).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.success {
        println!("{}", result.content);
        Output::new().usage(&result.usage);
    }

    match result.error {
        Some(kind) if !result.success => Err(generation_failure(kind, result.content)),
        _ => Ok(()),
    }
}

/// Result for one material file
#[derive(Debug, Serialize)]
struct FileResult {
    file: PathBuf,
    #[serde(flatten)]
    result: StructuredResult,
}

/// Generate flashcards or quiz questions for every file, concurrently.
///
/// Calls share one admission controller, so a large batch is paced by the
/// configured rate limits rather than failing.
pub async fn run_items(
    kind: ItemKind,
    files: &[PathBuf],
    count: usize,
    options: &GenerateOptions,
) -> Result<()> {
    // Reject bad overrides before reading any file
    options.build(String::new()).validate()?;
    let context = CommandContext::load()?;
    let ctx = interactive_context(options.timeout_secs);

    let mut materials = Vec::with_capacity(files.len());
    for file in files {
        let material = tokio::fs::read_to_string(file).await?;
        if material.trim().is_empty() {
            warn!(file = %file.display(), "Material file is empty, skipping");
            continue;
        }
        materials.push((file.clone(), material));
    }

    let schema = match kind {
        ItemKind::Flashcard => ItemSchema::flashcards(),
        ItemKind::Quiz => ItemSchema::quiz(),
    };

    let calls = materials.iter().map(|(file, material)| {
        let prompt = match kind {
            ItemKind::Flashcard => PromptTemplates::flashcards(material, count),
            ItemKind::Quiz => PromptTemplates::quiz(material, count),
        };
        let request = options.build(prompt);
        let generator = context.generator.clone();
        let schema = &schema;
        let ctx = &ctx;
        async move {
            info!(file = %file.display(), "Generating items");
            FileResult {
                file: file.clone(),
                result: generator.generate_structured(&request, schema, ctx).await,
            }
        }
    });
    let results = join_all(calls).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
        print_rate_limits(&context);
    }

    summarize(&results)
}

fn print_results(results: &[FileResult]) {
    let output = Output::new();

    for entry in results {
        output.section(&entry.file.display().to_string());

        let result = &entry.result;
        if !result.success {
            output.error(result.message.as_deref().unwrap_or("Generation failed"));
            continue;
        }

        for (i, item) in result.items.iter().enumerate() {
            match item {
                ParsedItem::Flashcard(card) => output.flashcard(i + 1, card),
                ParsedItem::Quiz(question) => output.quiz_question(i + 1, question),
            }
        }

        if result.items.is_empty() {
            output.warning("The model returned no usable items");
        } else if result.skipped > 0 {
            output.warning(&format!("{} malformed item(s) skipped", result.skipped));
        }
        output.usage(&result.usage);
    }
}

/// Limiter usage accumulated by this batch
fn print_rate_limits(context: &CommandContext) {
    let output = Output::new();
    output.section("Rate limits");
    output.rate_limits(&context.generator.rate_limit_stats());
}

/// Fail when no file produced a usable item
fn summarize(results: &[FileResult]) -> Result<()> {
    let produced: usize = results.iter().map(|r| r.result.items.len()).sum();
    if produced > 0 {
        return Ok(());
    }

    match results.iter().find(|r| !r.result.success) {
        Some(failed) => Err(generation_failure(
            failed.result.error.unwrap_or(ErrorKind::Fatal),
            failed
                .result
                .message
                .clone()
                .unwrap_or_else(|| "Generation failed".to_string()),
        )),
        None => Err(generation_failure(
            ErrorKind::MalformedResponse,
            "No usable items were generated",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::UsageRecord;
    use crate::ai::validation::{Difficulty, GeneratedFlashcard};

    fn result(success: bool, items: usize, error: Option<ErrorKind>) -> FileResult {
        let card = ParsedItem::Flashcard(GeneratedFlashcard {
            question: "Q".into(),
            answer: "A".into(),
            explanation: None,
            difficulty: Difficulty::Medium,
            tags: vec![],
            confidence: 0.8,
        });
        FileResult {
            file: PathBuf::from("notes.md"),
            result: StructuredResult {
                success,
                items: vec![card; items],
                usage: UsageRecord::empty(),
                error,
                message: error.map(|k| format!("failed: {}", k)),
                repaired: false,
                skipped: 0,
                attempts: 1,
            },
        }
    }

    #[test]
    fn test_summarize_accepts_any_items() {
        let results = vec![result(false, 0, Some(ErrorKind::Throttled)), result(true, 2, None)];
        assert!(summarize(&results).is_ok());
    }

    #[test]
    fn test_summarize_zero_items_is_failure() {
        let err = summarize(&[result(true, 0, None)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_summarize_keeps_failure_kind() {
        let err = summarize(&[result(false, 0, Some(ErrorKind::InvalidCredential))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);
    }

    #[test]
    fn test_options_build_request() {
        let options = GenerateOptions {
            max_tokens: Some(300),
            temperature: None,
            ..Default::default()
        };
        let request = options.request("p".into()).unwrap();
        assert_eq!(request.max_output_tokens, Some(300));
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn test_options_reject_out_of_range_overrides() {
        let hot = GenerateOptions {
            temperature: Some(5.0),
            ..Default::default()
        };
        let err = hot.request("p".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let empty = GenerateOptions {
            max_tokens: Some(0),
            ..Default::default()
        };
        assert!(empty.request("p".into()).is_err());
    }

    #[test]
    fn test_file_result_json_is_flat() {
        let value = serde_json::to_value(result(true, 1, None)).unwrap();
        assert_eq!(value["file"], "notes.md");
        assert_eq!(value["success"], true);
        assert_eq!(value["items"][0]["kind"], "flashcard");
    }
}
