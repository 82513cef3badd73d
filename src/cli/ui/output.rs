use console::style;

use crate::ai::limiter::{RateLimitStats, RateLimits};
use crate::ai::provider::UsageRecord;
use crate::ai::validation::{CorrectAnswer, GeneratedFlashcard, GeneratedQuizQuestion};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        println!("  {:<18} {}", style(key).dim(), value);
    }

    pub fn flashcard(&self, number: usize, card: &GeneratedFlashcard) {
        println!(
            "\n{} {}",
            style(format!("{}.", number)).bold(),
            style(&card.question).bold()
        );
        println!("   {}", card.answer);
        if let Some(explanation) = &card.explanation {
            println!("   {}", style(explanation).dim());
        }
        println!(
            "   {}",
            style(format!(
                "[{}] confidence {:.2}{}",
                card.difficulty,
                card.confidence,
                tag_suffix(&card.tags)
            ))
            .dim()
        );
    }

    pub fn quiz_question(&self, number: usize, question: &GeneratedQuizQuestion) {
        println!(
            "\n{} {} {}",
            style(format!("{}.", number)).bold(),
            style(&question.text).bold(),
            style(format!("({}, {} pt)", question.question_type, question.points)).dim()
        );

        let correct_index = match &question.correct {
            Some(CorrectAnswer::Index(i)) => Some(*i),
            _ => None,
        };
        for (i, option) in question.options.iter().enumerate() {
            let letter = char::from(b'A' + (i % 26) as u8);
            if Some(i) == correct_index {
                println!("   {} {}", style(format!("{})", letter)).green(), style(option).green());
            } else {
                println!("   {}) {}", letter, option);
            }
        }
        if let Some(CorrectAnswer::Text(answer)) = &question.correct {
            println!("   {} {}", style("Answer:").green(), answer);
        }
        if let Some(explanation) = &question.explanation {
            println!("   {}", style(explanation).dim());
        }
    }

    pub fn usage(&self, usage: &UsageRecord) {
        println!(
            "\n{}",
            style(format!(
                "tokens: {} prompt + {} completion = {} (≈ ${:.4})",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
                usage.estimated_cost_usd
            ))
            .dim()
        );
    }

    pub fn limits(&self, limits: &RateLimits) {
        self.field("Requests/minute", limits.requests_per_minute);
        self.field("Requests/day", limits.requests_per_day);
        self.field("Tokens/minute", limits.tokens_per_minute);
    }

    pub fn rate_limits(&self, stats: &RateLimitStats) {
        self.field(
            "Requests/minute",
            format!(
                "{} / {}",
                stats.requests_this_minute, stats.requests_per_minute_limit
            ),
        );
        self.field(
            "Requests today",
            format!("{} / {}", stats.daily_requests, stats.daily_limit),
        );
        self.field(
            "Tokens/minute",
            format!(
                "{} / {}",
                stats.tokens_this_minute, stats.tokens_per_minute_limit
            ),
        );
        if let Some(frees_at) = stats.window_frees_at {
            self.field("Window frees at", frees_at.format("%H:%M:%S UTC"));
        }
        self.field("Token reset", stats.token_reset_at.format("%H:%M:%S UTC"));
        self.field("Daily reset", stats.daily_reset_at.format("%Y-%m-%d %H:%M UTC"));
    }
}

fn tag_suffix(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" #{}", tags.join(" #"))
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
