use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use studyforge::ai::ItemKind;
use studyforge::cli::commands::generate::GenerateOptions;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "studyforge")]
#[command(
    version,
    about = "Generate flashcards and quizzes from study material with a rate-limited LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,

    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a free-text prompt
    Generate {
        #[arg(help = "Prompt text")]
        prompt: String,
        #[arg(long, help = "Maximum output tokens")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature (0.0-2.0)")]
        temperature: Option<f32>,
        #[arg(long, help = "Give up after this many seconds")]
        timeout: Option<u64>,
    },

    /// Generate flashcards from material files
    Flashcards {
        #[arg(long = "file", short = 'f', required = true, help = "Material file (repeatable)")]
        files: Vec<PathBuf>,
        #[arg(long, short = 'n', default_value = "10", help = "Cards per file")]
        count: usize,
        #[arg(long, help = "Maximum output tokens")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature (0.0-2.0)")]
        temperature: Option<f32>,
        #[arg(long, help = "Give up after this many seconds")]
        timeout: Option<u64>,
    },

    /// Generate quiz questions from material files
    Quiz {
        #[arg(long = "file", short = 'f', required = true, help = "Material file (repeatable)")]
        files: Vec<PathBuf>,
        #[arg(long, short = 'n', default_value = "5", help = "Questions per file")]
        count: usize,
        #[arg(long, help = "Maximum output tokens")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature (0.0-2.0)")]
        temperature: Option<f32>,
        #[arg(long, help = "Give up after this many seconds")]
        timeout: Option<u64>,
    },

    /// Show configured rate limits and retry settings (usage is reported per run)
    Stats {
        #[arg(long, help = "Also check that the endpoint accepts the API key")]
        check: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mstudyforge encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            max_tokens,
            temperature,
            timeout,
        } => {
            let options = GenerateOptions {
                max_tokens,
                temperature,
                timeout_secs: timeout,
                json: cli.json,
            };
            let rt = Runtime::new()?;
            rt.block_on(studyforge::cli::commands::generate::run_text(
                &prompt, &options,
            ))?;
        }
        Commands::Flashcards {
            files,
            count,
            max_tokens,
            temperature,
            timeout,
        } => {
            let options = GenerateOptions {
                max_tokens,
                temperature,
                timeout_secs: timeout,
                json: cli.json,
            };
            let rt = Runtime::new()?;
            rt.block_on(studyforge::cli::commands::generate::run_items(
                ItemKind::Flashcard,
                &files,
                count,
                &options,
            ))?;
        }
        Commands::Quiz {
            files,
            count,
            max_tokens,
            temperature,
            timeout,
        } => {
            let options = GenerateOptions {
                max_tokens,
                temperature,
                timeout_secs: timeout,
                json: cli.json,
            };
            let rt = Runtime::new()?;
            rt.block_on(studyforge::cli::commands::generate::run_items(
                ItemKind::Quiz,
                &files,
                count,
                &options,
            ))?;
        }
        Commands::Stats { check } => {
            let rt = Runtime::new()?;
            rt.block_on(studyforge::cli::commands::stats::run(check, cli.json))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let format = if cli.json { "json" } else { format.as_str() };
                studyforge::cli::commands::config::show(format)?;
            }
            ConfigAction::Path => {
                studyforge::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                studyforge::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(())
}
