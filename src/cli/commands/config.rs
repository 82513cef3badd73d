//! Config Command
//!
//! Manage studyforge configuration.
//!
//! Usage:
//!   studyforge config show [-f json]
//!   studyforge config path
//!   studyforge config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::constants::llm::API_KEY_ENV;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format == "json")?);

    let key_source = if config.llm.api_key.is_some() {
        "config file"
    } else if std::env::var_os(API_KEY_ENV).is_some() {
        API_KEY_ENV
    } else {
        "not set"
    };
    eprintln!("# api_key: {}", key_source);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    println!("Configuration paths:");
    println!();
    for (label, path) in ConfigLoader::paths() {
        match path {
            Some(path) => {
                let exists = if path.exists() { "✓" } else { "✗" };
                println!("  {:<8} {} {}", format!("{}:", label), exists, path.display());
            }
            None => println!("  {:<8} (not available)", format!("{}:", label)),
        }
    }
    Ok(())
}

/// Initialize global or project configuration
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let output = Output::new();
    output.success(&format!(
        "Initialized {} configuration",
        if global { "global" } else { "project" }
    ));
    output.field("Config", path.display());
    output.info(&format!("Set {} to authenticate", API_KEY_ENV));
    Ok(())
}
