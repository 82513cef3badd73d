//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/studyforge/config.toml)
//! 3. Project config (.studyforge/config.toml)
//! 4. Environment variables (STUDYFORGE_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{ForgeError, Result};

const APP_DIR: &str = "studyforge";
const PROJECT_DIR: &str = ".studyforge";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "STUDYFORGE_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_with(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Same chain with explicit file locations
    pub fn load_with(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // e.g. STUDYFORGE_LIMITS__REQUESTS_PER_MINUTE -> limits.requests_per_minute
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/studyforge/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".config")))
            .map(|p| p.join(APP_DIR))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Config file locations and whether each exists
    pub fn paths() -> Vec<(&'static str, Option<PathBuf>)> {
        vec![
            ("Global", Self::global_config_path()),
            ("Project", Some(Self::project_config_path())),
        ]
    }

    /// Render the effective configuration (API key omitted)
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| ForgeError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            ForgeError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::init_at(&global_dir, force)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::init_at(&Self::project_dir(), force)
    }

    /// Write the default config file into `dir`, keeping an existing one unless `force`
    pub fn init_at(dir: &Path, force: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_file()?)?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Default config file content (TOML)
    fn default_config_file() -> Result<String> {
        let body = Self::render(&Config::default(), false)?;
        Ok(format!(
            "# studyforge configuration\n\
             # Project settings in .studyforge/config.toml override ~/.config/studyforge/config.toml.\n\
             # Set the API key through STUDYFORGE_API_KEY rather than in this file.\n\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_when_files_missing() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("missing.toml");
            let config = ConfigLoader::load_with(None, &missing).unwrap();
            assert_eq!(config.version, "1.0");
            assert_eq!(config.limits.requests_per_day, 1500);
            Ok(())
        });
    }

    #[test]
    fn test_layering_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "global.toml",
                r#"
                [llm]
                model = "global-model"

                [limits]
                requests_per_minute = 10
                "#,
            )?;
            jail.create_file(
                "project.toml",
                r#"
                [limits]
                requests_per_minute = 5

                [retry]
                enable_retry_on_throttle = false
                "#,
            )?;
            jail.set_env("STUDYFORGE_LIMITS__REQUESTS_PER_DAY", "42");

            let dir = jail.directory();
            let config =
                ConfigLoader::load_with(Some(&dir.join("global.toml")), &dir.join("project.toml"))
                    .unwrap();

            assert_eq!(config.llm.model, "global-model");
            assert_eq!(config.limits.requests_per_minute, 5);
            assert_eq!(config.limits.requests_per_day, 42);
            assert!(!config.retry.enable_retry_on_throttle);
            assert_eq!(config.retry.max_retry_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_value_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("project.toml", "[limits]\nrequests_per_minute = 0\n")?;
            let err = ConfigLoader::load_with(None, &jail.directory().join("project.toml"))
                .unwrap_err();
            assert!(matches!(err, ForgeError::Config(ref m) if m.contains("requests_per_minute")));
            Ok(())
        });
    }

    #[test]
    fn test_api_key_from_file_is_loaded() {
        Jail::expect_with(|jail| {
            jail.create_file("project.toml", "[llm]\napi_key = \"sk-file\"\n")?;
            let config =
                ConfigLoader::load_with(None, &jail.directory().join("project.toml")).unwrap();
            assert_eq!(config.llm.api_key.as_deref(), Some("sk-file"));
            Ok(())
        });
    }

    #[test]
    fn test_init_writes_loadable_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = ConfigLoader::init_at(temp_dir.path(), false).unwrap();
        assert!(path.exists());

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# studyforge configuration"));
        assert!(contents.contains("[limits]"));

        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.limits, Config::default().limits);
        assert_eq!(parsed.retry, Config::default().retry);
    }

    #[test]
    fn test_init_keeps_existing_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::init_at(temp_dir.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"custom\"\n");

        ConfigLoader::init_at(temp_dir.path(), true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[retry]"));
    }

    #[test]
    fn test_render_json() {
        let rendered = ConfigLoader::render(&Config::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["limits"]["requests_per_minute"], 15);
        assert!(value["llm"].get("api_key").is_none());
    }
}
