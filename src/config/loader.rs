//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (`<config_dir>/transitq/config.toml`)
//! 3. Project config (`.transitq/config.toml`)
//! 4. Environment variables (`TRANSITQ_*` prefix, `__` between sections)
//! 5. Legacy flat variables (`GEMINI_API_KEY`, `MAX_RESULT_ROWS`, ...)

use directories::BaseDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{Result, TransitError};

/// Flat environment names accepted for compatibility, with their config keys
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("SCHEMA_CACHE_SECONDS", "agent.schema_cache_secs"),
    ("MAX_RESULT_ROWS", "agent.max_result_rows"),
    ("GEMINI_TIMEOUT_SECONDS", "llm.timeout_secs"),
    ("GEMINI_RETRY_COUNT", "llm.retry_count"),
    ("GEMINI_API_KEY", "llm.api_key"),
    ("GEMINI_MODEL", "llm.model"),
    ("DATABASE_PATH", "database.path"),
];

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_with_override(None)
    }

    /// Same as [`load`](Self::load) with an explicit file merged after the project config
    pub fn load_with_override(extra: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        if let Some(path) = extra {
            if !path.exists() {
                return Err(TransitError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config override from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        // TRANSITQ_AGENT__MAX_RESULT_ROWS -> agent.max_result_rows
        figment = figment.merge(Env::prefixed("TRANSITQ_").split("__"));
        figment = figment.merge(Self::legacy_env());

        let config: Config = figment
            .extract()
            .map_err(|e| TransitError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn legacy_env() -> Env {
        let names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();
        Env::raw().only(&names).map(|key| {
            LEGACY_ENV_KEYS
                .iter()
                .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                .map(|(_, mapped)| (*mapped).into())
                .unwrap_or_else(|| key.as_str().to_string().into())
        })
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory
    pub fn global_dir() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join("transitq"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".transitq")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration; the API key is never included
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| TransitError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            TransitError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_contents())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = Self::project_config_path();
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_contents())?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_config_contents() -> String {
        r#"# transitq configuration
# Project settings in .transitq/config.toml override the global file.
# The Gemini API key is read from GEMINI_API_KEY.

version = "1.0"

[database]
path = "transit.db"
pool_size = 8
statement_timeout_secs = 15

[llm]
provider = "gemini"
model = "gemini-2.0-flash"
timeout_secs = 30
retry_count = 1
retry_delay_ms = 500

[agent]
schema_cache_secs = 300
max_result_rows = 50
min_confidence = 3
strict_templates = true
"#
        .to_string()
    }
}
