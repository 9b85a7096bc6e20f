//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (`<config_dir>/transitq/`) and project (`.transitq/`) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{gemini, network, query, schema};
use crate::types::{Result, TransitError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Transit data store settings
    pub database: DatabaseConfig,

    /// Generative service settings
    pub llm: LlmConfig,

    /// Chat agent tuning
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `TransitError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(TransitError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(TransitError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.agent.max_result_rows == 0
            || self.agent.max_result_rows > query::MAX_RESULT_ROWS_CEILING
        {
            return Err(TransitError::Config(format!(
                "agent.max_result_rows must be between 1 and {}, got {}",
                query::MAX_RESULT_ROWS_CEILING,
                self.agent.max_result_rows
            )));
        }

        if self.database.pool_size == 0 {
            return Err(TransitError::Config(
                "database.pool_size must be greater than 0".to_string(),
            ));
        }

        if self.database.statement_timeout_secs == 0 {
            return Err(TransitError::Config(
                "database.statement_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the GTFS tables
    pub path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// Connection acquisition timeout (seconds)
    pub connection_timeout_secs: u64,

    /// Per-statement timeout (seconds)
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("transit.db"),
            pool_size: 8,
            connection_timeout_secs: network::CONNECTION_TIMEOUT_SECS,
            statement_timeout_secs: query::DEFAULT_STATEMENT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: gemini, builtin
    pub provider: String,

    /// Model name
    pub model: String,

    /// API key; read from config or `GEMINI_API_KEY`, never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: Option<String>,

    /// Request timeout (seconds)
    pub timeout_secs: u64,

    /// Additional attempts after a failed generation
    pub retry_count: u32,

    /// Fixed delay between attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Default: 0.0 for deterministic schema output
    pub temperature: f32,

    /// Output token ceiling
    pub max_tokens: usize,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_count", &self.retry_count)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: gemini::DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            retry_count: schema::DEFAULT_RETRY_COUNT,
            retry_delay_ms: schema::DEFAULT_RETRY_DELAY_MS,
            temperature: 0.0,
            max_tokens: gemini::DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent schema time-to-live (seconds); 0 regenerates on every turn
    pub schema_cache_secs: u64,

    /// Hard cap on rows returned by any query
    pub max_result_rows: usize,

    /// Minimum planner score to accept a template
    pub min_confidence: u32,

    /// Require every standard template key in generated schemas
    pub strict_templates: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            schema_cache_secs: schema::DEFAULT_CACHE_SECS,
            max_result_rows: query::DEFAULT_MAX_RESULT_ROWS,
            min_confidence: query::DEFAULT_MIN_CONFIDENCE,
            strict_templates: true,
        }
    }
}

impl AgentConfig {
    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.agent.max_result_rows, 50);
        assert_eq!(config.agent.schema_cache_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_row_cap() {
        let mut config = Config::default();
        config.agent.max_result_rows = 0;
        assert!(matches!(config.validate(), Err(TransitError::Config(_))));

        config.agent.max_result_rows = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_llm_values() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_is_redacted_and_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("secret-key-123".to_string());

        let debug = format!("{:?}", config.llm);
        assert!(!debug.contains("secret-key-123"));
        assert!(debug.contains("[REDACTED]"));

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("secret-key-123"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("[agent]\nmax_result_rows = 20\n").unwrap();
        assert_eq!(config.agent.max_result_rows, 20);
        assert_eq!(config.agent.min_confidence, 3);
        assert_eq!(config.database.path, PathBuf::from("transit.db"));
    }
}
