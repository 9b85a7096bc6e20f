//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for structured JSON generation.
//! All providers return `LlmResponse` with token usage for logging.
//!
//! ## Providers
//!
//! - `gemini`: Google Generative Language API over HTTPS
//! - `builtin`: offline provider answering with the bundled agent schema

mod builtin;
mod gemini;

pub use builtin::BuiltinProvider;
pub use gemini::GeminiProvider;

pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::constants::gemini as gemini_constants;
use crate::types::{Result, TransitError};

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// LLM response: parsed JSON content plus usage and timing
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated content (structured JSON)
    pub content: Value,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with content only (usage unknown)
    pub fn content_only(content: Value) -> Self {
        Self {
            content,
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Create from Gemini `usageMetadata`
    pub fn from_gemini(prompt_token_count: u32, candidates_token_count: u32) -> Self {
        Self {
            input_tokens: prompt_token_count,
            output_tokens: candidates_token_count,
        }
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Shared LLM provider type for concurrent access
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output.
/// Providers convert the key to `SecretString` on construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "gemini", "builtin"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Temperature for generation (0.0 = deterministic)
    pub temperature: f32,
    /// API key, never serialized to output
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for ProviderConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            model: Some(config.model.clone()),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

fn default_model() -> String {
    gemini_constants::DEFAULT_MODEL.to_string()
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// LLM Provider trait for structured output generation
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a JSON object for `prompt`
    ///
    /// `schema` is an optional shape hint; `Value::Null` means none.
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config.clone())?)),
        "builtin" => Ok(Arc::new(BuiltinProvider::new())),
        _ => Err(TransitError::Config(format!(
            "Unknown provider: {}. Supported: gemini, builtin",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("AIza-secret".to_string()),
            ..ProviderConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AIza-secret"));
        assert!(!serde_json::to_string(&config).unwrap().contains("AIza-secret"));
    }

    #[test]
    fn test_create_provider_rejects_unknown() {
        let config = ProviderConfig {
            provider: "claude".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(TransitError::Config(_))
        ));
    }

    #[test]
    fn test_create_builtin_provider() {
        let config = ProviderConfig {
            provider: "builtin".to_string(),
            ..ProviderConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "builtin");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::from_gemini(120, 30);
        assert_eq!(usage.total(), 150);
    }
}
