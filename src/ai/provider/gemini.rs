//! Gemini API Provider
//!
//! LLM provider using the Generative Language API `generateContent` endpoint
//! with JSON response mode. The API key travels in the `x-goog-api-key`
//! header so it never appears in a URL or a transport error message.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::{
    LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming, TokenUsage,
    default_model,
};
use crate::ai::validation::extract_json_object;
use crate::constants::{gemini as gemini_constants, query::MAX_ERROR_CHARS};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result, TransitError};

const PROVIDER: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider with secure API key handling
pub struct GeminiProvider {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: Url,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(gemini_constants::API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                TransitError::Config(format!(
                    "Gemini API key not found. Set {} or llm.api_key",
                    gemini_constants::API_KEY_ENV
                ))
            })?;

        let api_base = Self::validate_endpoint(
            config
                .api_base
                .as_deref()
                .unwrap_or(gemini_constants::DEFAULT_API_BASE),
        )?;

        let model = config
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(default_model);

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransitError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            client,
        })
    }

    /// Only http/https endpoints are accepted
    fn validate_endpoint(endpoint: &str) -> Result<Url> {
        let url = Url::parse(endpoint).map_err(|e| {
            TransitError::Config(format!("Invalid Gemini endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransitError::Config(format!(
                "Gemini endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        Ok(url)
    }

    fn model_url(&self, suffix: &str) -> Url {
        let path = format!(
            "{}/v1beta/models/{}{}",
            self.api_base.path().trim_end_matches('/'),
            self.model,
            suffix
        );
        let mut url = self.api_base.clone();
        url.set_path(&path);
        url
    }

    fn build_request(&self, prompt: &str, schema: &Value) -> GenerateContentRequest {
        let text = if schema.is_null() {
            prompt.to_string()
        } else {
            format!(
                "{}\n\nRespond ONLY with a JSON object matching:\n{}",
                prompt, schema
            )
        };

        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(text) }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json".to_string(),
                max_output_tokens: self.max_tokens,
            },
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransitError {
        if err.is_timeout() {
            return TransitError::timeout(format!("Gemini request ({})", self.model), self.timeout);
        }
        LlmError::with_provider(
            ErrorCategory::Network,
            format!(
                "Gemini request failed for model '{}' due to network error: {}",
                self.model,
                err.without_url()
            ),
            PROVIDER,
        )
        .into()
    }
}

/// Pull `error.message` out of an error body, falling back to the raw text
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    detail.chars().take(MAX_ERROR_CHARS).collect()
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        info!(
            "Generating with Gemini (model: {}, temperature: {})",
            self.model, self.temperature
        );

        let start_time = Instant::now();
        let url = self.model_url(":generateContent");
        let request = self.build_request(prompt, schema);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            let suffix = if detail.is_empty() {
                String::new()
            } else {
                format!(": {}", detail)
            };
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!(
                    "Gemini request failed for model '{}' with HTTP {}{}",
                    self.model,
                    status.as_u16(),
                    suffix
                ),
                PROVIDER,
            )
            .into());
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Gemini API response was not valid JSON: {}", e.without_url()),
                PROVIDER,
            )
        })?;
        let elapsed = start_time.elapsed();

        let usage = body
            .usage_metadata
            .as_ref()
            .map(|u| TokenUsage::from_gemini(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        let candidate = body.candidates.first().ok_or_else(|| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                "Gemini returned no candidates",
                PROVIDER,
            )
        })?;

        let text: String = candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::with_provider(
                ErrorCategory::ParseError,
                "Gemini returned empty content",
                PROVIDER,
            )
            .into());
        }

        debug!(
            tokens = usage.total(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Received Gemini response, parsing JSON"
        );
        let content = extract_json_object(&text)?;

        Ok(LlmResponse {
            content,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: PROVIDER.to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
