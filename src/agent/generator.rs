//! Schema Generator
//!
//! Asks the generative service for an agent schema, then normalizes and
//! validates the answer. A schema that fails validation gets exactly one
//! repair round before the attempt counts as failed.
//!
//! Transport failures are retried with a fixed delay (`retry_count` extra
//! attempts) when the error category is retryable. Auth and bad-request
//! failures return immediately.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::domain::{REQUIRED_TEMPLATE_KEYS, truth_schema_json};
use super::schema::AgentSchema;
use crate::ai::{PromptBuilder, SharedProvider, with_timeout};
use crate::constants::{query, schema};
use crate::types::{Result, TransitError, ValidationError};

/// Source of fresh agent schemas
#[async_trait]
pub trait SchemaGenerator: Send + Sync {
    async fn generate(&self) -> Result<AgentSchema>;
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Per-attempt deadline
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub max_rows: usize,
    pub strict: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::constants::network::DEFAULT_TIMEOUT_SECS),
            retry_count: schema::DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_millis(schema::DEFAULT_RETRY_DELAY_MS),
            max_rows: query::DEFAULT_MAX_RESULT_ROWS,
            strict: false,
        }
    }
}

/// Stands in for a provider that could not be built (e.g. no API key).
/// Every generation fails, so data questions get the unavailable reply
/// while plain chat keeps working.
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SchemaGenerator for UnavailableGenerator {
    async fn generate(&self) -> Result<AgentSchema> {
        Err(TransitError::Config(self.reason.clone()))
    }
}

pub struct LlmSchemaGenerator {
    provider: SharedProvider,
    settings: GeneratorSettings,
}

impl LlmSchemaGenerator {
    pub fn new(provider: SharedProvider, settings: GeneratorSettings) -> Self {
        Self { provider, settings }
    }

    /// One provider request with timeout and retry
    async fn request(&self, prompt: &str) -> Result<Value> {
        let hint = contract_example();
        let hint = &hint;
        let timeout = self.settings.timeout;

        let attempt = || async move {
            let response = with_timeout(
                timeout,
                self.provider.generate(prompt, hint),
                "agent schema generation",
            )
            .await?;
            debug!(
                provider = %response.metadata.provider,
                model = %response.metadata.model,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                elapsed_ms = response.timing.total_ms,
                "Schema response received"
            );
            Ok::<_, TransitError>(response.content)
        };

        attempt
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.settings.retry_delay)
                    .with_max_times(self.settings.retry_count as usize),
            )
            .sleep(tokio::time::sleep)
            .when(|e: &TransitError| e.is_recoverable())
            .notify(|e: &TransitError, delay: Duration| {
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    ?delay,
                    "Schema generation attempt failed, retrying"
                );
            })
            .await
    }

    fn check(&self, value: Value) -> std::result::Result<AgentSchema, Vec<ValidationError>> {
        let mut schema = AgentSchema::from_value(value)?;
        schema.normalize(self.settings.max_rows);
        let issues = schema.validate(self.settings.max_rows, self.settings.strict);
        if issues.is_empty() {
            Ok(schema)
        } else {
            Err(issues)
        }
    }
}

#[async_trait]
impl SchemaGenerator for LlmSchemaGenerator {
    #[instrument(skip(self), fields(provider = self.provider.name(), model = self.provider.model()))]
    async fn generate(&self) -> Result<AgentSchema> {
        let raw = self.request(&generation_prompt(self.settings.max_rows)).await?;

        let issues = match self.check(raw.clone()) {
            Ok(schema) => {
                info!(templates = schema.query_templates.len(), "Agent schema generated");
                return Ok(schema);
            }
            Err(issues) => issues,
        };

        warn!(issues = issues.len(), "Generated agent schema invalid, requesting repair");
        let repaired = self.request(&repair_prompt(&issues, &raw)).await?;
        let schema = self.check(repaired).map_err(TransitError::InvalidSchema)?;
        info!(
            templates = schema.query_templates.len(),
            "Agent schema generated after repair"
        );
        Ok(schema)
    }
}

// =============================================================================
// Prompts
// =============================================================================

fn generation_prompt(max_rows: usize) -> String {
    let truth = serde_json::to_string_pretty(&truth_schema_json()).unwrap_or_default();

    PromptBuilder::new()
        .role(
            "transit data engineer",
            "writing read-only SQLite query templates for a GTFS schedule",
        )
        .rules([
            "Use only the tables, columns and joins listed in the domain schema".to_string(),
            "Every statement is a single SELECT or WITH query; never modify data".to_string(),
            "Bind user values with named placeholders (:name); never inline them".to_string(),
            "Never use SELECT *; name every output column".to_string(),
            format!("End every statement with LIMIT :limit or a literal LIMIT of at most {max_rows}"),
            "Qualify columns as alias.column using aliases from FROM/JOIN".to_string(),
            "Declare every placeholder in params, and nothing else".to_string(),
            "Give each template a display template whose columns match the SELECT list".to_string(),
        ])
        .section("Domain schema", "")
        .code("json", &truth)
        .section(
            "Required template keys",
            &REQUIRED_TEMPLATE_KEYS.join(", "),
        )
        .focus(
            "Return one JSON object with query_templates and display_templates",
            &["No markdown", "No commentary", "No extra top-level keys"],
        )
        .build()
}

fn repair_prompt(issues: &[ValidationError], previous: &Value) -> String {
    let errors = issues
        .iter()
        .map(|issue| format!("- {}", issue))
        .collect::<Vec<_>>()
        .join("\n");
    let previous = serde_json::to_string_pretty(previous).unwrap_or_default();

    PromptBuilder::new()
        .text("Repair the previous agent schema JSON. Return JSON only. Do not invent new tables/columns.")
        .section("Validation errors", &errors)
        .section("Previous schema", "")
        .code("json", &previous)
        .focus(
            "Fix every listed error and keep valid templates unchanged",
            &["No markdown", "No commentary"],
        )
        .build()
}

/// Shape hint passed to the provider alongside the prompt
fn contract_example() -> Value {
    json!({
        "query_templates": [{
            "key": "stops_on_route",
            "description": "Stops served by a route in stop order",
            "tables": ["routes", "trips", "stop_times", "stops"],
            "intent_keywords": ["stops on route", "route stops"],
            "sql": "SELECT DISTINCT s.stop_id, s.stop_name FROM trips t JOIN stop_times st ON st.trip_id = t.trip_id JOIN stops s ON s.stop_id = st.stop_id WHERE t.route_id = :route_id LIMIT :limit",
            "params": [
                {"name": "route_id", "type": "string"},
                {"name": "limit", "type": "integer", "default": 25}
            ],
            "required_inputs": [["route_id"]],
            "default_limit": 25,
            "display_key": "stops_on_route"
        }],
        "display_templates": [{
            "key": "stops_on_route",
            "title_template": "Stops on route {route_id}",
            "columns": [
                {"name": "stop_id", "label": "Stop ID", "type": "string"},
                {"name": "stop_name", "label": "Stop", "type": "string"}
            ],
            "row_id_field": "stop_id"
        }]
    })
}
