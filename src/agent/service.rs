//! Chat Orchestrator
//!
//! Runs one chat turn through the pipeline, strictly in order:
//! gate, schema cache, planner, executor, display mapper. Every failure
//! inside the turn becomes a field of the response; `handle` never errors.

use std::sync::Arc;

use chrono::Local;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::AgentSettings;
use super::cache::{Clock, SchemaCache, SystemClock};
use super::chat::{ChatRequest, ChatResponse, PlanSummary};
use super::display::{DisplayPayload, render};
use super::executor::{ExecutionError, SafeExecutor};
use super::gate::QuestionGate;
use super::generator::{LlmSchemaGenerator, SchemaGenerator, UnavailableGenerator};
use super::planner::QueryPlanner;
use crate::ai::{ProviderConfig, create_provider};
use crate::config::Config;
use crate::storage::{Database, PoolConfig, SharedStore, SqliteStore};
use crate::types::{RequestId, Result, TransitError};

const CHAT_REPLY: &str = "I can answer questions about the transit schedule: routes, stops, \
     trips and arrival times. Ask me something like \"which routes stop at Central Station?\"";

const UNAVAILABLE_REPLY: &str =
    "Sorry, I can't query the schedule right now because the query templates are unavailable. \
     Please try again shortly.";

const REJECTED_REPLY: &str = "Sorry, I couldn't run that query safely.";

const FAILED_REPLY: &str = "Sorry, the query could not be completed.";

pub struct ChatService {
    gate: QuestionGate,
    cache: Arc<SchemaCache>,
    planner: QueryPlanner,
    executor: SafeExecutor,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(
        cache: Arc<SchemaCache>,
        store: SharedStore,
        settings: &AgentSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate: QuestionGate::new(),
            cache,
            planner: QueryPlanner::new(settings.planner()),
            executor: SafeExecutor::new(store, settings.max_rows),
            clock,
        }
    }

    /// Wire the pipeline from configuration: SQLite store, configured
    /// provider, system clock. A provider that cannot be built does not
    /// fail construction; data questions report the schema as unavailable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = Database::open_with_config(
            &config.database.path,
            PoolConfig::from(&config.database),
        )?;
        let store = Arc::new(SqliteStore::new(
            Arc::new(db),
            config.database.statement_timeout(),
        ));

        let settings = AgentSettings::from(config);
        let generator: Arc<dyn SchemaGenerator> =
            match create_provider(&ProviderConfig::from(&config.llm)) {
                Ok(provider) => Arc::new(LlmSchemaGenerator::new(provider, settings.generator())),
                Err(e) => {
                    warn!(error = %e, "Provider unavailable; schedule questions will fail");
                    Arc::new(UnavailableGenerator::new(e.to_string()))
                }
            };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(SchemaCache::new(generator, clock.clone(), settings.schema_ttl));

        Ok(Self::new(cache, store, &settings, clock))
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub async fn handle(&self, request: &ChatRequest) -> ChatResponse {
        let request_id = RequestId::new();
        self.turn(request)
            .instrument(info_span!("chat_turn", %request_id))
            .await
    }

    async fn turn(&self, request: &ChatRequest) -> ChatResponse {
        let decision = self.gate.classify(&request.message, &request.history);
        if !decision.is_database {
            debug!(rule = ?decision.rule, "Answering as chat");
            return ChatResponse::message(CHAT_REPLY);
        }
        debug!(rule = ?decision.rule, "Answering from the schedule");

        let cached = match self.cache.get().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "No agent schema available");
                return ChatResponse {
                    error: Some(e.to_string()),
                    ..ChatResponse::message(UNAVAILABLE_REPLY)
                };
            }
        };
        let status = Some(cached.status.clone());

        let now = self.clock.now().with_timezone(&Local).time();
        let plan = match self
            .planner
            .propose(&request.message, &request.history, &cached.schema, now)
        {
            Ok(plan) => plan,
            Err(TransitError::NoMatch { clarification }) => {
                return ChatResponse {
                    agent_status: status,
                    ..ChatResponse::message(clarification)
                };
            }
            Err(e) => {
                error!(error = %e, "Planner failed");
                return ChatResponse {
                    agent_status: status,
                    error: Some(e.to_string()),
                    ..ChatResponse::message(FAILED_REPLY)
                };
            }
        };

        let result = self.executor.execute(&plan).await;
        match result.error {
            Some(ExecutionError::Rejected) => ChatResponse {
                agent_status: status,
                error: Some(ExecutionError::Rejected.to_string()),
                ..ChatResponse::message(REJECTED_REPLY)
            },
            Some(ExecutionError::Failed(ref message)) => ChatResponse {
                query_executed: true,
                query_plan: Some(PlanSummary::from(&plan)),
                agent_status: status,
                error: Some(format!("query failed: {}", message)),
                ..ChatResponse::message(FAILED_REPLY)
            },
            None => {
                let payload = render(
                    &result,
                    cached.schema.display(&plan.display_key),
                    &plan.display_key,
                    &plan.params,
                );
                let (rows, truncated) = (payload.row_count, payload.truncated);
                info!(template = %plan.template_key, rows, truncated, "Query answered");
                ChatResponse {
                    assistant_message: summarize(&payload),
                    query_executed: true,
                    query_plan: Some(PlanSummary::from(&plan)),
                    display: Some(payload),
                    agent_status: status,
                    error: None,
                }
            }
        }
    }
}

fn summarize(display: &DisplayPayload) -> String {
    if let Some(value) = display.single_value() {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "none".to_string(),
            other => other.to_string(),
        };
        return format!("{}: {}", display.title, value);
    }

    let mut message = match display.row_count {
        0 => format!("{}: no matching rows.", display.title),
        1 => format!("{}: 1 row.", display.title),
        n => format!("{}: {} rows.", display.title, n),
    };
    if display.truncated {
        message.push_str(" Showing the first rows only; ask for fewer results to narrow it down.");
    }
    message
}
