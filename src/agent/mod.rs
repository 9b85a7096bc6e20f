//! Query Agent
//!
//! The chat-to-SQL pipeline over the fixed four-table GTFS domain.
//!
//! ```text
//! message ─► QuestionGate ─► SchemaCache ─► QueryPlanner ─► SafeExecutor ─► render
//!               │ no             │ (SchemaGenerator on miss)
//!               ▼                ▼
//!          chat reply       AgentSchema snapshot
//! ```

pub mod cache;
pub mod chat;
pub mod display;
pub mod domain;
pub mod executor;
pub mod extract;
pub mod gate;
pub mod generator;
pub mod planner;
pub mod safety;
pub mod schema;
pub mod service;

use std::time::Duration;

pub use cache::{AgentStatus, CachedSchema, Clock, SchemaCache, SchemaOrigin, SystemClock};
pub use chat::{ChatMessage, ChatRequest, ChatResponse, ErrorResponse, PlanSummary, Role};
pub use display::{DisplayColumn, DisplayPayload};
pub use executor::{ExecutionError, ExecutionResult, SafeExecutor};
pub use gate::{GateDecision, QuestionGate};
pub use generator::{
    GeneratorSettings, LlmSchemaGenerator, SchemaGenerator, UnavailableGenerator,
};
pub use planner::{PlannerSettings, QueryPlan, QueryPlanner};
pub use schema::{AgentSchema, ColumnSpec, ColumnType, DisplaySpec, ParamType, QueryTemplate};
pub use service::ChatService;

use crate::config::Config;

/// Immutable inputs for one pipeline instance
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub schema_ttl: Duration,
    pub max_rows: usize,
    pub min_confidence: u32,
    pub strict_templates: bool,
    pub generation_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AgentSettings {
    fn from(config: &Config) -> Self {
        Self {
            schema_ttl: config.agent.schema_ttl(),
            max_rows: config.agent.max_result_rows,
            min_confidence: config.agent.min_confidence,
            strict_templates: config.agent.strict_templates,
            generation_timeout: config.llm.timeout(),
            retry_count: config.llm.retry_count,
            retry_delay: config.llm.retry_delay(),
        }
    }
}

impl AgentSettings {
    pub fn planner(&self) -> PlannerSettings {
        PlannerSettings {
            max_rows: self.max_rows,
            min_confidence: self.min_confidence,
        }
    }

    pub fn generator(&self) -> GeneratorSettings {
        GeneratorSettings {
            timeout: self.generation_timeout,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
            max_rows: self.max_rows,
            strict: self.strict_templates,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fakes for the pipeline seams: provider, generator, store, clock

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{Value, json};

    use super::cache::Clock;
    use super::generator::SchemaGenerator;
    use super::schema::AgentSchema;
    use crate::ai::{LlmProvider, LlmResponse};
    use crate::storage::{BoundParam, DataStore, Row, StoreRows};
    use crate::types::{ErrorCategory, Result, TransitError};

    pub fn sample_schema_json() -> Value {
        serde_json::to_value(AgentSchema::builtin()).unwrap()
    }

    /// One scripted answer; the last step repeats once the script runs out
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Ok(Value),
        Fail(ErrorCategory),
    }

    struct Script {
        steps: Mutex<VecDeque<Scripted>>,
    }

    impl Script {
        fn new(steps: Vec<Scripted>) -> Self {
            assert!(!steps.is_empty(), "script needs at least one step");
            Self {
                steps: Mutex::new(steps.into()),
            }
        }

        fn next(&self) -> Scripted {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                steps.front().cloned().unwrap()
            }
        }
    }

    fn fail(category: ErrorCategory) -> TransitError {
        TransitError::llm_with_category(category, format!("scripted {} failure", category))
    }

    // -------------------------------------------------------------------------
    // Provider
    // -------------------------------------------------------------------------

    pub struct FakeProvider {
        script: Script,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        pub fn new(steps: Vec<Scripted>) -> Self {
            Self {
                script: Script::new(steps),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        async fn generate(&self, prompt: &str, _schema: &Value) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.script.next() {
                Scripted::Ok(value) => Ok(LlmResponse::content_only(value)),
                Scripted::Fail(category) => Err(fail(category)),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    // -------------------------------------------------------------------------
    // Generator
    // -------------------------------------------------------------------------

    pub struct FakeGenerator {
        script: Script,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeGenerator {
        pub fn new(steps: Vec<Scripted>) -> Self {
            Self {
                script: Script::new(steps),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        pub fn succeeding() -> Self {
            Self::new(vec![Scripted::Ok(sample_schema_json())])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SchemaGenerator for FakeGenerator {
        /// Normalized but never validated, so tests can inject bad templates
        async fn generate(&self) -> Result<AgentSchema> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.script.next() {
                Scripted::Ok(value) => {
                    let mut schema =
                        AgentSchema::from_value(value).map_err(TransitError::InvalidSchema)?;
                    schema.normalize(50);
                    Ok(schema)
                }
                Scripted::Fail(category) => Err(fail(category)),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Store
    // -------------------------------------------------------------------------

    pub struct FakeStore {
        available: usize,
        honors_cap: bool,
        failure: Option<String>,
        calls: AtomicUsize,
        last_max_rows: Mutex<Option<usize>>,
    }

    impl FakeStore {
        pub fn with_rows(available: usize) -> Self {
            Self {
                available,
                honors_cap: true,
                failure: None,
                calls: AtomicUsize::new(0),
                last_max_rows: Mutex::new(None),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                failure: Some(message.to_string()),
                ..Self::with_rows(0)
            }
        }

        /// Return every row regardless of `max_rows`
        pub fn ignoring_cap(mut self) -> Self {
            self.honors_cap = false;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_max_rows(&self) -> Option<usize> {
            *self.last_max_rows.lock().unwrap()
        }
    }

    #[async_trait]
    impl DataStore for FakeStore {
        async fn query(
            &self,
            _sql: &str,
            _params: &[BoundParam],
            max_rows: usize,
        ) -> Result<StoreRows> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_max_rows.lock().unwrap() = Some(max_rows);
            if let Some(message) = &self.failure {
                return Err(TransitError::Storage(message.clone()));
            }

            let take = if self.honors_cap {
                self.available.min(max_rows)
            } else {
                self.available
            };
            let rows: Vec<Row> = (0..take)
                .map(|i| json!({ "n": i }).as_object().cloned().unwrap())
                .collect();
            Ok(StoreRows {
                rows,
                truncated: self.honors_cap && self.available > max_rows,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Clock
    // -------------------------------------------------------------------------

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
