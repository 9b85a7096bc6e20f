//! Schema Cache
//!
//! Process-wide slot holding the current agent schema with an age-based
//! expiry. Concurrent misses collapse into one generation call; if every
//! waiter is dropped the call is cancelled and the next miss starts over.
//!
//! When regeneration fails and an older schema exists, the older schema is
//! served as a fallback and the failure is reported through `AgentStatus`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::executor::sanitize;
use super::generator::SchemaGenerator;
use super::schema::AgentSchema;
use crate::constants::schema::MAX_REPORTED_ISSUES;
use crate::types::{Result, TransitError};

// =============================================================================
// Clock
// =============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaOrigin {
    /// Generated for this request
    Fresh,
    /// Reused within its time-to-live
    Cached,
    /// Expired, served because regeneration failed
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub source: SchemaOrigin,
    pub cache_age_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// One schema snapshot plus how it was obtained
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub schema: Arc<AgentSchema>,
    pub status: AgentStatus,
}

// =============================================================================
// Cache
// =============================================================================

type FlightResult = std::result::Result<Arc<AgentSchema>, String>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

struct Entry {
    schema: Arc<AgentSchema>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entry: Option<Entry>,
    in_flight: Option<(u64, WeakShared<BoxFuture<'static, FlightResult>>)>,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    next_flight: u64,
}

pub struct SchemaCache {
    generator: Arc<dyn SchemaGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl SchemaCache {
    /// `ttl` of zero disables reuse: every request regenerates
    pub fn new(generator: Arc<dyn SchemaGenerator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            generator,
            clock,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Current schema, regenerating when missing or expired
    pub async fn get(&self) -> Result<CachedSchema> {
        self.load(false).await
    }

    /// Regenerate regardless of age
    pub async fn refresh(&self) -> Result<CachedSchema> {
        self.load(true).await
    }

    /// Drop the cached entry; the next `get` regenerates
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entry = None;
        info!("Agent schema cache cleared");
    }

    /// Status of the stored entry, if any
    pub fn status(&self) -> Option<AgentStatus> {
        let state = lock(&self.state);
        state
            .entry
            .as_ref()
            .map(|entry| self.status_for(&state, entry, SchemaOrigin::Cached))
    }

    async fn load(&self, force: bool) -> Result<CachedSchema> {
        let flight = {
            let mut state = lock(&self.state);
            if !force
                && let Some(entry) = state.entry.as_ref()
                && self.is_fresh(entry)
            {
                debug!("Agent schema cache hit");
                return Ok(CachedSchema {
                    schema: entry.schema.clone(),
                    status: self.status_for(&state, entry, SchemaOrigin::Cached),
                });
            }

            let joined = state.in_flight.as_ref().and_then(|(_, weak)| weak.upgrade());
            match joined {
                Some(flight) => {
                    debug!("Joining in-flight schema generation");
                    flight
                }
                None => self.start_flight(&mut state),
            }
        };

        let outcome = flight.await;

        let state = lock(&self.state);
        match (outcome, state.entry.as_ref()) {
            (Ok(schema), entry) => {
                let status = match entry {
                    Some(entry) if Arc::ptr_eq(&entry.schema, &schema) => {
                        self.status_for(&state, entry, SchemaOrigin::Fresh)
                    }
                    _ => AgentStatus {
                        source: SchemaOrigin::Fresh,
                        cache_age_seconds: 0,
                        last_error: None,
                        last_attempt_at: state.last_attempt_at,
                        last_success_at: state.last_success_at,
                    },
                };
                Ok(CachedSchema { schema, status })
            }
            (Err(message), Some(entry)) => {
                warn!(error = %message, "Serving previous agent schema");
                let mut status = self.status_for(&state, entry, SchemaOrigin::Fallback);
                status.last_error = Some(message);
                Ok(CachedSchema {
                    schema: entry.schema.clone(),
                    status,
                })
            }
            (Err(message), None) => Err(TransitError::SchemaUnavailable(message)),
        }
    }

    fn start_flight(&self, state: &mut CacheState) -> Flight {
        let id = state.next_flight;
        state.next_flight += 1;
        state.last_attempt_at = Some(self.clock.now());

        let generator = self.generator.clone();
        let clock = self.clock.clone();
        let shared_state = self.state.clone();

        let flight = async move {
            info!("Generating agent schema");
            let result = generator.generate().await;

            let mut state = lock(&shared_state);
            let outcome = match result {
                Ok(schema) => {
                    let now = clock.now();
                    let schema = Arc::new(schema);
                    state.entry = Some(Entry {
                        schema: schema.clone(),
                        created_at: now,
                    });
                    state.last_success_at = Some(now);
                    state.last_error = None;
                    Ok(schema)
                }
                Err(e) => {
                    let message = summarize(&e);
                    warn!(error = %message, "Agent schema generation failed");
                    state.last_error = Some(message.clone());
                    Err(message)
                }
            };
            if state.in_flight.as_ref().is_some_and(|(flight, _)| *flight == id) {
                state.in_flight = None;
            }
            outcome
        }
        .boxed()
        .shared();

        if let Some(weak) = flight.downgrade() {
            state.in_flight = Some((id, weak));
        }
        flight
    }

    fn age(&self, entry: &Entry) -> Duration {
        (self.clock.now() - entry.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        !self.ttl.is_zero() && self.age(entry) <= self.ttl
    }

    fn status_for(&self, state: &CacheState, entry: &Entry, source: SchemaOrigin) -> AgentStatus {
        AgentStatus {
            source,
            cache_age_seconds: self.age(entry).as_secs(),
            last_error: state.last_error.clone(),
            last_attempt_at: state.last_attempt_at,
            last_success_at: state.last_success_at,
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn summarize(error: &TransitError) -> String {
    let message = match error {
        TransitError::InvalidSchema(issues) => {
            let shown = issues
                .iter()
                .take(MAX_REPORTED_ISSUES)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            if issues.len() > MAX_REPORTED_ISSUES {
                format!(
                    "agent schema invalid: {} (+{} more)",
                    shown,
                    issues.len() - MAX_REPORTED_ISSUES
                )
            } else {
                format!("agent schema invalid: {}", shown)
            }
        }
        other => other.to_string(),
    };
    sanitize(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{FakeGenerator, ManualClock, Scripted, sample_schema_json};
    use crate::types::{ErrorCategory, ValidationError, ValidationErrorKind};

    fn cache(generator: &Arc<FakeGenerator>, clock: &Arc<ManualClock>, ttl: u64) -> SchemaCache {
        SchemaCache::new(generator.clone(), clock.clone(), Duration::from_secs(ttl))
    }

    #[tokio::test]
    async fn test_reuses_within_ttl() {
        let generator = Arc::new(FakeGenerator::succeeding());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 300);

        let first = cache.get().await.unwrap();
        assert_eq!(first.status.source, SchemaOrigin::Fresh);

        clock.advance(Duration::from_secs(120));
        let second = cache.get().await.unwrap();
        assert_eq!(second.status.source, SchemaOrigin::Cached);
        assert_eq!(second.status.cache_age_seconds, 120);
        assert!(Arc::ptr_eq(&first.schema, &second.schema));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_call() {
        let generator =
            Arc::new(FakeGenerator::succeeding().with_delay(Duration::from_millis(50)));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 300);

        let results = futures::future::join_all((0..8).map(|_| cache.get())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_regenerates() {
        let generator = Arc::new(FakeGenerator::succeeding());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 60);

        cache.get().await.unwrap();
        clock.advance(Duration::from_secs(61));
        let again = cache.get().await.unwrap();

        assert_eq!(again.status.source, SchemaOrigin::Fresh);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_entry_is_fresh_at_exact_ttl() {
        let generator = Arc::new(FakeGenerator::succeeding());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 60);

        cache.get().await.unwrap();
        clock.advance(Duration::from_secs(60));
        let at_boundary = cache.get().await.unwrap();

        assert_eq!(at_boundary.status.source, SchemaOrigin::Cached);
        assert_eq!(at_boundary.status.cache_age_seconds, 60);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_reuses() {
        let generator = Arc::new(FakeGenerator::succeeding());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 0);

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_previous() {
        let generator = Arc::new(FakeGenerator::new(vec![
            Scripted::Ok(sample_schema_json()),
            Scripted::Fail(ErrorCategory::Network),
        ]));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 60);

        let first = cache.get().await.unwrap();
        clock.advance(Duration::from_secs(90));
        let fallback = cache.get().await.unwrap();

        assert_eq!(fallback.status.source, SchemaOrigin::Fallback);
        assert_eq!(fallback.status.cache_age_seconds, 90);
        assert!(fallback.status.last_error.is_some());
        assert!(Arc::ptr_eq(&first.schema, &fallback.schema));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_without_entry_is_unavailable() {
        let generator = Arc::new(FakeGenerator::new(vec![Scripted::Fail(ErrorCategory::Auth)]));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 60);

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, TransitError::SchemaUnavailable(_)));
        assert!(cache.status().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_flight_is_restarted() {
        let generator =
            Arc::new(FakeGenerator::succeeding().with_delay(Duration::from_millis(100)));
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 300);

        let abandoned = tokio::time::timeout(Duration::from_millis(10), cache.get()).await;
        assert!(abandoned.is_err());

        assert!(cache.get().await.is_ok());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_and_clear() {
        let generator = Arc::new(FakeGenerator::succeeding());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&generator, &clock, 300);

        cache.get().await.unwrap();
        let refreshed = cache.refresh().await.unwrap();
        assert_eq!(refreshed.status.source, SchemaOrigin::Fresh);
        assert_eq!(generator.calls(), 2);

        cache.clear();
        assert!(cache.status().is_none());
        cache.get().await.unwrap();
        assert_eq!(generator.calls(), 3);
    }

    #[test]
    fn test_summarize_limits_issues() {
        let issues = (0..5)
            .map(|i| {
                ValidationError::new(ValidationErrorKind::Schema, format!("issue {}", i))
                    .with_field(format!("t{}", i))
            })
            .collect();
        let message = summarize(&TransitError::InvalidSchema(issues));
        assert!(message.contains("issue 2"));
        assert!(!message.contains("issue 3"));
        assert!(message.ends_with("(+2 more)"));
    }

    #[test]
    fn test_status_serializes_lowercase_source() {
        let status = AgentStatus {
            source: SchemaOrigin::Fallback,
            cache_age_seconds: 5,
            last_error: None,
            last_attempt_at: None,
            last_success_at: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["source"], "fallback");
        assert!(json.get("last_error").is_none());
    }
}
