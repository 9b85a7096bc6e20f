//! Read-Only Data Store
//!
//! `DataStore` is the seam between the safe executor and the relational
//! store. `SqliteStore` runs each statement on a blocking worker with:
//! - `PRAGMA query_only` held for the duration of the statement
//! - a deferred transaction that is always rolled back
//! - a statement timeout that interrupts the connection on expiry
//! - at most `max_rows + 1` rows stepped, to detect truncation

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, InterruptHandle, ToSql};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::SharedDatabase;
use crate::types::{Result, TransitError};

// =============================================================================
// Parameters and Rows
// =============================================================================

/// A value bound to a named placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(v) => ToSqlOutput::from(*v),
            Self::Real(v) => ToSqlOutput::from(*v),
            Self::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

/// Named parameter in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub name: String,
    pub value: ParamValue,
}

impl BoundParam {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One result record, keyed by column name in select order
pub type Row = Map<String, Value>;

/// Rows returned by a store, capped by the caller's limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRows {
    pub rows: Vec<Row>,
    /// More rows existed beyond the cap
    pub truncated: bool,
}

// =============================================================================
// Data Store Trait
// =============================================================================

/// Read-only relational store accepting parameterized statements
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run one read-only statement, returning at most `max_rows` rows
    async fn query(&self, sql: &str, params: &[BoundParam], max_rows: usize)
    -> Result<StoreRows>;
}

pub type SharedStore = Arc<dyn DataStore>;

// =============================================================================
// SQLite Store
// =============================================================================

pub struct SqliteStore {
    db: SharedDatabase,
    statement_timeout: Duration,
}

impl SqliteStore {
    pub fn new(db: SharedDatabase, statement_timeout: Duration) -> Self {
        Self {
            db,
            statement_timeout,
        }
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn query(
        &self,
        sql: &str,
        params: &[BoundParam],
        max_rows: usize,
    ) -> Result<StoreRows> {
        let db = Arc::clone(&self.db);
        let sql = sql.to_string();
        let params = params.to_vec();
        let timeout = self.statement_timeout;

        let state: SharedInterrupt = Arc::default();
        // Interrupts the worker if this future is dropped or times out
        let mut cancel = CancelOnDrop::new(Arc::clone(&state));

        let worker = tokio::task::spawn_blocking(move || {
            let conn = db.connection()?;
            let _registration = Registration::register(&state, &conn, timeout)?;
            run_read_only(&conn, &sql, &params, max_rows)
        });

        match tokio::time::timeout(timeout, worker).await {
            Ok(joined) => {
                cancel.disarm();
                joined.map_err(|e| TransitError::Storage(format!("Query worker failed: {}", e)))?
            }
            Err(_) => {
                warn!("Statement exceeded {:?}, interrupting", timeout);
                Err(TransitError::timeout("statement", timeout))
            }
        }
    }
}

// =============================================================================
// Interrupt Plumbing
// =============================================================================

#[derive(Default)]
struct InterruptState {
    handle: Option<InterruptHandle>,
    cancelled: bool,
}

type SharedInterrupt = Arc<Mutex<InterruptState>>;

fn lock(state: &SharedInterrupt) -> MutexGuard<'_, InterruptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CancelOnDrop {
    state: SharedInterrupt,
    armed: bool,
}

impl CancelOnDrop {
    fn new(state: SharedInterrupt) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(&self.state);
        state.cancelled = true;
        if let Some(handle) = &state.handle {
            handle.interrupt();
        }
    }
}

/// Publishes the worker connection's interrupt handle; withdrawn before the
/// connection goes back to the pool.
struct Registration<'a> {
    state: &'a SharedInterrupt,
}

impl<'a> Registration<'a> {
    fn register(state: &'a SharedInterrupt, conn: &Connection, timeout: Duration) -> Result<Self> {
        let mut guard = lock(state);
        if guard.cancelled {
            return Err(TransitError::timeout("statement", timeout));
        }
        guard.handle = Some(conn.get_interrupt_handle());
        Ok(Self { state })
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.state).handle = None;
    }
}

// =============================================================================
// Statement Execution
// =============================================================================

struct QueryOnlyGuard<'a> {
    conn: &'a Connection,
}

impl<'a> QueryOnlyGuard<'a> {
    fn enable(conn: &'a Connection) -> Result<Self> {
        conn.pragma_update(None, "query_only", true)?;
        Ok(Self { conn })
    }
}

impl Drop for QueryOnlyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.pragma_update(None, "query_only", false) {
            warn!("Failed to reset query_only: {}", e);
        }
    }
}

fn run_read_only(
    conn: &Connection,
    sql: &str,
    params: &[BoundParam],
    max_rows: usize,
) -> Result<StoreRows> {
    let _query_only = QueryOnlyGuard::enable(conn)?;
    let tx = conn.unchecked_transaction()?;
    let result = read_rows(&tx, sql, params, max_rows);
    if let Err(e) = tx.rollback() {
        warn!("Failed to roll back read transaction: {}", e);
    }
    result
}

fn read_rows(
    conn: &Connection,
    sql: &str,
    params: &[BoundParam],
    max_rows: usize,
) -> Result<StoreRows> {
    let mut stmt = conn.prepare(sql)?;
    for param in params {
        let placeholder = format!(":{}", param.name);
        match stmt.parameter_index(&placeholder)? {
            Some(index) => stmt.raw_bind_parameter(index, &param.value)?,
            None => debug!("Parameter {} not referenced by statement", param.name),
        }
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if out.len() == max_rows {
            truncated = true;
            break;
        }
        let mut record = Row::new();
        for (index, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(index)?));
        }
        out.push(record);
    }

    Ok(StoreRows {
        rows: out,
        truncated,
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn seeded_store(timeout: Duration) -> (SharedDatabase, SqliteStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        db.load_sample_feed().unwrap();
        let store = SqliteStore::new(Arc::clone(&db), timeout);
        (db, store)
    }

    #[tokio::test]
    async fn test_query_binds_named_params() {
        let (_db, store) = seeded_store(Duration::from_secs(5));
        let result = store
            .query(
                "SELECT COUNT(DISTINCT stop_times.stop_id) AS stop_count FROM routes \
                 JOIN trips ON trips.route_id = routes.route_id \
                 JOIN stop_times ON stop_times.trip_id = trips.trip_id \
                 WHERE routes.route_short_name = :route_id LIMIT 1",
                &[BoundParam::new("route_id", ParamValue::text("10"))],
                50,
            )
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["stop_count"], Value::from(4));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_row_cap_detects_truncation() {
        let (_db, store) = seeded_store(Duration::from_secs(5));
        let result = store
            .query("SELECT trip_id, stop_id FROM stop_times", &[], 3)
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);

        let exact = store
            .query("SELECT route_id FROM routes", &[], 2)
            .await
            .unwrap();
        assert_eq!(exact.rows.len(), 2);
        assert!(!exact.truncated);
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let (db, store) = seeded_store(Duration::from_secs(5));
        let result = store.query("DELETE FROM stop_times", &[], 10).await;
        assert!(result.is_err());

        let counts = db.table_counts().unwrap();
        assert_eq!(counts[2], ("stop_times".to_string(), 10));
    }

    #[tokio::test]
    async fn test_null_and_real_columns() {
        let (_db, store) = seeded_store(Duration::from_secs(5));
        let result = store
            .query(
                "SELECT stop_lat, parent_station FROM stops WHERE stop_id = :stop_id",
                &[BoundParam::new("stop_id", ParamValue::text("S1"))],
                5,
            )
            .await
            .unwrap();

        assert_eq!(result.rows[0]["parent_station"], Value::Null);
        assert!(result.rows[0]["stop_lat"].is_f64());
    }

    #[tokio::test]
    async fn test_statement_timeout_interrupts_and_releases_connection() {
        let (_db, store) = seeded_store(Duration::from_millis(100));
        let result = store
            .query(
                "WITH RECURSIVE counter(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM counter) \
                 SELECT COUNT(*) FROM counter",
                &[],
                1,
            )
            .await;
        assert!(matches!(result, Err(TransitError::Timeout { .. })));

        // The single pooled connection is usable again
        let after = store
            .query("SELECT route_id FROM routes", &[], 10)
            .await
            .unwrap();
        assert_eq!(after.rows.len(), 2);
    }

    #[test]
    fn test_param_value_untagged_serde() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[null, 10, 1.5, "S1"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Null,
                ParamValue::Integer(10),
                ParamValue::Real(1.5),
                ParamValue::text("S1"),
            ]
        );
    }
}
