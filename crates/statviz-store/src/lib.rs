//! Read-only query executor over DuckDB
//!
//! A bounded pool of connections opened with `AccessMode::ReadOnly`: the
//! guard already refuses anything but a single SELECT, and the access mode
//! makes the store itself refuse mutations independently. Named parameters
//! are bound as typed values, never inlined. The per-league namespace is a
//! `search_path` parameter rather than a separate code path.

use duckdb::{AccessMode, Config, Connection};
use serde_json::Value;
use statviz_model::TabularResult;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

mod bind;

pub use bind::bind_positional;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Unknown parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported parameter value for {0}: expected a scalar")]
    InvalidParameter(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("No store connection available within {0:?}")]
    Capacity(Duration),

    #[error("Query exceeded time budget of {0:?}")]
    Timeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Query task failed: {0}")]
    Internal(String),
}

/// Pool sizing and per-query bounds
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub pool_size: usize,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
    pub max_rows: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            acquire_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(15),
            max_rows: 5000,
        }
    }
}

/// Bounded pool of read-only store connections
pub struct StorePool {
    inner: Arc<PoolInner>,
    config: StoreConfig,
}

/// Invariant: the number of available permits never exceeds the number of
/// stored connections. Permits are only added after a connection has been
/// pushed back, so a successful acquire always finds one.
struct PoolInner {
    connections: StdMutex<Vec<Connection>>,
    permits: Semaphore,
}

impl PoolInner {
    fn check_in(&self, conn: Connection) {
        self.connections
            .lock()
            .expect("store pool lock poisoned")
            .push(conn);
        self.permits.add_permits(1);
    }
}

impl StorePool {
    /// Open `pool_size` read-only connections against a database file.
    pub fn open_read_only<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut connections = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            connections.push(open_connection(path)?);
        }
        Ok(Self::from_connections(connections, config))
    }

    /// Build a pool over pre-opened connections. Intended for tests and
    /// in-memory fixtures, where read-only mode would prevent seeding.
    pub fn from_connections(connections: Vec<Connection>, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                permits: Semaphore::new(connections.len()),
                connections: StdMutex::new(connections),
            }),
            config,
        }
    }

    /// Execute a guarded statement and collect the full result.
    ///
    /// Acquisition is bounded by the acquire timeout, the query itself by
    /// the query timeout. The blocking task owns the check-in: the
    /// connection and its permit return when the statement actually
    /// finishes, so a timed-out or cancelled request never hands a busy
    /// connection to the next caller.
    pub async fn execute(
        &self,
        sql: &str,
        params: &serde_json::Map<String, Value>,
        namespace: Option<&str>,
    ) -> Result<TabularResult, StoreError> {
        let permit = tokio::time::timeout(self.config.acquire_timeout, self.inner.permits.acquire())
            .await
            .map_err(|_| StoreError::Capacity(self.config.acquire_timeout))?
            .map_err(|_| StoreError::PoolClosed)?;
        // The permit is consumed here; the blocking task adds it back on
        // check-in, which keeps the books straight even if this future is
        // dropped mid-query.
        permit.forget();

        let conn = self
            .inner
            .connections
            .lock()
            .expect("store pool lock poisoned")
            .pop()
            .ok_or(StoreError::PoolClosed)?;

        let sql = sql.to_string();
        let params = params.clone();
        let namespace = namespace.map(String::from);
        let max_rows = self.config.max_rows;
        let inner = Arc::clone(&self.inner);

        let task = tokio::task::spawn_blocking(move || {
            let result = run_query(&conn, &sql, &params, namespace.as_deref(), max_rows);
            inner.check_in(conn);
            result
        });

        match tokio::time::timeout(self.config.query_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                // The closure panicked before check-in; that slot is gone.
                warn!("store query task failed: {join_error}");
                Err(StoreError::Internal(join_error.to_string()))
            }
            Err(_) => Err(StoreError::Timeout(self.config.query_timeout)),
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Run one statement on a connection and collect rows.
///
/// Exposed separately from the pool so tests can drive an in-memory
/// connection directly.
pub fn run_query(
    conn: &Connection,
    sql: &str,
    params: &serde_json::Map<String, Value>,
    namespace: Option<&str>,
    max_rows: usize,
) -> Result<TabularResult, StoreError> {
    if let Some(ns) = namespace {
        if !is_valid_namespace(ns) {
            return Err(StoreError::InvalidNamespace(ns.to_string()));
        }
        conn.execute_batch(&format!("SET search_path = '{ns}'"))?;
    } else {
        conn.execute_batch("SET search_path = 'main'")?;
    }

    let (sql, values) = bind_positional(sql, params)?;
    let sql = ensure_limit(&sql, max_rows);

    let mut stmt = conn.prepare(&sql)?;

    // Column metadata comes from the prepared statement so empty results
    // still carry their column names (the dry-run path relies on that).
    let mut columns: Vec<String> = Vec::new();
    for i in 0..stmt.column_count() {
        columns.push(stmt.column_name(i)?.to_string());
    }

    let mut rows = stmt.query(duckdb::params_from_iter(values))?;

    let mut collected: Vec<Vec<Value>> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            cells.push(cell_to_json(row, i)?);
        }
        collected.push(cells);

        if collected.len() >= max_rows {
            break;
        }
    }

    Ok(TabularResult::new(columns, collected))
}

fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty() && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Append the row cap to statements that carry no LIMIT of their own.
fn ensure_limit(sql: &str, max_rows: usize) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';');
    if trimmed.to_lowercase().contains(" limit ") {
        trimmed.to_string()
    } else {
        format!("{trimmed} LIMIT {max_rows}")
    }
}

fn cell_to_json(row: &duckdb::Row, idx: usize) -> Result<Value, StoreError> {
    use duckdb::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => serde_json::json!(i),
        ValueRef::SmallInt(i) => serde_json::json!(i),
        ValueRef::Int(i) => serde_json::json!(i),
        ValueRef::BigInt(i) => serde_json::json!(i),
        ValueRef::HugeInt(i) => serde_json::json!(i),
        ValueRef::UTinyInt(i) => serde_json::json!(i),
        ValueRef::USmallInt(i) => serde_json::json!(i),
        ValueRef::UInt(i) => serde_json::json!(i),
        ValueRef::UBigInt(i) => serde_json::json!(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
        _ => Value::String("<unsupported>".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE team (teamId INTEGER, teamName VARCHAR);
             INSERT INTO team VALUES (1, 'Bayern'), (2, 'Dortmund'), (3, 'Leipzig');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_run_query_collects_columns_and_rows() {
        let conn = seeded();
        let result = run_query(
            &conn,
            "SELECT teamName FROM team ORDER BY teamId",
            &serde_json::Map::new(),
            None,
            100,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["teamName"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows[0][0], serde_json::json!("Bayern"));
    }

    #[test]
    fn test_run_query_binds_named_params() {
        let conn = seeded();
        let mut params = serde_json::Map::new();
        params.insert("pattern".to_string(), serde_json::json!("%Bay%"));

        let result = run_query(
            &conn,
            "SELECT teamName FROM team WHERE teamName LIKE :pattern",
            &params,
            None,
            100,
        )
        .unwrap();

        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][0], serde_json::json!("Bayern"));
    }

    #[test]
    fn test_run_query_appends_row_cap() {
        let conn = seeded();
        let result = run_query(
            &conn,
            "SELECT teamName FROM team ORDER BY teamId",
            &serde_json::Map::new(),
            None,
            2,
        )
        .unwrap();
        assert_eq!(result.row_count, 2);
    }

    #[test]
    fn test_run_query_selects_namespace() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE SCHEMA bl1;
             CREATE TABLE bl1.season (seasonLabel VARCHAR);
             INSERT INTO bl1.season VALUES ('2023/24');",
        )
        .unwrap();

        let result = run_query(
            &conn,
            "SELECT seasonLabel FROM season",
            &serde_json::Map::new(),
            Some("bl1"),
            100,
        )
        .unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[test]
    fn test_run_query_rejects_bad_namespace() {
        let conn = seeded();
        let err = run_query(
            &conn,
            "SELECT 1",
            &serde_json::Map::new(),
            Some("bl1'; DROP SCHEMA x"),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidNamespace(_)));
    }

    #[test]
    fn test_store_errors_surface_verbatim() {
        let conn = seeded();
        let err = run_query(
            &conn,
            "SELECT nope FROM team",
            &serde_json::Map::new(),
            None,
            100,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nope"), "unexpected message: {message}");
    }

    #[test]
    fn test_ensure_limit() {
        assert_eq!(ensure_limit("SELECT 1", 10), "SELECT 1 LIMIT 10");
        assert_eq!(
            ensure_limit("SELECT 1 LIMIT 3", 10),
            "SELECT 1 LIMIT 3"
        );
        assert_eq!(ensure_limit("SELECT 1;", 10), "SELECT 1 LIMIT 10");
    }

    #[tokio::test]
    async fn test_pool_round_trip() {
        let pool = StorePool::from_connections(vec![seeded()], StoreConfig::default());
        let result = pool
            .execute("SELECT COUNT(*) AS n FROM team", &serde_json::Map::new(), None)
            .await
            .unwrap();
        assert_eq!(result.rows[0][0], serde_json::json!(3));

        // The connection went back to the pool
        let again = pool
            .execute("SELECT COUNT(*) AS n FROM team", &serde_json::Map::new(), None)
            .await
            .unwrap();
        assert_eq!(again.row_count, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_reports_capacity() {
        let config = StoreConfig {
            acquire_timeout: Duration::from_millis(20),
            ..StoreConfig::default()
        };
        let pool = StorePool::from_connections(vec![], config);
        let err = pool
            .execute("SELECT 1", &serde_json::Map::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Capacity(_)));
    }
}
