//! DuckDB service
//!
//! Owns the database, applies the service schema and the configured init
//! statements, and hands out per-request connections.

mod analytics;
mod engine;
mod migrations;
pub mod schema;
pub mod sql_types;

pub use analytics::DuckdbAnalytics;
pub use engine::DuckdbEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use duckdb::Connection;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::DatabaseConfig;
use crate::core::constants::DUCKDB_CHECKPOINT_INTERVAL_SECS;
use crate::data::DataError;

/// DuckDB service
///
/// Keeps one root connection. Requests never use it directly: each one
/// leases its own clone of it, so no connection is shared between
/// concurrent requests.
pub struct DuckdbService {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl Drop for DuckdbService {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            // Best-effort close - log but don't panic on error
            if let Err((_, e)) = conn.close() {
                tracing::warn!("DuckDB connection close failed during drop: {}", e);
            }
        }
    }
}

impl DuckdbService {
    /// Open the configured database on a blocking worker
    pub async fn init(config: &DatabaseConfig) -> Result<Self, DataError> {
        let path = config.path.clone();
        let init_sql = config.init_sql.clone();
        tokio::task::spawn_blocking(move || Self::open(path.as_deref(), &init_sql))
            .await
            .map_err(DataError::join)?
    }

    /// Open a database file, or an in-memory database when `path` is None
    pub fn open(path: Option<&Path>, init_sql: &[String]) -> Result<Self, DataError> {
        let conn = match path {
            Some(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };

        migrations::run_migrations(&conn)?;

        for (index, sql) in init_sql.iter().enumerate() {
            conn.execute_batch(sql).map_err(|e| DataError::InitSql {
                index,
                error: e.to_string(),
            })?;
        }

        tracing::debug!(
            path = %path.map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            init_statements = init_sql.len(),
            "DuckdbService initialized"
        );
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: path.map(Path::to_path_buf),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if the root connection is still open
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn clone_conn(&self) -> Result<Connection, DataError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(DataError::Closed)?;
        Ok(conn.try_clone()?)
    }

    /// Lease a connection for one request
    pub fn lease(&self) -> Result<DuckdbEngine, DataError> {
        self.clone_conn().map(DuckdbEngine::new)
    }

    /// Analytics recorder writing to `api_analytics` on its own connection
    pub fn analytics_recorder(&self) -> Result<DuckdbAnalytics, DataError> {
        self.clone_conn().map(DuckdbAnalytics::new)
    }

    /// Run a checkpoint to flush WAL to the main database file.
    ///
    /// Returns `Ok(())` if the connection is already closed (no-op).
    pub async fn checkpoint(self: &Arc<Self>) -> Result<(), DataError> {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn_guard = db.conn.lock();
            if let Some(ref conn) = *conn_guard {
                conn.execute("CHECKPOINT", [])?;
                tracing::debug!("DuckDB checkpoint completed");
            }
            Ok(())
        })
        .await
        .map_err(DataError::join)?
    }

    /// Close the root connection
    ///
    /// Connections already leased stay usable until their requests finish.
    pub async fn close(self: Arc<Self>) -> Result<(), DataError> {
        tokio::task::spawn_blocking(move || {
            let mut conn_guard = self.conn.lock();
            if let Some(conn) = conn_guard.take() {
                // Best-effort checkpoint before close - log but don't fail on error
                if let Err(e) = conn.execute("CHECKPOINT", []) {
                    tracing::warn!("CHECKPOINT failed during close: {}", e);
                }
                conn.close().map_err(|(_, e)| DataError::Duckdb(e))?;
                tracing::debug!("DuckDB connection closed");
            }
            Ok(())
        })
        .await
        .map_err(DataError::join)?
    }

    /// Periodic checkpoints for file-backed databases
    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        if self.path.is_none() {
            return None;
        }

        let db = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(DUCKDB_CHECKPOINT_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("DuckDB checkpoint task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = db.checkpoint().await {
                            tracing::warn!("DuckDB checkpoint failed: {}", e);
                        }
                    }
                }
            }
        }))
    }
}

/// Execute a function within a transaction, automatically rolling back on error.
pub(crate) fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, DataError>
where
    F: FnOnce(&Connection) -> Result<T, DataError>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(val) => {
            conn.execute_batch("COMMIT")?;
            Ok(val)
        }
        Err(e) => {
            // Best-effort rollback - log but return original error
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("ROLLBACK failed after transaction error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use tempfile::TempDir;

    use super::*;
    use crate::data::analytics::{AnalyticsEvent, AnalyticsRecorder, ClientInfo};
    use crate::domain::executor::QueryEngine;

    fn seed() -> Vec<String> {
        vec![
            "CREATE TABLE fluview (region VARCHAR, epiweek INTEGER)".to_string(),
            "INSERT INTO fluview VALUES ('nat', 202001), ('pa', 202002)".to_string(),
        ]
    }

    fn count(engine: &DuckdbEngine, sql: &str) -> usize {
        let mut rows = 0;
        engine
            .query(sql, &[], &mut |_| {
                rows += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        rows
    }

    #[test]
    fn test_in_memory_init_sql() {
        let service = DuckdbService::open(None, &seed()).unwrap();
        assert!(service.path().is_none());

        let engine = service.lease().unwrap();
        assert_eq!(count(&engine, "SELECT * FROM fluview"), 2);
    }

    #[test]
    fn test_leases_share_the_database() {
        let service = DuckdbService::open(None, &seed()).unwrap();
        let recorder = service.analytics_recorder().unwrap();
        recorder.record(AnalyticsEvent::new("fluview", 1, 2, &ClientInfo::default()));

        let engine = service.lease().unwrap();
        assert_eq!(count(&engine, "SELECT * FROM api_analytics"), 1);
    }

    #[test]
    fn test_bad_init_sql_reports_index() {
        let init = vec!["SELECT 1".to_string(), "CREATE TABLE".to_string()];
        let err = DuckdbService::open(None, &init).err().unwrap();
        assert!(matches!(err, DataError::InitSql { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("data").join("epidata.duckdb");

        let service = Arc::new(DuckdbService::open(Some(&path), &seed()).unwrap());
        service.checkpoint().await.unwrap();
        service.close().await.unwrap();

        let reopened = DuckdbService::open(Some(&path), &[]).unwrap();
        let engine = reopened.lease().unwrap();
        assert_eq!(count(&engine, "SELECT * FROM fluview"), 2);
    }

    #[tokio::test]
    async fn test_close_then_lease_fails() {
        let service = Arc::new(DuckdbService::open(None, &[]).unwrap());
        let handle = Arc::clone(&service);
        service.close().await.unwrap();

        assert!(!handle.is_open());
        assert!(matches!(handle.lease().err(), Some(DataError::Closed)));
    }

    #[test]
    fn test_in_transaction_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let result: Result<(), DataError> = in_transaction(&conn, |conn| {
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            Err(DataError::Closed)
        });
        assert!(result.is_err());

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
