//! Error type for the data layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Migration failed
    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    /// Statement from `database.init_sql` failed
    #[error("Init statement {index} failed: {error}")]
    InitSql { index: usize, error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The service connection was already closed
    #[error("DuckDB connection closed")]
    Closed,
}

impl DataError {
    pub fn migration_failed(version: i32, name: &str, error: &str) -> Self {
        Self::MigrationFailed {
            version,
            name: name.to_string(),
            error: error.to_string(),
        }
    }

    /// Wrap a failed blocking task
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e))
    }
}
