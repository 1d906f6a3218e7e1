//! DuckDB-backed query engine

use std::ops::ControlFlow;
use std::sync::Arc;

use duckdb::Connection;
use duckdb::types::Value;

use super::sql_types::raw_value;
use crate::data::filters::SqlValue;
use crate::domain::executor::{EngineError, QueryEngine, RawRow};

impl From<duckdb::Error> for EngineError {
    fn from(e: duckdb::Error) -> Self {
        Self::Query(Box::new(e))
    }
}

/// Query engine over one leased connection
///
/// A lease belongs to exactly one request; it is never shared between
/// concurrent requests.
pub struct DuckdbEngine {
    conn: Connection,
}

impl DuckdbEngine {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl QueryEngine for DuckdbEngine {
    fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        on_row: &mut dyn FnMut(RawRow) -> ControlFlow<()>,
    ) -> Result<(), EngineError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(params))?;

        let columns: Arc<[String]> = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default()
            .into();
        let width = columns.len();

        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i).map(raw_value))
                .collect::<Result<Vec<_>, _>>()?;
            if on_row(RawRow::new(columns.clone(), values)).is_break() {
                break;
            }
        }
        Ok(())
    }
}
