//! In-memory row collector

use super::{Row, RowSink};

/// Row sink that keeps every row for callers needing the full result set
#[derive(Debug, Default)]
pub struct CollectRowPrinter {
    pub rows: Vec<Row>,
}

impl CollectRowPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl RowSink for CollectRowPrinter {
    fn begin(&mut self) {}

    fn print_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    fn end(&mut self, _has_more: bool) {}
}
