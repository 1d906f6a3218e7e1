//! Row-capped query execution
//!
//! Runs one statement against a [`QueryEngine`], shapes every fetched row
//! to the declared field kinds and streams it into a [`RowSink`]. Rows are
//! never buffered here: each one is built, coerced and handed over before
//! the next is fetched.

use std::ops::ControlFlow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::data::filters::{SqlParams, SqlValue};
use crate::domain::printer::{Row, RowSink};

/// A raw scalar as returned by the query engine
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// One fetched row, columns in result order
#[derive(Debug, Clone)]
pub struct RawRow {
    columns: Arc<[String]>,
    values: Vec<RawValue>,
}

impl RawRow {
    pub fn new(columns: Arc<[String]>, values: Vec<RawValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Something that executes a statement and yields rows one at a time
pub trait QueryEngine {
    /// Execute `sql` with positional `params`, calling `on_row` per row until
    /// the rows run out or the callback breaks.
    fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        on_row: &mut dyn FnMut(RawRow) -> ControlFlow<()>,
    ) -> Result<(), EngineError>;
}

/// Declared output fields grouped by the type they are coerced to
///
/// Anything not listed here is dropped from output rows, even when the
/// statement selects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldKinds {
    #[serde(default)]
    pub string: Vec<String>,
    #[serde(default)]
    pub int: Vec<String>,
    #[serde(default)]
    pub float: Vec<String>,
}

impl FieldKinds {
    /// Restrict every kind to the requested names, keeping declared order
    pub fn project(&self, requested: &[String]) -> Self {
        let keep = |fields: &[String]| {
            fields
                .iter()
                .filter(|f| requested.contains(f))
                .cloned()
                .collect()
        };
        Self {
            string: keep(&self.string),
            int: keep(&self.int),
            float: keep(&self.float),
        }
    }

    /// All declared columns: strings, then integers, then floats
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.string
            .iter()
            .chain(&self.int)
            .chain(&self.float)
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.string.is_empty() && self.int.is_empty() && self.float.is_empty()
    }

    fn shape(&self, raw: &RawRow) -> Row {
        let mut row = Row::new();
        for field in &self.string {
            row.insert(field.clone(), to_text(raw.get(field)));
        }
        for field in &self.int {
            row.insert(field.clone(), to_integer(raw.get(field)));
        }
        for field in &self.float {
            row.insert(field.clone(), to_float(raw.get(field)));
        }
        row
    }
}

/// Outcome of one execution
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Completed { rows: u64, truncated: bool },
    /// The statement failed, possibly after some rows reached the sink.
    /// The sink is not ended; the caller reports the failure through it.
    Failed,
}

pub struct QueryExecutor<'e> {
    engine: &'e dyn QueryEngine,
    row_cap: u64,
}

impl<'e> QueryExecutor<'e> {
    pub fn new(engine: &'e dyn QueryEngine, row_cap: u64) -> Self {
        Self { engine, row_cap }
    }

    /// Execute `statement` with a row cap and stream shaped rows into `sink`.
    ///
    /// With `is_final` the sink is ended after the last row. Otherwise the
    /// caller may run further statements into the same sink before ending
    /// it.
    pub fn execute(
        &self,
        statement: &str,
        params: &SqlParams,
        projection: Option<&[String]>,
        fields: &FieldKinds,
        sink: &mut dyn RowSink,
        is_final: bool,
    ) -> Execution {
        let sql = format!("{} LIMIT {}", statement, self.row_cap);
        let projected;
        let fields = match projection {
            Some(requested) => {
                projected = fields.project(requested);
                &projected
            }
            None => fields,
        };

        tracing::debug!(sql = %sql, params = params.len(), "Executing query");

        let mut rows = 0u64;
        let result = self.engine.query(&sql, &params.values, &mut |raw| {
            sink.print_row(fields.shape(&raw));
            rows += 1;
            if sink.is_closed() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        if let Err(e) = result {
            tracing::error!(sql = %sql, error = %e, "Query failed");
            return Execution::Failed;
        }

        // an empty result still opens the response so end() emits a footer
        sink.begin();
        let truncated = self.row_cap > 0 && rows >= self.row_cap;
        if is_final {
            sink.end(truncated);
        }
        Execution::Completed { rows, truncated }
    }
}

fn to_text(raw: Option<&RawValue>) -> Value {
    match raw {
        None | Some(RawValue::Null) => Value::Null,
        Some(RawValue::Text(s)) => Value::String(s.clone()),
        Some(RawValue::Integer(i)) => Value::String(i.to_string()),
        Some(RawValue::Real(f)) => Value::String(f.to_string()),
    }
}

fn to_integer(raw: Option<&RawValue>) -> Value {
    match raw {
        None | Some(RawValue::Null) => Value::Null,
        Some(RawValue::Integer(i)) => Value::from(*i),
        Some(RawValue::Real(f)) => truncate(*f),
        Some(RawValue::Text(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Value::from(i),
                Err(_) => truncate(leading_float(s)),
            }
        }
    }
}

fn to_float(raw: Option<&RawValue>) -> Value {
    let f = match raw {
        None | Some(RawValue::Null) => return Value::Null,
        Some(RawValue::Integer(i)) => *i as f64,
        Some(RawValue::Real(f)) => *f,
        Some(RawValue::Text(s)) => leading_float(s.trim()),
    };
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn truncate(f: f64) -> Value {
    if f.is_finite() {
        Value::from(f.trunc() as i64)
    } else {
        Value::Null
    }
}

/// Longest numeric prefix of `s` as a float, or 0 when there is none
fn leading_float(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let digits = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    end = digits(end);
    if bytes.get(end) == Some(&b'.') {
        end = digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::data::MemoryAnalytics;
    use crate::domain::printer::{BufferedTransport, CollectRowPrinter, Format, Printer};

    /// Engine serving a fixed result set and recording what it was asked
    struct FakeEngine {
        columns: Arc<[String]>,
        rows: Vec<Vec<RawValue>>,
        fail_after: Option<usize>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl FakeEngine {
        fn new(columns: &[&str], rows: Vec<Vec<RawValue>>) -> Self {
            Self {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                fail_after: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self::new(&[], Vec::new()).failing_after(0)
        }

        fn failing_after(mut self, rows: usize) -> Self {
            self.fail_after = Some(rows);
            self
        }
    }

    impl QueryEngine for FakeEngine {
        fn query(
            &self,
            sql: &str,
            params: &[SqlValue],
            on_row: &mut dyn FnMut(RawRow) -> ControlFlow<()>,
        ) -> Result<(), EngineError> {
            self.seen.lock().push((sql.to_string(), params.len()));
            for (i, values) in self.rows.iter().enumerate() {
                if self.fail_after == Some(i) {
                    return Err(EngineError::Query("conversion error".into()));
                }
                let row = RawRow::new(self.columns.clone(), values.clone());
                if on_row(row).is_break() {
                    break;
                }
            }
            if self.fail_after.is_some_and(|n| n >= self.rows.len()) {
                return Err(EngineError::Query("no such table: fluview".into()));
            }
            Ok(())
        }
    }

    /// Sink that records lifecycle calls
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        close_after: Option<usize>,
        rows: usize,
    }

    impl RowSink for Recorder {
        fn begin(&mut self) {
            self.calls.push("begin".into());
        }

        fn print_row(&mut self, _row: Row) {
            self.rows += 1;
            self.calls.push("row".into());
        }

        fn end(&mut self, has_more: bool) {
            self.calls.push(format!("end({})", has_more));
        }

        fn is_closed(&self) -> bool {
            self.close_after.is_some_and(|n| self.rows >= n)
        }
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn kinds(string: &[&str], int: &[&str], float: &[&str]) -> FieldKinds {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        FieldKinds {
            string: own(string),
            int: own(int),
            float: own(float),
        }
    }

    #[test]
    fn appends_row_cap_and_passes_params() {
        let engine = FakeEngine::new(&["a"], vec![]);
        let mut params = SqlParams::default();
        params.push_text("pa");

        let mut sink = CollectRowPrinter::new();
        let outcome = QueryExecutor::new(&engine, 100).execute(
            "SELECT a FROM t WHERE (b = ?)",
            &params,
            None,
            &kinds(&["a"], &[], &[]),
            &mut sink,
            true,
        );

        assert_eq!(
            outcome,
            Execution::Completed {
                rows: 0,
                truncated: false
            }
        );
        assert_eq!(
            engine.seen.lock()[0],
            ("SELECT a FROM t WHERE (b = ?) LIMIT 100".to_string(), 1)
        );
    }

    #[test]
    fn coerces_declared_kinds_and_drops_the_rest() {
        let engine = FakeEngine::new(
            &["location", "epiweek", "value", "secret"],
            vec![
                vec![text("pa"), text("202001"), text("1.25"), text("x")],
                vec![
                    RawValue::Null,
                    RawValue::Real(202002.9),
                    RawValue::Integer(3),
                    text("y"),
                ],
                vec![
                    RawValue::Integer(42),
                    RawValue::Null,
                    RawValue::Null,
                    RawValue::Null,
                ],
            ],
        );

        let mut sink = CollectRowPrinter::new();
        let _ = QueryExecutor::new(&engine, 10).execute(
            "SELECT * FROM t",
            &SqlParams::default(),
            None,
            &kinds(&["location"], &["epiweek"], &["value"]),
            &mut sink,
            true,
        );

        let rows: Vec<Value> = sink.into_rows().into_iter().map(Value::Object).collect();
        assert_eq!(
            rows,
            vec![
                json!({"location": "pa", "epiweek": 202001, "value": 1.25}),
                json!({"location": null, "epiweek": 202002, "value": 3.0}),
                json!({"location": "42", "epiweek": null, "value": null}),
            ]
        );
    }

    #[test]
    fn projection_never_materializes_unrequested_fields() {
        let engine = FakeEngine::new(&["a", "b"], vec![vec![text("1"), text("2")]]);
        let requested = vec!["a".to_string()];

        let mut sink = CollectRowPrinter::new();
        let _ = QueryExecutor::new(&engine, 10).execute(
            "SELECT a, b FROM t",
            &SqlParams::default(),
            Some(&requested),
            &kinds(&["a", "b"], &[], &[]),
            &mut sink,
            true,
        );

        let rows = sink.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn missing_column_is_null() {
        let engine = FakeEngine::new(&["a"], vec![vec![text("1")]]);
        let mut sink = CollectRowPrinter::new();
        let _ = QueryExecutor::new(&engine, 10).execute(
            "SELECT a FROM t",
            &SqlParams::default(),
            None,
            &kinds(&["a"], &["n"], &[]),
            &mut sink,
            true,
        );
        assert_eq!(Value::Object(sink.rows[0].clone()), json!({"a": "1", "n": null}));
    }

    #[test]
    fn failure_leaves_sink_untouched() {
        let engine = FakeEngine::failing();
        let mut sink = Recorder::default();
        let outcome = QueryExecutor::new(&engine, 10).execute(
            "SELECT a FROM missing",
            &SqlParams::default(),
            None,
            &kinds(&["a"], &[], &[]),
            &mut sink,
            true,
        );

        assert_eq!(outcome, Execution::Failed);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn failure_mid_stream_closes_the_open_body() {
        let engine =
            FakeEngine::new(&["a"], vec![vec![text("1")], vec![text("2")]]).failing_after(1);
        let transport = BufferedTransport::new();
        let analytics = Arc::new(MemoryAnalytics::default());
        let mut printer = Printer::new(
            Format::Classic,
            "fluview",
            Box::new(transport.clone()),
            analytics.clone(),
        );

        let outcome = QueryExecutor::new(&engine, 10).execute(
            "SELECT a FROM t",
            &SqlParams::default(),
            None,
            &kinds(&[], &["a"], &[]),
            &mut printer,
            true,
        );
        assert_eq!(outcome, Execution::Failed);
        printer.print_database_error();

        let body: Value = serde_json::from_str(&transport.body_string()).unwrap();
        assert_eq!(
            body,
            json!({"epidata": [{"a": 1}], "count": 1, "result": -1, "message": "database error"})
        );
        let events = analytics.events();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].result, events[0].num_rows), (-1, 1));
    }

    #[test]
    fn empty_result_begins_and_ends() {
        let engine = FakeEngine::new(&["a"], vec![]);
        let mut sink = Recorder::default();
        let _ = QueryExecutor::new(&engine, 10).execute(
            "SELECT a FROM t",
            &SqlParams::default(),
            None,
            &kinds(&["a"], &[], &[]),
            &mut sink,
            true,
        );
        assert_eq!(sink.calls, vec!["begin", "end(false)"]);
    }

    #[test]
    fn hitting_the_cap_signals_truncation() {
        let engine = FakeEngine::new(&["a"], vec![vec![text("1")], vec![text("2")]]);
        let mut sink = Recorder::default();
        let outcome = QueryExecutor::new(&engine, 2).execute(
            "SELECT a FROM t",
            &SqlParams::default(),
            None,
            &kinds(&["a"], &[], &[]),
            &mut sink,
            true,
        );

        assert_eq!(
            outcome,
            Execution::Completed {
                rows: 2,
                truncated: true
            }
        );
        assert_eq!(sink.calls.last().map(String::as_str), Some("end(true)"));
    }

    #[test]
    fn non_final_execution_leaves_sink_open() {
        let engine = FakeEngine::new(&["a"], vec![vec![text("1")]]);
        let executor = QueryExecutor::new(&engine, 10);
        let fields = kinds(&["a"], &[], &[]);
        let mut sink = Recorder::default();

        let _ = executor.execute("SELECT a FROM t1", &SqlParams::default(), None, &fields, &mut sink, false);
        let _ = executor.execute("SELECT a FROM t2", &SqlParams::default(), None, &fields, &mut sink, true);

        assert_eq!(sink.calls, vec!["row", "begin", "row", "begin", "end(false)"]);
    }

    #[test]
    fn stops_fetching_once_sink_closes() {
        let engine = FakeEngine::new(
            &["a"],
            vec![vec![text("1")], vec![text("2")], vec![text("3")]],
        );
        let mut sink = Recorder {
            close_after: Some(1),
            ..Default::default()
        };
        let outcome = QueryExecutor::new(&engine, 10).execute(
            "SELECT a FROM t",
            &SqlParams::default(),
            None,
            &kinds(&["a"], &[], &[]),
            &mut sink,
            false,
        );

        assert_eq!(sink.rows, 1);
        assert_eq!(
            outcome,
            Execution::Completed {
                rows: 1,
                truncated: false
            }
        );
    }

    #[test]
    fn lenient_numeric_text() {
        assert_eq!(to_integer(Some(&text("12abc"))), json!(12));
        assert_eq!(to_integer(Some(&text("abc"))), json!(0));
        assert_eq!(to_integer(Some(&text(" -7 "))), json!(-7));
        assert_eq!(to_integer(Some(&text("1e3"))), json!(1000));
        assert_eq!(to_float(Some(&text("2.5kg"))), json!(2.5));
        assert_eq!(to_float(Some(&text("."))), json!(0.0));
        assert_eq!(to_float(Some(&RawValue::Real(f64::NAN))), Value::Null);
    }

    #[test]
    fn field_kinds_columns_in_kind_order() {
        let fields = kinds(&["s"], &["i"], &["f"]);
        assert_eq!(fields.columns().collect::<Vec<_>>(), vec!["s", "i", "f"]);
        assert!(!fields.is_empty());
        assert!(FieldKinds::default().is_empty());
    }
}
