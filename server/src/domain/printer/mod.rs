//! Streaming result printers
//!
//! A printer frames result rows into one response encoding while tracking
//! how many rows were written and the outcome code. Every printer moves
//! through `NotBegun -> Active -> Ended` exactly once:
//!
//! - `begin()` is idempotent and `print_row()` begins implicitly.
//! - `end()` is a no-op unless the printer has begun.
//! - The error methods bypass the row lifecycle and emit a single envelope.
//!
//! Each terminal emission (normal `end()`, an error envelope, or a
//! non-standard payload) records exactly one analytics event.

mod classic;
mod collect;
mod csv;
mod json;
mod transport;

use std::sync::Arc;

use serde::Serialize;

use crate::data::analytics::{AnalyticsEvent, AnalyticsRecorder, ClientInfo};

use self::classic::ClassicFraming;
use self::csv::CsvFraming;
use self::json::{JsonFraming, JsonLinesFraming};

pub use collect::CollectRowPrinter;
pub use transport::{BufferedTransport, Transport};

/// One output row: field name to string, integer, float or null
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Field the tree format groups rows by
pub const TREE_GROUP_FIELD: &str = "signal";

/// Outcome code for an error envelope
pub const RESULT_ERROR: i32 = -1;
/// Outcome code for a query that returned no rows
pub const RESULT_EMPTY: i32 = -2;
/// Outcome code for a successful query
pub const RESULT_SUCCESS: i32 = 1;
/// Outcome code for a result cut off at the row cap
pub const RESULT_TRUNCATED: i32 = 2;

pub(crate) const CONTENT_TYPE: &str = "Content-Type";
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";

/// Row sink contract shared by streaming printers and collectors
pub trait RowSink {
    fn begin(&mut self);
    fn print_row(&mut self, row: Row);
    fn end(&mut self, has_more: bool);

    /// True once the sink can no longer deliver output
    fn is_closed(&self) -> bool {
        false
    }
}

/// Response encoding, selected by the `format` request parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Classic,
    Tree,
    Json,
    JsonLines,
    Csv,
}

impl Format {
    /// Unknown or missing values fall back to the classic envelope
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("tree") => Self::Tree,
            Some("json") => Self::Json,
            Some("jsonl") => Self::JsonLines,
            Some("csv") => Self::Csv,
            _ => Self::Classic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Tree => "tree",
            Self::Json => "json",
            Self::JsonLines => "jsonl",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterState {
    NotBegun,
    Active,
    Ended,
}

/// Transport wrapper that stops writing after the first failure
pub(crate) struct Output {
    transport: Box<dyn Transport>,
    closed: bool,
}

impl Output {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            closed: false,
        }
    }

    pub(crate) fn set_status(&mut self, status: u16) {
        self.transport.set_status(status);
    }

    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        self.transport.set_header(name, value);
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        if self.closed || bytes.is_empty() {
            return;
        }
        if let Err(e) = self.transport.write(bytes) {
            tracing::debug!(error = %e, "Transport closed, discarding remaining output");
            self.closed = true;
        }
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    pub(crate) fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.write(&bytes),
            Err(e) => tracing::warn!(error = %e, "Failed to encode JSON output"),
        }
    }
}

enum Framing {
    Classic(ClassicFraming),
    Json(JsonFraming),
    JsonLines(JsonLinesFraming),
    Csv(CsvFraming),
}

impl Framing {
    fn begin(&mut self, out: &mut Output) {
        match self {
            Self::Classic(f) => f.begin(out),
            Self::Json(f) => f.begin(out),
            Self::JsonLines(f) => f.begin(out),
            Self::Csv(f) => f.begin(out),
        }
    }

    fn row(&mut self, out: &mut Output, first: bool, row: Row) {
        match self {
            Self::Classic(f) => f.row(out, first, row),
            Self::Json(f) => f.row(out, first, row),
            Self::JsonLines(f) => f.row(out, row),
            Self::Csv(f) => f.row(out, first, row),
        }
    }

    fn end(&mut self, out: &mut Output, count: u64, result: i32) {
        match self {
            Self::Classic(f) => f.end(out, count, result),
            Self::Json(f) => f.end(out),
            Self::JsonLines(_) | Self::Csv(_) => {}
        }
    }

    /// Close an open body after a failure. The head is already committed,
    /// so only formats with a footer can carry the error.
    fn fail(&mut self, out: &mut Output, count: u64, message: &str) {
        match self {
            Self::Classic(f) => f.fail(out, count, message),
            Self::Json(f) => f.end(out),
            Self::JsonLines(_) | Self::Csv(_) => {}
        }
    }
}

/// Streaming printer for one request
pub struct Printer {
    source: String,
    framing: Framing,
    out: Output,
    state: PrinterState,
    count: u64,
    result: i32,
    use_status_codes: bool,
    finished: bool,
    analytics: Arc<dyn AnalyticsRecorder>,
    client: ClientInfo,
}

impl Printer {
    pub fn new(
        format: Format,
        source: impl Into<String>,
        transport: Box<dyn Transport>,
        analytics: Arc<dyn AnalyticsRecorder>,
    ) -> Self {
        let framing = match format {
            Format::Classic => Framing::Classic(ClassicFraming::flat()),
            Format::Tree => Framing::Classic(ClassicFraming::tree(TREE_GROUP_FIELD)),
            Format::Json => Framing::Json(JsonFraming),
            Format::JsonLines => Framing::JsonLines(JsonLinesFraming),
            Format::Csv => Framing::Csv(CsvFraming::default()),
        };
        // Classic clients read `result` from the body and expect HTTP 200
        let use_status_codes = !matches!(format, Format::Classic | Format::Tree);

        Self {
            source: source.into(),
            framing,
            out: Output::new(transport),
            state: PrinterState::NotBegun,
            count: 0,
            result: RESULT_ERROR,
            use_status_codes,
            finished: false,
            analytics,
            client: ClientInfo::default(),
        }
    }

    /// Attach client details recorded with the analytics event
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Change the tree grouping field (no effect on other formats)
    pub fn grouped_by(mut self, field: impl Into<String>) -> Self {
        if let Framing::Classic(f) = &mut self.framing {
            f.set_group(field.into());
        }
        self
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn result(&self) -> i32 {
        self.result
    }

    pub fn state(&self) -> PrinterState {
        self.state
    }

    /// Emit an error envelope immediately, bypassing the row lifecycle.
    ///
    /// Once rows have started streaming the envelope can no longer be sent;
    /// the open body is closed instead and the error lands in its footer
    /// where the format has one.
    pub fn print_error(&mut self, result: i32, message: &str, status: Option<u16>) {
        if !self.claim_terminal() {
            return;
        }
        let streaming = self.state == PrinterState::Active;
        self.state = PrinterState::Ended;
        self.result = result;
        if streaming {
            self.framing.fail(&mut self.out, self.count, message);
            self.record_analytics(self.count);
            return;
        }
        if let Some(status) = status
            && self.use_status_codes
        {
            self.out.set_status(status);
        }
        self.out.set_header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        self.out.write_json(&serde_json::json!({
            "result": result,
            "message": message,
        }));
        self.record_analytics(0);
    }

    pub fn print_database_error(&mut self) {
        self.print_error(RESULT_ERROR, "database error", Some(500));
    }

    pub fn print_unauthenticated(&mut self) {
        self.print_error(RESULT_ERROR, "unauthenticated", Some(401));
    }

    pub fn print_validation_failed(&mut self, message: &str) {
        self.print_error(RESULT_ERROR, message, Some(400));
    }

    pub fn print_missing_or_wrong_source(&mut self) {
        self.print_error(RESULT_ERROR, "no data source specified", Some(400));
    }

    /// Emit a success envelope around an arbitrary payload
    pub fn print_non_standard<T: Serialize + ?Sized>(&mut self, data: &T) {
        if !self.claim_terminal() {
            return;
        }
        self.state = PrinterState::Ended;
        self.result = RESULT_SUCCESS;
        self.out.set_header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        self.out.write_json(&serde_json::json!({
            "result": self.result,
            "message": "success",
            "epidata": data,
        }));
        self.record_analytics(0);
    }

    fn claim_terminal(&mut self) -> bool {
        if self.finished {
            tracing::warn!(source = %self.source, "Printer already finished, ignoring terminal call");
            return false;
        }
        self.finished = true;
        true
    }

    fn record_analytics(&self, num_rows: u64) {
        self.analytics.record(AnalyticsEvent::new(
            &self.source,
            self.result,
            num_rows,
            &self.client,
        ));
    }
}

impl RowSink for Printer {
    fn begin(&mut self) {
        if self.state != PrinterState::NotBegun {
            return;
        }
        self.state = PrinterState::Active;
        self.framing.begin(&mut self.out);
    }

    fn print_row(&mut self, row: Row) {
        match self.state {
            PrinterState::NotBegun => self.begin(),
            PrinterState::Active => {}
            PrinterState::Ended => {
                tracing::debug!(source = %self.source, "Dropping row printed after end");
                return;
            }
        }
        let first = self.count == 0;
        self.framing.row(&mut self.out, first, row);
        self.count += 1;
    }

    fn end(&mut self, has_more: bool) {
        if self.state != PrinterState::Active || !self.claim_terminal() {
            return;
        }
        self.result = if self.count == 0 {
            RESULT_EMPTY
        } else if has_more {
            RESULT_TRUNCATED
        } else {
            RESULT_SUCCESS
        };
        self.framing.end(&mut self.out, self.count, self.result);
        self.state = PrinterState::Ended;
        self.record_analytics(self.count);
    }

    fn is_closed(&self) -> bool {
        self.out.closed || self.state == PrinterState::Ended
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use serde_json::json;

    use super::*;
    use crate::data::analytics::MemoryAnalytics;

    pub(super) fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    pub(super) fn printer(format: Format) -> (Printer, BufferedTransport, Arc<MemoryAnalytics>) {
        let transport = BufferedTransport::new();
        let analytics = Arc::new(MemoryAnalytics::default());
        let printer = Printer::new(
            format,
            "fluview",
            Box::new(transport.clone()),
            analytics.clone(),
        );
        (printer, transport, analytics)
    }

    #[test]
    fn format_from_param() {
        assert_eq!(Format::from_param(None), Format::Classic);
        assert_eq!(Format::from_param(Some("tree")), Format::Tree);
        assert_eq!(Format::from_param(Some("jsonl")), Format::JsonLines);
        assert_eq!(Format::from_param(Some("csv")), Format::Csv);
        assert_eq!(Format::from_param(Some("xml")), Format::Classic);
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let (mut p, _, _) = printer(Format::Json);
        assert_eq!(p.state(), PrinterState::NotBegun);
        p.print_row(row(json!({"a": 1})));
        assert_eq!(p.state(), PrinterState::Active);
        p.end(false);
        assert_eq!(p.state(), PrinterState::Ended);
        p.begin();
        assert_eq!(p.state(), PrinterState::Ended);
    }

    #[test]
    fn begin_twice_matches_begin_once() {
        for format in [
            Format::Classic,
            Format::Tree,
            Format::Json,
            Format::JsonLines,
            Format::Csv,
        ] {
            let (mut once, once_out, _) = printer(format);
            once.begin();
            once.print_row(row(json!({"signal": "x", "a": 1})));
            once.end(false);

            let (mut twice, twice_out, _) = printer(format);
            twice.begin();
            twice.begin();
            twice.print_row(row(json!({"signal": "x", "a": 1})));
            twice.end(false);

            assert_eq!(once_out.body(), twice_out.body(), "format: {}", format.as_str());
        }
    }

    #[test]
    fn end_without_begin_is_silent() {
        let (mut p, out, analytics) = printer(Format::Classic);
        p.end(false);
        assert!(out.body().is_empty());
        assert_eq!(p.state(), PrinterState::NotBegun);
        assert!(analytics.events().is_empty());
    }

    #[test]
    fn outcome_codes() {
        let (mut empty, _, _) = printer(Format::Json);
        empty.begin();
        empty.end(false);
        assert_eq!(empty.result(), RESULT_EMPTY);

        let (mut ok, _, _) = printer(Format::Json);
        ok.print_row(row(json!({"a": 1})));
        ok.end(false);
        assert_eq!(ok.result(), RESULT_SUCCESS);

        let (mut truncated, _, _) = printer(Format::Json);
        truncated.print_row(row(json!({"a": 1})));
        truncated.end(true);
        assert_eq!(truncated.result(), RESULT_TRUNCATED);

        // an empty result reports -2 even when truncation was signalled
        let (mut empty_more, _, _) = printer(Format::Json);
        empty_more.begin();
        empty_more.end(true);
        assert_eq!(empty_more.result(), RESULT_EMPTY);
    }

    #[test]
    fn normal_end_records_one_event_with_count() {
        let (mut p, _, analytics) = printer(Format::Json);
        p.print_row(row(json!({"a": 1})));
        p.print_row(row(json!({"a": 2})));
        p.end(false);
        p.end(false);

        let events = analytics.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "fluview");
        assert_eq!(events[0].result, RESULT_SUCCESS);
        assert_eq!(events[0].num_rows, 2);
    }

    #[test]
    fn every_error_path_records_one_event() {
        let cases: [(fn(&mut Printer), u16, &str); 4] = [
            (|p| p.print_database_error(), 500, "database error"),
            (|p| p.print_unauthenticated(), 401, "unauthenticated"),
            (
                |p| p.print_validation_failed("missing parameter: need [epiweeks]"),
                400,
                "missing parameter: need [epiweeks]",
            ),
            (|p| p.print_missing_or_wrong_source(), 400, "no data source specified"),
        ];

        for (print, status, message) in cases {
            let (mut p, out, analytics) = printer(Format::Json);
            print(&mut p);
            // terminal calls after an error are ignored
            p.end(false);
            p.print_database_error();

            assert_eq!(out.status(), Some(status));
            assert_eq!(
                out.body_string(),
                format!(r#"{{"result":-1,"message":"{}"}}"#, message)
            );
            assert_eq!(out.header("content-type").as_deref(), Some("application/json"));

            let events = analytics.events();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].result, RESULT_ERROR);
            assert_eq!(events[0].num_rows, 0);
        }
    }

    #[test]
    fn error_after_rows_closes_each_format() {
        let cases = [
            (
                Format::Classic,
                r#"{"epidata":[{"a":1}],"count":1,"result":-1,"message":"database error"}"#,
            ),
            (
                Format::Tree,
                r#"{"epidata":{"x":[{"a":1}]},"count":1,"result":-1,"message":"database error"}"#,
            ),
            (Format::Json, r#"[{"a":1}]"#),
            (Format::JsonLines, "{\"a\":1}\n"),
            (Format::Csv, "a\n1\n"),
        ];

        for (format, expected) in cases {
            let (mut p, out, analytics) = printer(format);
            let mut first = row(json!({"a": 1}));
            if format == Format::Tree {
                first.insert("signal".to_string(), json!("x"));
            }
            p.print_row(first);
            p.print_database_error();
            p.end(false);

            assert_eq!(out.body_string(), expected, "{}", format.as_str());
            assert_eq!(out.status(), None);
            assert_eq!(p.state(), PrinterState::Ended);

            let events = analytics.events();
            assert_eq!(events.len(), 1);
            assert_eq!((events[0].result, events[0].num_rows), (RESULT_ERROR, 1));
        }
    }

    #[test]
    fn classic_errors_keep_status_200() {
        let (mut p, out, _) = printer(Format::Classic);
        p.print_validation_failed("bad");
        assert_eq!(out.status(), None);
        assert_eq!(out.body_string(), r#"{"result":-1,"message":"bad"}"#);
    }

    #[test]
    fn non_standard_payload() {
        let (mut p, out, analytics) = printer(Format::Classic);
        p.print_non_standard(&json!(["fluview", "covidcast"]));

        assert_eq!(
            out.body_string(),
            r#"{"result":1,"message":"success","epidata":["fluview","covidcast"]}"#
        );
        assert_eq!(p.result(), RESULT_SUCCESS);
        assert_eq!(analytics.events().len(), 1);
    }

    struct BrokenTransport;

    impl Transport for BrokenTransport {
        fn set_status(&mut self, _status: u16) {}
        fn set_header(&mut self, _name: &str, _value: &str) {}
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn disconnect_closes_printer_but_still_records() {
        let analytics = Arc::new(MemoryAnalytics::default());
        let mut p = Printer::new(
            Format::Json,
            "fluview",
            Box::new(BrokenTransport),
            analytics.clone(),
        );
        p.print_row(row(json!({"a": 1})));
        assert!(p.is_closed());
        p.end(false);
        assert_eq!(analytics.events().len(), 1);
    }
}
