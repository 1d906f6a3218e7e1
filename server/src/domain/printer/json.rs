//! Plain JSON array and JSON-lines framing

use super::{CONTENT_TYPE, CONTENT_TYPE_JSON, Output, Row};

/// `[row,row,...]`
pub(super) struct JsonFraming;

impl JsonFraming {
    pub(super) fn begin(&mut self, out: &mut Output) {
        out.set_header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        out.write_str("[");
    }

    pub(super) fn row(&mut self, out: &mut Output, first: bool, row: Row) {
        if !first {
            out.write_str(",");
        }
        out.write_json(&row);
    }

    pub(super) fn end(&mut self, out: &mut Output) {
        out.write_str("]");
    }
}

/// One compact JSON object per line
pub(super) struct JsonLinesFraming;

impl JsonLinesFraming {
    pub(super) fn begin(&mut self, out: &mut Output) {
        // no registered media type for JSON lines
        out.set_header(CONTENT_TYPE, "text/plain; charset=utf8");
    }

    pub(super) fn row(&mut self, out: &mut Output, row: Row) {
        out.write_json(&row);
        out.write_str("\n");
    }
}
