//! CSV framing
//!
//! Header row from the first row's field names, then one record per row.
//! Each record is encoded into a scratch buffer and handed to the transport
//! as soon as it is complete.

use serde_json::Value;

use super::{Output, Row};

#[derive(Default)]
pub(super) struct CsvFraming {
    buf: Vec<u8>,
}

impl CsvFraming {
    pub(super) fn begin(&mut self, out: &mut Output) {
        out.set_header("Content-Type", "text/csv; charset=utf8");
        out.set_header("Content-Disposition", "attachment; filename=epidata.csv");
    }

    pub(super) fn row(&mut self, out: &mut Output, first: bool, row: Row) {
        if let Err(e) = encode(&mut self.buf, first, &row) {
            tracing::warn!(error = %e, "Failed to write CSV record");
        }
        out.write(&self.buf);
        self.buf.clear();
    }
}

fn encode(buf: &mut Vec<u8>, header: bool, row: &Row) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(buf);
    if header {
        writer.write_record(row.keys())?;
    }
    writer.write_record(row.values().map(field))?;
    writer.flush()?;
    Ok(())
}

fn field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}
