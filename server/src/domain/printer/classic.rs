//! Classic envelope framing
//!
//! `{"epidata":[...],"count":N,"result":R,"message":"..."}`. The tree
//! variant buffers every row and emits `epidata` as an object of row lists
//! keyed by the grouping field.

use serde_json::Value;

use super::{CONTENT_TYPE, CONTENT_TYPE_JSON, Output, RESULT_ERROR, RESULT_TRUNCATED, Row};

pub(super) struct ClassicFraming {
    tree: Option<TreeBuffer>,
}

struct TreeBuffer {
    group: String,
    rows: Vec<Row>,
}

impl ClassicFraming {
    pub(super) fn flat() -> Self {
        Self { tree: None }
    }

    pub(super) fn tree(group: &str) -> Self {
        Self {
            tree: Some(TreeBuffer {
                group: group.to_string(),
                rows: Vec::new(),
            }),
        }
    }

    pub(super) fn set_group(&mut self, group: String) {
        if let Some(tree) = &mut self.tree {
            tree.group = group;
        }
    }

    pub(super) fn begin(&mut self, out: &mut Output) {
        out.set_header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if self.tree.is_some() {
            out.write_str(r#"{"epidata":"#);
        } else {
            out.write_str(r#"{"epidata":["#);
        }
    }

    pub(super) fn row(&mut self, out: &mut Output, first: bool, row: Row) {
        match &mut self.tree {
            Some(tree) => tree.rows.push(row),
            None => {
                if !first {
                    out.write_str(",");
                }
                out.write_json(&row);
            }
        }
    }

    pub(super) fn end(&mut self, out: &mut Output, count: u64, result: i32) {
        let message = if count == 0 {
            "no results"
        } else if result == RESULT_TRUNCATED {
            "too many results, data truncated"
        } else {
            "success"
        };
        self.close_rows(out);
        footer(out, count, result, message);
    }

    /// Close the row list and report the failure in the footer
    pub(super) fn fail(&mut self, out: &mut Output, count: u64, message: &str) {
        self.close_rows(out);
        footer(out, count, RESULT_ERROR, message);
    }

    fn close_rows(&mut self, out: &mut Output) {
        match &mut self.tree {
            Some(tree) => {
                let rows = std::mem::take(&mut tree.rows);
                let grouped = group_rows(&tree.group, rows);
                if grouped.is_empty() {
                    out.write_str("{}");
                } else {
                    out.write_json(&grouped);
                }
            }
            None => out.write_str("]"),
        }
    }
}

fn footer(out: &mut Output, count: u64, result: i32, message: &str) {
    out.write_str(&format!(
        r#","count":{},"result":{},"message":{}}}"#,
        count,
        result,
        Value::from(message)
    ));
}

/// Group rows by the value of `group`, removing that field from each row.
/// Rows without a value group under the empty string.
fn group_rows(group: &str, rows: Vec<Row>) -> serde_json::Map<String, Value> {
    let mut grouped = serde_json::Map::new();
    for mut row in rows {
        let key = match row.shift_remove(group) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        if let Value::Array(list) = grouped
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            list.push(Value::Object(row));
        }
    }
    grouped
}
