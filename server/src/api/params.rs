//! Request parameters
//!
//! Presence semantics only: a parameter given with an empty value still
//! counts as present.

use std::collections::HashMap;

use crate::domain::Printer;

/// Query-string parameters of one request
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    values: HashMap<String, String>,
}

impl RequestParams {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Report the first missing parameter through `printer`.
    ///
    /// Returns false when a parameter was missing and the printer has
    /// already emitted the error.
    pub fn require_all(&self, printer: &mut Printer, names: &[&str]) -> bool {
        match names.iter().find(|name| !self.contains(name)) {
            Some(missing) => {
                printer.print_validation_failed(&format!("missing parameter: need [{}]", missing));
                false
            }
            None => true,
        }
    }

    /// Report through `printer` unless at least one of `names` is present
    pub fn require_any(&self, printer: &mut Printer, names: &[&str]) -> bool {
        if names.iter().any(|name| self.contains(name)) {
            return true;
        }
        printer.print_validation_failed(&format!(
            "missing parameter: need one of [{}]",
            names.join(", ")
        ));
        false
    }

    /// Requested output fields, None when no projection applies
    pub fn fields(&self) -> Option<Vec<String>> {
        let raw = self.get("fields").filter(|raw| !raw.is_empty())?;
        Some(raw.split(',').map(str::to_string).collect())
    }
}
