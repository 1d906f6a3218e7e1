//! SQL filter builder
//!
//! Compiles normalized value lists into `OR`-joined predicates, one clause
//! per value or range. Integer and date values are `i64` by construction and
//! are written as literals; string values are always bound as `?`.

use super::regions;
use super::types::{DateValue, SqlParams, ValueSpec, Values};

/// Compile `values` into a predicate on `field`
///
/// `field` is interpolated verbatim and must come from trusted
/// configuration, never from the request.
pub fn compile(field: &str, values: &Values, params: &mut SqlParams) -> String {
    match values {
        Values::Integers(v) => filter_integers(field, v),
        Values::Strings(v) => filter_strings(field, v, params),
        Values::Dates(v) => filter_dates(field, v),
    }
}

/// Integer values/ranges (e.g. epiweeks)
pub fn filter_integers(field: &str, values: &[ValueSpec<i64>]) -> String {
    disjunction(values.iter().map(|value| match value {
        ValueSpec::Single(v) => format!("({} = {})", field, v),
        ValueSpec::Range(first, last) => format!("({} BETWEEN {} AND {})", field, first, last),
    }))
}

/// Date values/ranges against an integer `YYYYMMDD` column
pub fn filter_dates(field: &str, values: &[ValueSpec<DateValue>]) -> String {
    disjunction(values.iter().map(|value| match value {
        ValueSpec::Single(d) => format!("({} = {})", field, d),
        ValueSpec::Range(first, last) => format!("({} BETWEEN {} AND {})", field, first, last),
    }))
}

/// Date values/ranges against a DATE column, bound as `YYYY-MM-DD`
pub fn filter_iso_dates(
    field: &str,
    values: &[ValueSpec<DateValue>],
    params: &mut SqlParams,
) -> String {
    disjunction(values.iter().map(|value| match value {
        ValueSpec::Single(d) => {
            params.push_text(d.to_iso_string());
            format!("({} = ?)", field)
        }
        ValueSpec::Range(first, last) => {
            params.push_text(first.to_iso_string());
            params.push_text(last.to_iso_string());
            format!("({} BETWEEN ? AND ?)", field)
        }
    }))
}

/// String values/ranges (e.g. locations)
pub fn filter_strings(field: &str, values: &[ValueSpec<String>], params: &mut SqlParams) -> String {
    disjunction(values.iter().map(|value| match value {
        ValueSpec::Single(v) => {
            params.push_text(v.clone());
            format!("({} = ?)", field)
        }
        ValueSpec::Range(first, last) => {
            params.push_text(first.clone());
            params.push_text(last.clone());
            format!("({} BETWEEN ? AND ?)", field)
        }
    }))
}

/// String values where region codes expand to their member states
pub fn filter_regions(field: &str, values: &[ValueSpec<String>], params: &mut SqlParams) -> String {
    disjunction(values.iter().map(|value| match value {
        ValueSpec::Single(v) => match regions::members(v) {
            Some(states) => {
                for state in states {
                    params.push_text(*state);
                }
                let placeholders: Vec<&str> = states.iter().map(|_| "?").collect();
                format!("({} IN ({}))", field, placeholders.join(", "))
            }
            None => {
                params.push_text(v.clone());
                format!("({} = ?)", field)
            }
        },
        ValueSpec::Range(first, last) => {
            params.push_text(first.clone());
            params.push_text(last.clone());
            format!("({} BETWEEN ? AND ?)", field)
        }
    }))
}

// An empty disjunction matches nothing
fn disjunction(clauses: impl Iterator<Item = String>) -> String {
    let clauses: Vec<String> = clauses.collect();
    if clauses.is_empty() {
        return "FALSE".to_string();
    }
    clauses.join(" OR ")
}
