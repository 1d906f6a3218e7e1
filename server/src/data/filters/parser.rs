//! Value and range extraction
//!
//! Parses human-written filter strings (`1,5-10,20`, `2020-01-01:2020-01-31`,
//! `a-c,x`) into normalized value lists. An inverted range anywhere in the
//! input rejects the whole input.

use thiserror::Error;

use super::types::{DateValue, ValueKind, ValueSpec, Values};

/// Errors produced while parsing a filter string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("inverted range: {0}")]
    InvertedRange(String),

    #[error("malformed range: {0}")]
    MalformedRange(String),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// Parse `raw` according to `kind`.
///
/// An empty string yields an empty list, meaning no filter was requested.
pub fn extract_values(raw: &str, kind: ValueKind) -> Result<Values, ParseError> {
    match kind {
        ValueKind::Integer => extract_integers(raw).map(Values::Integers),
        ValueKind::OrderedString => extract_strings(raw, true).map(Values::Strings),
        ValueKind::String => extract_strings(raw, false).map(Values::Strings),
        ValueKind::Date => extract_dates(raw).map(Values::Dates),
    }
}

/// Parse comma-separated integers and `first-last` integer ranges
pub fn extract_integers(raw: &str) -> Result<Vec<ValueSpec<i64>>, ParseError> {
    split_parts(raw)
        .map(|part| {
            if part.contains('-') {
                let (first, last) = split_range(part, '-')?;
                range(part, parse_integer(first)?, parse_integer(last)?)
            } else {
                parse_integer(part).map(ValueSpec::Single)
            }
        })
        .collect()
}

/// Parse comma-separated strings.
///
/// With `ranged` set, `first-last` is an inclusive lexical range.
pub fn extract_strings(raw: &str, ranged: bool) -> Result<Vec<ValueSpec<String>>, ParseError> {
    split_parts(raw)
        .map(|part| {
            if ranged && part.contains('-') {
                let (first, last) = split_range(part, '-')?;
                range(part, first.to_string(), last.to_string())
            } else {
                Ok(ValueSpec::Single(part.to_string()))
            }
        })
        .collect()
}

/// Parse comma-separated dates and date ranges.
///
/// Accepted part forms:
/// - `first:last`, each endpoint `YYYYMMDD` or `YYYY-MM-DD`
/// - `YYYYMMDD-YYYYMMDD`, `YYYY-MM-DD-YYYY-MM-DD` and the mixed forms
/// - a single `YYYYMMDD` or `YYYY-MM-DD`
pub fn extract_dates(raw: &str) -> Result<Vec<ValueSpec<DateValue>>, ParseError> {
    split_parts(raw).map(parse_date_part).collect()
}

/// Parse `YYYYMMDD` or `YYYY-MM-DD` into a date integer
pub fn parse_date(s: &str) -> Result<DateValue, ParseError> {
    DateValue::parse(s)
}

/// Format a `YYYYMMDD` integer as `YYYY-MM-DD`
pub fn date_string(value: i64) -> String {
    DateValue::from_yyyymmdd(value).to_iso_string()
}

fn split_parts(raw: &str) -> impl Iterator<Item = &str> {
    // "".split(',') yields one empty part; an empty input means no filter
    raw.split(',').filter(move |_| !raw.is_empty())
}

fn split_range(part: &str, separator: char) -> Result<(&str, &str), ParseError> {
    let mut pieces = part.split(separator);
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(first), Some(last), None) => Ok((first, last)),
        _ => Err(ParseError::MalformedRange(part.to_string())),
    }
}

fn range<T: Ord>(part: &str, first: T, last: T) -> Result<ValueSpec<T>, ParseError> {
    ValueSpec::from_endpoints(first, last)
        .ok_or_else(|| ParseError::InvertedRange(part.to_string()))
}

fn parse_integer(s: &str) -> Result<i64, ParseError> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(s.to_string()))
}

fn parse_date_part(part: &str) -> Result<ValueSpec<DateValue>, ParseError> {
    if part.contains(':') {
        let (first, last) = split_range(part, ':')?;
        return date_range(part, first, last);
    }

    // Dashes are both date separators and the range separator, so the
    // segment count decides which endpoints they belong to.
    let segments: Vec<&str> = part.split('-').collect();
    match segments.as_slice() {
        [_] | [_, _, _] => parse_date(part).map(ValueSpec::Single),
        [first, last] => date_range(part, first, last),
        [first, rest @ ..] if rest.len() == 3 && is_compact_date(first) => {
            date_range(part, first, &rest.join("-"))
        }
        [y, m, d, last] => date_range(part, &[*y, *m, *d].join("-"), last),
        [y1, m1, d1, y2, m2, d2] => {
            date_range(part, &[*y1, *m1, *d1].join("-"), &[*y2, *m2, *d2].join("-"))
        }
        _ => Err(ParseError::MalformedRange(part.to_string())),
    }
}

fn is_compact_date(s: &str) -> bool {
    s.trim().len() == 8
}

fn date_range(part: &str, first: &str, last: &str) -> Result<ValueSpec<DateValue>, ParseError> {
    range(part, parse_date(first)?, parse_date(last)?)
}
