//! Filter value types
//!
//! Normalized singleton/range values produced by the parser and the bound
//! parameter list collected while compiling them into SQL.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::parser::ParseError;

/// Which parsing rules apply to a raw filter string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Integers; `-` separates range endpoints
    Integer,
    /// Strings compared lexically; `-` separates range endpoints
    OrderedString,
    /// Literal strings; `-` has no meaning
    String,
    /// Calendar dates as `YYYYMMDD` or `YYYY-MM-DD`; ranges via `:` or `-`
    Date,
}

/// A single value or an inclusive range with `first < last`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValueSpec<T> {
    Single(T),
    Range(T, T),
}

impl<T: Ord> ValueSpec<T> {
    /// Normalize range endpoints.
    ///
    /// Equal endpoints collapse to a singleton. Returns `None` when the range
    /// is inverted.
    pub fn from_endpoints(first: T, last: T) -> Option<Self> {
        match last.cmp(&first) {
            Ordering::Equal => Some(Self::Single(first)),
            Ordering::Greater => Some(Self::Range(first, last)),
            Ordering::Less => None,
        }
    }
}

/// A calendar date encoded as the integer `YYYYMMDD`
///
/// No calendar validation is performed: `20240231` is accepted as-is and
/// compared purely numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DateValue(i64);

impl DateValue {
    pub const fn from_yyyymmdd(value: i64) -> Self {
        Self(value)
    }

    /// Parse `YYYYMMDD` or `YYYY-MM-DD` by dropping dashes and reading the
    /// remaining digits as an integer.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let digits: String = s.trim().chars().filter(|c| *c != '-').collect();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidDate(s.to_string()));
        }
        digits
            .parse::<i64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidDate(s.to_string()))
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    pub const fn year(self) -> i64 {
        (self.0 / 10_000) % 10_000
    }

    pub const fn month(self) -> i64 {
        (self.0 / 100) % 100
    }

    pub const fn day(self) -> i64 {
        self.0 % 100
    }

    /// Render as `YYYY-MM-DD`
    pub fn to_iso_string(self) -> String {
        format!("{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed values of one filter parameter, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Values {
    Integers(Vec<ValueSpec<i64>>),
    Strings(Vec<ValueSpec<String>>),
    Dates(Vec<ValueSpec<DateValue>>),
}

impl Values {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Integers(v) => v.len(),
            Self::Strings(v) => v.len(),
            Self::Dates(v) => v.len(),
        }
    }
}

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(i64),
    Text(String),
}

/// Collects SQL parameters during query building (maintains insertion order)
#[derive(Debug, Default, Clone)]
pub struct SqlParams {
    pub values: Vec<SqlValue>,
}

impl SqlParams {
    pub fn push_text(&mut self, value: impl Into<String>) {
        self.values.push(SqlValue::Text(value.into()));
    }

    pub fn push_integer(&mut self, value: i64) {
        self.values.push(SqlValue::Integer(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
