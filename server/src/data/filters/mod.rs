//! Request filter system
//!
//! Parses comma-separated filter parameters into normalized values and
//! compiles them into SQL predicates with bound string parameters.
//!
//! ## Usage
//!
//! ```
//! use epidata_server::data::filters::{SqlParams, ValueKind, compile, extract_values};
//!
//! let values = extract_values("202001,202010-202012", ValueKind::Integer).unwrap();
//! let mut params = SqlParams::default();
//! let sql = compile("epiweek", &values, &mut params);
//! assert_eq!(sql, "(epiweek = 202001) OR (epiweek BETWEEN 202010 AND 202012)");
//! ```

mod builder;
mod parser;
pub mod regions;
mod types;

pub use builder::{
    compile, filter_dates, filter_integers, filter_iso_dates, filter_regions, filter_strings,
};
pub use parser::{
    ParseError, date_string, extract_dates, extract_integers, extract_strings, extract_values,
    parse_date,
};
pub use types::{DateValue, SqlParams, SqlValue, ValueKind, ValueSpec, Values};
