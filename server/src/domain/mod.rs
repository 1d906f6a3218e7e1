//! Query pipeline domain logic
//!
//! - `executor` - row-capped execution and row shaping
//! - `printer` - streaming response encodings
//! - `trend` - trend classification over a collected series

pub mod executor;
pub mod printer;
pub mod trend;

pub use executor::{
    EngineError, Execution, FieldKinds, QueryEngine, QueryExecutor, RawRow, RawValue,
};
pub use printer::{Format, Printer, RowSink};
