//! Data layer
//!
//! - `filters` - request filter parsing and SQL predicate compilation
//! - `duckdb` - DuckDB storage, query engine and analytics table
//! - `analytics` - per-request analytics events and recorders

pub mod analytics;
pub mod duckdb;
pub mod error;
pub mod filters;

pub use analytics::{AnalyticsEvent, AnalyticsRecorder, ClientInfo, MemoryAnalytics};
pub use error::DataError;
