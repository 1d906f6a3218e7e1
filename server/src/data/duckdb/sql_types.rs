//! SQL type wrappers for DuckDB
//!
//! Conversions between the pipeline's value types and DuckDB values.

use chrono::{DateTime, Utc};
use duckdb::ToSql;
use duckdb::types::{TimeUnit, ToSqlOutput, Value, ValueRef};

use crate::data::filters::SqlValue;
use crate::domain::executor::RawValue;

impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::BigInt(*i)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Wrapper for DateTime<Utc> to implement ToSql for DuckDB TIMESTAMP
pub struct SqlTimestamp(pub DateTime<Utc>);

impl ToSql for SqlTimestamp {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let ts = self.0.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        Ok(ToSqlOutput::Owned(Value::Text(ts)))
    }
}

/// Convert a fetched DuckDB value into a raw pipeline value.
///
/// Dates and timestamps become ISO text; exotic types fall back to their
/// debug rendering.
pub fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Boolean(b) => RawValue::Integer(i64::from(b)),
        Value::TinyInt(i) => RawValue::Integer(i64::from(i)),
        Value::SmallInt(i) => RawValue::Integer(i64::from(i)),
        Value::Int(i) => RawValue::Integer(i64::from(i)),
        Value::BigInt(i) => RawValue::Integer(i),
        Value::UTinyInt(i) => RawValue::Integer(i64::from(i)),
        Value::USmallInt(i) => RawValue::Integer(i64::from(i)),
        Value::UInt(i) => RawValue::Integer(i64::from(i)),
        Value::UBigInt(i) => match i64::try_from(i) {
            Ok(i) => RawValue::Integer(i),
            Err(_) => RawValue::Text(i.to_string()),
        },
        Value::HugeInt(i) => match i64::try_from(i) {
            Ok(i) => RawValue::Integer(i),
            Err(_) => RawValue::Text(i.to_string()),
        },
        Value::Float(f) => RawValue::Real(f64::from(f)),
        Value::Double(f) => RawValue::Real(f),
        Value::Decimal(d) => RawValue::Text(d.to_string()),
        Value::Text(s) => RawValue::Text(s),
        Value::Enum(s) => RawValue::Text(s),
        Value::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map(|dt| RawValue::Text(dt.format("%Y-%m-%d").to_string()))
            .unwrap_or(RawValue::Null),
        Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
            .map(|dt| RawValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(RawValue::Null),
        other => RawValue::Text(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}
