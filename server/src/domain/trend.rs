//! Trend classification for a single time series
//!
//! Compares the value at a current time against a basis time and the
//! series extremes. Changes are judged relative to the series minimum so
//! a series hovering near zero does not flip between states on noise.

use serde::Serialize;
use serde_json::Value;

use crate::domain::printer::Row;

/// Relative change at or beyond which a series counts as moving
const CHANGE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    #[default]
    Unknown,
    Increasing,
    Decreasing,
    Steady,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trend {
    pub value: Option<f64>,

    pub basis_date: Option<i64>,
    pub basis_value: Option<f64>,
    pub basis_trend: TrendDirection,

    pub min_date: Option<i64>,
    pub min_value: Option<f64>,
    pub min_trend: TrendDirection,

    pub max_date: Option<i64>,
    pub max_value: Option<f64>,
    pub max_trend: TrendDirection,
}

impl Trend {
    /// Output row: the series key fields followed by the trend fields
    pub fn into_row(self, mut key: Row) -> Row {
        match serde_json::to_value(&self) {
            Ok(Value::Object(fields)) => key.extend(fields),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to encode trend"),
        }
        key
    }
}

/// Compute the trend of `points` at `current` against `basis`.
///
/// When no point exists at `current` every direction stays unknown.
pub fn compute_trend(
    current: i64,
    basis: i64,
    points: impl IntoIterator<Item = (i64, f64)>,
) -> Trend {
    let mut trend = Trend {
        basis_date: Some(basis),
        ..Default::default()
    };

    for (time, value) in points {
        if time == current {
            trend.value = Some(value);
        }
        if time == basis {
            trend.basis_value = Some(value);
        }
        if trend.min_value.is_none_or(|min| min > value) {
            trend.min_date = Some(time);
            trend.min_value = Some(value);
        }
        if trend.max_value.is_none_or(|max| max < value) {
            trend.max_date = Some(time);
            trend.max_value = Some(value);
        }
    }

    let (Some(value), Some(min)) = (trend.value, trend.min_value) else {
        return trend;
    };

    let against = |reference: Option<f64>| match reference {
        Some(r) if r != 0.0 => classify(value, r, min),
        _ => TrendDirection::Unknown,
    };
    trend.basis_trend = against(trend.basis_value);
    trend.min_trend = classify(value, min, min);
    trend.max_trend = against(trend.max_value);
    trend
}

/// Classify `current` against `basis`, both measured from `min`
pub fn classify(current: f64, basis: f64, min: f64) -> TrendDirection {
    let basis = basis - min;
    let current = current - min;
    if basis == current {
        return TrendDirection::Steady;
    }
    if basis == 0.0 {
        return TrendDirection::Increasing;
    }
    let change = current / basis - 1.0;
    if change >= CHANGE_THRESHOLD {
        TrendDirection::Increasing
    } else if change <= -CHANGE_THRESHOLD {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Steady
    }
}
