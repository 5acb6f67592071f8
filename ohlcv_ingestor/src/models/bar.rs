//! Canonical in-memory representation of a time-series bar (OHLCV).
//!
//! This struct is the standard output of every [`DataProvider`](crate::providers::DataProvider)
//! and the unit the quality checks and uploaders work on. Missing provider
//! cells are carried as `f64::NAN` so a partially filled row survives the
//! round trip through the working set and can be reported instead of dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-series bar (OHLCV) for a given timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar boundary (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume traded during the bar interval.
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Names of the numeric fields holding NaN, in column order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_nan())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn has_missing(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .any(|v| v.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reports_missing_fields_in_column_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bar = Bar::new(ts, f64::NAN, 2.0, 1.0, f64::NAN, 10.0);
        assert!(bar.has_missing());
        assert_eq!(bar.missing_fields(), vec!["open", "close"]);

        let full = Bar::new(ts, 1.0, 2.0, 1.0, 1.5, 0.0);
        assert!(!full.has_missing());
        assert!(full.missing_fields().is_empty());
    }
}
