//! Quality Gate: advisory data-quality checks over one series.
//!
//! [`evaluate`] runs six checks in a fixed order and always runs all of them:
//!
//! 1. missing values (NaN in any numeric field)
//! 2. duplicate timestamps in the raw input
//! 3. OHLC price inconsistencies
//! 4. zero or negative volume
//! 5. statistical outliers in close-to-close returns
//! 6. time gaps larger than the timeframe's interval
//!
//! Checks 1-4 look at the raw series as loaded; 5 and 6 at its sorted,
//! de-duplicated form. The result is sorted by (kind, first timestamp) and is
//! a pure function of the input: findings are data and never fail the call.

pub mod calendar;
pub mod checks;
pub mod finding;
pub mod report;

use ohlcv_ingestor::models::bar_series::BarSeries;
use serde::Serialize;

pub use calendar::TradingCalendar;
pub use finding::{Finding, FindingKind, PriceRule, Severity};

pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityConfig {
    /// Absolute z-score above which a return is an outlier.
    pub z_threshold: f64,
    pub calendar: Option<TradingCalendar>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            z_threshold: DEFAULT_Z_THRESHOLD,
            calendar: None,
        }
    }
}

/// Runs every check over `series`.
pub fn evaluate(series: &BarSeries, config: &QualityConfig) -> Vec<Finding> {
    if series.is_empty() {
        return Vec::new();
    }
    let clean = series.dedup_last_wins();

    let mut findings = Vec::new();
    findings.extend(checks::missing_values(series));
    findings.extend(checks::duplicate_timestamps(series));
    findings.extend(checks::price_inconsistencies(series));
    findings.extend(checks::volume_anomalies(series));
    findings.extend(checks::statistical_outliers(&clean, config.z_threshold));
    findings.extend(checks::time_gaps(&clean, config.calendar.as_ref()));

    // stable: equal (kind, anchor) keep check order
    findings.sort_by_key(|f| (f.kind.rank(), f.anchor()));
    findings
}
