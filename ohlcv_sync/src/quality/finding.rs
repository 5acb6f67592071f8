use std::fmt;

use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::bar_series::SeriesKey;
use serde::Serialize;

/// Category of a quality issue. Declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingValue,
    DuplicateTimestamp,
    PriceInconsistency,
    VolumeAnomaly,
    StatisticalOutlier,
    TimeGap,
}

impl FindingKind {
    pub const ALL: [FindingKind; 6] = [
        FindingKind::MissingValue,
        FindingKind::DuplicateTimestamp,
        FindingKind::PriceInconsistency,
        FindingKind::VolumeAnomaly,
        FindingKind::StatisticalOutlier,
        FindingKind::TimeGap,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            FindingKind::MissingValue => "missing_value",
            FindingKind::DuplicateTimestamp => "duplicate_timestamp",
            FindingKind::PriceInconsistency => "price_inconsistency",
            FindingKind::VolumeAnomaly => "volume_anomaly",
            FindingKind::StatisticalOutlier => "statistical_outlier",
            FindingKind::TimeGap => "time_gap",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The OHLC inequality a bar violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRule {
    HighBelowLow,
    HighBelowOpen,
    HighBelowClose,
    LowAboveOpen,
    LowAboveClose,
}

impl PriceRule {
    pub fn description(self) -> &'static str {
        match self {
            PriceRule::HighBelowLow => "high below low",
            PriceRule::HighBelowOpen => "high below open",
            PriceRule::HighBelowClose => "high below close",
            PriceRule::LowAboveOpen => "low above open",
            PriceRule::LowAboveClose => "low above close",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported, never blocks an upload.
    Informational,
}

/// One reported data-quality issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub key: SeriesKey,
    /// Affected timestamps, ascending. The first one positions the finding
    /// within its kind.
    pub timestamps: Vec<DateTime<Utc>>,
    pub severity: Severity,
    /// Violated rules, only for price inconsistencies.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PriceRule>,
    pub detail: String,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        key: &SeriesKey,
        timestamps: Vec<DateTime<Utc>>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.clone(),
            timestamps,
            severity: Severity::Informational,
            rules: Vec::new(),
            detail: detail.into(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<PriceRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Position used for ordering within a kind.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }
}
