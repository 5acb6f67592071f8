//! Bar granularities supported by the collector.
//!
//! A [`Timeframe`] is one of the fixed interval codes the quote provider
//! accepts (`1m`, `5m`, `15m`, `30m`, `90m`, `1h`, `1d`). The same code is used
//! in working-set file names (`AAPL_1d.csv`) and in the persisted `timeframe`
//! column, so `Display`/`FromStr` round-trip exactly.
//!
//! ```
//! use ohlcv_ingestor::models::timeframe::Timeframe;
//!
//! let tf: Timeframe = "5m".parse().unwrap();
//! assert_eq!(tf, Timeframe::FiveMinutes);
//! assert_eq!(tf.to_string(), "5m");
//! assert!(tf.is_intraday());
//! ```

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("unknown timeframe code: {0:?}")]
    UnknownCode(String),
}

/// Sampling granularity of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "90m")]
    NinetyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// Every supported timeframe, finest first.
    pub const ALL: [Timeframe; 7] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::NinetyMinutes,
        Timeframe::OneHour,
        Timeframe::OneDay,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::NinetyMinutes => "90m",
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Distance between two adjacent bars when nothing is missing.
    pub fn expected_interval(self) -> Duration {
        match self {
            Timeframe::OneMinute => Duration::minutes(1),
            Timeframe::FiveMinutes => Duration::minutes(5),
            Timeframe::FifteenMinutes => Duration::minutes(15),
            Timeframe::ThirtyMinutes => Duration::minutes(30),
            Timeframe::NinetyMinutes => Duration::minutes(90),
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::OneDay => Duration::days(1),
        }
    }

    pub const fn is_intraday(self) -> bool {
        !matches!(self, Timeframe::OneDay)
    }

    /// Longest look-back the provider serves for this interval, as a range code.
    pub const fn max_range(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "7d",
            Timeframe::FiveMinutes
            | Timeframe::FifteenMinutes
            | Timeframe::ThirtyMinutes
            | Timeframe::NinetyMinutes => "60d",
            Timeframe::OneHour => "730d",
            Timeframe::OneDay => "max",
        }
    }

    /// [`Self::max_range`] as a duration. `None` when the whole history is
    /// served.
    pub fn max_lookback(self) -> Option<Duration> {
        match self {
            Timeframe::OneMinute => Some(Duration::days(7)),
            Timeframe::FiveMinutes
            | Timeframe::FifteenMinutes
            | Timeframe::ThirtyMinutes
            | Timeframe::NinetyMinutes => Some(Duration::days(60)),
            Timeframe::OneHour => Some(Duration::days(730)),
            Timeframe::OneDay => None,
        }
    }

    /// Age after which a master file for this interval counts as stale.
    pub fn staleness(self) -> Duration {
        if self.is_intraday() {
            Duration::hours(12)
        } else {
            Duration::days(7)
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.code() == s.trim())
            .ok_or_else(|| TimeframeError::UnknownCode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.code().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(
            "2m".parse::<Timeframe>(),
            Err(TimeframeError::UnknownCode("2m".into()))
        );
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn intervals_and_ranges() {
        assert_eq!(Timeframe::NinetyMinutes.expected_interval(), Duration::minutes(90));
        assert_eq!(Timeframe::OneDay.expected_interval(), Duration::days(1));
        assert_eq!(Timeframe::OneMinute.max_range(), "7d");
        assert_eq!(Timeframe::OneHour.max_range(), "730d");
        assert_eq!(Timeframe::FiveMinutes.max_lookback(), Some(Duration::days(60)));
        assert_eq!(Timeframe::OneDay.max_lookback(), None);
        assert_eq!(Timeframe::OneDay.staleness(), Duration::days(7));
        assert_eq!(Timeframe::FiveMinutes.staleness(), Duration::hours(12));
    }

    #[test]
    fn serde_uses_codes() {
        let json = serde_json::to_string(&Timeframe::FifteenMinutes).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Timeframe = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(back, Timeframe::OneHour);
    }
}
