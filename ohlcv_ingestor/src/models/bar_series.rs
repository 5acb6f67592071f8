//! A collection of time-series bars for one (ticker, timeframe) key.
//!
//! A [`BarSeries`] as loaded from the working set is *raw*: it can contain
//! repeated timestamps and arbitrary order. Consumers that need the ordered,
//! unique form call [`BarSeries::dedup_last_wins`], which builds a new series
//! and leaves the original untouched so the quality checks can still see the
//! duplicates.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{bar::Bar, timeframe::Timeframe};

/// Identity of a series: ticker plus timeframe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub ticker: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    /// Tickers are stored upper-case, matching the provider's symbols.
    pub fn new(ticker: impl AsRef<str>, timeframe: Timeframe) -> Self {
        Self {
            ticker: ticker.as_ref().trim().to_uppercase(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.ticker, self.timeframe)
    }
}

/// Why a series is not strictly ascending by timestamp.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SeriesOrderError {
    #[error("duplicate timestamp {timestamp} at index {index}")]
    Duplicate {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("timestamp {timestamp} at index {index} precedes {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// Represents a complete set of time-series data for a single key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub key: SeriesKey,
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(key: SeriesKey, bars: Vec<Bar>) -> Self {
        Self { key, bars }
    }

    pub fn empty(key: SeriesKey) -> Self {
        Self::new(key, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Sorted, unique copy of this series. When a timestamp repeats, the bar
    /// supplied last wins.
    pub fn dedup_last_wins(&self) -> BarSeries {
        let mut by_ts: BTreeMap<DateTime<Utc>, &Bar> = BTreeMap::new();
        for bar in &self.bars {
            by_ts.insert(bar.timestamp, bar);
        }
        BarSeries {
            key: self.key.clone(),
            bars: by_ts.into_values().cloned().collect(),
        }
    }

    /// Checks that timestamps are strictly ascending. Reports the first violation.
    pub fn ensure_ordered(&self) -> Result<(), SeriesOrderError> {
        for (index, pair) in self.bars.windows(2).enumerate() {
            let (prev, cur) = (&pair[0], &pair[1]);
            if cur.timestamp == prev.timestamp {
                return Err(SeriesOrderError::Duplicate {
                    index: index + 1,
                    timestamp: cur.timestamp,
                });
            }
            if cur.timestamp < prev.timestamp {
                return Err(SeriesOrderError::OutOfOrder {
                    index: index + 1,
                    timestamp: cur.timestamp,
                    previous: prev.timestamp,
                });
            }
        }
        Ok(())
    }

    /// Largest timestamp in the series, regardless of order.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).max()
    }

    /// Tail of an ordered series strictly newer than `watermark`.
    ///
    /// Assumes [`Self::ensure_ordered`] holds; `None` selects everything.
    pub fn newer_than(&self, watermark: Option<DateTime<Utc>>) -> &[Bar] {
        match watermark {
            None => &self.bars,
            Some(wm) => {
                let start = self.bars.partition_point(|b| b.timestamp <= wm);
                &self.bars[start..]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn bar(day: u32, close: f64) -> Bar {
        Bar::new(ts(day), close, close + 1.0, close - 1.0, close, 100.0)
    }

    fn key() -> SeriesKey {
        SeriesKey::new("aapl", Timeframe::OneDay)
    }

    #[test]
    fn key_is_upper_cased_and_displays_like_a_file_stem() {
        let k = key();
        assert_eq!(k.ticker, "AAPL");
        assert_eq!(k.to_string(), "AAPL_1d");
    }

    #[test]
    fn dedup_keeps_last_and_sorts_without_touching_source() {
        let raw = BarSeries::new(key(), vec![bar(3, 30.0), bar(1, 10.0), bar(2, 20.0), bar(2, 21.0)]);
        let clean = raw.dedup_last_wins();

        assert_eq!(raw.len(), 4);
        assert_eq!(clean.len(), 3);
        let closes: Vec<f64> = clean.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![10.0, 21.0, 30.0]);
        assert!(clean.ensure_ordered().is_ok());
    }

    #[test]
    fn ensure_ordered_reports_first_violation() {
        let dup = BarSeries::new(key(), vec![bar(1, 1.0), bar(2, 2.0), bar(2, 3.0)]);
        assert_eq!(
            dup.ensure_ordered(),
            Err(SeriesOrderError::Duplicate { index: 2, timestamp: ts(2) })
        );

        let inverted = BarSeries::new(key(), vec![bar(2, 1.0), bar(1, 2.0)]);
        assert!(matches!(
            inverted.ensure_ordered(),
            Err(SeriesOrderError::OutOfOrder { index: 1, .. })
        ));

        assert!(BarSeries::empty(key()).ensure_ordered().is_ok());
    }

    #[test]
    fn newer_than_is_strict() {
        let s = BarSeries::new(key(), (3..=7).map(|d| bar(d, d as f64)).collect());
        let delta = s.newer_than(Some(ts(5)));
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].timestamp, ts(6));

        assert_eq!(s.newer_than(None).len(), 5);
        assert!(s.newer_than(Some(ts(7))).is_empty());
        assert_eq!(s.newer_than(Some(ts(1) - Duration::days(3))).len(), 5);
        assert_eq!(s.latest_timestamp(), Some(ts(7)));
    }

    proptest::proptest! {
        #[test]
        fn dedup_output_is_strictly_ascending_and_last_wins(
            days in proptest::collection::vec(1u32..=28, 0..40)
        ) {
            let bars: Vec<Bar> = days
                .iter()
                .enumerate()
                .map(|(i, d)| bar(*d, i as f64))
                .collect();
            let clean = BarSeries::new(key(), bars).dedup_last_wins();

            proptest::prop_assert!(clean.ensure_ordered().is_ok());
            for b in &clean.bars {
                let last = days
                    .iter()
                    .rposition(|d| ts(*d) == b.timestamp)
                    .expect("timestamp came from input");
                proptest::prop_assert_eq!(b.close, last as f64);
            }
        }
    }
}
