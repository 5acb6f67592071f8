//! The individual checks. Each takes the raw series and returns its findings
//! in ascending timestamp order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::bar_series::BarSeries;

use crate::quality::{
    calendar::TradingCalendar,
    finding::{Finding, FindingKind, PriceRule},
};

fn sort_by_anchor(mut findings: Vec<Finding>) -> Vec<Finding> {
    findings.sort_by_key(|f| f.anchor());
    findings
}

/// One finding per bar that has a NaN field.
pub fn missing_values(series: &BarSeries) -> Vec<Finding> {
    let found = series
        .bars
        .iter()
        .filter(|b| b.has_missing())
        .map(|b| {
            Finding::new(
                FindingKind::MissingValue,
                &series.key,
                vec![b.timestamp],
                format!("missing {}", b.missing_fields().join(", ")),
            )
        })
        .collect();
    sort_by_anchor(found)
}

/// A single finding listing every timestamp seen more than once.
pub fn duplicate_timestamps(series: &BarSeries) -> Vec<Finding> {
    let mut counts: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
    for bar in &series.bars {
        *counts.entry(bar.timestamp).or_default() += 1;
    }
    let dups: Vec<DateTime<Utc>> = counts
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(ts, _)| *ts)
        .collect();
    if dups.is_empty() {
        return Vec::new();
    }
    let extra: usize = counts.values().filter(|n| **n > 1).map(|n| n - 1).sum();
    let detail = format!("{} timestamps repeated ({extra} extra rows)", dups.len());
    vec![Finding::new(
        FindingKind::DuplicateTimestamp,
        &series.key,
        dups,
        detail,
    )]
}

/// Rules a bar violates, in [`PriceRule`] order. Comparisons involving NaN
/// never count as violations.
pub fn violated_rules(open: f64, high: f64, low: f64, close: f64) -> Vec<PriceRule> {
    let checks = [
        (PriceRule::HighBelowLow, high < low),
        (PriceRule::HighBelowOpen, high < open),
        (PriceRule::HighBelowClose, high < close),
        (PriceRule::LowAboveOpen, low > open),
        (PriceRule::LowAboveClose, low > close),
    ];
    checks
        .into_iter()
        .filter(|(_, violated)| *violated)
        .map(|(rule, _)| rule)
        .collect()
}

/// One finding per inconsistent bar, naming each violated rule.
pub fn price_inconsistencies(series: &BarSeries) -> Vec<Finding> {
    let found = series
        .bars
        .iter()
        .filter_map(|b| {
            let rules = violated_rules(b.open, b.high, b.low, b.close);
            if rules.is_empty() {
                return None;
            }
            let detail = rules
                .iter()
                .map(|r| r.description())
                .collect::<Vec<_>>()
                .join("; ");
            Some(
                Finding::new(
                    FindingKind::PriceInconsistency,
                    &series.key,
                    vec![b.timestamp],
                    format!(
                        "{detail} (o={} h={} l={} c={})",
                        b.open, b.high, b.low, b.close
                    ),
                )
                .with_rules(rules),
            )
        })
        .collect();
    sort_by_anchor(found)
}

/// One finding per bar with zero or negative volume.
pub fn volume_anomalies(series: &BarSeries) -> Vec<Finding> {
    let found = series
        .bars
        .iter()
        .filter(|b| b.volume <= 0.0)
        .map(|b| {
            Finding::new(
                FindingKind::VolumeAnomaly,
                &series.key,
                vec![b.timestamp],
                format!("volume {}", b.volume),
            )
        })
        .collect();
    sort_by_anchor(found)
}

/// Z-score test over simple close-to-close returns of the sorted, unique
/// series. Skipped when fewer than two returns exist or the sample standard
/// deviation is zero or not finite.
pub fn statistical_outliers(clean: &BarSeries, threshold: f64) -> Vec<Finding> {
    let returns: Vec<(DateTime<Utc>, f64)> = clean
        .bars
        .windows(2)
        .map(|w| (w[1].timestamp, w[1].close / w[0].close - 1.0))
        .filter(|(_, r)| r.is_finite())
        .collect();

    if returns.len() < 2 {
        return Vec::new();
    }
    let n = returns.len() as f64;
    let mean = returns.iter().map(|(_, r)| r).sum::<f64>() / n;
    let var = returns.iter().map(|(_, r)| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if !std.is_finite() || std == 0.0 {
        return Vec::new();
    }

    returns
        .into_iter()
        .filter_map(|(ts, r)| {
            let z = (r - mean) / std;
            (z.abs() > threshold).then(|| {
                Finding::new(
                    FindingKind::StatisticalOutlier,
                    &clean.key,
                    vec![ts],
                    format!("return {:.4} has z-score {z:.2}", r),
                )
            })
        })
        .collect()
}

/// Adjacent bars further apart than the timeframe's interval. With a
/// calendar, a gap whose missing slots all fall on closed dates is excused.
/// Daily bars are keyed by exchange date, so only intraday slots are moved
/// into the calendar's zone.
pub fn time_gaps(clean: &BarSeries, calendar: Option<&TradingCalendar>) -> Vec<Finding> {
    let interval = clean.key.timeframe.expected_interval();
    clean
        .bars
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (w[0].timestamp, w[1].timestamp);
            let delta = b - a;
            if delta <= interval {
                return None;
            }
            if let Some(cal) = calendar {
                let (first, last) = (a + interval, b - interval);
                let excused = if clean.key.timeframe.is_intraday() {
                    cal.all_closed_between(first, last)
                } else {
                    cal.all_closed_on(first.date_naive(), last.date_naive())
                };
                if excused {
                    return None;
                }
            }
            let missing = delta.num_seconds() / interval.num_seconds() - 1;
            Some(Finding::new(
                FindingKind::TimeGap,
                &clean.key,
                vec![a, b],
                format!("gap of {} ({missing} expected bars missing)", human(delta)),
            ))
        })
        .collect()
}

fn human(d: chrono::Duration) -> String {
    if d.num_days() >= 1 && d.num_seconds() % 86_400 == 0 {
        format!("{}d", d.num_days())
    } else if d.num_seconds() % 3_600 == 0 {
        format!("{}h", d.num_hours())
    } else {
        format!("{}m", d.num_minutes())
    }
}
