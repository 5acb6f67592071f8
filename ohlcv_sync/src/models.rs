//! Diesel row types for `ohlcv_bars`.
//!
//! Missing values (NaN in [`Bar`]) are persisted as SQL `NULL` and read back
//! as NaN, so a row survives the round trip unchanged.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};

use crate::{
    schema::{pg, sqlite},
    tz::{parse_ts_to_utc, to_rfc3339_millis},
};

fn nullable(v: f64) -> Option<f64> {
    if v.is_nan() { None } else { Some(v) }
}

fn from_nullable(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

/// Insertable row for the SQLite table (text timestamps).
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sqlite::ohlcv_bars)]
pub struct NewSqliteBar<'a> {
    pub ticker: &'a str,
    pub timeframe: &'a str,
    pub timestamp: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl<'a> NewSqliteBar<'a> {
    pub fn from_bar(key: &'a SeriesKey, bar: &Bar) -> Self {
        Self {
            ticker: &key.ticker,
            timeframe: key.timeframe.code(),
            timestamp: to_rfc3339_millis(bar.timestamp),
            open: nullable(bar.open),
            high: nullable(bar.high),
            low: nullable(bar.low),
            close: nullable(bar.close),
            volume: nullable(bar.volume),
        }
    }
}

/// A persisted SQLite row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sqlite::ohlcv_bars, check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteBarRow {
    pub ticker: String,
    pub timeframe: String,
    pub timestamp: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl SqliteBarRow {
    pub fn to_bar(&self) -> anyhow::Result<Bar> {
        Ok(Bar::new(
            parse_ts_to_utc(&self.timestamp)?,
            from_nullable(self.open),
            from_nullable(self.high),
            from_nullable(self.low),
            from_nullable(self.close),
            from_nullable(self.volume),
        ))
    }
}

/// Insertable row for the PostgreSQL table.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pg::ohlcv_bars)]
pub struct NewPgBar<'a> {
    pub ticker: &'a str,
    pub timeframe: &'a str,
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl<'a> NewPgBar<'a> {
    pub fn from_bar(key: &'a SeriesKey, bar: &Bar) -> Self {
        Self {
            ticker: &key.ticker,
            timeframe: key.timeframe.code(),
            timestamp: bar.timestamp,
            open: nullable(bar.open),
            high: nullable(bar.high),
            low: nullable(bar.low),
            close: nullable(bar.close),
            volume: nullable(bar.volume),
        }
    }
}
