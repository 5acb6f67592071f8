//! Reading and writing one series as CSV.
//!
//! Files carry a `Date` column (daily) or a `Datetime` column (intraday)
//! followed by `Open,High,Low,Close,Volume`. Empty or non-numeric cells are NaN.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::warn;

use crate::models::{
    bar::Bar,
    bar_series::{BarSeries, SeriesKey},
};

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: missing column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path} line {line}: {message}")]
    Row {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

fn column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][±HH:MM]` and plain dates.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

/// Daily rows are keyed by their calendar date, whatever time or offset the
/// file carries.
fn parse_daily_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

/// `None` when the cell holds something other than a number, `nan` or
/// nothing at all.
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

fn format_number(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}

fn format_timestamp(ts: DateTime<Utc>, intraday: bool) -> String {
    if intraday {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

/// Loads a series exactly as stored: no sorting and no de-duplication.
pub fn read_series_csv(path: &Path, key: SeriesKey) -> Result<BarSeries, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CsvError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| CsvError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let ts_idx = column_index(&headers, &["datetime", "date", "timestamp"]).ok_or_else(|| {
        CsvError::MissingColumn {
            path: path.to_path_buf(),
            column: "Datetime",
        }
    })?;
    let mut value_idx = [0usize; 5];
    for (slot, name) in value_idx.iter_mut().zip(PRICE_COLUMNS) {
        *slot = column_index(&headers, &[name]).ok_or_else(|| CsvError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })?;
    }

    let intraday = key.timeframe.is_intraday();
    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| CsvError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row_err = |message: String| CsvError::Row {
            path: path.to_path_buf(),
            line,
            message,
        };

        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let parsed = if intraday {
            parse_timestamp(raw_ts)
        } else {
            parse_daily_timestamp(raw_ts)
        };
        let timestamp =
            parsed.ok_or_else(|| row_err(format!("invalid timestamp {raw_ts:?}")))?;

        let mut values = [f64::NAN; 5];
        for ((v, idx), name) in values.iter_mut().zip(value_idx).zip(PRICE_COLUMNS) {
            let raw = record.get(idx).unwrap_or_default();
            *v = parse_number(raw).unwrap_or_else(|| {
                warn!(
                    path = %path.display(),
                    line,
                    column = name,
                    value = raw,
                    "non-numeric cell read as NaN"
                );
                f64::NAN
            });
        }
        let [open, high, low, close, volume] = values;
        bars.push(Bar::new(timestamp, open, high, low, close, volume));
    }

    Ok(BarSeries::new(key, bars))
}

/// Writes `series` in the order given. The file is replaced atomically.
pub fn write_series_csv(path: &Path, series: &BarSeries) -> Result<(), CsvError> {
    write_bars(path, series.key.timeframe.is_intraday(), &series.bars)
}

fn write_bars(path: &Path, intraday: bool, bars: &[Bar]) -> Result<(), CsvError> {
    let io_err = |source| CsvError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| CsvError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(csv_err)?;
        let ts_header = if intraday { "Datetime" } else { "Date" };
        writer
            .write_record([ts_header, "Open", "High", "Low", "Close", "Volume"])
            .map_err(csv_err)?;
        for bar in bars {
            writer
                .write_record([
                    format_timestamp(bar.timestamp, intraday),
                    format_number(bar.open),
                    format_number(bar.high),
                    format_number(bar.low),
                    format_number(bar.close),
                    format_number(bar.volume),
                ])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

/// Merges `fresh` into the master file at `master`.
///
/// Rows whose timestamp is not yet in the master are appended and the file is
/// rewritten sorted ascending; on collision the master's row is kept. When
/// `process_path` is given and rows were added, those rows are also written
/// there. Returns the number of rows added.
pub fn merge_into_master(
    master: &Path,
    fresh: &BarSeries,
    process_path: Option<&Path>,
) -> Result<usize, CsvError> {
    let existing = if master.exists() {
        read_series_csv(master, fresh.key.clone())?
    } else {
        BarSeries::empty(fresh.key.clone())
    };

    let known: HashSet<DateTime<Utc>> = existing.bars.iter().map(|b| b.timestamp).collect();
    let new_rows: Vec<Bar> = fresh
        .dedup_last_wins()
        .bars
        .into_iter()
        .filter(|b| !known.contains(&b.timestamp))
        .collect();

    if new_rows.is_empty() && master.exists() {
        return Ok(0);
    }

    let intraday = fresh.key.timeframe.is_intraday();
    let mut combined = existing.bars;
    combined.extend(new_rows.iter().cloned());
    combined.sort_by_key(|b| b.timestamp);
    write_bars(master, intraday, &combined)?;

    if let Some(process_path) = process_path {
        if !new_rows.is_empty() {
            write_bars(process_path, intraday, &new_rows)?;
        }
    }
    Ok(new_rows.len())
}
