//! Timestamp encoding and time zone helpers.
//!
//! - [`to_rfc3339_millis`] / [`parse_ts_to_utc`]: the text encoding used for the
//!   SQLite `timestamp` column. Fixed width with a `Z` suffix, so string order
//!   is time order.
//! - [`local_date`]: calendar date of an instant in an IANA zone, used by the
//!   trading calendar to decide whether a gap spans non-trading days.
//! - [`parse_tz`]: strict IANA zone name parsing (e.g., "America/New_York").

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn parse_tz(name: &str) -> anyhow::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("bad tz {name}: {e}"))
}

/// Wall-clock date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
