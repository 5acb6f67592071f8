//! Optional trading calendar used to excuse expected gaps.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::tz::local_date;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingCalendar {
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    pub weekends_closed: bool,
    pub holidays: BTreeSet<NaiveDate>,
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(tz.name())
}

impl TradingCalendar {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            weekends_closed: true,
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if self.weekends_closed && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays.contains(&date)
    }

    /// True when every local date from `first_missing` to `last_missing`
    /// (inclusive) is a non-trading day. For intraday slots only; daily bars
    /// already carry their exchange date and go through
    /// [`TradingCalendar::all_closed_on`].
    pub fn all_closed_between(
        &self,
        first_missing: DateTime<Utc>,
        last_missing: DateTime<Utc>,
    ) -> bool {
        self.all_closed_on(
            local_date(first_missing, self.timezone),
            local_date(last_missing, self.timezone),
        )
    }

    /// True when every date in `start..=end` is a non-trading day.
    pub fn all_closed_on(&self, start: NaiveDate, end: NaiveDate) -> bool {
        if end < start {
            return false;
        }
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .all(|d| !self.is_trading_day(d))
    }
}
