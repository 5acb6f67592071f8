#![allow(dead_code)]

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ohlcv_ingestor::{
    models::{
        bar::Bar,
        bar_series::{BarSeries, SeriesKey},
    },
    providers::{ApiSnafu, BarsRequest, DataProvider, ProviderError},
};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn bar_at(ts: DateTime<Utc>, close: f64) -> Bar {
    Bar::new(ts, close, close + 1.0, close - 1.0, close, 1_000.0)
}

/// Provider serving canned series; unknown keys fail with an API error.
#[derive(Default)]
pub struct StubProvider {
    series: HashMap<SeriesKey, Vec<Bar>>,
    pub calls: Mutex<Vec<BarsRequest>>,
}

impl StubProvider {
    pub fn with(mut self, key: SeriesKey, bars: Vec<Bar>) -> Self {
        self.series.insert(key, bars);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<BarsRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataProvider for StubProvider {
    async fn fetch_bars(&self, request: &BarsRequest) -> Result<BarSeries, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.series.get(&request.key) {
            Some(bars) => Ok(BarSeries::new(request.key.clone(), bars.clone())),
            None => ApiSnafu {
                message: format!("no data for {}", request.key),
            }
            .fail(),
        }
    }
}
