#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{Duration, DurationRound, Utc};
use ohlcv_ingestor::{
    models::{bar::Bar, bar_series::BarSeries},
    providers::{ApiSnafu, BarsRequest, DataProvider, ProviderError},
};
use system_manager::config::{AppConfig, FileConfig};
use tempfile::TempDir;

/// Serves the same recent daily bars for every request, or fails every
/// request when built with [`StubProvider::failing`].
pub struct StubProvider {
    bars: Vec<Bar>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl StubProvider {
    /// Three daily bars ending yesterday, so a fresh master counts as fresh.
    pub fn recent_daily() -> Self {
        let today = Utc::now()
            .duration_trunc(Duration::days(1))
            .expect("truncate to day");
        let bars = (1..=3)
            .rev()
            .map(|n| {
                let close = 100.0 + n as f64;
                Bar::new(
                    today - Duration::days(n),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1_000.0,
                )
            })
            .collect();
        Self {
            bars,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            bars: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for StubProvider {
    async fn fetch_bars(&self, request: &BarsRequest) -> Result<BarSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return ApiSnafu {
                message: "service unavailable",
            }
            .fail();
        }
        Ok(BarSeries::new(request.key.clone(), self.bars.clone()))
    }
}

/// A throwaway working directory with a ticker file, a SQLite path and a
/// Delta table location.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(tickers_json: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("ticker.json"), tickers_json).expect("ticker file");
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn db_path(&self) -> String {
        self.path("bars.db").to_string_lossy().to_string()
    }

    pub fn warehouse_uri(&self) -> String {
        self.path("warehouse/ohlcv_bars").to_string_lossy().to_string()
    }

    /// Daily-only config with both uploads enabled, plus `extra` overrides.
    pub fn config(&self, extra: &[(&str, &str)]) -> AppConfig {
        let mut vars: Vec<(String, String)> = vec![
            ("BASE_FOLDER".into(), self.path("data").to_string_lossy().to_string()),
            ("TICKER_FILE".into(), self.path("ticker.json").to_string_lossy().to_string()),
            ("TIMEFRAMES".into(), "1d".into()),
            ("ENABLE_LOCAL_DB".into(), "true".into()),
            ("DATABASE_URL".into(), self.db_path()),
            ("ENABLE_WAREHOUSE".into(), "true".into()),
            ("WAREHOUSE_URI".into(), self.warehouse_uri()),
            (
                "QUALITY_REPORT_PATH".into(),
                self.path("reports").to_string_lossy().to_string(),
            ),
            ("UPLOAD_TIMEOUT_SECS".into(), "30".into()),
        ];
        for (k, v) in extra {
            vars.retain(|(name, _)| name.as_str() != *k);
            vars.push((k.to_string(), v.to_string()));
        }
        AppConfig::from_lookup(FileConfig::default(), move |name| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        })
        .expect("valid test config")
    }
}
