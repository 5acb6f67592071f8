//! The collection step: refresh every (ticker, timeframe) master file.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    io::{
        csv_series::{CsvError, merge_into_master, read_series_csv, write_series_csv},
        layout::DataLayout,
    },
    models::{bar_series::SeriesKey, timeframe::Timeframe},
    providers::{BarsRequest, DataProvider},
};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no tickers configured")]
    NoTickers,

    #[error("failed to prepare working set under {path}: {source}")]
    Layout {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("every fetch failed ({failed} series)")]
    AllFailed { failed: usize },
}

/// Outcome of one collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectSummary {
    /// Every master file was fresh, nothing was fetched.
    pub skipped_fresh: bool,
    pub fetched: usize,
    pub new_rows: usize,
    pub failed: Vec<(SeriesKey, String)>,
}

pub struct Collector {
    provider: Arc<dyn DataProvider>,
    layout: DataLayout,
}

impl Collector {
    pub fn new(provider: Arc<dyn DataProvider>, layout: DataLayout) -> Self {
        Self { provider, layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Why the master file for `key` needs refreshing at `now`, or `None`
    /// when its newest bar is within the timeframe's staleness window.
    pub fn stale_reason(&self, key: &SeriesKey, now: DateTime<Utc>) -> Option<String> {
        let path = self.layout.master_path(key);
        if !path.exists() {
            return Some("missing master file".into());
        }
        let series = match read_series_csv(&path, key.clone()) {
            Ok(s) => s,
            Err(e) => return Some(format!("unreadable master file: {e}")),
        };
        match series.latest_timestamp() {
            None => Some("empty master file".into()),
            Some(latest) if now - latest > key.timeframe.staleness() => {
                Some(format!(
                "latest bar {latest} is older than {}h",
                key.timeframe.staleness().num_hours()
            ))
            }
            Some(_) => None,
        }
    }

    pub async fn run(
        &self,
        tickers: &[String],
        timeframes: &[Timeframe],
    ) -> Result<CollectSummary, CollectError> {
        self.run_at(tickers, timeframes, Utc::now()).await
    }

    /// Same as [`Self::run`] with an explicit clock for the freshness check.
    pub async fn run_at(
        &self,
        tickers: &[String],
        timeframes: &[Timeframe],
        now: DateTime<Utc>,
    ) -> Result<CollectSummary, CollectError> {
        if tickers.is_empty() {
            return Err(CollectError::NoTickers);
        }
        self.layout.ensure_dirs().map_err(|source| CollectError::Layout {
            path: self.layout.base_folder().to_path_buf(),
            source,
        })?;

        let keys: Vec<SeriesKey> = tickers
            .iter()
            .flat_map(|t| timeframes.iter().map(move |tf| SeriesKey::new(t, *tf)))
            .collect();

        let mut needs_update = false;
        for key in &keys {
            if let Some(reason) = self.stale_reason(key, now) {
                info!(%key, %reason, "update needed");
                needs_update = true;
            }
        }
        if !needs_update {
            info!(series = keys.len(), "all master files are fresh, skipping collection");
            return Ok(CollectSummary {
                skipped_fresh: true,
                ..Default::default()
            });
        }

        let mut summary = CollectSummary::default();
        for key in keys {
            match self.collect_one(&key, now).await {
                Ok(added) => {
                    summary.fetched += 1;
                    summary.new_rows += added;
                    info!(%key, new_rows = added, "merged");
                }
                Err(reason) => {
                    warn!(%key, %reason, "collection failed for series");
                    summary.failed.push((key, reason));
                }
            }
        }

        if summary.fetched == 0 && !summary.failed.is_empty() {
            return Err(CollectError::AllFailed {
                failed: summary.failed.len(),
            });
        }
        Ok(summary)
    }

    /// Newest bar in the master file, if it can be read.
    fn master_latest(&self, key: &SeriesKey) -> Option<DateTime<Utc>> {
        let path = self.layout.master_path(key);
        if !path.exists() {
            return None;
        }
        read_series_csv(&path, key.clone())
            .ok()
            .and_then(|s| s.latest_timestamp())
    }

    async fn collect_one(&self, key: &SeriesKey, now: DateTime<Utc>) -> Result<usize, String> {
        let request = BarsRequest::resume_from(key.clone(), self.master_latest(key), now);
        debug!(%key, range = ?request.range, "fetching");
        let fetched = self
            .provider
            .fetch_bars(&request)
            .await
            .map_err(|e| e.to_string())?;

        if fetched.is_empty() {
            return Err("provider returned no bars".into());
        }

        write_series_csv(&self.layout.fetched_path(key), &fetched)
            .map_err(|e: CsvError| e.to_string())?;

        let process = self.layout.process_path(key);
        merge_into_master(&self.layout.master_path(key), &fetched, Some(&process))
            .map_err(|e| e.to_string())
    }
}
