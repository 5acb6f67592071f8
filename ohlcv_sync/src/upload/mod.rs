//! Incremental upload of a series to one target.
//!
//! [`DeltaUploader::upload`] reads the target's watermark for the series key,
//! keeps only the bars strictly newer than it and writes them in one batch.
//! A bar exactly at the watermark is treated as already persisted, which makes
//! a repeated upload with no new data a no-op that never touches the store's
//! write path.
//!
//! The series must already be sorted ascending and free of duplicate
//! timestamps (see [`BarSeries::dedup_last_wins`]). A series that is not is
//! rejected with [`UploadError::Validation`] before the store is contacted.
//!
//! If a previous run persisted part of a batch without acknowledging it, the
//! watermark moves past the unacknowledged rows and any rows that were lost
//! between them are not re-sent. That gap is not repaired here.

pub mod batch;

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::bar_series::{BarSeries, SeriesKey, SeriesOrderError};
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span};

use crate::store::{StoreError, StoreHandle, TargetKind};

/// Result of one successful unit (series, target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Rows the store reports as newly added.
    pub rows_written: usize,
    /// Nothing newer than the watermark; the store was not written to.
    pub skipped: bool,
    pub watermark_before: Option<DateTime<Utc>>,
    /// Bars selected for the write.
    pub delta_len: usize,
}

/// Store operation during which an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Watermark,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Watermark => "watermark",
            Stage::Write => "write",
        })
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{target} {key}: store unreachable during {stage}: {message}")]
    Connectivity {
        key: SeriesKey,
        target: TargetKind,
        stage: Stage,
        message: String,
    },

    #[error("{target} {key}: {stage} timed out after {after:?}")]
    Timeout {
        key: SeriesKey,
        target: TargetKind,
        stage: Stage,
        after: Duration,
    },

    #[error("{target} {key}: series is not sorted and unique: {source}")]
    Validation {
        key: SeriesKey,
        target: TargetKind,
        #[source]
        source: SeriesOrderError,
    },

    #[error("{target} {key}: write outcome unknown, re-run to reconcile: {message}")]
    PartialWrite {
        key: SeriesKey,
        target: TargetKind,
        message: String,
    },

    #[error("{target} {key}: store rejected {stage}: {message}")]
    Rejected {
        key: SeriesKey,
        target: TargetKind,
        stage: Stage,
        message: String,
    },
}

impl UploadError {
    /// Whether re-running the whole unit later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Connectivity { .. } | UploadError::Timeout { .. }
        )
    }

    pub fn key(&self) -> &SeriesKey {
        match self {
            UploadError::Connectivity { key, .. }
            | UploadError::Timeout { key, .. }
            | UploadError::Validation { key, .. }
            | UploadError::PartialWrite { key, .. }
            | UploadError::Rejected { key, .. } => key,
        }
    }

    pub fn target(&self) -> TargetKind {
        match self {
            UploadError::Connectivity { target, .. }
            | UploadError::Timeout { target, .. }
            | UploadError::Validation { target, .. }
            | UploadError::PartialWrite { target, .. }
            | UploadError::Rejected { target, .. } => *target,
        }
    }

    fn from_store(key: &SeriesKey, target: TargetKind, stage: Stage, err: StoreError) -> Self {
        let key = key.clone();
        match err {
            StoreError::Connection(message) => UploadError::Connectivity {
                key,
                target,
                stage,
                message,
            },
            StoreError::Ambiguous(message) => UploadError::PartialWrite {
                key,
                target,
                message,
            },
            StoreError::Query(message) | StoreError::Schema(message) => UploadError::Rejected {
                key,
                target,
                stage,
                message,
            },
        }
    }
}

/// Uploads series to a target, bounding every store call by `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct DeltaUploader {
    timeout: Duration,
}

impl DeltaUploader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        key: &SeriesKey,
        target: TargetKind,
        stage: Stage,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, UploadError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(UploadError::from_store(key, target, stage, e)),
            Err(_) => Err(UploadError::Timeout {
                key: key.clone(),
                target,
                stage,
                after: self.timeout,
            }),
        }
    }

    pub async fn upload(
        &self,
        series: &BarSeries,
        store: &dyn StoreHandle,
    ) -> Result<UploadResult, UploadError> {
        let target = store.target();
        let key = &series.key;
        let span = info_span!("upload", %key, %target);

        async move {
            series
                .ensure_ordered()
                .map_err(|source| UploadError::Validation {
                    key: key.clone(),
                    target,
                    source,
                })?;

            let watermark = self
                .bounded(key, target, Stage::Watermark, store.get_watermark(key))
                .await?;

            let delta = series.newer_than(watermark);
            if delta.is_empty() {
                debug!(?watermark, "nothing newer than watermark");
                return Ok(UploadResult {
                    rows_written: 0,
                    skipped: true,
                    watermark_before: watermark,
                    delta_len: 0,
                });
            }

            let rows_written = self
                .bounded(key, target, Stage::Write, store.write_batch(key, delta))
                .await?;

            if rows_written < delta.len() {
                debug!(sent = delta.len(), rows_written, "store accepted fewer rows than sent");
            }
            info!(?watermark, rows_written, "uploaded delta");

            Ok(UploadResult {
                rows_written,
                skipped: false,
                watermark_before: watermark,
                delta_len: delta.len(),
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ohlcv_ingestor::models::{bar::Bar, timeframe::Timeframe};

    use crate::store::memory::MemoryStore;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn series(days: &[u32]) -> BarSeries {
        BarSeries::new(
            SeriesKey::new("AAPL", Timeframe::OneDay),
            days.iter()
                .map(|d| Bar::new(ts(*d), 1.0, 2.0, 0.5, 1.5, 100.0))
                .collect(),
        )
    }

    #[tokio::test]
    async fn writes_only_bars_after_the_watermark() {
        let existing = series(&[1, 2, 3, 4, 5]);
        let store = MemoryStore::new(TargetKind::LocalDb).seeded(&existing.key, &existing.bars);

        let res = DeltaUploader::new(Duration::from_secs(5))
            .upload(&series(&[3, 4, 5, 6, 7]), &store)
            .await
            .unwrap();

        assert_eq!(res.rows_written, 2);
        assert_eq!(res.watermark_before, Some(ts(5)));
        assert!(!res.skipped);
        assert_eq!(store.bars(&existing.key).len(), 7);
    }

    #[tokio::test]
    async fn invalid_series_never_reaches_the_store() {
        let store = MemoryStore::new(TargetKind::Warehouse);
        let err = DeltaUploader::new(Duration::from_secs(5))
            .upload(&series(&[2, 1]), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Validation { .. }));
        assert!(!err.is_retryable());
        assert_eq!(err.target(), TargetKind::Warehouse);
        assert_eq!(store.watermark_calls(), 0);
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn slow_store_times_out_as_retryable() {
        let store = MemoryStore::new(TargetKind::LocalDb).with_delay(Duration::from_millis(200));
        let err = DeltaUploader::new(Duration::from_millis(20))
            .upload(&series(&[1]), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Timeout { stage: Stage::Watermark, .. }));
        assert!(err.is_retryable());
        assert_eq!(err.key().ticker, "AAPL");
    }

    #[tokio::test]
    async fn store_errors_map_onto_the_upload_taxonomy() {
        let uploader = DeltaUploader::new(Duration::from_secs(5));
        let cases = [
            (StoreError::Connection("refused".into()), true),
            (StoreError::Ambiguous("commit lost".into()), false),
            (StoreError::Query("constraint".into()), false),
        ];
        for (fault, retryable) in cases {
            let store = MemoryStore::new(TargetKind::LocalDb).failing_writes(fault.clone());
            let err = uploader.upload(&series(&[1]), &store).await.unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "{fault:?}");
            if let StoreError::Ambiguous(_) = fault {
                assert!(matches!(err, UploadError::PartialWrite { .. }));
            }
        }
    }
}
