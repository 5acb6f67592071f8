//! Running the uploader over many series against one target.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::{StreamExt, stream};
use ohlcv_ingestor::models::bar_series::{BarSeries, SeriesKey};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    store::{StoreHandle, TargetKind},
    upload::{DeltaUploader, UploadError, UploadResult},
};

/// Cooperative cancellation shared between the runner and whoever stops it.
/// Units already started always run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum UnitStatus {
    Uploaded(UploadResult),
    Failed(UploadError),
    Cancelled,
}

/// Outcome of one (series, target) unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub key: SeriesKey,
    pub target: TargetKind,
    pub status: UnitStatus,
}

/// Tally of one target's outcomes.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub units: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retryable_failures: usize,
    pub cancelled: usize,
    pub rows_written: usize,
}

impl TargetSummary {
    pub fn from_outcomes(outcomes: &[UnitOutcome]) -> Self {
        let mut s = TargetSummary {
            units: outcomes.len(),
            ..Default::default()
        };
        for o in outcomes {
            match &o.status {
                UnitStatus::Uploaded(r) if r.skipped => s.skipped += 1,
                UnitStatus::Uploaded(r) => {
                    s.uploaded += 1;
                    s.rows_written += r.rows_written;
                }
                UnitStatus::Failed(e) => {
                    s.failed += 1;
                    if e.is_retryable() {
                        s.retryable_failures += 1;
                    }
                }
                UnitStatus::Cancelled => s.cancelled += 1,
            }
        }
        s
    }
}

/// Uploads every series to `store` with at most `workers` units in flight.
///
/// Each unit is independent: a failure is recorded in its own outcome and
/// never stops the others. Outcomes come back sorted by series key.
pub async fn upload_all(
    uploader: &DeltaUploader,
    store: &dyn StoreHandle,
    series: &[BarSeries],
    workers: usize,
    cancel: &CancelFlag,
) -> Vec<UnitOutcome> {
    let target = store.target();

    // futures are built up front (they stay lazy) rather than via
    // `StreamExt::map`, which trips rustc's higher-ranked `Send` check
    // when this future is awaited inside a spawned task
    let units: Vec<_> = series
        .iter()
        .map(|s| async move {
            let status = if cancel.is_cancelled() {
                UnitStatus::Cancelled
            } else {
                match uploader.upload(s, store).await {
                    Ok(r) => UnitStatus::Uploaded(r),
                    Err(e) => {
                        warn!(error = %e, retryable = e.is_retryable(), "upload unit failed");
                        UnitStatus::Failed(e)
                    }
                }
            };
            UnitOutcome {
                key: s.key.clone(),
                target,
                status,
            }
        })
        .collect();
    let mut outcomes: Vec<UnitOutcome> = stream::iter(units)
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    outcomes.sort_by(|a, b| a.key.cmp(&b.key));

    let summary = TargetSummary::from_outcomes(&outcomes);
    info!(
        %target,
        units = summary.units,
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        rows = summary.rows_written,
        "target finished"
    );
    outcomes
}
