//! Cron-driven runs of the pipeline.

use std::{future::Future, sync::Arc};

use ohlcv_sync::upload::batch::CancelFlag;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::{config::AppConfig, pipeline::Pipeline};

/// Saturdays at 06:00 UTC (seconds field first).
pub const DEFAULT_CRON: &str = "0 0 6 * * Sat";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expr:?}: {message}")]
    InvalidCron { expr: String, message: String },

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

fn scheduler_err(e: impl std::fmt::Debug) -> ScheduleError {
    ScheduleError::Scheduler(format!("{e:?}"))
}

/// Checks that `expr` parses as a schedule.
pub fn validate_cron(expr: &str) -> Result<(), ScheduleError> {
    Job::new_async(expr, |_, _| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| ScheduleError::InvalidCron {
            expr: expr.to_string(),
            message: format!("{e:?}"),
        })
}

/// Trips `cancel` once `signal` resolves. Upload units already started run
/// to completion; queued ones and later steps are dropped.
pub async fn cancel_when<F>(signal: F, cancel: CancelFlag)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            warn!("interrupt received, cancelling remaining work");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, run is not cancellable"),
    }
}

/// Runs the pipeline on `expr` until Ctrl-C. A tick that fires while the
/// previous run is still going is skipped.
pub async fn run_scheduled(
    expr: &str,
    pipeline: Arc<Pipeline>,
    cfg: Arc<AppConfig>,
) -> Result<(), ScheduleError> {
    validate_cron(expr)?;

    let running = Arc::new(Mutex::new(()));
    let cancel = pipeline.cancel_flag().clone();
    let in_flight = Arc::clone(&running);
    let job = Job::new_async(expr, move |_id, _sched| {
        let pipeline = Arc::clone(&pipeline);
        let cfg = Arc::clone(&cfg);
        let running = Arc::clone(&running);
        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                warn!("previous run still in progress, skipping this tick");
                return;
            };
            let report = pipeline.run(&cfg).await;
            if !report.succeeded() {
                error!("scheduled run failed");
            }
        })
    })
    .map_err(|e| ScheduleError::InvalidCron {
        expr: expr.to_string(),
        message: format!("{e:?}"),
    })?;

    let mut sched = JobScheduler::new().await.map_err(scheduler_err)?;
    sched.add(job).await.map_err(scheduler_err)?;
    sched.start().await.map_err(scheduler_err)?;
    info!(cron = expr, "scheduler started, waiting for Ctrl-C");

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    info!("shutting down scheduler");
    // let a run in progress drain before the scheduler goes away
    let _drained = in_flight.lock().await;
    sched.shutdown().await.map_err(scheduler_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expression_parses() {
        validate_cron(DEFAULT_CRON).unwrap();
    }

    #[tokio::test]
    async fn signal_trips_the_cancel_flag() {
        let cancel = CancelFlag::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let watcher = tokio::spawn(cancel_when(
            async move {
                let _ = rx.await;
                Ok(())
            },
            cancel.clone(),
        ));
        assert!(!cancel.is_cancelled());

        tx.send(()).unwrap();
        watcher.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_listener_leaves_the_run_alone() {
        let cancel = CancelFlag::new();
        cancel_when(
            async { Err(std::io::Error::other("no signal handler")) },
            cancel.clone(),
        )
        .await;
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn garbage_is_rejected() {
        let err = validate_cron("every saturday please").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
    }
}
