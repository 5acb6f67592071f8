//! The service run: collect, quality, upload to the local DB, upload to the
//! warehouse.
//!
//! Every step has the same contract, `Result<StepSummary, StepError>`, and
//! its outcome is recorded in a [`RunReport`]. A failed step never stops the
//! ones after it; only a failed collection makes the run itself fail.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use ohlcv_ingestor::{
    collect::{CollectError, CollectSummary, Collector},
    io::{csv_series::read_series_csv, layout::DataLayout},
    models::bar_series::BarSeries,
    providers::DataProvider,
};
use ohlcv_sync::{
    db::{is_postgres_url, migrate},
    quality::{
        QualityConfig, evaluate,
        report::{QualityReport, ReportError},
    },
    store::{
        StoreHandle, TargetKind, postgres::PgStore, sqlite::SqliteStore,
        warehouse::DeltaWarehouse,
    },
    upload::{
        DeltaUploader,
        batch::{CancelFlag, TargetSummary, upload_all},
    },
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    config::AppConfig,
    tickers::{TickerFileError, load_tickers},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Collect,
    Quality,
    UploadLocalDb,
    UploadWarehouse,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::Collect,
        Step::Quality,
        Step::UploadLocalDb,
        Step::UploadWarehouse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Collect => "collect",
            Step::Quality => "quality",
            Step::UploadLocalDb => "upload_local_db",
            Step::UploadWarehouse => "upload_warehouse",
        }
    }

    fn enabled(self, cfg: &AppConfig) -> bool {
        match self {
            Step::Collect => true,
            Step::Quality => cfg.enable_quality_checks,
            Step::UploadLocalDb => cfg.enable_local_db,
            Step::UploadWarehouse => cfg.enable_warehouse,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug)]
pub enum StepSummary {
    Collect(CollectSummary),
    Quality {
        series: usize,
        findings: usize,
        json_report: std::path::PathBuf,
    },
    Upload {
        target: TargetKind,
        summary: TargetSummary,
    },
}

impl fmt::Display for StepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSummary::Collect(s) if s.skipped_fresh => f.write_str("all master files fresh"),
            StepSummary::Collect(s) => write!(
                f,
                "{} series fetched, {} new rows, {} failed",
                s.fetched,
                s.new_rows,
                s.failed.len()
            ),
            StepSummary::Quality {
                series, findings, ..
            } => write!(f, "{series} series checked, {findings} findings"),
            StepSummary::Upload { summary, .. } => write!(
                f,
                "{} uploaded, {} up to date, {} rows written",
                summary.uploaded, summary.skipped, summary.rows_written
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Tickers(#[from] TickerFileError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("failed to list working set: {0}")]
    WorkingSet(#[source] std::io::Error),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("{target}: {} of {} series failed", .summary.failed, .summary.units)]
    Units {
        target: TargetKind,
        summary: TargetSummary,
    },

    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub detail: String,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn status(&self, step: Step) -> Option<StepStatus> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.status)
    }

    /// Uploads and quality checks are advisory: the run fails only when
    /// collection did.
    pub fn succeeded(&self) -> bool {
        self.status(Step::Collect) != Some(StepStatus::Failed)
    }

    pub fn log(&self) {
        info!(started_at = %self.started_at, "run finished");
        for r in &self.steps {
            let status = match r.status {
                StepStatus::Succeeded => "ok",
                StepStatus::Failed => "FAILED",
                StepStatus::Skipped => "skipped",
            };
            info!(
                "  {:<17} {:<8} {:>7.1}s  {}",
                r.step.name(),
                status,
                r.elapsed.as_secs_f64(),
                r.detail
            );
        }
        if self.succeeded() {
            info!("run succeeded");
        } else {
            error!("run failed");
        }
    }
}

pub struct Pipeline {
    provider: Arc<dyn DataProvider>,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self {
            provider,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Runs every step in order. Disabled steps are recorded as skipped.
    pub async fn run(&self, cfg: &AppConfig) -> RunReport {
        let mut report = RunReport {
            started_at: Utc::now(),
            steps: Vec::with_capacity(Step::ALL.len()),
        };
        for step in Step::ALL {
            report.steps.push(self.run_step(step, cfg, false).await);
        }
        report.log();
        report
    }

    /// Runs one step. `force` runs it even when the config disables it.
    pub async fn run_step(&self, step: Step, cfg: &AppConfig, force: bool) -> StepRecord {
        let started = Instant::now();
        if !force && !step.enabled(cfg) {
            info!(%step, "step disabled");
            return StepRecord {
                step,
                status: StepStatus::Skipped,
                detail: "disabled".into(),
                elapsed: started.elapsed(),
            };
        }
        if self.cancel.is_cancelled() {
            return StepRecord {
                step,
                status: StepStatus::Skipped,
                detail: StepError::Cancelled.to_string(),
                elapsed: started.elapsed(),
            };
        }

        let result = async {
            info!("step started");
            match step {
                Step::Collect => self.collect(cfg).await,
                Step::Quality => self.quality(cfg).await,
                Step::UploadLocalDb => self.upload_local_db(cfg).await,
                Step::UploadWarehouse => self.upload_warehouse(cfg).await,
            }
        }
        .instrument(info_span!("step", %step))
        .await;

        let (status, detail) = match result {
            Ok(summary) => {
                info!(%step, %summary, "step succeeded");
                (StepStatus::Succeeded, summary.to_string())
            }
            Err(e) => {
                error!(%step, error = %e, "step failed");
                (StepStatus::Failed, e.to_string())
            }
        };
        StepRecord {
            step,
            status,
            detail,
            elapsed: started.elapsed(),
        }
    }

    pub async fn collect(&self, cfg: &AppConfig) -> Result<StepSummary, StepError> {
        let tickers = load_tickers(&cfg.ticker_file)?;
        info!(tickers = tickers.len(), timeframes = cfg.timeframes.len(), "collecting");
        let collector = Collector::new(
            Arc::clone(&self.provider),
            DataLayout::new(&cfg.base_folder),
        );
        let summary = collector.run(&tickers, &cfg.timeframes).await?;
        Ok(StepSummary::Collect(summary))
    }

    pub async fn quality(&self, cfg: &AppConfig) -> Result<StepSummary, StepError> {
        let series = load_working_set(&DataLayout::new(&cfg.base_folder))?;
        let quality = QualityConfig {
            z_threshold: cfg.z_threshold,
            calendar: cfg.calendar.clone(),
        };

        let mut report = QualityReport::new(Utc::now());
        let mut total = 0;
        for s in &series {
            let findings = evaluate(s, &quality);
            if !findings.is_empty() {
                info!(key = %s.key, findings = findings.len(), "quality findings");
            }
            total += findings.len();
            report.push(s, findings);
        }
        let (json_report, md_report) = report.write_to(&cfg.quality_report_path)?;
        info!(json = %json_report.display(), markdown = %md_report.display(), "quality report written");

        Ok(StepSummary::Quality {
            series: series.len(),
            findings: total,
            json_report,
        })
    }

    pub async fn upload_local_db(&self, cfg: &AppConfig) -> Result<StepSummary, StepError> {
        let url = cfg
            .database
            .as_ref()
            .ok_or(StepError::NotConfigured("local database"))?
            .url();
        migrate_database(&url).await?;

        let url = url.expose_secret().to_owned();
        if is_postgres_url(&url) {
            self.upload_to(cfg, &PgStore::new(url)).await
        } else {
            self.upload_to(cfg, &SqliteStore::new(url)).await
        }
    }

    pub async fn upload_warehouse(&self, cfg: &AppConfig) -> Result<StepSummary, StepError> {
        let uri = cfg
            .warehouse_uri
            .as_deref()
            .ok_or(StepError::NotConfigured("warehouse"))?;
        self.upload_to(cfg, &DeltaWarehouse::new(uri)).await
    }

    async fn upload_to(
        &self,
        cfg: &AppConfig,
        store: &dyn StoreHandle,
    ) -> Result<StepSummary, StepError> {
        let series: Vec<BarSeries> = load_working_set(&DataLayout::new(&cfg.base_folder))?
            .iter()
            .map(BarSeries::dedup_last_wins)
            .collect();

        let uploader = DeltaUploader::new(cfg.upload_timeout);
        let outcomes = upload_all(&uploader, store, &series, cfg.upload_workers, &self.cancel).await;
        let summary = TargetSummary::from_outcomes(&outcomes);
        let target = store.target();

        if summary.failed > 0 {
            return Err(StepError::Units { target, summary });
        }
        if summary.cancelled > 0 {
            warn!(%target, cancelled = summary.cancelled, "upload cancelled before every series ran");
        }
        Ok(StepSummary::Upload { target, summary })
    }
}

/// Applies the embedded migrations for whichever backend `url` names.
pub async fn migrate_database(url: &SecretString) -> Result<(), StepError> {
    let url = url.expose_secret().to_owned();
    tokio::task::spawn_blocking(move || migrate::run_all(&url))
        .await
        .map_err(|e| StepError::Migration(e.to_string()))?
        .map_err(|e| StepError::Migration(format!("{e:#}")))
}

/// Reads every master file. Unreadable files are logged and left out so one
/// bad file does not hide the others.
pub fn load_working_set(layout: &DataLayout) -> Result<Vec<BarSeries>, StepError> {
    let files = layout.list_master_files().map_err(StepError::WorkingSet)?;
    let mut out = Vec::with_capacity(files.len());
    for (key, path) in files {
        match read_series_csv(&path, key) {
            Ok(series) => out.push(series),
            Err(e) => warn!(error = %e, "skipping unreadable master file"),
        }
    }
    Ok(out)
}
