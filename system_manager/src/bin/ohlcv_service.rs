use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ohlcv_ingestor::providers::yahoo_chart::YahooChartProvider;
use system_manager::{
    config::{AppConfig, ValidationReport},
    logging,
    pipeline::{Pipeline, Step, StepStatus, migrate_database},
    schedule::{DEFAULT_CRON, ScheduleError, cancel_when, run_scheduled},
};
use tracing::{error, info, warn};

const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(version, about = "OHLCV collection, quality checks and delta uploads")]
struct Cli {
    /// Optional TOML file; environment variables take precedence.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Full pipeline (the default)
    Run,
    /// Refresh the CSV working set only
    Collect,
    /// Check every master file and write the quality report
    Quality,
    /// Upload the working set to one target
    Upload {
        #[arg(long, value_enum)]
        target: UploadTarget,
    },
    /// Apply schema migrations to the configured database
    Migrate,
    /// Print the configuration check and exit
    ValidateConfig,
    /// Run the pipeline on a cron schedule until Ctrl-C
    Schedule {
        #[arg(long, default_value = DEFAULT_CRON)]
        cron: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum UploadTarget {
    LocalDb,
    Warehouse,
}

fn print_report(report: &ValidationReport) {
    for e in &report.errors {
        println!("ERROR   {e}");
    }
    for w in &report.warnings {
        println!("WARNING {w}");
    }
    if report.is_ok() {
        println!("configuration OK");
    }
}

/// Ctrl-C lets units in flight finish and drops the rest.
fn spawn_ctrl_c_watcher(pipeline: &Pipeline) -> tokio::task::JoinHandle<()> {
    tokio::spawn(cancel_when(
        tokio::signal::ctrl_c(),
        pipeline.cancel_flag().clone(),
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cmd = cli.cmd.unwrap_or(Cmd::Run);

    let cfg = match AppConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    };

    if let Cmd::ValidateConfig = cmd {
        let report = cfg.validate();
        print_report(&report);
        return if report.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_INVALID_CONFIG)
        };
    }

    let _log = match logging::init(&cfg.log_dir, &cfg.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    if matches!(cmd, Cmd::Run | Cmd::Collect | Cmd::Schedule { .. }) {
        let report = cfg.validate();
        for w in &report.warnings {
            warn!("{w}");
        }
        if !report.is_ok() {
            for e in &report.errors {
                error!("{e}");
            }
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    }

    match dispatch(cmd, cfg).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURE),
        Err(e) if e.downcast_ref::<ScheduleError>().is_some_and(|e| {
            matches!(e, ScheduleError::InvalidCron { .. })
        }) =>
        {
            error!("{e:#}");
            ExitCode::from(EXIT_INVALID_CONFIG)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn dispatch(cmd: Cmd, cfg: AppConfig) -> anyhow::Result<bool> {
    let provider = YahooChartProvider::new().context("failed to build the quote provider")?;
    let pipeline = Pipeline::new(Arc::new(provider));

    let step = match cmd {
        Cmd::Run => {
            let watcher = spawn_ctrl_c_watcher(&pipeline);
            let ok = pipeline.run(&cfg).await.succeeded();
            watcher.abort();
            return Ok(ok);
        }
        Cmd::Collect => Step::Collect,
        Cmd::Quality => Step::Quality,
        Cmd::Upload {
            target: UploadTarget::LocalDb,
        } => Step::UploadLocalDb,
        Cmd::Upload {
            target: UploadTarget::Warehouse,
        } => Step::UploadWarehouse,
        Cmd::Migrate => {
            let db = cfg
                .database
                .as_ref()
                .context("no database configured (DATABASE_URL or DB_NAME/DB_USER/DB_PASSWORD)")?;
            migrate_database(&db.url()).await?;
            info!("migrations applied");
            return Ok(true);
        }
        Cmd::Schedule { cron } => {
            run_scheduled(&cron, Arc::new(pipeline), Arc::new(cfg)).await?;
            return Ok(true);
        }
        Cmd::ValidateConfig => return Ok(cfg.validate().is_ok()),
    };

    let watcher = spawn_ctrl_c_watcher(&pipeline);
    let record = pipeline.run_step(step, &cfg, true).await;
    watcher.abort();
    info!(step = %record.step, status = ?record.status, "{}", record.detail);
    Ok(record.status == StepStatus::Succeeded)
}
