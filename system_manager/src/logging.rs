//! Tracing subscriber for the service binary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the file writer flushing. Drop it only when the process exits.
pub struct LogGuard {
    _file: WorkerGuard,
    pub path: PathBuf,
}

pub fn log_file_name(now: chrono::DateTime<Utc>) -> String {
    format!("service_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Logs to stdout and to `<dir>/service_<YYYYmmdd_HHMMSS>.log`.
///
/// `level` is an `EnvFilter` directive such as `info` or
/// `ohlcv_sync=debug,info`; `RUST_LOG` wins when it is set.
pub fn init(dir: &Path, level: &str) -> anyhow::Result<LogGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let name = log_file_name(Utc::now());
    let path = dir.join(&name);
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        dir, &name,
    ));

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid LOG_LEVEL {level:?}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(LogGuard { _file: guard, path })
}
