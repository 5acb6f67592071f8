//! Process configuration.
//!
//! [`AppConfig`] is built once at start-up and passed by reference. Values come
//! from, in decreasing precedence, the process environment, a `.env` file and
//! an optional TOML file. `dotenvy` never overrides variables that are already
//! set, so loading `.env` first and then reading the environment gives the
//! first two layers; the TOML file only fills in what neither of them sets.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDate;
use ohlcv_ingestor::models::timeframe::Timeframe;
use ohlcv_sync::{
    quality::{DEFAULT_Z_THRESHOLD, TradingCalendar},
    store::warehouse::is_supported_uri,
    tz::parse_tz,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use shared_utils::{
    config::ConfigError,
    env::{MissingEnvVarError, flag_or, get_env_opt, parse_or},
};
use thiserror::Error;

pub const DEFAULT_BASE_FOLDER: &str = "all_ohclv_data";
pub const DEFAULT_TICKER_FILE: &str = "ticker.json";
pub const DEFAULT_QUALITY_REPORT_PATH: &str = "logs/quality_reports";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_UPLOAD_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// The optional TOML layer. Keys mirror the environment variable names in
/// lower case.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_folder: Option<PathBuf>,
    pub ticker_file: Option<PathBuf>,
    pub timeframes: Option<Vec<String>>,
    pub enable_quality_checks: Option<bool>,
    pub enable_local_db: Option<bool>,
    pub enable_warehouse: Option<bool>,
    pub database_url: Option<String>,
    pub warehouse_uri: Option<String>,
    pub quality_report_path: Option<PathBuf>,
    pub upload_timeout_secs: Option<u64>,
    pub upload_workers: Option<usize>,
    pub z_threshold: Option<f64>,
    pub calendar_tz: Option<String>,
    #[serde(default)]
    pub calendar_holidays: Vec<NaiveDate>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Relational store connection settings.
#[derive(Debug)]
pub enum DatabaseConfig {
    /// A full connection URL (`postgres://..` or a SQLite path).
    Url(SecretString),
    /// PostgreSQL assembled from the `DB_*` variables.
    Parts {
        name: String,
        user: String,
        password: SecretString,
        host: String,
        port: u16,
    },
}

impl DatabaseConfig {
    pub fn url(&self) -> SecretString {
        match self {
            DatabaseConfig::Url(url) => SecretString::from(url.expose_secret().to_owned()),
            DatabaseConfig::Parts {
                name,
                user,
                password,
                host,
                port,
            } => SecretString::from(format!(
                "postgres://{user}:{}@{host}:{port}/{name}",
                password.expose_secret()
            )),
        }
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub base_folder: PathBuf,
    pub ticker_file: PathBuf,
    pub timeframes: Vec<Timeframe>,
    pub enable_quality_checks: bool,
    pub enable_local_db: bool,
    pub enable_warehouse: bool,
    pub database: Option<DatabaseConfig>,
    pub warehouse_uri: Option<String>,
    pub quality_report_path: PathBuf,
    pub upload_timeout: Duration,
    pub upload_workers: usize,
    pub z_threshold: f64,
    pub calendar: Option<TradingCalendar>,
    pub log_level: String,
    pub log_dir: PathBuf,
}

/// Outcome of the pre-flight checks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AppConfig {
    /// Loads `.env`, then builds the config from the environment over the
    /// optional TOML file.
    pub fn load(config_file: Option<&Path>) -> Result<Self, LoadError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
        }
        let file = match config_file {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::from_lookup(file, get_env_opt)?)
    }

    /// Builds the config from `file` with every variable resolved through
    /// `lookup`. Blank values must already be filtered to `None`.
    pub fn from_lookup(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_folder = lookup("BASE_FOLDER")
            .map(PathBuf::from)
            .or(file.base_folder)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_FOLDER));

        let ticker_file = lookup("TICKER_FILE")
            .map(PathBuf::from)
            .or(file.ticker_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TICKER_FILE));

        let timeframes = match lookup("TIMEFRAMES") {
            Some(raw) => parse_timeframes("TIMEFRAMES", raw.split(','))?,
            None => match &file.timeframes {
                Some(list) => parse_timeframes("timeframes", list.iter().map(String::as_str))?,
                None => Timeframe::ALL.to_vec(),
            },
        };

        let enable_quality_checks = flag_or(
            "ENABLE_QUALITY_CHECKS",
            lookup("ENABLE_QUALITY_CHECKS"),
            file.enable_quality_checks.unwrap_or(true),
        )?;
        let enable_local_db = flag_or(
            "ENABLE_LOCAL_DB",
            lookup("ENABLE_LOCAL_DB"),
            file.enable_local_db.unwrap_or(false),
        )?;
        let warehouse_default = file.enable_warehouse.unwrap_or(false);
        let enable_warehouse = match lookup("ENABLE_WAREHOUSE") {
            Some(raw) => flag_or("ENABLE_WAREHOUSE", Some(raw), warehouse_default)?,
            None => flag_or("ENABLE_BIGQUERY", lookup("ENABLE_BIGQUERY"), warehouse_default)?,
        };

        let database = database_from(&lookup, file.database_url)?;

        let warehouse_uri = lookup("WAREHOUSE_URI").or(file.warehouse_uri);

        let quality_report_path = lookup("QUALITY_REPORT_PATH")
            .map(PathBuf::from)
            .or(file.quality_report_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_QUALITY_REPORT_PATH));

        let upload_timeout = Duration::from_secs(parse_or(
            "UPLOAD_TIMEOUT_SECS",
            lookup("UPLOAD_TIMEOUT_SECS"),
            file.upload_timeout_secs.unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
        )?);
        let upload_workers = parse_or(
            "UPLOAD_WORKERS",
            lookup("UPLOAD_WORKERS"),
            file.upload_workers.unwrap_or(DEFAULT_UPLOAD_WORKERS),
        )?;
        let z_threshold = parse_or(
            "Z_THRESHOLD",
            lookup("Z_THRESHOLD"),
            file.z_threshold.unwrap_or(DEFAULT_Z_THRESHOLD),
        )?;

        let calendar = calendar_from(&lookup, file.calendar_tz, file.calendar_holidays)?;

        let log_level = lookup("LOG_LEVEL")
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());
        let log_dir = lookup("LOG_DIR")
            .map(PathBuf::from)
            .or(file.log_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        Ok(Self {
            base_folder,
            ticker_file,
            timeframes,
            enable_quality_checks,
            enable_local_db,
            enable_warehouse,
            database,
            warehouse_uri,
            quality_report_path,
            upload_timeout,
            upload_workers,
            z_threshold,
            calendar,
            log_level,
            log_dir,
        })
    }

    /// Pre-flight checks. Errors make the service refuse to run; warnings are
    /// only printed.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.ticker_file.is_file() {
            report.errors.push(format!(
                "ticker file not found: {}",
                self.ticker_file.display()
            ));
        }
        if self.timeframes.is_empty() {
            report.errors.push("no timeframes configured".into());
        }
        if self.upload_workers == 0 {
            report.errors.push("UPLOAD_WORKERS must be at least 1".into());
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            report
                .errors
                .push(format!("Z_THRESHOLD must be positive, got {}", self.z_threshold));
        }

        if self.enable_local_db && self.database.is_none() {
            report.errors.push(
                "local DB upload enabled but neither DATABASE_URL nor DB_NAME/DB_USER/DB_PASSWORD is set"
                    .into(),
            );
        }
        match &self.warehouse_uri {
            None if self.enable_warehouse => {
                report
                    .errors
                    .push("warehouse upload enabled but WAREHOUSE_URI is not set".into());
            }
            Some(uri) if !is_supported_uri(uri) => {
                report.errors.push(format!(
                    "WAREHOUSE_URI {uri} is not a local path; only local Delta tables are supported"
                ));
            }
            _ => {}
        }

        if !self.enable_quality_checks {
            report.warnings.push("quality checks are disabled".into());
        }
        if !self.enable_local_db {
            report.warnings.push("local DB upload is disabled".into());
        }
        if !self.enable_warehouse {
            report.warnings.push("warehouse upload is disabled".into());
        }
        if !self.enable_local_db && !self.enable_warehouse {
            report
                .warnings
                .push("no storage enabled, data will only be kept in CSV files".into());
        }
        if !self.base_folder.exists() {
            report.warnings.push(format!(
                "data folder {} does not exist yet and will be created",
                self.base_folder.display()
            ));
        }

        report
    }
}

fn parse_timeframes<'a>(
    name: &str,
    codes: impl Iterator<Item = &'a str>,
) -> Result<Vec<Timeframe>, ConfigError> {
    let mut out = Vec::new();
    for code in codes.map(str::trim).filter(|c| !c.is_empty()) {
        let tf: Timeframe = code.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: code.to_string(),
        })?;
        if !out.contains(&tf) {
            out.push(tf);
        }
    }
    Ok(out)
}

fn database_from(
    lookup: &impl Fn(&str) -> Option<String>,
    file_url: Option<String>,
) -> Result<Option<DatabaseConfig>, ConfigError> {
    if let Some(url) = lookup("DATABASE_URL").or(file_url) {
        return Ok(Some(DatabaseConfig::Url(SecretString::from(url))));
    }

    let name = lookup("DB_NAME");
    let user = lookup("DB_USER");
    let password = lookup("DB_PASSWORD");
    match (name, user, password) {
        (None, None, None) => Ok(None),
        (Some(name), Some(user), Some(password)) => Ok(Some(DatabaseConfig::Parts {
            name,
            user,
            password: SecretString::from(password),
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or("DB_PORT", lookup("DB_PORT"), 5432u16)?,
        })),
        (name, user, _) => {
            let missing = if name.is_none() {
                "DB_NAME"
            } else if user.is_none() {
                "DB_USER"
            } else {
                "DB_PASSWORD"
            };
            Err(MissingEnvVarError(missing.to_string()).into())
        }
    }
}

fn calendar_from(
    lookup: &impl Fn(&str) -> Option<String>,
    file_tz: Option<String>,
    file_holidays: Vec<NaiveDate>,
) -> Result<Option<TradingCalendar>, ConfigError> {
    let Some(tz_name) = lookup("CALENDAR_TZ").or(file_tz) else {
        return Ok(None);
    };
    let tz = parse_tz(&tz_name).map_err(|_| ConfigError::InvalidValue {
        name: "CALENDAR_TZ".to_string(),
        value: tz_name.clone(),
    })?;

    let holidays = match lookup("CALENDAR_HOLIDAYS") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
                    name: "CALENDAR_HOLIDAYS".to_string(),
                    value: d.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => file_holidays,
    };

    Ok(Some(TradingCalendar::new(tz).with_holidays(holidays)))
}
