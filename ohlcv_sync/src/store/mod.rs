//! Target stores for the delta upload.
//!
//! Every target exposes the same two operations through [`StoreHandle`]:
//! read the watermark for a series key and append a batch of bars. The
//! uploader is written once against this trait; the implementations differ
//! only in plumbing:
//!
//! - [`sqlite::SqliteStore`]: relational, row inserts, local and tests.
//! - [`postgres::PgStore`]: relational, batched `INSERT .. ON CONFLICT DO NOTHING`.
//! - [`warehouse::DeltaWarehouse`]: columnar Delta Lake table, one commit per batch.
//! - [`memory::MemoryStore`]: in-process, with injectable delays and failures.

pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod warehouse;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};
use serde::Serialize;
use thiserror::Error;

/// Which kind of target a store is. Used in logs, errors and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    LocalDb,
    Warehouse,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::LocalDb => "local_db",
            TargetKind::Warehouse => "warehouse",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store unreachable or authentication failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store rejected the query or write.
    #[error("query failed: {0}")]
    Query(String),

    /// The write was issued but its outcome is unknown.
    #[error("write outcome unknown: {0}")]
    Ambiguous(String),

    /// The batch could not be encoded for this store.
    #[error("schema mismatch: {0}")]
    Schema(String),
}

/// Capability interface shared by every target.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    fn target(&self) -> TargetKind;

    /// Latest persisted timestamp for `key`. `None` when the key, the table or
    /// the dataset does not exist yet.
    async fn get_watermark(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Appends `bars` as one batch. Rows already present under the uniqueness
    /// constraint are skipped; returns the number of rows actually added.
    async fn write_batch(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError>;
}

/// Runs a blocking diesel call off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Ambiguous(format!("store task aborted: {e}")))?
}

/// Sorts a diesel error into the store taxonomy.
pub(crate) fn classify_diesel(err: diesel::result::Error) -> StoreError {
    use diesel::result::{DatabaseErrorKind, Error};

    match err {
        Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            StoreError::Connection(info.message().to_string())
        }
        Error::DatabaseError(_, info) if is_busy(info.message()) => {
            StoreError::Connection(info.message().to_string())
        }
        Error::DatabaseError(_, info) => StoreError::Query(info.message().to_string()),
        Error::RollbackErrorOnCommit { commit_error, .. } => {
            StoreError::Ambiguous(commit_error.to_string())
        }
        Error::BrokenTransactionManager => {
            StoreError::Ambiguous("transaction manager left in a broken state".into())
        }
        Error::SerializationError(e) => StoreError::Schema(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

/// SQLite BUSY and LOCKED. The statement did not run, so a retry is safe.
fn is_busy(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("database is locked")
        || m.contains("table is locked")
        || m.contains("database is busy")
}

pub(crate) fn classify_connection(err: diesel::ConnectionError) -> StoreError {
    StoreError::Connection(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_displays_as_step_name() {
        assert_eq!(TargetKind::LocalDb.to_string(), "local_db");
        assert_eq!(TargetKind::Warehouse.to_string(), "warehouse");
    }

    #[test]
    fn diesel_errors_are_classified() {
        assert!(matches!(
            classify_diesel(diesel::result::Error::NotFound),
            StoreError::Query(_)
        ));
        assert!(matches!(
            classify_diesel(diesel::result::Error::BrokenTransactionManager),
            StoreError::Ambiguous(_)
        ));
    }

    #[test]
    fn locked_database_is_retryable() {
        use diesel::result::{DatabaseErrorKind, Error};

        let err =
            |m: &str| Error::DatabaseError(DatabaseErrorKind::Unknown, Box::new(m.to_string()));
        assert_eq!(
            classify_diesel(err("database is locked")),
            StoreError::Connection("database is locked".into())
        );
        assert!(matches!(
            classify_diesel(err("database table is locked: ohlcv_bars")),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            classify_diesel(err("UNIQUE constraint failed: ohlcv_bars.ticker")),
            StoreError::Query(_)
        ));
    }
}
