//! SQLite-backed relational target.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{dsl::max, prelude::*};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};
use tracing::debug;

use crate::{
    db::{connection::connect_sqlite, migrate},
    models::{NewSqliteBar, SqliteBarRow},
    schema::sqlite::ohlcv_bars,
    store::{StoreError, StoreHandle, TargetKind, classify_diesel, run_blocking},
    tz::parse_ts_to_utc,
};

/// Relational store on a SQLite file. The connection is opened lazily and
/// reopened after a connection-level failure.
#[derive(Clone)]
pub struct SqliteStore {
    url: String,
    conn: Arc<Mutex<Option<SqliteConnection>>>,
}

fn is_missing_table(err: &diesel::result::Error) -> bool {
    matches!(err, diesel::result::Error::DatabaseError(_, info) if info.message().contains("no such table"))
}

impl SqliteStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Applies pending migrations, then returns a store on the same file.
    pub fn open_migrated(url: impl Into<String>) -> Result<Self, StoreError> {
        let url = url.into();
        migrate::run_sqlite(&url).map_err(|e| StoreError::Connection(format!("{e:#}")))?;
        Ok(Self::new(url))
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let slot = Arc::clone(&self.conn);
        let url = self.url.clone();
        run_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| StoreError::Connection("connection lock poisoned".into()))?;
            if guard.is_none() {
                let conn = connect_sqlite(&url).map_err(|e| StoreError::Connection(format!("{e:#}")))?;
                *guard = Some(conn);
            }
            let Some(conn) = guard.as_mut() else {
                return Err(StoreError::Connection("no connection".into()));
            };
            let out = f(conn);
            if matches!(out, Err(StoreError::Connection(_))) {
                *guard = None;
            }
            out
        })
        .await
    }

    /// Every persisted bar for `key`, ascending.
    pub async fn load_series(&self, key: &SeriesKey) -> Result<Vec<Bar>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let rows: Vec<SqliteBarRow> = ohlcv_bars::table
                .filter(ohlcv_bars::ticker.eq(&key.ticker))
                .filter(ohlcv_bars::timeframe.eq(key.timeframe.code()))
                .order(ohlcv_bars::timestamp.asc())
                .select(SqliteBarRow::as_select())
                .load(conn)
                .map_err(classify_diesel)?;
            rows.iter()
                .map(|r| r.to_bar().map_err(|e| StoreError::Schema(format!("{e:#}"))))
                .collect()
        })
        .await
    }
}

#[async_trait]
impl StoreHandle for SqliteStore {
    fn target(&self) -> TargetKind {
        TargetKind::LocalDb
    }

    async fn get_watermark(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let latest = ohlcv_bars::table
                .filter(ohlcv_bars::ticker.eq(&key.ticker))
                .filter(ohlcv_bars::timeframe.eq(key.timeframe.code()))
                .select(max(ohlcv_bars::timestamp))
                .first::<Option<String>>(conn);

            match latest {
                Ok(Some(raw)) => parse_ts_to_utc(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Schema(format!("{e:#}"))),
                Ok(None) => Ok(None),
                Err(e) if is_missing_table(&e) => Ok(None),
                Err(e) => Err(classify_diesel(e)),
            }
        })
        .await
    }

    async fn write_batch(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let key = key.clone();
        let bars = bars.to_vec();
        let sent = bars.len();

        let inserted = self
            .with_conn(move |conn| {
                conn.transaction::<usize, diesel::result::Error, _>(|conn| {
                    let mut inserted = 0;
                    for bar in &bars {
                        inserted += diesel::insert_or_ignore_into(ohlcv_bars::table)
                            .values(NewSqliteBar::from_bar(&key, bar))
                            .execute(conn)?;
                    }
                    Ok(inserted)
                })
                .map_err(classify_diesel)
            })
            .await?;

        if inserted < sent {
            debug!(sent, inserted, "rows already present were ignored");
        }
        Ok(inserted)
    }
}
