//! PostgreSQL-backed relational target.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{dsl::max, prelude::*};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};
use tracing::debug;

use crate::{
    db::connection::connect_postgres,
    models::NewPgBar,
    schema::pg::ohlcv_bars,
    store::{StoreError, StoreHandle, TargetKind, classify_connection, classify_diesel, run_blocking},
};

/// 8 bind parameters per row, PostgreSQL caps a statement at 65535.
const ROWS_PER_STATEMENT: usize = 4_000;

/// Relational store on PostgreSQL. The URL may carry credentials and is never
/// logged.
#[derive(Clone)]
pub struct PgStore {
    url: String,
    conn: Arc<Mutex<Option<PgConnection>>>,
}

/// Splits a batch into single-statement inserts.
fn statement_chunks(bars: &[Bar]) -> std::slice::Chunks<'_, Bar> {
    bars.chunks(ROWS_PER_STATEMENT)
}

fn is_missing_table(err: &diesel::result::Error) -> bool {
    matches!(err, diesel::result::Error::DatabaseError(_, info)
        if info.message().contains("relation") && info.message().contains("does not exist"))
}

impl PgStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let slot = Arc::clone(&self.conn);
        let url = self.url.clone();
        run_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| StoreError::Connection("connection lock poisoned".into()))?;
            if guard.is_none() {
                *guard = Some(connect_postgres(&url).map_err(classify_connection)?);
            }
            let Some(conn) = guard.as_mut() else {
                return Err(StoreError::Connection("no connection".into()));
            };
            let out = f(conn);
            if matches!(out, Err(StoreError::Connection(_) | StoreError::Ambiguous(_))) {
                *guard = None;
            }
            out
        })
        .await
    }
}

#[async_trait]
impl StoreHandle for PgStore {
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
                .first::<Option<DateTime<Utc>>>(conn);
            match latest {
                Ok(wm) => Ok(wm),
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
                    for chunk in statement_chunks(&bars) {
                        let rows: Vec<NewPgBar<'_>> =
                            chunk.iter().map(|b| NewPgBar::from_bar(&key, b)).collect();
                        inserted += diesel::insert_into(ohlcv_bars::table)
                            .values(&rows)
                            .on_conflict((
                                ohlcv_bars::ticker,
                                ohlcv_bars::timeframe,
                                ohlcv_bars::timestamp,
                            ))
                            .do_nothing()
                            .execute(conn)?;
                    }
                    Ok(inserted)
                })
                .map_err(classify_diesel)
            })
            .await?;

        if inserted < sent {
            debug!(sent, inserted, "conflicting rows were skipped");
        }
        Ok(inserted)
    }
}
