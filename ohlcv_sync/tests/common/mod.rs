#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use ohlcv_ingestor::models::{
    bar::Bar,
    bar_series::{BarSeries, SeriesKey},
    timeframe::Timeframe,
};
use ohlcv_sync::{
    db::{connection, migrate},
    store::sqlite::SqliteStore,
};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteStore) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("test.db").to_string_lossy().to_string();
    migrate::run_all(&path).expect("migrations");
    let store = SqliteStore::new(path.clone());
    (TestDb { _dir: dir, path }, store)
}

pub fn raw_conn(db: &TestDb) -> SqliteConnection {
    connection::connect_sqlite(&db.path).expect("connect")
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn bar(ts: DateTime<Utc>, close: f64) -> Bar {
    Bar::new(ts, close, close + 1.0, close - 1.0, close, 1_000.0)
}

pub fn aapl_1d() -> SeriesKey {
    SeriesKey::new("AAPL", Timeframe::OneDay)
}

/// Daily series over the given day offsets, close = 100 + offset.
pub fn daily(key: &SeriesKey, days: impl IntoIterator<Item = i64>) -> BarSeries {
    BarSeries::new(
        key.clone(),
        days.into_iter().map(|d| bar(day(d), 100.0 + d as f64)).collect(),
    )
}
