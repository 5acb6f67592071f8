mod common;

use std::time::Duration;

use common::{aapl_1d, assert_sqlite_pragmas, bar, daily, day, raw_conn, setup_db};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey, timeframe::Timeframe};
use ohlcv_sync::{
    store::{StoreError, StoreHandle, TargetKind, sqlite::SqliteStore},
    upload::DeltaUploader,
};

#[test]
fn sqlite_connection_applies_pragmas() {
    let (db, _store) = setup_db();
    let mut conn = raw_conn(&db);
    assert_sqlite_pragmas(&mut conn);
}

#[tokio::test]
async fn watermark_is_none_until_rows_exist() {
    let (_db, store) = setup_db();
    assert_eq!(store.target(), TargetKind::LocalDb);
    assert_eq!(store.get_watermark(&aapl_1d()).await.unwrap(), None);

    let written = store.write_batch(&aapl_1d(), &daily(&aapl_1d(), 0..3).bars).await.unwrap();
    assert_eq!(written, 3);
    assert_eq!(store.get_watermark(&aapl_1d()).await.unwrap(), Some(day(2)));

    // other keys are unaffected
    let msft = SeriesKey::new("MSFT", Timeframe::OneDay);
    let aapl_1h = SeriesKey::new("AAPL", Timeframe::OneHour);
    assert_eq!(store.get_watermark(&msft).await.unwrap(), None);
    assert_eq!(store.get_watermark(&aapl_1h).await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_rows_are_ignored_not_fatal() {
    let (_db, store) = setup_db();
    let key = aapl_1d();
    store.write_batch(&key, &[bar(day(0), 1.0), bar(day(1), 2.0)]).await.unwrap();

    let written = store
        .write_batch(&key, &[bar(day(1), 99.0), bar(day(2), 3.0)])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let stored = store.load_series(&key).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].close, 2.0, "existing row is never modified");
}

#[tokio::test]
async fn nan_values_round_trip_as_null() {
    let (_db, store) = setup_db();
    let key = aapl_1d();
    let gappy = Bar::new(day(0), f64::NAN, 2.0, 1.0, 1.5, f64::NAN);
    store.write_batch(&key, &[gappy]).await.unwrap();

    let stored = store.load_series(&key).await.unwrap();
    assert!(stored[0].open.is_nan());
    assert!(stored[0].volume.is_nan());
    assert_eq!(stored[0].close, 1.5);
}

#[tokio::test]
async fn missing_table_means_no_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db").to_string_lossy().to_string();
    let store = SqliteStore::new(path);

    assert_eq!(store.get_watermark(&aapl_1d()).await.unwrap(), None);
    let err = store.write_batch(&aapl_1d(), &[bar(day(0), 1.0)]).await.unwrap_err();
    assert!(matches!(err, StoreError::Query(_)));
}

#[tokio::test]
async fn unreachable_database_is_a_connection_error() {
    let store = SqliteStore::new("/nonexistent-dir/for/sure/x.db");
    let err = store.get_watermark(&aapl_1d()).await.unwrap_err();
    assert!(matches!(err, StoreError::Connection(_)));
}

#[tokio::test]
async fn upload_twice_writes_nothing_the_second_time() {
    let (_db, store) = setup_db();
    let uploader = DeltaUploader::new(Duration::from_secs(10));
    let series = daily(&aapl_1d(), 0..100);

    let first = uploader.upload(&series, &store).await.unwrap();
    assert_eq!(first.rows_written, 100);
    assert_eq!(first.watermark_before, None);

    let second = uploader.upload(&series, &store).await.unwrap();
    assert_eq!(second.rows_written, 0);
    assert!(second.skipped);
    assert_eq!(second.watermark_before, Some(day(99)));
}
