mod common;

use std::sync::Arc;

use common::{StubProvider, Workspace};
use ohlcv_ingestor::models::{bar_series::SeriesKey, timeframe::Timeframe};
use ohlcv_sync::store::{sqlite::SqliteStore, warehouse::DeltaWarehouse};
use system_manager::pipeline::{Pipeline, Step, StepStatus};

const TWO_TICKERS: &str = r#"{"tech": ["aapl"], "index": ["SPY", "AAPL"]}"#;

fn statuses(report: &system_manager::pipeline::RunReport) -> Vec<(Step, StepStatus)> {
    report.steps.iter().map(|r| (r.step, r.status)).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_fills_both_targets() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[]);
    let provider = Arc::new(StubProvider::recent_daily());
    let pipeline = Pipeline::new(provider.clone());

    let report = pipeline.run(&cfg).await;

    assert!(report.succeeded());
    assert_eq!(
        statuses(&report),
        vec![
            (Step::Collect, StepStatus::Succeeded),
            (Step::Quality, StepStatus::Succeeded),
            (Step::UploadLocalDb, StepStatus::Succeeded),
            (Step::UploadWarehouse, StepStatus::Succeeded),
        ]
    );
    assert_eq!(provider.call_count(), 2);

    let aapl = SeriesKey::new("AAPL", Timeframe::OneDay);
    let spy = SeriesKey::new("SPY", Timeframe::OneDay);

    let db = SqliteStore::new(ws.db_path());
    assert_eq!(db.load_series(&aapl).await.unwrap().len(), 3);
    assert_eq!(db.load_series(&spy).await.unwrap().len(), 3);

    let wh = DeltaWarehouse::new(ws.warehouse_uri());
    assert_eq!(wh.count_rows(&aapl).await.unwrap(), 3);
    assert_eq!(wh.count_rows(&spy).await.unwrap(), 3);

    let reports: Vec<_> = std::fs::read_dir(ws.path("reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert!(reports.iter().any(|n| n.ends_with(".json")));
    assert!(reports.iter().any(|n| n.ends_with(".md")));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_run_is_a_no_op() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[]);
    let provider = Arc::new(StubProvider::recent_daily());
    let pipeline = Pipeline::new(provider.clone());

    assert!(pipeline.run(&cfg).await.succeeded());
    let again = pipeline.run(&cfg).await;

    assert!(again.succeeded());
    // fresh masters: no new fetches
    assert_eq!(provider.call_count(), 2);
    let collect = &again.steps[0];
    assert_eq!(collect.detail, "all master files fresh");
    for upload in &again.steps[2..] {
        assert_eq!(upload.status, StepStatus::Succeeded);
        assert!(upload.detail.starts_with("0 uploaded, 2 up to date, 0 rows written"));
    }

    let wh = DeltaWarehouse::new(ws.warehouse_uri());
    let aapl = SeriesKey::new("AAPL", Timeframe::OneDay);
    assert_eq!(wh.count_rows(&aapl).await.unwrap(), 3);
}

#[tokio::test]
async fn disabled_steps_are_skipped() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[
        ("ENABLE_QUALITY_CHECKS", "false"),
        ("ENABLE_LOCAL_DB", "false"),
        ("ENABLE_WAREHOUSE", "false"),
    ]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::recent_daily()));

    let report = pipeline.run(&cfg).await;

    assert!(report.succeeded());
    assert_eq!(
        statuses(&report),
        vec![
            (Step::Collect, StepStatus::Succeeded),
            (Step::Quality, StepStatus::Skipped),
            (Step::UploadLocalDb, StepStatus::Skipped),
            (Step::UploadWarehouse, StepStatus::Skipped),
        ]
    );
    assert!(!std::path::Path::new(&ws.db_path()).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_collection_fails_the_run_but_later_steps_still_run() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[("ENABLE_WAREHOUSE", "false")]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::failing()));

    let report = pipeline.run(&cfg).await;

    assert!(!report.succeeded());
    assert_eq!(report.status(Step::Collect), Some(StepStatus::Failed));
    assert!(report.steps[0].detail.contains("every fetch failed"));
    // empty working set: nothing to check or upload, but the steps ran
    assert_eq!(report.status(Step::Quality), Some(StepStatus::Succeeded));
    assert_eq!(report.status(Step::UploadLocalDb), Some(StepStatus::Succeeded));
    assert_eq!(report.status(Step::UploadWarehouse), Some(StepStatus::Skipped));
}

#[tokio::test]
async fn upload_failure_is_advisory() {
    let ws = Workspace::new(TWO_TICKERS);
    let bad_db = ws.path("no_such_dir/bars.db").to_string_lossy().to_string();
    let cfg = ws.config(&[("DATABASE_URL", &bad_db), ("ENABLE_WAREHOUSE", "false")]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::recent_daily()));

    let report = pipeline.run(&cfg).await;

    assert!(report.succeeded());
    assert_eq!(report.status(Step::UploadLocalDb), Some(StepStatus::Failed));
    assert!(report.steps[2].detail.starts_with("migration failed"));
}

#[tokio::test]
async fn missing_ticker_file_fails_collection() {
    let ws = Workspace::new(TWO_TICKERS);
    let missing = ws.path("nope.json").to_string_lossy().to_string();
    let cfg = ws.config(&[
        ("TICKER_FILE", &missing),
        ("ENABLE_LOCAL_DB", "false"),
        ("ENABLE_WAREHOUSE", "false"),
    ]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::recent_daily()));

    let record = pipeline.run_step(Step::Collect, &cfg, false).await;

    assert_eq!(record.status, StepStatus::Failed);
    assert!(record.detail.contains("nope.json"));
}

#[tokio::test]
async fn forced_step_runs_when_disabled_but_needs_settings() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[("ENABLE_WAREHOUSE", "false"), ("WAREHOUSE_URI", "")]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::recent_daily()));

    let record = pipeline.run_step(Step::UploadWarehouse, &cfg, true).await;

    assert_eq!(record.status, StepStatus::Failed);
    assert_eq!(record.detail, "warehouse is not configured");
}

#[tokio::test]
async fn cancelled_pipeline_skips_remaining_steps() {
    let ws = Workspace::new(TWO_TICKERS);
    let cfg = ws.config(&[]);
    let pipeline = Pipeline::new(Arc::new(StubProvider::recent_daily()));
    pipeline.cancel_flag().cancel();

    let report = pipeline.run(&cfg).await;

    assert!(report.steps.iter().all(|r| r.status == StepStatus::Skipped));
    assert!(report.succeeded());
}
