//! In-process store with the same uniqueness rule as the real targets.
//!
//! Used by tests and dry runs. Calls can be slowed down or made to fail so
//! timeout and error paths can be exercised without a database.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};

use crate::store::{StoreError, StoreHandle, TargetKind};

type Rows = BTreeMap<SeriesKey, BTreeMap<DateTime<Utc>, Bar>>;

pub struct MemoryStore {
    target: TargetKind,
    rows: Mutex<Rows>,
    delay: Option<Duration>,
    write_fault: Option<StoreError>,
    key_faults: HashMap<SeriesKey, StoreError>,
    watermark_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(target: TargetKind) -> Self {
        Self {
            target,
            rows: Mutex::new(BTreeMap::new()),
            delay: None,
            write_fault: None,
            key_faults: HashMap::new(),
            watermark_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `write_batch` fails with `err`.
    pub fn failing_writes(mut self, err: StoreError) -> Self {
        self.write_fault = Some(err);
        self
    }

    /// Both operations fail with `err` for `key` only.
    pub fn failing_key(mut self, key: SeriesKey, err: StoreError) -> Self {
        self.key_faults.insert(key, err);
        self
    }

    /// Pre-populates rows, bypassing call counters.
    pub fn seeded(self, key: &SeriesKey, bars: &[Bar]) -> Self {
        if let Ok(mut rows) = self.rows.lock() {
            let series = rows.entry(key.clone()).or_default();
            for bar in bars {
                series.entry(bar.timestamp).or_insert_with(|| bar.clone());
            }
        }
        self
    }

    pub fn bars(&self, key: &SeriesKey) -> Vec<Bar> {
        self.rows
            .lock()
            .map(|rows| rows.get(key).map(|s| s.values().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn watermark_calls(&self) -> usize {
        self.watermark_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Rows>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl StoreHandle for MemoryStore {
    fn target(&self) -> TargetKind {
        self.target
    }

    async fn get_watermark(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.watermark_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.key_faults.get(key) {
            return Err(err.clone());
        }
        let rows = self.lock()?;
        Ok(rows.get(key).and_then(|s| s.keys().next_back().copied()))
    }

    async fn write_batch(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.key_faults.get(key).or(self.write_fault.as_ref()) {
            return Err(err.clone());
        }
        let mut rows = self.lock()?;
        let series = rows.entry(key.clone()).or_default();
        let mut inserted = 0;
        for bar in bars {
            if !series.contains_key(&bar.timestamp) {
                series.insert(bar.timestamp, bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
