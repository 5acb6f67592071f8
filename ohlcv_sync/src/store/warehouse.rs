//! Columnar warehouse target on a Delta Lake table.
//!
//! The table holds the same columns as the relational `ohlcv_bars` table with
//! `timestamp` stored as microseconds in UTC. Each batch is one Arrow
//! [`RecordBatch`] appended in a single Delta commit; the watermark is a
//! DataFusion `MAX("timestamp")` over the current snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltalake::{
    DeltaOps, DeltaTableError,
    arrow::{
        array::{Array, Float64Array, StringArray, TimestampMicrosecondArray},
        datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit},
        record_batch::RecordBatch,
    },
    datafusion::prelude::SessionContext,
    kernel::{DataType, PrimitiveType, StructField},
    open_table,
    protocol::SaveMode,
};
use ohlcv_ingestor::models::{bar::Bar, bar_series::SeriesKey};
use tracing::{debug, info};

use crate::store::{StoreError, StoreHandle, TargetKind};

const TABLE_NAME: &str = "ohlcv_bars";

fn table_columns() -> Vec<StructField> {
    let price = |name: &str| {
        StructField::new(name.to_string(), DataType::Primitive(PrimitiveType::Double), true)
    };
    vec![
        StructField::new("ticker".to_string(), DataType::Primitive(PrimitiveType::String), false),
        StructField::new(
            "timeframe".to_string(),
            DataType::Primitive(PrimitiveType::String),
            false,
        ),
        StructField::new(
            "timestamp".to_string(),
            DataType::Primitive(PrimitiveType::Timestamp),
            false,
        ),
        price("open"),
        price("high"),
        price("low"),
        price("close"),
        price("volume"),
    ]
}

fn arrow_schema() -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(vec![
        Field::new("ticker", ArrowDataType::Utf8, false),
        Field::new("timeframe", ArrowDataType::Utf8, false),
        Field::new(
            "timestamp",
            ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("open", ArrowDataType::Float64, true),
        Field::new("high", ArrowDataType::Float64, true),
        Field::new("low", ArrowDataType::Float64, true),
        Field::new("close", ArrowDataType::Float64, true),
        Field::new("volume", ArrowDataType::Float64, true),
    ]))
}

fn nullable_column(bars: &[Bar], pick: impl Fn(&Bar) -> f64) -> Float64Array {
    bars.iter()
        .map(|b| {
            let v = pick(b);
            if v.is_nan() { None } else { Some(v) }
        })
        .collect()
}

/// Encodes one series batch as an Arrow record batch.
pub fn bars_to_record_batch(key: &SeriesKey, bars: &[Bar]) -> Result<RecordBatch, StoreError> {
    let n = bars.len();
    let tickers = StringArray::from(vec![key.ticker.as_str(); n]);
    let timeframes = StringArray::from(vec![key.timeframe.code(); n]);
    let timestamps = TimestampMicrosecondArray::from(
        bars.iter().map(|b| b.timestamp.timestamp_micros()).collect::<Vec<_>>(),
    )
    .with_timezone("UTC");

    RecordBatch::try_new(
        arrow_schema(),
        vec![
            Arc::new(tickers),
            Arc::new(timeframes),
            Arc::new(timestamps),
            Arc::new(nullable_column(bars, |b| b.open)),
            Arc::new(nullable_column(bars, |b| b.high)),
            Arc::new(nullable_column(bars, |b| b.low)),
            Arc::new(nullable_column(bars, |b| b.close)),
            Arc::new(nullable_column(bars, |b| b.volume)),
        ],
    )
    .map_err(|e| StoreError::Schema(e.to_string()))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn classify_delta(err: DeltaTableError) -> StoreError {
    match err {
        DeltaTableError::ObjectStore { source } => StoreError::Connection(source.to_string()),
        DeltaTableError::Io { source } => StoreError::Connection(source.to_string()),
        DeltaTableError::VersionAlreadyExists(v) => {
            StoreError::Ambiguous(format!("concurrent commit at version {v}"))
        }
        DeltaTableError::Arrow { source } => StoreError::Schema(source.to_string()),
        DeltaTableError::SchemaMismatch { msg } => StoreError::Schema(msg),
        other => StoreError::Query(other.to_string()),
    }
}

/// True for the URIs this build can open: plain paths and `file://` URIs.
/// Object store schemes (`gs://`, `s3://`, ...) need deltalake storage
/// features that are not compiled in.
pub fn is_supported_uri(uri: &str) -> bool {
    !uri.contains("://") || uri.starts_with("file://")
}

/// Delta Lake table at `table_uri`, a local directory.
#[derive(Debug, Clone)]
pub struct DeltaWarehouse {
    table_uri: String,
}

impl DeltaWarehouse {
    pub fn new(table_uri: impl Into<String>) -> Self {
        Self {
            table_uri: table_uri.into(),
        }
    }

    pub fn table_uri(&self) -> &str {
        &self.table_uri
    }

    fn is_local(&self) -> bool {
        is_supported_uri(&self.table_uri)
    }

    fn local_path(&self) -> &str {
        self.table_uri.trim_start_matches("file://")
    }

    /// Creates the table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        if self.is_local() {
            let path = self.local_path();
            std::fs::create_dir_all(path)
                .map_err(|e| StoreError::Connection(format!("{path}: {e}")))?;
        }
        DeltaOps::try_from_uri(&self.table_uri)
            .await
            .map_err(classify_delta)?
            .create()
            .with_columns(table_columns())
            .with_table_name(TABLE_NAME)
            .with_save_mode(SaveMode::Ignore)
            .await
            .map_err(classify_delta)?;
        Ok(())
    }

    /// Number of rows stored for `key`.
    pub async fn count_rows(&self, key: &SeriesKey) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {TABLE_NAME} WHERE ticker = {} AND timeframe = {}",
            quote_literal(&key.ticker),
            quote_literal(key.timeframe.code())
        );
        let Some(batches) = self.query(&sql).await? else {
            return Ok(0);
        };
        let mut total = 0usize;
        for batch in batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let col = batch.column(0);
            let Some(counts) = col.as_any().downcast_ref::<deltalake::arrow::array::Int64Array>()
            else {
                return Err(StoreError::Schema(format!(
                    "COUNT returned {:?}",
                    col.data_type()
                )));
            };
            total += counts.value(0).max(0) as usize;
        }
        Ok(total)
    }

    /// Runs `sql` against the latest snapshot registered as `ohlcv_bars`.
    /// `None` when the table does not exist.
    async fn query(&self, sql: &str) -> Result<Option<Vec<RecordBatch>>, StoreError> {
        if self.is_local() && !std::path::Path::new(self.local_path()).exists() {
            return Ok(None);
        }
        let table = match open_table(&self.table_uri).await {
            Ok(t) => t,
            Err(DeltaTableError::NotATable(_)) | Err(DeltaTableError::InvalidTableLocation(_)) => {
                return Ok(None);
            }
            Err(e) => return Err(classify_delta(e)),
        };

        let ctx = SessionContext::new();
        ctx.register_table(TABLE_NAME, Arc::new(table))
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let batches = ctx
            .sql(sql)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .collect()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(Some(batches))
    }
}

#[async_trait]
impl StoreHandle for DeltaWarehouse {
    fn target(&self) -> TargetKind {
        TargetKind::Warehouse
    }

    async fn get_watermark(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sql = format!(
            "SELECT MAX(\"timestamp\") AS watermark FROM {TABLE_NAME} WHERE ticker = {} AND timeframe = {}",
            quote_literal(&key.ticker),
            quote_literal(key.timeframe.code())
        );
        let Some(batches) = self.query(&sql).await? else {
            debug!(uri = %self.table_uri, "warehouse table missing, no watermark");
            return Ok(None);
        };

        for batch in batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let col = batch.column(0);
            let Some(ts) = col.as_any().downcast_ref::<TimestampMicrosecondArray>() else {
                return Err(StoreError::Schema(format!(
                    "watermark column has type {:?}",
                    col.data_type()
                )));
            };
            if ts.is_null(0) {
                return Ok(None);
            }
            return DateTime::from_timestamp_micros(ts.value(0))
                .map(Some)
                .ok_or_else(|| StoreError::Schema(format!("timestamp {} out of range", ts.value(0))));
        }
        Ok(None)
    }

    async fn write_batch(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let batch = bars_to_record_batch(key, bars)?;
        self.ensure_table().await?;

        let table = DeltaOps::try_from_uri(&self.table_uri)
            .await
            .map_err(classify_delta)?
            .write(vec![batch])
            .with_save_mode(SaveMode::Append)
            .await
            .map_err(classify_delta)?;

        info!(%key, rows = bars.len(), version = table.version(), "warehouse commit");
        Ok(bars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ohlcv_ingestor::models::timeframe::Timeframe;

    #[test]
    fn record_batch_carries_nulls_for_nan() {
        let key = SeriesKey::new("AAPL", Timeframe::OneDay);
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = vec![
            Bar::new(ts, 1.0, 2.0, 0.5, 1.5, 100.0),
            Bar::new(ts + chrono::Duration::days(1), f64::NAN, 2.0, 0.5, 1.5, 100.0),
        ];
        let batch = bars_to_record_batch(&key, &bars).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 8);
        assert_eq!(batch.column(3).null_count(), 1);

        let ts_col = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(ts_col.value(0), ts.timestamp_micros());
    }

    #[test]
    fn only_local_tables_are_supported() {
        assert!(is_supported_uri("/data/warehouse/ohlcv_bars"));
        assert!(is_supported_uri("relative/ohlcv_bars"));
        assert!(is_supported_uri("file:///data/ohlcv_bars"));
        assert!(!is_supported_uri("gs://bucket/ohlcv_bars"));
        assert!(!is_supported_uri("s3://bucket/ohlcv_bars"));
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(quote_literal("O'NEIL"), "'O''NEIL'");
    }
}
