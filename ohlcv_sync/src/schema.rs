//! Diesel table definitions, one module per backend.
//!
//! Both describe the same `ohlcv_bars` table; only the timestamp column type
//! differs (RFC 3339 text on SQLite, `timestamptz` on PostgreSQL).

pub mod sqlite {
    diesel::table! {
        ohlcv_bars (ticker, timeframe, timestamp) {
            ticker -> Text,
            timeframe -> Text,
            timestamp -> Text,
            open -> Nullable<Double>,
            high -> Nullable<Double>,
            low -> Nullable<Double>,
            close -> Nullable<Double>,
            volume -> Nullable<Double>,
        }
    }
}

pub mod pg {
    diesel::table! {
        ohlcv_bars (ticker, timeframe, timestamp) {
            ticker -> Text,
            timeframe -> Text,
            timestamp -> Timestamptz,
            open -> Nullable<Float8>,
            high -> Nullable<Float8>,
            low -> Nullable<Float8>,
            close -> Nullable<Float8>,
            volume -> Nullable<Float8>,
        }
    }
}
