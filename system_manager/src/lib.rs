//! Service glue: configuration, ticker lists, logging, the pipeline runner
//! and cron scheduling for the `ohlcv-service` binary.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod schedule;
pub mod tickers;
