//! Provider abstraction for market data sources.
//!
//! This module defines the [`DataProvider`] trait, the single interface the
//! collection step uses to pull bars for one series key. Concrete vendors
//! (currently [`yahoo_chart::YahooChartProvider`]) implement it and own their
//! request shaping, rate limiting and response decoding.
//!
//! The trait is async and object safe so a provider can be picked at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use ohlcv_ingestor::models::bar_series::BarSeries;
//! use ohlcv_ingestor::providers::{BarsRequest, DataProvider, ProviderError};
//!
//! struct NullProvider;
//!
//! #[async_trait]
//! impl DataProvider for NullProvider {
//!     async fn fetch_bars(&self, request: &BarsRequest) -> Result<BarSeries, ProviderError> {
//!         Ok(BarSeries::empty(request.key.clone()))
//!     }
//! }
//! ```

pub mod yahoo_chart;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::{Backtrace, Snafu};

use crate::models::bar_series::{BarSeries, SeriesKey};

/// Time window of a bars request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRange {
    /// The longest look-back the provider allows for the key's timeframe.
    MaxForTimeframe,
    /// Inclusive start, exclusive end (UTC).
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Universal parameters for requesting bars for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarsRequest {
    pub key: SeriesKey,
    pub range: RequestRange,
}

impl BarsRequest {
    pub fn max_history(key: SeriesKey) -> Self {
        Self {
            key,
            range: RequestRange::MaxForTimeframe,
        }
    }

    /// Picks up from `latest`, the newest bar already held, up to `now`. The
    /// bar at `latest` is fetched again and dropped by the merge. Falls back
    /// to the full look-back when nothing is held or `latest` is older than
    /// the provider serves.
    pub fn resume_from(key: SeriesKey, latest: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let lookback = key.timeframe.max_lookback();
        let within_lookback =
            |start: DateTime<Utc>| start < now && lookback.is_none_or(|w| now - start < w);
        match latest {
            Some(start) if within_lookback(start) => Self {
                key,
                range: RequestRange::Between { start, end: now },
            },
            _ => Self::max_history(key),
        }
    }
}

/// Trait for fetching time-series bar data from a market data provider.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches the bars for `request.key`. The returned series is raw: callers
    /// must not assume it is sorted or free of duplicates.
    async fn fetch_bars(&self, request: &BarsRequest) -> Result<BarSeries, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// A configured header value contains invalid characters.
    #[snafu(display("Invalid header value: {source}"))]
    InvalidHeader {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API returned a specific error message.
    #[snafu(display("API error: {message}"))]
    Api {
        message: String,
        backtrace: Backtrace,
    },

    /// The response could not be turned into bars.
    #[snafu(display("Malformed provider response: {message}"))]
    Decode {
        message: String,
        backtrace: Backtrace,
    },
}
