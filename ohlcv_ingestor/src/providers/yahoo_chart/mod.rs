//! Yahoo Finance chart endpoint (`/v8/finance/chart/{symbol}`).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::YahooChartProvider;
