use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{
    models::{bar::Bar, timeframe::Timeframe},
    providers::{DecodeSnafu, ProviderError},
};

#[derive(Deserialize, Debug)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Deserialize, Debug)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
pub struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Deserialize, Debug)]
pub struct ChartResult {
    pub meta: ChartMeta,
    /// Absent when the symbol has no bars in the requested window.
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub symbol: String,
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    pub gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteColumns>,
    #[serde(default)]
    pub adjclose: Vec<AdjCloseColumn>,
}

#[derive(Deserialize, Debug, Default)]
pub struct QuoteColumns {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
pub struct AdjCloseColumn {
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}

fn cell(col: &[Option<f64>], i: usize) -> f64 {
    col.get(i).copied().flatten().unwrap_or(f64::NAN)
}

/// Daily bars are keyed by the exchange-local trading date at midnight UTC.
fn bar_timestamp(secs: i64, gmtoffset: i64, tf: Timeframe) -> Option<DateTime<Utc>> {
    let ts = DateTime::from_timestamp(secs, 0)?;
    if tf.is_intraday() {
        return Some(ts);
    }
    let local_date = (ts + Duration::seconds(gmtoffset)).date_naive();
    Some(local_date.and_hms_opt(0, 0, 0)?.and_utc())
}

impl ChartResult {
    /// Zips the column arrays into bars. Null cells become NaN.
    pub fn into_bars(self, tf: Timeframe, auto_adjust: bool) -> Result<Vec<Bar>, ProviderError> {
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adj = self
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|c| c.adjclose)
            .filter(|c| auto_adjust && !c.is_empty());

        let mut bars = Vec::with_capacity(self.timestamp.len());
        for (i, secs) in self.timestamp.iter().copied().enumerate() {
            let Some(timestamp) = bar_timestamp(secs, self.meta.gmtoffset, tf) else {
                return DecodeSnafu {
                    message: format!("{}: timestamp {secs} out of range", self.meta.symbol),
                }
                .fail();
            };

            let mut bar = Bar::new(
                timestamp,
                cell(&quote.open, i),
                cell(&quote.high, i),
                cell(&quote.low, i),
                cell(&quote.close, i),
                cell(&quote.volume, i),
            );

            if let Some(adj) = &adj {
                let adj_close = cell(adj, i);
                if adj_close.is_finite() && bar.close.is_finite() && bar.close != 0.0 {
                    let factor = adj_close / bar.close;
                    bar.open *= factor;
                    bar.high *= factor;
                    bar.low *= factor;
                    bar.close = adj_close;
                }
            }
            bars.push(bar);
        }
        Ok(bars)
    }
}
