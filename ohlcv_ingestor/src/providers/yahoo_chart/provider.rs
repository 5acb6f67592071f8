use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::bar_series::BarSeries,
    providers::{
        ApiSnafu, BarsRequest, ClientBuildSnafu, DataProvider, InvalidHeaderSnafu, ProviderError,
        ProviderInitError, ReqwestSnafu,
        yahoo_chart::{
            params::{YahooChartParams, construct_params},
            response::ChartResponse,
        },
    },
};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) ohlcv-service/0.1";
/// Whole-request deadline, connect through body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct YahooChartProvider {
    client: Client,
    base_url: String,
    params: YahooChartParams,
    limiter: DefaultDirectRateLimiter,
}

impl YahooChartProvider {
    /// Creates a provider against the public chart endpoint, limited to two
    /// requests per second.
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_base_url(BASE_URL, YahooChartParams::default())
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        params: YahooChartParams,
    ) -> Result<Self, ProviderInitError> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            params,
            limiter: RateLimiter::direct(Quota::per_second(nonzero!(2u32))),
        })
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProviderInitError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(USER_AGENT).context(InvalidHeaderSnafu)?,
    );

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context(ClientBuildSnafu)
}

#[async_trait]
impl DataProvider for YahooChartProvider {
    async fn fetch_bars(&self, request: &BarsRequest) -> Result<BarSeries, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, request.key.ticker);
        let query = construct_params(request, &self.params);
        debug!(key = %request.key, %url, "requesting chart");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        let body = response.text().await.context(ReqwestSnafu)?;

        // Yahoo reports unknown symbols as 404 with a chart.error body
        let parsed: Option<ChartResponse> = serde_json::from_str(&body).ok();
        if let Some(err) = parsed.as_ref().and_then(|r| r.chart.error.as_ref()) {
            return ApiSnafu {
                message: format!("{}: {}", err.code, err.description),
            }
            .fail();
        }
        if !status.is_success() {
            return ApiSnafu {
                message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            }
            .fail();
        }

        let Some(parsed) = parsed else {
            return ApiSnafu {
                message: "response body is not a chart document".to_string(),
            }
            .fail();
        };

        let bars = match parsed.chart.result.and_then(|r| r.into_iter().next()) {
            Some(result) => result.into_bars(request.key.timeframe, self.params.auto_adjust)?,
            None => Vec::new(),
        };

        Ok(BarSeries::new(request.key.clone(), bars))
    }
}
