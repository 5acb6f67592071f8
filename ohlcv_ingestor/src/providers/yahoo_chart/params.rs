use crate::{
    models::timeframe::Timeframe,
    providers::{BarsRequest, RequestRange},
};

/// Yahoo-specific knobs that are not part of [`BarsRequest`].
#[derive(Clone, Debug)]
pub struct YahooChartParams {
    /// Scale open/high/low/close by the dividend/split adjusted close when the
    /// response carries one (daily bars only).
    pub auto_adjust: bool,
    /// Include pre- and post-market bars for intraday intervals.
    pub include_pre_post: bool,
}

impl Default for YahooChartParams {
    fn default() -> Self {
        Self {
            auto_adjust: true,
            include_pre_post: false,
        }
    }
}

/// Interval code as the chart endpoint spells it.
pub fn interval_code(tf: Timeframe) -> &'static str {
    match tf {
        // the endpoint accepts "60m" and "1h"; use the documented spelling
        Timeframe::OneHour => "60m",
        other => other.code(),
    }
}

/// Query string for one request.
pub fn construct_params(request: &BarsRequest, params: &YahooChartParams) -> Vec<(String, String)> {
    let mut q = vec![(
        "interval".to_string(),
        interval_code(request.key.timeframe).to_string(),
    )];

    match &request.range {
        RequestRange::MaxForTimeframe => {
            q.push(("range".into(), request.key.timeframe.max_range().into()));
        }
        RequestRange::Between { start, end } => {
            q.push(("period1".into(), start.timestamp().to_string()));
            q.push(("period2".into(), end.timestamp().to_string()));
        }
    }

    q.push((
        "includePrePost".into(),
        params.include_pre_post.to_string(),
    ));
    q.push(("events".into(), "div,splits".into()));
    q
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::bar_series::SeriesKey;

    #[test]
    fn max_range_request_uses_timeframe_limit() {
        let req = BarsRequest::max_history(SeriesKey::new("MSFT", Timeframe::OneMinute));
        let q = construct_params(&req, &YahooChartParams::default());
        assert!(q.contains(&("interval".into(), "1m".into())));
        assert!(q.contains(&("range".into(), "7d".into())));
        assert!(q.contains(&("includePrePost".into(), "false".into())));
    }

    #[test]
    fn bounded_request_uses_epoch_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let req = BarsRequest {
            key: SeriesKey::new("MSFT", Timeframe::OneHour),
            range: RequestRange::Between { start, end },
        };
        let q = construct_params(&req, &YahooChartParams::default());
        assert!(q.contains(&("interval".into(), "60m".into())));
        assert!(q.contains(&("period1".into(), "1704067200".into())));
        assert!(q.contains(&("period2".into(), "1704153600".into())));
        assert!(!q.iter().any(|(k, _)| k == "range"));
    }
}
