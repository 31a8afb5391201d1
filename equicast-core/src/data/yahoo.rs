//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API, either for a date range at
//! daily interval or for a relative period at an intraday interval. One HTTP
//! request per call: retries happen one level up, as suffix fallback.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV directory provider is the fallback when Yahoo is unavailable.

use super::provider::{
    ColumnLabel, DataError, DataProvider, DataSource, FetchWindow, ProviderFrame, RawValue,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::time::Duration;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(BASE_URL)
    }

    /// Point the provider at a different chart endpoint (mirrors, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Build the chart API URL for a symbol and window.
    fn chart_url(base: &str, symbol: &str, window: &FetchWindow) -> Result<String, DataError> {
        match window {
            FetchWindow::Range { start, end } => {
                let start_ts = day_bound(*start, 0, 0, 0)?;
                let end_ts = day_bound(*end, 23, 59, 59)?;
                Ok(format!(
                    "{base}/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d\
                     &includeAdjustedClose=true"
                ))
            }
            FetchWindow::Period { period, interval } => Ok(format!(
                "{base}/{symbol}?range={period}&interval={interval}&includeAdjustedClose=true"
            )),
        }
    }

    /// Parse the chart API response into a provider frame.
    ///
    /// Daily timestamps are truncated to midnight; intraday ones are kept as UTC.
    fn parse_response(
        symbol: &str,
        resp: ChartResponse,
        daily: bool,
    ) -> Result<ProviderFrame, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        // No timestamps means no trading rows in the window.
        let Some(timestamps) = data.timestamp else {
            return Err(DataError::EmptyResponse {
                symbol: symbol.to_string(),
            });
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut index = Vec::with_capacity(timestamps.len());
        for &ts in &timestamps {
            let dt = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;
            index.push(if daily { midnight(dt) } else { dt });
        }

        let n = index.len();
        let column = |values: &[Option<f64>]| -> Vec<RawValue> {
            (0..n)
                .map(|i| RawValue::from(values.get(i).copied().flatten()))
                .collect()
        };

        let mut frame = ProviderFrame {
            index,
            columns: Vec::new(),
        };
        frame.push_column(ColumnLabel::Flat("Open".into()), column(&quote.open));
        frame.push_column(ColumnLabel::Flat("High".into()), column(&quote.high));
        frame.push_column(ColumnLabel::Flat("Low".into()), column(&quote.low));
        frame.push_column(ColumnLabel::Flat("Close".into()), column(&quote.close));
        if let Some(adj) = adj_closes {
            frame.push_column(ColumnLabel::Flat("Adj Close".into()), column(&adj));
        }
        frame.push_column(ColumnLabel::Flat("Volume".into()), column(&quote.volume));

        Ok(frame)
    }

    fn fetch_once(&self, symbol: &str, window: &FetchWindow) -> Result<ProviderFrame, DataError> {
        let url = Self::chart_url(&self.base_url, symbol, window)?;

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, chart, window.is_daily())
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> DataSource {
        DataSource::YahooFinance
    }

    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<ProviderFrame, DataError> {
        self.fetch_once(symbol, window)
    }
}

fn day_bound(date: NaiveDate, h: u32, m: u32, s: u32) -> Result<i64, DataError> {
    date.and_hms_opt(h, m, s)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| DataError::ValidationError(format!("invalid date bound {date}")))
}

fn midnight(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_time(chrono::NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::normalize::normalize_frame;

    const SAMPLE: &str = r#"{
      "chart": {
        "result": [{
          "timestamp": [1704182400, 1704268800, 1704355200],
          "indicators": {
            "quote": [{
              "open":   [100.0, null, 102.0],
              "high":   [101.0, null, 103.5],
              "low":    [99.0,  null, 101.0],
              "close":  [100.5, null, 103.0],
              "volume": [1000,  null, 1200]
            }],
            "adjclose": [{"adjclose": [100.4, null, 102.9]}]
          }
        }],
        "error": null
      }
    }"#;

    #[test]
    fn parses_sample_and_normalizes() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let frame = YahooProvider::parse_response("ABC.NS", resp, true).unwrap();
        assert_eq!(frame.index.len(), 3);
        assert_eq!(frame.columns.len(), 6);

        let bars = normalize_frame("ABC.NS", frame).unwrap();
        // the all-null holiday row is dropped
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].volume, 1200.0);
        assert_eq!(
            bars[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            YahooProvider::parse_response("ZZZ.NS", resp, true),
            Err(DataError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn missing_timestamps_is_empty_response() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            YahooProvider::parse_response("ABC.NS", resp, true),
            Err(DataError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn intraday_timestamps_keep_time_of_day() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704188700],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[5]}]}}],
            "error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let frame = YahooProvider::parse_response("ABC.NS", resp, false).unwrap();
        assert_eq!(frame.index[0].time().to_string(), "09:45:00");
    }

    #[test]
    fn chart_url_forms() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let url = YahooProvider::chart_url(BASE_URL, "ABC.NS", &FetchWindow::daily(d, d)).unwrap();
        assert!(url.contains("/ABC.NS?period1=1704153600&period2=1704239999&interval=1d"));

        let url =
            YahooProvider::chart_url(BASE_URL, "ABC.BO", &FetchWindow::intraday("60d", "15m"))
                .unwrap();
        assert!(url.ends_with("/ABC.BO?range=60d&interval=15m&includeAdjustedClose=true"));
    }
}
