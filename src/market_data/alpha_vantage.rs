//! Alpha Vantage time series, the last-resort bar source.
//!
//! Timestamps come back as naive exchange-local strings and are interpreted
//! in US/Eastern.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde_json::Value;

use super::{get_json, normalize_bars, num, BarProvider};
use crate::config::ProvidersConfig;
use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, BarInterval};

const NAME: &str = "alpha_vantage";

#[derive(Clone)]
pub struct AlphaVantageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AlphaVantageProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key }
    }

    pub fn from_config(client: reqwest::Client, cfg: &ProvidersConfig) -> Self {
        Self::new(client, cfg.alpha_vantage_base_url.clone(), cfg.alpha_vantage_api_key.clone())
    }
}

fn series_key(interval: BarInterval) -> &'static str {
    match interval {
        | BarInterval::OneMinute => "Time Series (1min)",
        | BarInterval::FiveMinute => "Time Series (5min)",
        | BarInterval::Daily => "Time Series (Daily)",
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(16, 0, 0))?;
    New_York.from_local_datetime(&naive).earliest().map(|dt| dt.with_timezone(&Utc))
}

/// Parse a `Time Series (...)` object keyed by local timestamp.
pub fn parse_series(body: &Value, interval: BarInterval) -> Result<Vec<Bar>> {
    if let Some(note) = body["Note"].as_str().or_else(|| body["Information"].as_str()) {
        return Err(Error::provider(NAME, note.to_string()));
    }
    if let Some(msg) = body["Error Message"].as_str() {
        return Err(Error::provider(NAME, msg.to_string()));
    }
    let series = body[series_key(interval)]
        .as_object()
        .ok_or_else(|| Error::provider(NAME, "response without time series"))?;
    let bars = series
        .iter()
        .filter_map(|(ts, row)| {
            Some(Bar {
                timestamp: parse_timestamp(ts)?,
                open: num(&row["1. open"])?,
                high: num(&row["2. high"])?,
                low: num(&row["3. low"])?,
                close: num(&row["4. close"])?,
                volume: num(&row["5. volume"]).unwrap_or(0.0),
            })
        })
        .collect();
    Ok(normalize_bars(bars))
}

#[async_trait]
impl BarProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let key = self.api_key.as_deref().ok_or_else(|| Error::provider(NAME, "missing API key"))?;
        let mut params = vec![("symbol", symbol), ("apikey", key), ("outputsize", "full")];
        match interval {
            | BarInterval::Daily => params.push(("function", "TIME_SERIES_DAILY")),
            | BarInterval::OneMinute => {
                params.push(("function", "TIME_SERIES_INTRADAY"));
                params.push(("interval", "1min"));
            }
            | BarInterval::FiveMinute => {
                params.push(("function", "TIME_SERIES_INTRADAY"));
                params.push(("interval", "5min"));
            }
        }
        let url = format!("{}/query", self.base_url);
        let body = get_json(NAME, self.client.get(&url).query(&params)).await?;
        let mut bars = parse_series(&body, interval)?;
        bars.retain(|b| b.timestamp >= from && b.timestamp <= to);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn parses_intraday_in_eastern_time() {
        let body = json!({
            "Time Series (5min)": {
                "2024-03-04 09:35:00": {"1. open": "10.0", "2. high": "10.4", "3. low": "9.9", "4. close": "10.3", "5. volume": "5000"},
                "2024-03-04 09:30:00": {"1. open": "9.9", "2. high": "10.1", "3. low": "9.8", "4. close": "10.0", "5. volume": "7000"}
            }
        });
        let bars = parse_series(&body, BarInterval::FiveMinute).unwrap();
        assert_eq!(bars.len(), 2);
        // 09:30 EST == 14:30 UTC
        assert_eq!(bars[0].timestamp.hour(), 14);
        assert_eq!(bars[0].timestamp.minute(), 30);
        assert_eq!(bars[1].close, 10.3);
    }

    #[test]
    fn rate_limit_note_is_an_error() {
        let body = json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"});
        assert!(parse_series(&body, BarInterval::Daily).is_err());
    }
}
