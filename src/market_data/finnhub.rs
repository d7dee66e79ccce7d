//! Finnhub stock candles, the secondary bar source.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::{get_json, normalize_bars, num, BarProvider};
use crate::config::ProvidersConfig;
use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, BarInterval};

const NAME: &str = "finnhub";

#[derive(Clone)]
pub struct FinnhubProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FinnhubProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key }
    }

    pub fn from_config(client: reqwest::Client, cfg: &ProvidersConfig) -> Self {
        Self::new(client, cfg.finnhub_base_url.clone(), cfg.finnhub_api_key.clone())
    }
}

fn resolution(interval: BarInterval) -> &'static str {
    match interval {
        | BarInterval::OneMinute => "1",
        | BarInterval::FiveMinute => "5",
        | BarInterval::Daily => "D",
    }
}

/// Parse a candle response: `s` status plus parallel `t/o/h/l/c/v` arrays.
pub fn parse_candles(body: &Value) -> Result<Vec<Bar>> {
    match body["s"].as_str() {
        | Some("ok") => {}
        | Some(other) => return Err(Error::provider(NAME, format!("status {other}"))),
        | None => return Err(Error::provider(NAME, "candle response without status")),
    }
    let col = |k: &str| body[k].as_array().cloned().unwrap_or_default();
    let (t, o, h, l, c, v) = (col("t"), col("o"), col("h"), col("l"), col("c"), col("v"));
    let bars = t
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            Some(Bar {
                timestamp: Utc.timestamp_opt(ts.as_i64()?, 0).single()?,
                open: num(o.get(i)?)?,
                high: num(h.get(i)?)?,
                low: num(l.get(i)?)?,
                close: num(c.get(i)?)?,
                volume: v.get(i).and_then(num).unwrap_or(0.0),
            })
        })
        .collect();
    Ok(normalize_bars(bars))
}

#[async_trait]
impl BarProvider for FinnhubProvider {
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
        let token = self.api_key.as_deref().ok_or_else(|| Error::provider(NAME, "missing API key"))?;
        let url = format!("{}/stock/candle", self.base_url);
        let req = self.client.get(&url).query(&[
            ("symbol", symbol.to_string()),
            ("resolution", resolution(interval).to_string()),
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
            ("token", token.to_string()),
        ]);
        let body = get_json(NAME, req).await?;
        parse_candles(&body)
    }
}
