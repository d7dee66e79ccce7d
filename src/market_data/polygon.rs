//! Polygon.io: aggregates (primary bars), last NBBO (primary quote) and the
//! gainers/losers snapshot used for dynamic universe discovery.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::{get_json, normalize_bars, num, BarProvider, Mover, MoverDirection, MoversProvider, QuoteProvider, TopOfBook};
use crate::config::ProvidersConfig;
use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, BarInterval};

const NAME: &str = "polygon";

#[derive(Clone)]
pub struct PolygonProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PolygonProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key }
    }

    pub fn from_config(client: reqwest::Client, cfg: &ProvidersConfig) -> Self {
        Self::new(client, cfg.polygon_base_url.clone(), cfg.polygon_api_key.clone())
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::provider(NAME, "missing API key"))
    }
}

fn timespan(interval: BarInterval) -> (u32, &'static str) {
    match interval {
        | BarInterval::OneMinute => (1, "minute"),
        | BarInterval::FiveMinute => (5, "minute"),
        | BarInterval::Daily => (1, "day"),
    }
}

/// Parse an aggregates response (`results: [{t,o,h,l,c,v}]`).
pub fn parse_aggs(body: &Value) -> Result<Vec<Bar>> {
    if body["status"].as_str() == Some("ERROR") {
        let msg = body["error"].as_str().unwrap_or("unknown error");
        return Err(Error::provider(NAME, msg.to_string()));
    }
    let rows = body["results"]
        .as_array()
        .ok_or_else(|| Error::provider(NAME, "aggregates response without results"))?;
    let bars = rows
        .iter()
        .filter_map(|r| {
            let ts = r["t"].as_i64()?;
            Some(Bar {
                timestamp: Utc.timestamp_millis_opt(ts).single()?,
                open: num(&r["o"])?,
                high: num(&r["h"])?,
                low: num(&r["l"])?,
                close: num(&r["c"])?,
                volume: num(&r["v"]).unwrap_or(0.0),
            })
        })
        .collect();
    Ok(normalize_bars(bars))
}

/// Parse a last-NBBO response (`results: {P,S,p,s}`; upper case is the ask).
pub fn parse_nbbo(body: &Value) -> Result<TopOfBook> {
    let r = &body["results"];
    let quote = (|| {
        Some(TopOfBook {
            ask: num(&r["P"])?,
            ask_size: num(&r["S"])?,
            bid: num(&r["p"])?,
            bid_size: num(&r["s"])?,
        })
    })();
    quote
        .filter(|q| q.bid > 0.0 && q.ask > 0.0)
        .ok_or_else(|| Error::provider(NAME, "NBBO response missing bid/ask"))
}

/// Parse a gainers/losers snapshot. Rows without a usable price are skipped.
pub fn parse_movers(body: &Value) -> Vec<Mover> {
    let Some(rows) = body["tickers"].as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|t| {
            let symbol = t["ticker"].as_str()?.to_ascii_uppercase();
            let last_price = num(&t["lastTrade"]["p"])
                .or_else(|| num(&t["day"]["c"]))
                .or_else(|| num(&t["min"]["c"]))?;
            let change = num(&t["todaysChangePerc"]).or_else(|| num(&t["todaysChangePct"]))?;
            Some(Mover {
                symbol,
                last_price,
                day_volume: num(&t["day"]["v"]).unwrap_or(0.0),
                market_cap: num(&t["market_cap"]),
                change_pct: change / 100.0,
            })
        })
        .collect()
}

#[async_trait]
impl BarProvider for PolygonProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.key().is_ok()
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let (mult, span) = timespan(interval);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            mult,
            span,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let req = self.client.get(&url).query(&[
            ("adjusted", "true"),
            ("sort", "asc"),
            ("limit", "50000"),
            ("apiKey", self.key()?),
        ]);
        let body = get_json(NAME, req).await?;
        parse_aggs(&body)
    }
}

#[async_trait]
impl QuoteProvider for PolygonProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.key().is_ok()
    }

    async fn top_of_book(&self, symbol: &str) -> Result<TopOfBook> {
        let url = format!("{}/v2/last/nbbo/{}", self.base_url, symbol);
        let req = self.client.get(&url).query(&[("apiKey", self.key()?)]);
        let body = get_json(NAME, req).await?;
        parse_nbbo(&body)
    }
}

#[async_trait]
impl MoversProvider for PolygonProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn top_movers(&self, direction: MoverDirection) -> Result<Vec<Mover>> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/{}",
            self.base_url,
            direction.as_path()
        );
        let req = self.client.get(&url).query(&[("apiKey", self.key()?)]);
        let body = get_json(NAME, req).await?;
        Ok(parse_movers(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_aggregates() {
        let body = json!({
            "status": "OK",
            "results": [
                {"t": 1709564400000i64, "o": 10.0, "h": 10.5, "l": 9.9, "c": 10.2, "v": 1200},
                {"t": 1709564100000i64, "o": 9.8, "h": 10.1, "l": 9.7, "c": 10.0, "v": 900},
                {"t": 1709564700000i64, "o": 10.2}
            ]
        });
        let bars = parse_aggs(&body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.0);
        assert_eq!(bars[1].volume, 1200.0);
    }

    #[test]
    fn aggregate_error_status() {
        let body = json!({"status": "ERROR", "error": "bad key"});
        assert!(parse_aggs(&body).is_err());
        assert!(parse_aggs(&json!({"status": "OK"})).is_err());
    }

    #[test]
    fn parses_nbbo() {
        let body = json!({"results": {"P": 100.05, "S": 300, "p": 100.0, "s": 500}});
        let q = parse_nbbo(&body).unwrap();
        assert_eq!(q.ask, 100.05);
        assert_eq!(q.bid_size, 500.0);
        assert!(parse_nbbo(&json!({"results": {}})).is_err());
    }

    #[test]
    fn parses_movers() {
        let body = json!({"tickers": [
            {"ticker": "abcd", "todaysChangePerc": 12.5, "lastTrade": {"p": 20.0}, "day": {"v": 2_000_000}},
            {"ticker": "NOPX", "todaysChangePerc": 3.0, "day": {"c": 5.0, "v": 10}},
            {"ticker": "BAD"}
        ]});
        let movers = parse_movers(&body);
        assert_eq!(movers.len(), 2);
        assert_eq!(movers[0].symbol, "ABCD");
        assert!((movers[0].change_pct - 0.125).abs() < 1e-12);
        assert_eq!(movers[1].last_price, 5.0);
        assert!(movers[0].market_cap.is_none());
    }
}
