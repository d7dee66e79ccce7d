//! Alpaca latest-quote endpoint, the secondary top-of-book source.
//!
//! Needs both `APCA-API-KEY-ID` and `APCA-API-SECRET-KEY`; without them the
//! provider reports itself unconfigured and is skipped.

use async_trait::async_trait;
use serde::Deserialize;

use super::{QuoteProvider, TopOfBook};
use crate::config::ProvidersConfig;
use crate::utils::error::{Error, Result};

const NAME: &str = "alpaca";

#[derive(Clone)]
pub struct AlpacaQuoteProvider {
    client: reqwest::Client,
    base_url: String,
    key_id: Option<String>,
    secret: Option<String>,
}

impl AlpacaQuoteProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        key_id: Option<String>,
        secret: Option<String>,
    ) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), key_id, secret }
    }

    pub fn from_config(client: reqwest::Client, cfg: &ProvidersConfig) -> Self {
        Self::new(
            client,
            cfg.alpaca_data_base_url.clone(),
            cfg.alpaca_api_key_id.clone(),
            cfg.alpaca_api_secret_key.clone(),
        )
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.key_id.as_deref(), self.secret.as_deref()) {
            | (Some(k), Some(s)) if !k.is_empty() && !s.is_empty() => Some((k, s)),
            | _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestQuote {
    quote: Quote,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(rename = "ap")]
    ask: f64,
    #[serde(rename = "as", default)]
    ask_size: f64,
    #[serde(rename = "bp")]
    bid: f64,
    #[serde(rename = "bs", default)]
    bid_size: f64,
}

/// Decode a `/v2/stocks/{sym}/quotes/latest` body.
pub fn parse_latest_quote(body: serde_json::Value) -> Result<TopOfBook> {
    let LatestQuote { quote } = serde_json::from_value(body)
        .map_err(|e| Error::provider(NAME, format!("malformed quote: {e}")))?;
    if quote.bid <= 0.0 || quote.ask <= 0.0 {
        return Err(Error::provider(NAME, "quote without two-sided market"));
    }
    Ok(TopOfBook { bid: quote.bid, ask: quote.ask, bid_size: quote.bid_size, ask_size: quote.ask_size })
}

#[async_trait]
impl QuoteProvider for AlpacaQuoteProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    async fn top_of_book(&self, symbol: &str) -> Result<TopOfBook> {
        let (key, secret) =
            self.credentials().ok_or_else(|| Error::provider(NAME, "missing API credentials"))?;
        let url = format!("{}/v2/stocks/{}/quotes/latest", self.base_url, symbol);
        let req = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", key)
            .header("APCA-API-SECRET-KEY", secret);
        let body = super::get_json(NAME, req).await?;
        parse_latest_quote(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_quote() {
        let q = parse_latest_quote(json!({"symbol": "AAPL", "quote": {"ap": 190.1, "as": 3, "bp": 190.0, "bs": 5}})).unwrap();
        assert_eq!(q.bid, 190.0);
        assert_eq!(q.ask_size, 3.0);
    }

    #[test]
    fn one_sided_quote_rejected() {
        assert!(parse_latest_quote(json!({"quote": {"ap": 0.0, "bp": 190.0}})).is_err());
        assert!(parse_latest_quote(json!({"message": "forbidden"})).is_err());
    }

    #[test]
    fn unconfigured_without_secret() {
        let p = AlpacaQuoteProvider::new(reqwest::Client::new(), "http://x", Some("id".into()), None);
        assert!(!p.is_configured());
    }
}
