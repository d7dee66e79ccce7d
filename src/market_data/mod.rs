//! Market-data providers and the fail-fast fetch chain.
//!
//! Three provider roles exist: OHLCV bars, top-of-book quotes and top-movers
//! snapshots. A concrete provider may implement any subset of them. Every
//! response is parsed leniently; only price/volume/OHLC fields are required.

pub mod alpaca;
pub mod alpha_vantage;
pub mod fetcher;
pub mod finnhub;
pub mod polygon;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, BarInterval};

pub use fetcher::{FetchedBars, MarketDataFetcher};

/// Source of OHLCV bars.
#[async_trait]
pub trait BarProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Providers without credentials are skipped by the fetch chain.
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;
}

/// Best bid/ask with displayed sizes (shares).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
}

/// Source of top-of-book quotes.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn top_of_book(&self, symbol: &str) -> Result<TopOfBook>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoverDirection {
    Gainers,
    Losers,
}

impl MoverDirection {
    pub fn as_path(&self) -> &'static str {
        match self {
            | MoverDirection::Gainers => "gainers",
            | MoverDirection::Losers => "losers",
        }
    }
}

/// One row of a top-movers snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub last_price: f64,
    pub day_volume: f64,
    pub market_cap: Option<f64>,
    /// Fractional change on the day (0.05 = +5%)
    pub change_pct: f64,
}

/// Source of ranked top-movers lists.
#[async_trait]
pub trait MoversProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn top_movers(&self, direction: MoverDirection) -> Result<Vec<Mover>>;
}

/// Build the shared HTTP client used by every provider.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("signal-desk/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// GET `url` and decode the body as loose JSON. Non-2xx statuses become
/// provider errors carrying the status code.
pub(crate) async fn get_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<Value> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::provider(provider, format!("HTTP {status}")));
    }
    let body: Value = resp.json().await?;
    Ok(body)
}

/// Read a number that may arrive as JSON number or numeric string.
pub(crate) fn num(v: &Value) -> Option<f64> {
    match v {
        | Value::Number(n) => n.as_f64(),
        | Value::String(s) => s.trim().parse::<f64>().ok(),
        | _ => None,
    }
    .filter(|x| x.is_finite())
}

/// Keep only well-formed bars, sorted ascending with duplicate timestamps removed.
pub(crate) fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.retain(|b| {
        b.close > 0.0 && b.high >= b.low && b.volume >= 0.0 && b.open.is_finite()
    });
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}
