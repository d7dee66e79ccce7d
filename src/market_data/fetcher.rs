//! Fail-fast provider chain for OHLCV bars.
//!
//! Providers are tried strictly in priority order. Each gets exactly one
//! request bounded by `request_timeout`; any error, timeout or short series
//! falls through to the next provider. There are no retries, so a dead
//! provider costs at most one timeout per symbol.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::{alpha_vantage::AlphaVantageProvider, finnhub::FinnhubProvider, polygon::PolygonProvider, BarProvider};
use crate::config::ProvidersConfig;
use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, BarInterval};

/// Bars for one symbol plus the provider that served them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedBars {
    pub bars: Vec<Bar>,
    pub provider: String,
}

impl FetchedBars {
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

pub struct MarketDataFetcher {
    providers: Vec<Arc<dyn BarProvider>>,
    request_timeout: Duration,
    min_intraday_bars: usize,
    min_daily_bars: usize,
}

impl MarketDataFetcher {
    pub fn new(
        providers: Vec<Arc<dyn BarProvider>>,
        request_timeout: Duration,
        min_intraday_bars: usize,
        min_daily_bars: usize,
    ) -> Self {
        Self { providers, request_timeout, min_intraday_bars, min_daily_bars }
    }

    /// Polygon, then Finnhub, then Alpha Vantage.
    pub fn from_config(cfg: &ProvidersConfig, client: reqwest::Client) -> Self {
        let providers: Vec<Arc<dyn BarProvider>> = vec![
            Arc::new(PolygonProvider::from_config(client.clone(), cfg)),
            Arc::new(FinnhubProvider::from_config(client.clone(), cfg)),
            Arc::new(AlphaVantageProvider::from_config(client, cfg)),
        ];
        Self::new(
            providers,
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.min_intraday_bars,
            cfg.min_daily_bars,
        )
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn min_bars(&self, interval: BarInterval) -> usize {
        if interval.is_intraday() {
            self.min_intraday_bars
        } else {
            self.min_daily_bars
        }
    }

    /// Fetch the default look-back window ending now.
    pub async fn fetch(&self, symbol: &str, interval: BarInterval) -> Option<FetchedBars> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(interval.lookback_days());
        self.fetch_range(symbol, interval, from, to).await
    }

    /// Walk the provider chain once. `None` means every provider failed.
    pub async fn fetch_range(
        &self,
        symbol: &str,
        interval: BarInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<FetchedBars> {
        let min_bars = self.min_bars(interval);
        for provider in &self.providers {
            let name = provider.name();
            if !provider.is_configured() {
                debug!("{symbol}: skipping {name} (not configured)");
                continue;
            }
            match self.attempt(provider.as_ref(), symbol, interval, from, to).await {
                | Ok(bars) if bars.len() >= min_bars => {
                    increment_counter!(crate::metrics::PROVIDER_REQUESTS, "provider" => name, "outcome" => "ok");
                    return Some(FetchedBars { bars, provider: name.to_string() });
                }
                | Ok(bars) => {
                    debug!("{symbol}: {name} returned {} {interval} bars, need {min_bars}", bars.len());
                    increment_counter!(crate::metrics::PROVIDER_REQUESTS, "provider" => name, "outcome" => "short");
                }
                | Err(e @ Error::Timeout(_)) => {
                    debug!("{symbol}: {name}: {e}");
                    increment_counter!(crate::metrics::PROVIDER_REQUESTS, "provider" => name, "outcome" => "timeout");
                }
                | Err(e) => {
                    debug!("{symbol}: {name} failed: {e}");
                    increment_counter!(crate::metrics::PROVIDER_REQUESTS, "provider" => name, "outcome" => "error");
                }
            }
        }
        debug!("{symbol}: no provider returned usable {interval} bars");
        None
    }

    /// One bounded request; an overrun becomes [`Error::Timeout`].
    async fn attempt(
        &self,
        provider: &dyn BarProvider,
        symbol: &str,
        interval: BarInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        match timeout(self.request_timeout, provider.fetch_bars(symbol, interval, from, to)).await {
            | Ok(result) => result,
            | Err(_) => Err(Error::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        (0..n)
            .map(|i| Bar {
                timestamp: start + ChronoDuration::minutes(5 * i as i64),
                open: 10.0,
                high: 10.1,
                low: 9.9,
                close: 10.0,
                volume: 1_000.0,
            })
            .collect()
    }

    enum Behaviour {
        Bars(usize),
        Fail,
        Hang,
        Unconfigured,
    }

    struct Scripted {
        name: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { name, behaviour, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl BarProvider for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_configured(&self) -> bool {
            !matches!(self.behaviour, Behaviour::Unconfigured)
        }
        async fn fetch_bars(&self, _: &str, _: BarInterval, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                | Behaviour::Bars(n) => Ok(bars(n)),
                | Behaviour::Fail | Behaviour::Unconfigured => Err(Error::provider(self.name, "boom")),
                | Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(bars(50))
                }
            }
        }
    }

    fn fetcher(providers: Vec<Arc<dyn BarProvider>>) -> MarketDataFetcher {
        MarketDataFetcher::new(providers, Duration::from_millis(50), 10, 10)
    }

    #[tokio::test]
    async fn falls_through_to_first_healthy_provider() {
        let a = Scripted::new("a", Behaviour::Fail);
        let b = Scripted::new("b", Behaviour::Hang);
        let c = Scripted::new("c", Behaviour::Bars(20));
        let f = fetcher(vec![a.clone(), b.clone(), c.clone()]);
        let got = f.fetch("AAPL", BarInterval::FiveMinute).await.unwrap();
        assert_eq!(got.provider, "c");
        assert_eq!(got.bars.len(), 20);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_series_is_not_usable() {
        let a = Scripted::new("a", Behaviour::Bars(4));
        let f = fetcher(vec![a.clone()]);
        assert!(f.fetch("AAPL", BarInterval::FiveMinute).await.is_none());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_providers_are_not_called() {
        let a = Scripted::new("a", Behaviour::Unconfigured);
        let b = Scripted::new("b", Behaviour::Bars(12));
        let f = fetcher(vec![a.clone(), b]);
        assert_eq!(f.fetch("MSFT", BarInterval::Daily).await.unwrap().provider, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overrun_is_reported_as_timeout() {
        let slow = Scripted::new("slow", Behaviour::Hang);
        let f = fetcher(vec![slow.clone()]);
        let now = Utc::now();
        let got = f.attempt(slow.as_ref(), "AAPL", BarInterval::FiveMinute, now - ChronoDuration::days(1), now).await;
        assert_matches!(got, Err(Error::Timeout(50)));
    }

    #[test]
    fn default_chain_order() {
        let f = MarketDataFetcher::from_config(&ProvidersConfig::default(), reqwest::Client::new());
        assert_eq!(f.provider_names(), vec!["polygon", "finnhub", "alpha_vantage"]);
    }
}
