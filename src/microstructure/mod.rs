//! Order-book snapshots, the tradeability filter and the 0-10
//! execution-quality score.
//!
//! Missing microstructure is never fatal: without a snapshot a symbol is
//! tradeable with a warning and scores a neutral quality.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::cache::{self, keys, Cache};
use crate::config::{MicrostructureConfig, ProvidersConfig};
use crate::market_data::{alpaca::AlpacaQuoteProvider, polygon::PolygonProvider, QuoteProvider, TopOfBook};
use crate::utils::types::DayMode;

/// Derived top-of-book state. Depth is in dollars (price x displayed size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostructureSnapshot {
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub spread: f64,
    pub spread_bps: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub order_imbalance: f64,
    pub depth_imbalance: f64,
    pub mid_price: f64,
    pub provider: String,
    pub as_of: DateTime<Utc>,
}

fn imbalance(bid: f64, ask: f64) -> f64 {
    let total = bid + ask;
    if total <= 0.0 {
        return 0.0;
    }
    ((bid - ask) / total).clamp(-1.0, 1.0)
}

impl MicrostructureSnapshot {
    /// `None` for one-sided or crossed books.
    pub fn from_top_of_book(tob: &TopOfBook, provider: &str, as_of: DateTime<Utc>) -> Option<Self> {
        if !(tob.bid > 0.0 && tob.ask > 0.0 && tob.ask >= tob.bid) {
            return None;
        }
        let bid_size = tob.bid_size.max(0.0);
        let ask_size = tob.ask_size.max(0.0);
        let mid = (tob.bid + tob.ask) / 2.0;
        let spread = tob.ask - tob.bid;
        let bid_depth = tob.bid * bid_size;
        let ask_depth = tob.ask * ask_size;
        Some(Self {
            best_bid: tob.bid,
            best_ask: tob.ask,
            bid_size,
            ask_size,
            spread,
            spread_bps: (spread / mid * 10_000.0).max(0.0),
            bid_depth,
            ask_depth,
            order_imbalance: imbalance(bid_size, ask_size),
            depth_imbalance: imbalance(bid_depth, ask_depth),
            mid_price: mid,
            provider: provider.to_string(),
            as_of,
        })
    }

    pub fn total_depth(&self) -> f64 {
        self.bid_depth + self.ask_depth
    }
}

/// Outcome of the spread/depth gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeabilityVerdict {
    pub tradeable: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
}

/// Spread/depth gate for `mode`. Warnings never block.
pub fn assess_tradeability(
    cfg: &MicrostructureConfig,
    symbol: &str,
    mode: DayMode,
    snapshot: Option<&MicrostructureSnapshot>,
) -> TradeabilityVerdict {
    let Some(snap) = snapshot else {
        return TradeabilityVerdict {
            tradeable: true,
            reason: None,
            warnings: vec![format!("{symbol}: no microstructure data, spread and depth unchecked")],
        };
    };

    let max_spread = cfg.max_spread_bps(mode);
    let min_depth = cfg.min_depth_usd(mode);
    let depth = snap.total_depth();
    let mut warnings = Vec::new();

    if snap.spread_bps > max_spread {
        return TradeabilityVerdict {
            tradeable: false,
            reason: Some(format!("spread {:.1} bps exceeds {:.0} bps {} limit", snap.spread_bps, max_spread, mode)),
            warnings,
        };
    }
    if depth < min_depth {
        return TradeabilityVerdict {
            tradeable: false,
            reason: Some(format!("depth ${:.0} below ${:.0} {} floor", depth, min_depth, mode)),
            warnings,
        };
    }

    if snap.spread_bps > max_spread * cfg.spread_warning_ratio {
        warnings.push(format!("spread {:.1} bps close to {:.0} bps limit", snap.spread_bps, max_spread));
    }
    if depth < min_depth * cfg.depth_warning_ratio {
        warnings.push(format!("depth ${:.0} close to ${:.0} floor", depth, min_depth));
    }
    if snap.order_imbalance.abs() > cfg.imbalance_warning {
        let heavy = if snap.order_imbalance > 0.0 { "bid" } else { "ask" };
        warnings.push(format!("order book {heavy}-heavy (imbalance {:.2})", snap.order_imbalance));
    }

    TradeabilityVerdict { tradeable: true, reason: None, warnings }
}

/// Banded 0-10 score: spread (0-4) + depth (0-3) + imbalance (0-3).
pub fn execution_quality_score(cfg: &MicrostructureConfig, snapshot: Option<&MicrostructureSnapshot>) -> f64 {
    let Some(snap) = snapshot else {
        return cfg.neutral_quality_score;
    };

    let spread_score = cfg
        .spread_bands_bps
        .iter()
        .position(|&limit| snap.spread_bps < limit)
        .map_or(0.0, |i| (4 - i) as f64);

    let depth = snap.total_depth();
    let depth_score = cfg
        .depth_bands_usd
        .iter()
        .position(|&floor| depth >= floor)
        .map_or(0.0, |i| (3 - i) as f64);

    let oi = snap.order_imbalance.abs();
    let imbalance_score = cfg
        .imbalance_bands
        .iter()
        .position(|&limit| oi < limit)
        .map_or(0.0, |i| (3 - i) as f64);

    (spread_score + depth_score + imbalance_score).clamp(0.0, 10.0)
}

/// Fetches snapshots through the quote-provider chain and caches them briefly.
pub struct MicrostructureService {
    providers: Vec<Arc<dyn QuoteProvider>>,
    request_timeout: Duration,
    cache: Arc<dyn Cache>,
    config: MicrostructureConfig,
}

impl MicrostructureService {
    pub fn new(
        providers: Vec<Arc<dyn QuoteProvider>>,
        request_timeout: Duration,
        cache: Arc<dyn Cache>,
        config: MicrostructureConfig,
    ) -> Self {
        Self { providers, request_timeout, cache, config }
    }

    /// Polygon NBBO, then Alpaca latest quote.
    pub fn from_config(
        providers_cfg: &ProvidersConfig,
        config: MicrostructureConfig,
        client: reqwest::Client,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let providers: Vec<Arc<dyn QuoteProvider>> = vec![
            Arc::new(PolygonProvider::from_config(client.clone(), providers_cfg)),
            Arc::new(AlpacaQuoteProvider::from_config(client, providers_cfg)),
        ];
        Self::new(providers, Duration::from_millis(providers_cfg.request_timeout_ms), cache, config)
    }

    pub fn config(&self) -> &MicrostructureConfig {
        &self.config
    }

    pub async fn snapshot(&self, symbol: &str) -> Option<MicrostructureSnapshot> {
        let key = keys::microstructure(symbol);
        if let Some(hit) = cache::get_json::<MicrostructureSnapshot>(self.cache.as_ref(), &key).await {
            return Some(hit);
        }

        for provider in &self.providers {
            let name = provider.name();
            if !provider.is_configured() {
                continue;
            }
            match timeout(self.request_timeout, provider.top_of_book(symbol)).await {
                | Ok(Ok(tob)) => {
                    if let Some(snap) = MicrostructureSnapshot::from_top_of_book(&tob, name, Utc::now()) {
                        let ttl = Duration::from_secs(self.config.snapshot_ttl_secs);
                        if let Err(e) = cache::set_json(self.cache.as_ref(), &key, &snap, ttl).await {
                            debug!("{symbol}: could not cache snapshot: {e}");
                        }
                        return Some(snap);
                    }
                    debug!("{symbol}: {name} returned an unusable book");
                }
                | Ok(Err(e)) => debug!("{symbol}: {name} quote failed: {e}"),
                | Err(_) => debug!("{symbol}: {name} quote timed out"),
            }
        }
        None
    }

    pub fn is_tradeable(
        &self,
        symbol: &str,
        mode: DayMode,
        snapshot: Option<&MicrostructureSnapshot>,
    ) -> TradeabilityVerdict {
        assess_tradeability(&self.config, symbol, mode, snapshot)
    }

    pub fn execution_quality_score(&self, snapshot: Option<&MicrostructureSnapshot>) -> f64 {
        execution_quality_score(&self.config, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::utils::error::{Error, Result};
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snap(bid: f64, ask: f64, bid_size: f64, ask_size: f64) -> MicrostructureSnapshot {
        let tob = TopOfBook { bid, ask, bid_size, ask_size };
        MicrostructureSnapshot::from_top_of_book(&tob, "test", Utc::now()).unwrap()
    }

    #[test]
    fn derives_spread_and_imbalance() {
        let s = snap(99.95, 100.05, 3_000.0, 1_000.0);
        assert!((s.spread_bps - 10.0).abs() < 1e-9);
        assert!((s.order_imbalance - 0.5).abs() < 1e-9);
        assert!(s.depth_imbalance > 0.0 && s.depth_imbalance <= 1.0);
        assert!((s.mid_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn crossed_book_is_rejected() {
        let tob = TopOfBook { bid: 10.1, ask: 10.0, bid_size: 1.0, ask_size: 1.0 };
        assert!(MicrostructureSnapshot::from_top_of_book(&tob, "x", Utc::now()).is_none());
    }

    #[test]
    fn missing_snapshot_is_neutral() {
        let cfg = MicrostructureConfig::default();
        let v = assess_tradeability(&cfg, "AAPL", DayMode::Safe, None);
        assert!(v.tradeable);
        assert_eq!(v.warnings.len(), 1);
        assert_eq!(execution_quality_score(&cfg, None), 5.0);
    }

    #[rstest]
    #[case(DayMode::Safe, 99.7, 100.3, false)] // 60 bps
    #[case(DayMode::Aggressive, 99.7, 100.3, true)]
    #[case(DayMode::Safe, 99.9, 100.1, true)] // 20 bps
    fn spread_gate_by_mode(#[case] mode: DayMode, #[case] bid: f64, #[case] ask: f64, #[case] ok: bool) {
        let cfg = MicrostructureConfig::default();
        let s = snap(bid, ask, 2_000.0, 2_000.0);
        assert_eq!(assess_tradeability(&cfg, "X", mode, Some(&s)).tradeable, ok);
    }

    #[test]
    fn thin_book_rejected_for_safe_only() {
        let cfg = MicrostructureConfig::default();
        // $70k total depth
        let s = snap(99.99, 100.01, 350.0, 350.0);
        assert!(!assess_tradeability(&cfg, "X", DayMode::Safe, Some(&s)).tradeable);
        let aggressive = assess_tradeability(&cfg, "X", DayMode::Aggressive, Some(&s));
        assert!(aggressive.tradeable);
        assert!(aggressive.warnings.iter().any(|w| w.contains("depth")));
    }

    #[test]
    fn one_sided_book_warns() {
        let cfg = MicrostructureConfig::default();
        let s = snap(99.99, 100.01, 19_000.0, 1_000.0);
        let v = assess_tradeability(&cfg, "X", DayMode::Safe, Some(&s));
        assert!(v.tradeable);
        assert!(v.warnings.iter().any(|w| w.contains("bid-heavy")));
    }

    #[test]
    fn quality_score_bands() {
        let cfg = MicrostructureConfig::default();
        // 2 bps spread, $2M depth, balanced book
        let best = snap(99.99, 100.01, 10_000.0, 10_000.0);
        assert_eq!(execution_quality_score(&cfg, Some(&best)), 10.0);
        // 200 bps spread, tiny depth, fully one-sided
        let worst = snap(99.0, 101.0, 10.0, 0.0);
        assert_eq!(execution_quality_score(&cfg, Some(&worst)), 0.0);
        // 20 bps -> 3, $600k -> 2, imbalance 0.33 -> 2
        let mid = snap(99.9, 100.1, 4_000.0, 2_000.0);
        assert_eq!(execution_quality_score(&cfg, Some(&mid)), 7.0);
    }

    struct CountingQuotes {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteProvider for CountingQuotes {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn top_of_book(&self, _symbol: &str) -> Result<TopOfBook> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::provider("counting", "down"));
            }
            Ok(TopOfBook { bid: 50.0, ask: 50.02, bid_size: 2_000.0, ask_size: 2_000.0 })
        }
    }

    #[tokio::test]
    async fn snapshot_falls_through_and_caches() {
        let down = Arc::new(CountingQuotes { fail: true, calls: AtomicUsize::new(0) });
        let up = Arc::new(CountingQuotes { fail: false, calls: AtomicUsize::new(0) });
        let svc = MicrostructureService::new(
            vec![down.clone(), up.clone()],
            Duration::from_millis(100),
            Arc::new(MemoryCache::new()),
            MicrostructureConfig::default(),
        );
        let first = svc.snapshot("AMD").await.unwrap();
        let second = svc.snapshot("AMD").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
        assert_eq!(up.calls.load(Ordering::SeqCst), 1);
    }
}
