//! In-process fake providers and wiring shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::America::New_York;

use signal_desk::cache::{Cache, MemoryCache};
use signal_desk::config::Config;
use signal_desk::market_data::{
    BarProvider, MarketDataFetcher, Mover, MoverDirection, MoversProvider, QuoteProvider, TopOfBook,
};
use signal_desk::microstructure::MicrostructureService;
use signal_desk::persistence::{MemorySignalStore, SignalStore};
use signal_desk::pipeline::ScanEngine;
use signal_desk::risk::BracketBuilder;
use signal_desk::signal::SignalAssembler;
use signal_desk::universe::UniverseDiscovery;
use signal_desk::utils::error::{Error, Result};
use signal_desk::utils::types::{Bar, BarInterval};
use signal_desk::SignalDesk;

/// Serves fixed series per symbol; unknown symbols fail.
pub struct FakeBars {
    pub name: &'static str,
    pub series: HashMap<String, Vec<Bar>>,
    pub calls: AtomicUsize,
}

impl FakeBars {
    pub fn new(name: &'static str) -> Self {
        Self { name, series: HashMap::new(), calls: AtomicUsize::new(0) }
    }

    pub fn with(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.series.insert(symbol.to_string(), bars);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BarProvider for FakeBars {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        _interval: BarInterval,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.series.get(symbol).cloned().ok_or_else(|| Error::provider(self.name, format!("no data for {symbol}")))
    }
}

/// Never answers inside any sane timeout.
pub struct HangingBars {
    pub calls: AtomicUsize,
}

#[async_trait]
impl BarProvider for HangingBars {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn fetch_bars(&self, _: &str, _: BarInterval, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Bar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

pub struct FakeQuotes {
    pub book: TopOfBook,
}

#[async_trait]
impl QuoteProvider for FakeQuotes {
    fn name(&self) -> &'static str {
        "fake-quotes"
    }

    async fn top_of_book(&self, _symbol: &str) -> Result<TopOfBook> {
        Ok(self.book)
    }
}

pub struct FakeMovers {
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
}

#[async_trait]
impl MoversProvider for FakeMovers {
    fn name(&self) -> &'static str {
        "fake-movers"
    }

    async fn top_movers(&self, direction: MoverDirection) -> Result<Vec<Mover>> {
        Ok(match direction {
            | MoverDirection::Gainers => self.gainers.clone(),
            | MoverDirection::Losers => self.losers.clone(),
        })
    }
}

pub fn mover(symbol: &str, change_pct: f64) -> Mover {
    Mover {
        symbol: symbol.to_string(),
        last_price: 120.0,
        day_volume: 20_000_000.0,
        market_cap: Some(900_000_000_000.0),
        change_pct,
    }
}

pub fn et(h: u32, m: u32) -> DateTime<Utc> {
    New_York.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap().with_timezone(&Utc)
}

/// `n` five-minute bars from 09:30 ET, closes compounding by `step` per bar,
/// each bar spanning ±`half_range` around its close.
pub fn trending_bars(n: usize, start: f64, step: f64, half_range: f64, volume: f64) -> Vec<Bar> {
    let t0 = et(9, 30);
    (0..n)
        .map(|i| {
            let close = start * (1.0 + step).powi(i as i32);
            Bar {
                timestamp: t0 + ChronoDuration::minutes(5 * i as i64),
                open: close / (1.0 + step),
                high: close * (1.0 + half_range),
                low: close * (1.0 - half_range),
                close,
                volume,
            }
        })
        .collect()
}

/// Bars that qualify as a SAFE long: steady climb, tight ranges, heavy volume.
pub fn safe_long_bars() -> Vec<Bar> {
    trending_bars(40, 100.0, 0.002, 0.004, 200_000.0)
}

/// Defaults with tight budgets, a given curated list and no daily context fetch.
pub fn test_config(core: &[&str]) -> Config {
    let mut config = Config::default();
    let list: Vec<String> = core.iter().map(|s| s.to_string()).collect();
    config.universe.safe_core = list.clone();
    config.universe.aggressive_core = list.clone();
    config.universe.swing_core = list;
    config.providers.request_timeout_ms = 200;
    config.providers.symbol_budget_ms = 3_000;
    config.providers.fetch_daily_context = false;
    config.storage.in_memory = true;
    config
}

pub struct Harness {
    pub cache: Arc<dyn Cache>,
    pub store: Arc<dyn SignalStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self { cache: Arc::new(MemoryCache::new()), store: Arc::new(MemorySignalStore::new()) }
    }

    pub fn engine(
        &self,
        config: &Config,
        bars: Vec<Arc<dyn BarProvider>>,
        quotes: Vec<Arc<dyn QuoteProvider>>,
        movers: Option<Arc<dyn MoversProvider>>,
    ) -> ScanEngine {
        let timeout = Duration::from_millis(config.providers.request_timeout_ms);
        let discovery = UniverseDiscovery::new(movers, self.cache.clone(), config.universe.clone(), timeout);
        let fetcher = Arc::new(MarketDataFetcher::new(
            bars,
            timeout,
            config.providers.min_intraday_bars,
            config.providers.min_daily_bars,
        ));
        let micro = Arc::new(MicrostructureService::new(
            quotes,
            timeout,
            self.cache.clone(),
            config.microstructure.clone(),
        ));
        let assembler = SignalAssembler::new(BracketBuilder::new(config.risk.clone()), self.store.clone());
        ScanEngine::new(config, discovery, fetcher, micro, assembler)
    }

    pub fn desk(
        &self,
        config: Config,
        bars: Vec<Arc<dyn BarProvider>>,
        quotes: Vec<Arc<dyn QuoteProvider>>,
        movers: Option<Arc<dyn MoversProvider>>,
    ) -> SignalDesk {
        let engine = self.engine(&config, bars, quotes, movers);
        SignalDesk::new(config, self.cache.clone(), self.store.clone(), engine)
    }
}
