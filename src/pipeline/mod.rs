//! Per-symbol scan pipeline: fetch, microstructure, features, scoring and
//! assembly, fanned out over a universe with bounded concurrency.
//!
//! Every scanned symbol ends in exactly one terminal bucket of
//! [`ScanDiagnostics`]. Results are ranked only after all symbol tasks have
//! finished or timed out, so completion order never affects the output.

mod day;
mod swing;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::Config;
use crate::features::{FeatureExtractor, Rejection};
use crate::market_data::MarketDataFetcher;
use crate::microstructure::MicrostructureService;
use crate::risk::BracketBuilder;
use crate::scoring::SignalScorer;
use crate::signal::{Signal, SignalAssembler};
use crate::universe::{Universe, UniverseDiscovery};
use crate::utils::types::{BarInterval, TradingStyle};

pub use day::DAY_BAR_INTERVAL;

/// Why a symbol produced no pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    DataFetch,
    Microstructure,
    Volatility,
    Momentum,
    Liquidity,
    GapOrHalt,
    InsufficientData,
    NoSetup,
    Quality,
}

impl From<&Rejection> for Bucket {
    fn from(r: &Rejection) -> Self {
        match r {
            | Rejection::InsufficientBars { .. } => Bucket::InsufficientData,
            | Rejection::Gap { .. } | Rejection::Halted { .. } => Bucket::GapOrHalt,
            | Rejection::Volatility { .. } => Bucket::Volatility,
            | Rejection::Liquidity { .. } => Bucket::Liquidity,
            | Rejection::Momentum { .. } => Bucket::Momentum,
            | Rejection::NoSetup(_) => Bucket::NoSetup,
            | Rejection::Quality { .. } => Bucket::Quality,
        }
    }
}

/// Counters explaining why a scan returned as many picks as it did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDiagnostics {
    pub scanned_count: u32,
    /// Cleared the order-book check and the volume gate
    pub passed_liquidity: u32,
    /// Qualified as a signal
    pub passed_quality: u32,
    pub failed_data_fetch: u32,
    pub filtered_by_microstructure: u32,
    pub filtered_by_volatility: u32,
    pub filtered_by_momentum: u32,
    pub filtered_by_liquidity: u32,
    pub filtered_by_gap_or_halt: u32,
    pub filtered_by_insufficient_data: u32,
    pub filtered_by_no_setup: u32,
    pub filtered_by_quality: u32,
    /// Successful bar fetches by provider
    pub provider_counts: BTreeMap<String, u32>,
    pub duration_ms: u64,
}

impl ScanDiagnostics {
    fn record(&mut self, result: &SymbolResult) {
        self.scanned_count += 1;
        if let Some(p) = &result.provider {
            *self.provider_counts.entry(p.clone()).or_default() += 1;
        }
        if result.passed_liquidity {
            self.passed_liquidity += 1;
        }
        match &result.outcome {
            | Ok(_) => self.passed_quality += 1,
            | Err(bucket) => *self.bucket_mut(*bucket) += 1,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut u32 {
        match bucket {
            | Bucket::DataFetch => &mut self.failed_data_fetch,
            | Bucket::Microstructure => &mut self.filtered_by_microstructure,
            | Bucket::Volatility => &mut self.filtered_by_volatility,
            | Bucket::Momentum => &mut self.filtered_by_momentum,
            | Bucket::Liquidity => &mut self.filtered_by_liquidity,
            | Bucket::GapOrHalt => &mut self.filtered_by_gap_or_halt,
            | Bucket::InsufficientData => &mut self.filtered_by_insufficient_data,
            | Bucket::NoSetup => &mut self.filtered_by_no_setup,
            | Bucket::Quality => &mut self.filtered_by_quality,
        }
    }

    /// Sum of all terminal buckets; equals `scanned_count`.
    pub fn terminal_total(&self) -> u32 {
        self.passed_quality
            + self.failed_data_fetch
            + self.filtered_by_microstructure
            + self.filtered_by_volatility
            + self.filtered_by_momentum
            + self.filtered_by_liquidity
            + self.filtered_by_gap_or_halt
            + self.filtered_by_insufficient_data
            + self.filtered_by_no_setup
            + self.filtered_by_quality
    }
}

/// What one symbol task produced.
#[derive(Debug)]
struct SymbolResult {
    outcome: std::result::Result<Signal, Bucket>,
    provider: Option<String>,
    passed_liquidity: bool,
}

impl SymbolResult {
    fn failed(bucket: Bucket) -> Self {
        Self { outcome: Err(bucket), provider: None, passed_liquidity: false }
    }
}

/// Ranked picks of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub style: TradingStyle,
    pub universe: Universe,
    /// Every qualified signal, best score first
    pub signals: Vec<Signal>,
    pub diagnostics: ScanDiagnostics,
}

#[derive(Debug, Clone, Copy)]
struct ScanLimits {
    max_concurrent: usize,
    symbol_budget: Duration,
    fetch_daily_context: bool,
    context_budget: Duration,
}

/// Wires every stage of the pipeline together.
pub struct ScanEngine {
    discovery: UniverseDiscovery,
    fetcher: Arc<MarketDataFetcher>,
    micro: Arc<MicrostructureService>,
    extractor: FeatureExtractor,
    scorer: SignalScorer,
    assembler: SignalAssembler,
    limits: ScanLimits,
}

impl ScanEngine {
    pub fn new(
        config: &Config,
        discovery: UniverseDiscovery,
        fetcher: Arc<MarketDataFetcher>,
        micro: Arc<MicrostructureService>,
        assembler: SignalAssembler,
    ) -> Self {
        let p = &config.providers;
        let extractor = FeatureExtractor::new(
            config.features.clone(),
            config.microstructure.clone(),
            DAY_BAR_INTERVAL,
            p.min_intraday_bars,
            p.min_daily_bars,
        );
        Self {
            discovery,
            fetcher,
            micro,
            extractor,
            scorer: SignalScorer::new(config.scoring.clone()),
            assembler,
            limits: ScanLimits {
                max_concurrent: p.max_concurrent_symbols.max(1),
                symbol_budget: Duration::from_millis(p.symbol_budget_ms),
                fetch_daily_context: p.fetch_daily_context,
                context_budget: Duration::from_millis(p.request_timeout_ms),
            },
        }
    }

    pub fn discovery(&self) -> &UniverseDiscovery {
        &self.discovery
    }

    pub fn fetcher(&self) -> &Arc<MarketDataFetcher> {
        &self.fetcher
    }

    pub fn bracket_builder(&self) -> &BracketBuilder {
        self.assembler.builder()
    }

    /// Fan `per_symbol` out over the universe, then rank and persist.
    async fn run_scan<'a, F, Fut>(
        &'a self,
        style: TradingStyle,
        universe: Universe,
        per_symbol: F,
    ) -> ScanResult
    where
        F: Fn(&'a Self, String) -> Fut,
        Fut: Future<Output = SymbolResult> + 'a,
    {
        let started = Instant::now();
        let budget = self.limits.symbol_budget;

        let results: Vec<(String, SymbolResult)> = stream::iter(universe.symbols.clone())
            .map(|symbol| {
                let task = per_symbol(self, symbol.clone());
                async move {
                    let result = match timeout(budget, task).await {
                        | Ok(r) => r,
                        | Err(_) => {
                            debug!("{symbol}: symbol budget of {budget:?} exhausted");
                            SymbolResult::failed(Bucket::DataFetch)
                        }
                    };
                    (symbol, result)
                }
            })
            .buffer_unordered(self.limits.max_concurrent)
            .collect()
            .await;

        let mut diagnostics = ScanDiagnostics::default();
        let mut signals = Vec::new();
        for (symbol, result) in results {
            diagnostics.record(&result);
            match result.outcome {
                | Ok(signal) => signals.push(signal),
                | Err(bucket) => debug!("{symbol}: filtered ({bucket:?})"),
            }
        }

        // score desc, symbol asc so ties are stable across runs
        signals.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.symbol.cmp(&b.symbol)));
        for signal in &signals {
            self.assembler.persist(signal).await;
        }

        diagnostics.duration_ms = started.elapsed().as_millis() as u64;
        let style_label = style.to_string();
        counter!(crate::metrics::SYMBOLS_SCANNED, diagnostics.scanned_count as u64, "style" => style_label.clone());
        counter!(crate::metrics::PICKS_RETURNED, signals.len() as u64, "style" => style_label.clone());
        histogram!(crate::metrics::SCAN_DURATION, started.elapsed().as_secs_f64(), "style" => style_label);

        if signals.is_empty() && diagnostics.failed_data_fetch < diagnostics.scanned_count {
            warn!(
                "{style}: no picks from {} symbols ({} failed fetch, {} microstructure, {} volatility, {} momentum)",
                diagnostics.scanned_count,
                diagnostics.failed_data_fetch,
                diagnostics.filtered_by_microstructure,
                diagnostics.filtered_by_volatility,
                diagnostics.filtered_by_momentum
            );
        } else {
            info!(
                "{style}: {} picks ({} qualified) from {} {} symbols in {} ms; providers {:?}",
                signals.len(),
                diagnostics.passed_quality,
                diagnostics.scanned_count,
                universe.source,
                diagnostics.duration_ms,
                diagnostics.provider_counts
            );
        }

        ScanResult { style, universe, signals, diagnostics }
    }
}

/// Bars for the requested interval, or the data-fetch bucket.
async fn fetch_or_fail(
    fetcher: &MarketDataFetcher,
    symbol: &str,
    interval: BarInterval,
) -> std::result::Result<crate::market_data::FetchedBars, SymbolResult> {
    fetcher.fetch(symbol, interval).await.ok_or_else(|| SymbolResult::failed(Bucket::DataFetch))
}
