use chrono::{DateTime, Utc};
use log::debug;
use tokio::time::timeout;

use super::{fetch_or_fail, Bucket, ScanEngine, ScanResult, SymbolResult};
use crate::features::Rejection;
use crate::signal::Candidate;
use crate::universe::UniverseSource;
use crate::utils::types::{Bar, BarInterval, DayMode, TradingStyle};

/// Intraday scans run on five-minute bars.
pub const DAY_BAR_INTERVAL: BarInterval = BarInterval::FiveMinute;

impl ScanEngine {
    pub async fn scan_day(&self, mode: DayMode, dynamic: bool) -> ScanResult {
        self.scan_day_at(mode, dynamic, Utc::now()).await
    }

    /// Day scan with discovery evaluated as of `now`.
    pub async fn scan_day_at(&self, mode: DayMode, dynamic: bool, now: DateTime<Utc>) -> ScanResult {
        let universe = self.discovery.discover_at(mode, dynamic, now).await;
        let source = universe.source;
        self.run_scan(TradingStyle::Day(mode), universe, move |engine, symbol| {
            engine.day_symbol(mode, symbol, source)
        })
        .await
    }

    /// Prior-day bars for the breakout reference; empty once `context_budget` lapses.
    async fn daily_context(&self, symbol: &str) -> Vec<Bar> {
        if !self.limits.fetch_daily_context {
            return Vec::new();
        }
        match timeout(self.limits.context_budget, self.fetcher.fetch(symbol, BarInterval::Daily)).await {
            | Ok(fetched) => fetched.map(|d| d.bars).unwrap_or_default(),
            | Err(_) => {
                debug!("{symbol}: daily context dropped after {:?}", self.limits.context_budget);
                Vec::new()
            }
        }
    }

    async fn day_symbol(&self, mode: DayMode, symbol: String, source: UniverseSource) -> SymbolResult {
        let fast = match fetch_or_fail(&self.fetcher, &symbol, DAY_BAR_INTERVAL).await {
            | Ok(f) => f,
            | Err(failed) => return failed,
        };
        let provider = Some(fast.provider.clone());
        let filtered = |bucket: Bucket, passed_liquidity: bool| SymbolResult {
            outcome: Err(bucket),
            provider: provider.clone(),
            passed_liquidity,
        };

        let (slow, snapshot) = tokio::join!(self.daily_context(&symbol), self.micro.snapshot(&symbol));
        let verdict = self.micro.is_tradeable(&symbol, mode, snapshot.as_ref());
        if !verdict.tradeable {
            debug!("{symbol}: not tradeable: {}", verdict.reason.as_deref().unwrap_or("order book"));
            return filtered(Bucket::Microstructure, false);
        }

        let features = match self.extractor.extract(&fast.bars, &slow, snapshot.as_ref()) {
            | Ok(f) => f,
            | Err(r) => return filtered(Bucket::from(&r), false),
        };

        let style = TradingStyle::Day(mode);
        let scored = match self.scorer.evaluate(&features, style) {
            | Ok(s) => s,
            | Err(r) => {
                let past_liquidity = matches!(r, Rejection::Momentum { .. } | Rejection::Quality { .. });
                debug!("{symbol}: {r}");
                return filtered(Bucket::from(&r), past_liquidity);
            }
        };

        let Some(entry_price) = fast.last_close() else {
            return filtered(Bucket::InsufficientData, true);
        };
        let mut notes = verdict.warnings.clone();
        if snapshot.is_none() {
            notes.push("no order-book snapshot; execution quality assumed neutral".to_string());
        }
        let candidate = Candidate {
            symbol: symbol.clone(),
            style,
            scored,
            features,
            entry_price,
            universe_source: source,
            data_provider: fast.provider.clone(),
            notes,
        };
        match self.assembler.assemble(candidate, Utc::now()) {
            | Ok(signal) => SymbolResult { outcome: Ok(signal), provider: provider.clone(), passed_liquidity: true },
            | Err(e) => {
                debug!("{symbol}: could not build bracket: {e}");
                filtered(Bucket::InsufficientData, true)
            }
        }
    }
}
