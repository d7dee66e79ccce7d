use chrono::Utc;
use log::debug;

use super::{fetch_or_fail, Bucket, ScanEngine, ScanResult, SymbolResult};
use crate::signal::Candidate;
use crate::universe::UniverseSource;
use crate::utils::types::{BarInterval, SwingStrategy, TradingStyle};

impl ScanEngine {
    /// Multi-day scan on daily bars. There is no order-book gate here; a
    /// snapshot, when available, only feeds the execution-quality features.
    pub async fn scan_swing(&self, strategy: SwingStrategy, dynamic: bool) -> ScanResult {
        let universe = self.discovery.swing_universe(dynamic).await;
        let source = universe.source;
        self.run_scan(TradingStyle::Swing(strategy), universe, move |engine, symbol| {
            engine.swing_symbol(strategy, symbol, source)
        })
        .await
    }

    async fn swing_symbol(&self, strategy: SwingStrategy, symbol: String, source: UniverseSource) -> SymbolResult {
        let daily = match fetch_or_fail(&self.fetcher, &symbol, BarInterval::Daily).await {
            | Ok(d) => d,
            | Err(failed) => return failed,
        };
        let provider = Some(daily.provider.clone());
        let filtered = |bucket: Bucket, passed_liquidity: bool| SymbolResult {
            outcome: Err(bucket),
            provider: provider.clone(),
            passed_liquidity,
        };

        let snapshot = self.micro.snapshot(&symbol).await;
        let features = match self.extractor.extract_daily(&daily.bars, snapshot.as_ref()) {
            | Ok(f) => f,
            | Err(r) => return filtered(Bucket::from(&r), false),
        };

        let style = TradingStyle::Swing(strategy);
        let scored = match self.scorer.evaluate(&features, style) {
            | Ok(s) => s,
            | Err(r) => {
                debug!("{symbol}: {r}");
                return filtered(Bucket::from(&r), true);
            }
        };

        let Some(entry_price) = daily.last_close() else {
            return filtered(Bucket::InsufficientData, true);
        };
        let candidate = Candidate {
            symbol: symbol.clone(),
            style,
            scored,
            features,
            entry_price,
            universe_source: source,
            data_provider: daily.provider.clone(),
            notes: Vec::new(),
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
