//! Process-local store for tests and runs without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FillFilter, SignalFilter, SignalStore};
use crate::execution::{FillRecord, SymbolExecutionProfile};
use crate::performance::{SignalOutcome, StrategyPerformance};
use crate::signal::Signal;
use crate::utils::error::Result;
use crate::utils::types::TradingStyle;

#[derive(Default)]
struct Tables {
    signals: Vec<Signal>,
    fills: Vec<FillRecord>,
    profiles: HashMap<String, SymbolExecutionProfile>,
    outcomes: HashMap<Uuid, SignalOutcome>,
    performance: Vec<StrategyPerformance>,
}

#[derive(Default)]
pub struct MemorySignalStore {
    tables: RwLock<Tables>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn save_signal(&self, signal: &Signal) -> Result<()> {
        let mut t = self.tables.write().await;
        t.signals.retain(|s| s.id != signal.id);
        t.signals.push(signal.clone());
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        Ok(self.tables.read().await.signals.iter().find(|s| s.id == id).cloned())
    }

    async fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let t = self.tables.read().await;
        let mut out: Vec<Signal> = t.signals.iter().filter(|s| filter.matches(s)).cloned().collect();
        out.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn save_fill_result(&self, record: &FillRecord) -> Result<()> {
        self.tables.write().await.fills.push(record.clone());
        Ok(())
    }

    async fn list_fill_records(&self, filter: &FillFilter) -> Result<Vec<FillRecord>> {
        let t = self.tables.read().await;
        let mut out: Vec<FillRecord> = t.fills.iter().filter(|r| filter.matches(r)).cloned().collect();
        out.sort_by_key(|r| r.recorded_at);
        Ok(out)
    }

    async fn upsert_symbol_profile(&self, profile: &SymbolExecutionProfile) -> Result<()> {
        self.tables.write().await.profiles.insert(profile.symbol.clone(), profile.clone());
        Ok(())
    }

    async fn get_symbol_profile(&self, symbol: &str) -> Result<Option<SymbolExecutionProfile>> {
        Ok(self.tables.read().await.profiles.get(symbol).cloned())
    }

    async fn save_signal_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        self.tables.write().await.outcomes.insert(outcome.signal_id, outcome.clone());
        Ok(())
    }

    async fn list_signal_outcomes(&self, style: Option<TradingStyle>) -> Result<Vec<SignalOutcome>> {
        let t = self.tables.read().await;
        let mut out: Vec<SignalOutcome> =
            t.outcomes.values().filter(|o| style.map_or(true, |s| o.style == s)).cloned().collect();
        out.sort_by_key(|o| o.exit_time);
        Ok(out)
    }

    async fn save_strategy_performance(&self, perf: &StrategyPerformance) -> Result<()> {
        self.tables.write().await.performance.push(perf.clone());
        Ok(())
    }

    async fn list_strategy_performance(&self, style: Option<TradingStyle>) -> Result<Vec<StrategyPerformance>> {
        let t = self.tables.read().await;
        let mut out: Vec<StrategyPerformance> =
            t.performance.iter().filter(|p| style.map_or(true, |s| p.style == s)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
