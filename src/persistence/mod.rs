//! Persistence layer traits and implementations
//!
//! Signals, fills, symbol profiles, outcomes and performance snapshots go
//! through [`SignalStore`] so the engine never depends on a concrete backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::execution::{FillRecord, SymbolExecutionProfile};
use crate::performance::{SignalOutcome, StrategyPerformance};
use crate::signal::Signal;
use crate::utils::error::Result;
use crate::utils::types::{TradingKind, TradingStyle};

pub mod memory;
pub mod sqlite;

pub use memory::MemorySignalStore;
pub use sqlite::SqliteSignalStore;

/// Selects signals; unset fields match everything. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFilter {
    pub symbol: Option<String>,
    pub style: Option<TradingStyle>,
    pub kind: Option<TradingKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SignalFilter {
    pub fn matches(&self, s: &Signal) -> bool {
        self.symbol.as_deref().map_or(true, |sym| s.symbol == sym)
            && self.style.map_or(true, |st| s.style == st)
            && self.kind.map_or(true, |k| s.kind() == k)
            && self.since.map_or(true, |t| s.generated_at >= t)
            && self.until.map_or(true, |t| s.generated_at < t)
    }
}

/// Selects fill records; results are oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillFilter {
    pub user_id: Option<String>,
    pub symbol: Option<String>,
    pub kind: Option<TradingKind>,
    pub since: Option<DateTime<Utc>>,
}

impl FillFilter {
    pub fn matches(&self, r: &FillRecord) -> bool {
        self.user_id.as_deref().map_or(true, |u| r.user_id == u)
            && self.symbol.as_deref().map_or(true, |sym| r.symbol == sym)
            && self.kind.map_or(true, |k| r.kind() == k)
            && self.since.map_or(true, |t| r.recorded_at >= t)
    }
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn save_signal(&self, signal: &Signal) -> Result<()>;

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>>;

    async fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>>;

    async fn save_fill_result(&self, record: &FillRecord) -> Result<()>;

    async fn list_fill_records(&self, filter: &FillFilter) -> Result<Vec<FillRecord>>;

    async fn upsert_symbol_profile(&self, profile: &SymbolExecutionProfile) -> Result<()>;

    async fn get_symbol_profile(&self, symbol: &str) -> Result<Option<SymbolExecutionProfile>>;

    /// Replaces any earlier outcome for the same signal.
    async fn save_signal_outcome(&self, outcome: &SignalOutcome) -> Result<()>;

    async fn list_signal_outcomes(&self, style: Option<TradingStyle>) -> Result<Vec<SignalOutcome>>;

    /// Append-only.
    async fn save_strategy_performance(&self, perf: &StrategyPerformance) -> Result<()>;

    /// Newest snapshot first.
    async fn list_strategy_performance(&self, style: Option<TradingStyle>) -> Result<Vec<StrategyPerformance>>;
}

/// Build the store selected by the storage config.
pub async fn open_store(cfg: &StorageConfig) -> Result<Arc<dyn SignalStore>> {
    if cfg.in_memory {
        return Ok(Arc::new(MemorySignalStore::new()));
    }
    let store = SqliteSignalStore::new(cfg.sqlite_path.as_ref().map(Into::into)).await?;
    Ok(Arc::new(store))
}
