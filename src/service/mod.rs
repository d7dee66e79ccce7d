//! Client-facing query surface over the scan engine, advisor and tracker.
//!
//! Pick responses are cached under versioned keys. An empty result is a
//! valid answer but is never cached, so the next request rescans.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{self, keys, Cache, MemoryCache};
use crate::config::Config;
use crate::execution::{
    EntryTiming, ExecutionAdvisor, ExecutionQualityTracker, ExecutionSuggestion, Fill, FillRecord,
    UserExecutionStats,
};
use crate::maintenance::MaintenanceJob;
use crate::market_data::{http_client, polygon::PolygonProvider, BarProvider, MarketDataFetcher, MoversProvider};
use crate::microstructure::MicrostructureService;
use crate::persistence::{open_store, SignalStore};
use crate::pipeline::{ScanDiagnostics, ScanEngine, ScanResult};
use crate::risk::{position_sizer, BracketBuilder};
use crate::signal::{Signal, SignalAssembler};
use crate::universe::{UniverseDiscovery, UniverseSource};
use crate::utils::error::{Error, Result};
use crate::utils::types::{DayMode, SwingStrategy, TradingKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPicksResponse {
    pub as_of: DateTime<Utc>,
    pub mode: DayMode,
    pub picks: Vec<Signal>,
    pub universe_size: usize,
    pub universe_source: UniverseSource,
    pub diagnostics: ScanDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPicksResponse {
    pub as_of: DateTime<Utc>,
    pub strategy: SwingStrategy,
    pub picks: Vec<Signal>,
    pub universe_size: usize,
    pub universe_source: UniverseSource,
    pub diagnostics: ScanDiagnostics,
}

pub struct SignalDesk {
    config: Config,
    cache: Arc<dyn Cache>,
    store: Arc<dyn SignalStore>,
    engine: ScanEngine,
    advisor: ExecutionAdvisor,
    tracker: Arc<ExecutionQualityTracker>,
    maintenance: MaintenanceJob,
}

impl SignalDesk {
    pub fn new(config: Config, cache: Arc<dyn Cache>, store: Arc<dyn SignalStore>, engine: ScanEngine) -> Self {
        let tracker = Arc::new(ExecutionQualityTracker::new(store.clone(), config.execution.clone()));
        let fetcher = engine.fetcher().clone();
        let maintenance =
            MaintenanceJob::new(tracker.clone(), store.clone(), Some(fetcher), config.maintenance.clone());
        Self {
            advisor: ExecutionAdvisor::new(config.execution.clone()),
            config,
            cache,
            store,
            engine,
            tracker,
            maintenance,
        }
    }

    /// Wire the live providers, an in-process cache and the configured store.
    pub async fn from_config(config: Config) -> Result<Self> {
        let p = &config.providers;
        let client = http_client(Duration::from_millis(p.request_timeout_ms))?;
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let store = open_store(&config.storage).await?;

        let polygon = PolygonProvider::from_config(client.clone(), p);
        let movers: Option<Arc<dyn MoversProvider>> = if BarProvider::is_configured(&polygon) {
            Some(Arc::new(polygon))
        } else {
            warn!("no Polygon key configured; discovery will use the curated lists");
            None
        };
        let timeout = Duration::from_millis(p.request_timeout_ms);
        let discovery = UniverseDiscovery::new(movers, cache.clone(), config.universe.clone(), timeout);
        let fetcher = Arc::new(MarketDataFetcher::from_config(p, client.clone()));
        let micro = Arc::new(MicrostructureService::from_config(
            p,
            config.microstructure.clone(),
            client,
            cache.clone(),
        ));
        let builder =
            BracketBuilder::with_sizer(config.risk.clone(), position_sizer::from_config(&config.risk.position_sizer));
        let assembler = SignalAssembler::new(builder, store.clone());
        let engine = ScanEngine::new(&config, discovery, fetcher, micro, assembler);
        Ok(Self::new(config, cache, store, engine))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &ScanEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    pub fn maintenance(&self) -> &MaintenanceJob {
        &self.maintenance
    }

    /// The cache holds the full ranked list; `limit` trims each response.
    pub async fn get_day_trading_picks(&self, mode: DayMode, dynamic: bool, limit: usize) -> DayPicksResponse {
        let key = keys::day_picks(mode, dynamic);
        if let Some(mut hit) = cache::get_json::<DayPicksResponse>(self.cache.as_ref(), &key).await {
            debug!("day picks for {mode} served from cache");
            hit.picks.truncate(limit);
            return hit;
        }

        let ScanResult { universe, signals, diagnostics, .. } = self.engine.scan_day(mode, dynamic).await;
        let mut response = DayPicksResponse {
            as_of: Utc::now(),
            mode,
            picks: signals,
            universe_size: universe.len(),
            universe_source: universe.source,
            diagnostics,
        };
        self.cache_picks(&key, &response, response.picks.len(), self.config.cache.day_picks_ttl_secs).await;
        response.picks.truncate(limit);
        response
    }

    pub async fn get_swing_trading_picks(
        &self,
        strategy: SwingStrategy,
        dynamic: bool,
        limit: usize,
    ) -> SwingPicksResponse {
        let key = keys::swing_picks(strategy, dynamic);
        if let Some(mut hit) = cache::get_json::<SwingPicksResponse>(self.cache.as_ref(), &key).await {
            debug!("swing picks for {strategy} served from cache");
            hit.picks.truncate(limit);
            return hit;
        }

        let ScanResult { universe, signals, diagnostics, .. } =
            self.engine.scan_swing(strategy, dynamic).await;
        let mut response = SwingPicksResponse {
            as_of: Utc::now(),
            strategy,
            picks: signals,
            universe_size: universe.len(),
            universe_source: universe.source,
            diagnostics,
        };
        self.cache_picks(&key, &response, response.picks.len(), self.config.cache.swing_picks_ttl_secs).await;
        response.picks.truncate(limit);
        response
    }

    async fn cache_picks<T: Serialize + Sync>(&self, key: &str, response: &T, picks: usize, ttl_secs: u64) {
        if picks == 0 {
            debug!("not caching empty result under {key}");
            return;
        }
        if let Err(e) = cache::set_json(self.cache.as_ref(), key, response, Duration::from_secs(ttl_secs)).await {
            debug!("could not cache {key}: {e}");
        }
    }

    pub async fn signal(&self, id: Uuid) -> Result<Signal> {
        self.store
            .get_signal(id)
            .await?
            .ok_or_else(|| Error::InvalidArgument(format!("unknown signal {id}")))
    }

    /// Advice for `signal`, biased by the symbol's fill history when known.
    pub async fn get_execution_suggestion(&self, signal: &Signal, kind: Option<TradingKind>) -> ExecutionSuggestion {
        let profile = match self.store.get_symbol_profile(&signal.symbol).await {
            | Ok(p) => p,
            | Err(e) => {
                warn!("{}: execution profile unavailable: {e}", signal.symbol);
                None
            }
        };
        self.advisor.suggest_with_profile(signal, kind.unwrap_or_else(|| signal.kind()), profile.as_ref())
    }

    pub fn get_entry_timing(&self, signal: &Signal, current_price: f64) -> Result<EntryTiming> {
        self.advisor.suggest_entry_timing(signal, current_price)
    }

    pub async fn record_fill(&self, user_id: &str, signal: &Signal, fill: Fill) -> Result<FillRecord> {
        self.tracker.record_fill(user_id, signal, fill).await
    }

    pub async fn get_execution_quality_stats(
        &self,
        user_id: &str,
        kind: Option<TradingKind>,
        days: Option<i64>,
    ) -> Result<UserExecutionStats> {
        self.tracker.get_user_execution_stats(user_id, kind, days).await
    }
}
