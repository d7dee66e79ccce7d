//! Candidate symbol discovery.
//!
//! The dynamic scan pulls top gainers and losers, keeps plain common-stock
//! tickers that pass the mode's price/volume/market-cap filters and a
//! time-of-day-adaptive change cap, and falls back to a curated list when
//! too few survive.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::cache::{self, keys, Cache};
use crate::config::{DiscoveryFilter, UniverseConfig};
use crate::market_data::{Mover, MoverDirection, MoversProvider};
use crate::utils::types::DayMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UniverseSource {
    DynamicMovers,
    Core,
}

impl std::fmt::Display for UniverseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            | UniverseSource::DynamicMovers => write!(f, "DYNAMIC_MOVERS"),
            | UniverseSource::Core => write!(f, "CORE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub symbols: Vec<String>,
    pub source: UniverseSource,
}

impl Universe {
    pub fn core(symbols: &[String], limit: usize) -> Self {
        Self { symbols: symbols.iter().take(limit).cloned().collect(), source: UniverseSource::Core }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Plain common-stock tickers only: at most five characters, no share-class
/// dot, and no trailing `X` (mutual-fund style symbols).
pub fn is_plain_ticker(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 5
        && !symbol.contains('.')
        && !symbol.ends_with('X')
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
}

fn market_tz(cfg: &UniverseConfig) -> Tz {
    cfg.market_timezone.parse::<Tz>().unwrap_or(chrono_tz::America::New_York)
}

/// Absolute daily change allowed at `now` for `mode`.
pub fn max_change_cap(cfg: &UniverseConfig, mode: DayMode, now: DateTime<Utc>) -> f64 {
    let base = cfg.filter(mode).base_max_change_pct;
    let hour = now.with_timezone(&market_tz(cfg)).hour();
    if hour < cfg.early_session_end_hour {
        base * cfg.early_session_multiplier
    } else if hour >= cfg.late_session_start_hour {
        base * cfg.late_session_multiplier
    } else {
        base
    }
}

pub fn passes_filter(filter: &DiscoveryFilter, change_cap: f64, mover: &Mover) -> bool {
    if mover.last_price < filter.min_price || mover.last_price > filter.max_price {
        return false;
    }
    if mover.day_volume < filter.min_volume {
        return false;
    }
    if let Some(cap) = mover.market_cap {
        if cap < filter.min_market_cap {
            return false;
        }
    }
    mover.change_pct.abs() <= change_cap
}

pub struct UniverseDiscovery {
    movers: Option<Arc<dyn MoversProvider>>,
    cache: Arc<dyn Cache>,
    config: UniverseConfig,
    request_timeout: Duration,
}

impl UniverseDiscovery {
    pub fn new(
        movers: Option<Arc<dyn MoversProvider>>,
        cache: Arc<dyn Cache>,
        config: UniverseConfig,
        request_timeout: Duration,
    ) -> Self {
        Self { movers, cache, config, request_timeout }
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    pub async fn discover(&self, mode: DayMode, dynamic: bool) -> Universe {
        self.discover_at(mode, dynamic, Utc::now()).await
    }

    /// Discovery evaluated as of `now` (drives the time-of-day cap).
    pub async fn discover_at(&self, mode: DayMode, dynamic: bool, now: DateTime<Utc>) -> Universe {
        let core = Universe::core(self.config.core(mode), self.config.max_symbols);
        if !dynamic || !self.config.use_dynamic_discovery {
            return core;
        }

        let key = keys::dynamic_universe(mode);
        if let Some(hit) = cache::get_json::<Universe>(self.cache.as_ref(), &key).await {
            debug!("dynamic universe for {mode} served from cache ({} symbols)", hit.len());
            return hit;
        }

        let symbols = self.scan_movers(mode, now).await;
        // the fallback is cached too, so a movers outage costs one scan per ttl
        let universe = if symbols.len() < self.config.min_dynamic_symbols {
            warn!(
                "dynamic discovery for {mode} found {} symbols (< {}), using core list",
                symbols.len(),
                self.config.min_dynamic_symbols
            );
            core
        } else {
            info!("dynamic discovery for {mode}: {} symbols", symbols.len());
            Universe { symbols, source: UniverseSource::DynamicMovers }
        };
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Err(e) = cache::set_json(self.cache.as_ref(), &key, &universe, ttl).await {
            debug!("could not cache {mode} universe: {e}");
        }
        universe
    }

    /// Swing candidates: the curated large-cap list unless configured to
    /// reuse the AGGRESSIVE movers scan.
    pub async fn swing_universe(&self, dynamic: bool) -> Universe {
        if dynamic && self.config.swing_dynamic_discovery {
            let found = self.discover(DayMode::Aggressive, true).await;
            if found.source == UniverseSource::DynamicMovers {
                return found;
            }
        }
        Universe::core(&self.config.swing_core, self.config.swing_max_symbols)
    }

    async fn scan_movers(&self, mode: DayMode, now: DateTime<Utc>) -> Vec<String> {
        let Some(provider) = &self.movers else {
            return Vec::new();
        };
        let filter = self.config.filter(mode);
        let cap = max_change_cap(&self.config, mode, now);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for direction in [MoverDirection::Gainers, MoverDirection::Losers] {
            let rows = match timeout(self.request_timeout, provider.top_movers(direction)).await {
                | Ok(Ok(rows)) => rows,
                | Ok(Err(e)) => {
                    debug!("{} {:?} failed: {e}", provider.name(), direction);
                    continue;
                }
                | Err(_) => {
                    debug!("{} {:?} timed out", provider.name(), direction);
                    continue;
                }
            };
            for mover in rows {
                if out.len() >= self.config.max_symbols {
                    break;
                }
                if !is_plain_ticker(&mover.symbol) || !passes_filter(filter, cap, &mover) {
                    continue;
                }
                if seen.insert(mover.symbol.clone()) {
                    out.push(mover.symbol);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::utils::error::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mover(symbol: &str, change_pct: f64) -> Mover {
        Mover {
            symbol: symbol.to_string(),
            last_price: 50.0,
            day_volume: 8_000_000.0,
            market_cap: None,
            change_pct,
        }
    }

    fn at_et(h: u32, m: u32) -> DateTime<Utc> {
        New_York.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn ticker_shape() {
        assert!(is_plain_ticker("AAPL"));
        assert!(!is_plain_ticker("BRK.B"));
        assert!(!is_plain_ticker("VFIAX"));
        assert!(!is_plain_ticker("ABCDEF"));
    }

    #[test]
    fn change_cap_follows_session() {
        let cfg = UniverseConfig::default();
        assert!((max_change_cap(&cfg, DayMode::Safe, at_et(9, 30)) - 0.2505).abs() < 1e-9);
        assert!((max_change_cap(&cfg, DayMode::Safe, at_et(11, 0)) - 0.15).abs() < 1e-9);
        assert!((max_change_cap(&cfg, DayMode::Safe, at_et(15, 0)) - 0.0495).abs() < 1e-9);
    }

    #[test]
    fn filter_checks_price_volume_and_cap() {
        let cfg = UniverseConfig::default();
        let f = cfg.filter(DayMode::Safe);
        assert!(passes_filter(f, 0.15, &mover("AAPL", 0.05)));
        let mut cheap = mover("PENY", 0.05);
        cheap.last_price = 3.0;
        assert!(!passes_filter(f, 0.15, &cheap));
        let mut small = mover("SMOL", 0.05);
        small.market_cap = Some(2_000_000_000.0);
        assert!(!passes_filter(f, 0.15, &small));
        assert!(passes_filter(cfg.filter(DayMode::Aggressive), 0.3, &small));
    }

    struct FixedMovers {
        gainers: Vec<Mover>,
        losers: Vec<Mover>,
        calls: AtomicUsize,
    }

    impl FixedMovers {
        fn new(gainers: Vec<Mover>, losers: Vec<Mover>) -> Arc<Self> {
            Arc::new(Self { gainers, losers, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl MoversProvider for FixedMovers {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn top_movers(&self, direction: MoverDirection) -> Result<Vec<Mover>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match direction {
                | MoverDirection::Gainers => self.gainers.clone(),
                | MoverDirection::Losers => self.losers.clone(),
            })
        }
    }

    fn discovery_with(movers: Arc<FixedMovers>) -> UniverseDiscovery {
        UniverseDiscovery::new(
            Some(movers),
            Arc::new(MemoryCache::new()),
            UniverseConfig::default(),
            Duration::from_millis(200),
        )
    }

    fn discovery(gainers: Vec<Mover>, losers: Vec<Mover>) -> UniverseDiscovery {
        discovery_with(FixedMovers::new(gainers, losers))
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("S{}", (b'A' + i as u8) as char)).collect()
    }

    #[tokio::test]
    async fn dynamic_scan_dedups_and_caches() {
        let gainers: Vec<Mover> = names(8).iter().map(|s| mover(s, 0.04)).collect();
        let mut losers: Vec<Mover> = names(12).iter().map(|s| mover(s, -0.03)).collect();
        losers.push(mover("BRK.B", -0.01));
        let d = discovery(gainers, losers);
        let u = d.discover_at(DayMode::Safe, true, at_et(11, 0)).await;
        assert_eq!(u.source, UniverseSource::DynamicMovers);
        assert_eq!(u.len(), 12);
        let again = d.discover_at(DayMode::Safe, true, at_et(11, 0)).await;
        assert_eq!(u, again);
    }

    #[tokio::test]
    async fn too_few_movers_falls_back_to_core() {
        let gainers: Vec<Mover> = names(4).iter().map(|s| mover(s, 0.04)).collect();
        let d = discovery(gainers, Vec::new());
        let u = d.discover_at(DayMode::Safe, true, at_et(11, 0)).await;
        assert_eq!(u.source, UniverseSource::Core);
        assert_eq!(u.symbols, UniverseConfig::default().safe_core);
    }

    #[tokio::test]
    async fn core_fallback_is_cached_during_a_movers_outage() {
        let movers = FixedMovers::new(Vec::new(), Vec::new());
        let d = discovery_with(movers.clone());
        let first = d.discover_at(DayMode::Safe, true, at_et(11, 0)).await;
        assert_eq!(movers.calls.load(Ordering::SeqCst), 2);

        let second = d.discover_at(DayMode::Safe, true, at_et(11, 0)).await;
        assert_eq!(movers.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
        assert_eq!(second.source, UniverseSource::Core);
    }

    #[tokio::test]
    async fn static_request_skips_movers() {
        let d = discovery(Vec::new(), Vec::new());
        let u = d.discover(DayMode::Aggressive, false).await;
        assert_eq!(u.source, UniverseSource::Core);
        assert_eq!(u.len(), 40);
        assert_eq!(d.swing_universe(true).await.len(), 40);
    }
}
