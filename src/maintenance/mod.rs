//! Background upkeep: symbol execution profiles, signal outcomes and
//! strategy performance snapshots.
//!
//! The job is dispatched onto the runtime and never awaited by scans. A
//! per-day ledger and an in-flight flag turn repeated or overlapping
//! dispatches into no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::MaintenanceConfig;
use crate::execution::ExecutionQualityTracker;
use crate::market_data::MarketDataFetcher;
use crate::performance::{evaluate_outcome, rollup, Period, StrategyPerformance};
use crate::persistence::{SignalFilter, SignalStore};
use crate::pipeline::DAY_BAR_INTERVAL;
use crate::utils::error::Result;
use crate::utils::types::{BarInterval, TradingKind, TradingStyle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub run_date: NaiveDate,
    pub profiles_updated: usize,
    pub outcomes_recorded: usize,
    pub snapshots: Vec<StrategyPerformance>,
}

/// Dates the job completed on. Kept apart from the market-data cache.
#[derive(Debug, Default)]
struct Ledger {
    last_run: Mutex<Option<NaiveDate>>,
}

impl Ledger {
    fn ran_on(&self, day: NaiveDate) -> bool {
        self.last_run.lock().map(|d| *d == Some(day)).unwrap_or(false)
    }

    fn mark(&self, day: NaiveDate) {
        if let Ok(mut d) = self.last_run.lock() {
            *d = Some(day);
        }
    }

    fn last(&self) -> Option<NaiveDate> {
        self.last_run.lock().ok().and_then(|d| *d)
    }
}

struct Inner {
    tracker: Arc<ExecutionQualityTracker>,
    store: Arc<dyn SignalStore>,
    fetcher: Option<Arc<MarketDataFetcher>>,
    config: MaintenanceConfig,
    ledger: Ledger,
    in_flight: AtomicBool,
}

/// Cheap to clone; clones share the ledger and the in-flight flag.
#[derive(Clone)]
pub struct MaintenanceJob {
    inner: Arc<Inner>,
}

/// Clears the in-flight flag however the run ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MaintenanceJob {
    pub fn new(
        tracker: Arc<ExecutionQualityTracker>,
        store: Arc<dyn SignalStore>,
        fetcher: Option<Arc<MarketDataFetcher>>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tracker,
                store,
                fetcher,
                config,
                ledger: Ledger::default(),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        self.inner.ledger.last()
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Dispatch today's run. `None` when it already ran today or a run is
    /// still in flight.
    pub fn spawn(&self) -> Option<JoinHandle<Result<MaintenanceReport>>> {
        self.spawn_at(Utc::now())
    }

    pub fn spawn_at(&self, now: DateTime<Utc>) -> Option<JoinHandle<Result<MaintenanceReport>>> {
        let day = now.date_naive();
        if self.inner.ledger.ran_on(day) {
            debug!("maintenance already ran on {day}");
            return None;
        }
        if self.inner.in_flight.swap(true, Ordering::SeqCst) {
            debug!("maintenance run already in flight");
            return None;
        }
        let job = self.clone();
        Some(tokio::spawn(async move {
            let _guard = FlightGuard(&job.inner.in_flight);
            let report = job.run(now).await;
            match &report {
                | Ok(r) => {
                    job.inner.ledger.mark(day);
                    info!(
                        "maintenance for {day}: {} profiles, {} outcomes, {} snapshots",
                        r.profiles_updated,
                        r.outcomes_recorded,
                        r.snapshots.len()
                    );
                }
                | Err(e) => warn!("maintenance for {day} failed: {e}"),
            }
            report
        }))
    }

    /// The run body, without the once-per-day and in-flight gating.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let inner = &self.inner;
        let profiles_updated = inner.tracker.update_all_symbol_profiles().await?;

        let period = Period::trailing_days(now, inner.config.rollup_days);
        let outcomes_recorded = if inner.config.evaluate_outcomes {
            self.record_outcomes(period, now).await?
        } else {
            0
        };

        let signals = inner
            .store
            .list_signals(&SignalFilter { since: Some(period.start), until: Some(period.end), ..Default::default() })
            .await?;
        let mut snapshots = Vec::with_capacity(TradingStyle::ALL.len());
        for style in TradingStyle::ALL {
            let outcomes = inner.store.list_signal_outcomes(Some(style)).await?;
            let perf = rollup(style, period, &signals, &outcomes);
            inner.store.save_strategy_performance(&perf).await?;
            snapshots.push(perf);
        }

        Ok(MaintenanceReport { run_date: now.date_naive(), profiles_updated, outcomes_recorded, snapshots })
    }

    /// Evaluate expired signals in `period` that have no outcome yet.
    async fn record_outcomes(&self, period: Period, now: DateTime<Utc>) -> Result<usize> {
        let inner = &self.inner;
        let Some(fetcher) = &inner.fetcher else {
            return Ok(0);
        };
        let done: std::collections::HashSet<_> =
            inner.store.list_signal_outcomes(None).await?.into_iter().map(|o| o.signal_id).collect();
        let pending: Vec<_> = inner
            .store
            .list_signals(&SignalFilter { since: Some(period.start), until: Some(period.end), ..Default::default() })
            .await?
            .into_iter()
            .filter(|s| !done.contains(&s.id) && s.expires_at() <= now)
            .take(inner.config.max_outcome_evaluations)
            .collect();

        let mut recorded = 0;
        for signal in pending {
            let interval = match signal.kind() {
                | TradingKind::Day => DAY_BAR_INTERVAL,
                | TradingKind::Swing => BarInterval::Daily,
            };
            let to = signal.expires_at() + Duration::days(1);
            let Some(bars) = fetcher.fetch_range(&signal.symbol, interval, signal.generated_at, to).await else {
                debug!("{}: no bars to evaluate signal {}", signal.symbol, signal.id);
                continue;
            };
            match evaluate_outcome(&signal, &bars.bars) {
                | Ok(outcome) => {
                    inner.store.save_signal_outcome(&outcome).await?;
                    recorded += 1;
                }
                | Err(e) => debug!("{}: outcome not evaluated: {e}", signal.symbol),
            }
        }
        Ok(recorded)
    }
}
