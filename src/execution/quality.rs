//! Fill analysis, coaching and per-user / per-symbol aggregation.
//!
//! Slippage is reported in percent points (0.6 means 0.6%) and is positive
//! when the fill was worse than the signal's entry for its side.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::persistence::{FillFilter, SignalStore};
use crate::signal::Signal;
use crate::utils::error::Result;
use crate::utils::round_to;
use crate::utils::types::{Side, TradingKind, TradingStyle};

/// An execution reported by the user's broker context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub size: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQualityResult {
    /// Price units, positive = worse than entry
    pub slippage: f64,
    /// Percent points, positive = worse than entry
    pub slippage_pct: f64,
    pub quality_score: f64,
    pub chased_price: bool,
    pub coaching_tip: String,
}

impl ExecutionQualityResult {
    fn unanalyzable(reason: &str) -> Self {
        Self {
            slippage: 0.0,
            slippage_pct: 0.0,
            quality_score: 5.0,
            chased_price: false,
            coaching_tip: format!("Unable to analyze this fill ({reason})."),
        }
    }

    pub fn slippage_bps(&self) -> f64 {
        self.slippage_pct * 100.0
    }
}

/// A persisted fill and its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub style: TradingStyle,
    pub side: Side,
    pub fill: Fill,
    pub result: ExecutionQualityResult,
    pub recorded_at: DateTime<Utc>,
}

impl FillRecord {
    pub fn kind(&self) -> TradingKind {
        self.style.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolExecutionProfile {
    pub symbol: String,
    pub avg_slippage_bps: f64,
    pub avg_quality_score: f64,
    pub fill_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserExecutionStats {
    pub user_id: String,
    pub kind: Option<TradingKind>,
    pub days: i64,
    pub fill_count: usize,
    pub avg_slippage_pct: f64,
    pub avg_quality_score: f64,
    pub chased_count: usize,
    pub chase_rate: f64,
    pub best_slippage_pct: Option<f64>,
    pub worst_slippage_pct: Option<f64>,
    /// Most important first
    pub tips: Vec<String>,
}

/// Banded 0-10 score from signed slippage in percent points.
pub fn quality_from_slippage(slippage_pct: f64) -> f64 {
    let score = if slippage_pct <= 0.1 {
        10.0
    } else if slippage_pct <= 0.25 {
        8.0
    } else if slippage_pct <= 0.5 {
        6.0
    } else if slippage_pct <= 1.0 {
        4.0
    } else {
        (10.0 - 2.0 * slippage_pct.abs()).max(0.0)
    };
    score.clamp(0.0, 10.0)
}

pub fn chase_threshold_pct(cfg: &ExecutionConfig, kind: TradingKind) -> f64 {
    match kind {
        | TradingKind::Day => cfg.day_chase_threshold_pct,
        | TradingKind::Swing => cfg.swing_chase_threshold_pct,
    }
}

fn coaching_tip(signal: &Signal, slippage_pct: f64, chased: bool) -> String {
    if slippage_pct <= 0.1 {
        "Excellent execution: filled within 0.1% of the signal entry.".to_string()
    } else if slippage_pct <= 0.25 {
        "Good fill. A limit order at the signal entry would tighten it further.".to_string()
    } else if chased {
        format!(
            "You chased the price: filled {:.2}% beyond the {:.2} entry. Place a limit order inside the suggested price band and let the price come to you.",
            slippage_pct, signal.entry_price
        )
    } else if slippage_pct > 0.5 {
        format!("High slippage ({slippage_pct:.2}%). Prefer limit orders over market orders.")
    } else {
        "Check the execution suggestion before entering; limit orders keep slippage predictable.".to_string()
    }
}

/// Score one fill against its signal.
pub fn analyze_fill(cfg: &ExecutionConfig, signal: &Signal, fill: &Fill) -> ExecutionQualityResult {
    let entry = signal.entry_price;
    if !entry.is_finite() || entry <= 0.0 {
        return ExecutionQualityResult::unanalyzable("signal has no valid entry price");
    }
    if !fill.price.is_finite() || fill.price <= 0.0 {
        return ExecutionQualityResult::unanalyzable("fill price must be positive");
    }
    if !fill.size.is_finite() || fill.size <= 0.0 {
        return ExecutionQualityResult::unanalyzable("fill size must be positive");
    }

    let slippage = (fill.price - entry) * signal.side.sign();
    let slippage_pct = slippage / entry * 100.0;
    let chased = slippage_pct.abs() > chase_threshold_pct(cfg, signal.kind());
    ExecutionQualityResult {
        slippage: round_to(slippage, 4),
        slippage_pct: round_to(slippage_pct, 4),
        quality_score: quality_from_slippage(slippage_pct),
        chased_price: chased,
        coaching_tip: coaching_tip(signal, slippage_pct, chased),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Aggregate a user's fills into stats plus prioritized tips.
pub fn summarize_fills(
    user_id: &str,
    kind: Option<TradingKind>,
    days: i64,
    records: &[FillRecord],
) -> UserExecutionStats {
    let n = records.len();
    let slippages = || records.iter().map(|r| r.result.slippage_pct);
    let avg_slippage = mean(slippages());
    let avg_quality = mean(records.iter().map(|r| r.result.quality_score));
    let chased = records.iter().filter(|r| r.result.chased_price).count();
    let chase_rate = if n == 0 { 0.0 } else { chased as f64 / n as f64 };

    let mut tips = Vec::new();
    if n == 0 {
        tips.push(format!("No fills recorded in the last {days} days."));
    } else {
        if avg_slippage > 0.25 {
            tips.push(format!(
                "Your average slippage is {avg_slippage:.2}%; limit orders would cut this to ~0.15%."
            ));
        }
        if chased > 0 && chase_rate >= 0.25 {
            tips.push(format!(
                "You chased the price on {chased} of {n} fills; wait for price to return to the suggested band."
            ));
        }
        if avg_quality < 6.0 {
            tips.push(format!(
                "Average execution quality is {avg_quality:.1}/10; check the spread before entering."
            ));
        }
        if tips.is_empty() {
            tips.push("Execution is on track; keep using limit orders at the suggested entry.".to_string());
        }
    }

    UserExecutionStats {
        user_id: user_id.to_string(),
        kind,
        days,
        fill_count: n,
        avg_slippage_pct: round_to(avg_slippage, 4),
        avg_quality_score: round_to(avg_quality, 2),
        chased_count: chased,
        chase_rate: round_to(chase_rate, 4),
        best_slippage_pct: slippages().reduce(f64::min),
        worst_slippage_pct: slippages().reduce(f64::max),
        tips,
    }
}

/// Recompute a symbol profile from every fill on record for it.
pub fn profile_from_fills(symbol: &str, records: &[FillRecord], now: DateTime<Utc>) -> Option<SymbolExecutionProfile> {
    if records.is_empty() {
        return None;
    }
    Some(SymbolExecutionProfile {
        symbol: symbol.to_string(),
        avg_slippage_bps: round_to(mean(records.iter().map(|r| r.result.slippage_bps())), 2),
        avg_quality_score: round_to(mean(records.iter().map(|r| r.result.quality_score)), 2),
        fill_count: records.len() as u32,
        updated_at: now,
    })
}

/// Stateful side of the execution feedback loop.
pub struct ExecutionQualityTracker {
    store: Arc<dyn SignalStore>,
    config: ExecutionConfig,
}

impl ExecutionQualityTracker {
    pub fn new(store: Arc<dyn SignalStore>, config: ExecutionConfig) -> Self {
        Self { store, config }
    }

    pub fn analyze_fill(&self, signal: &Signal, fill: &Fill) -> ExecutionQualityResult {
        analyze_fill(&self.config, signal, fill)
    }

    /// Analyze and persist a user's fill.
    pub async fn record_fill(&self, user_id: &str, signal: &Signal, fill: Fill) -> Result<FillRecord> {
        let result = self.analyze_fill(signal, &fill);
        let record = FillRecord {
            id: Uuid::new_v4(),
            signal_id: signal.id,
            user_id: user_id.to_string(),
            symbol: signal.symbol.clone(),
            style: signal.style,
            side: signal.side,
            fill,
            result,
            recorded_at: Utc::now(),
        };
        self.store.save_fill_result(&record).await?;
        increment_counter!(crate::metrics::FILLS_ANALYZED, "kind" => record.kind().to_string());
        debug!(
            "{} fill for {} by {}: slippage {:.3}% quality {:.1}",
            record.kind(),
            record.symbol,
            user_id,
            record.result.slippage_pct,
            record.result.quality_score
        );
        Ok(record)
    }

    pub async fn get_user_execution_stats(
        &self,
        user_id: &str,
        kind: Option<TradingKind>,
        days: Option<i64>,
    ) -> Result<UserExecutionStats> {
        let days = days.unwrap_or(self.config.stats_default_days).max(1);
        let filter = FillFilter {
            user_id: Some(user_id.to_string()),
            kind,
            since: Some(Utc::now() - Duration::days(days)),
            ..FillFilter::default()
        };
        let records = self.store.list_fill_records(&filter).await?;
        Ok(summarize_fills(user_id, kind, days, &records))
    }

    pub async fn update_symbol_profile(&self, symbol: &str) -> Result<Option<SymbolExecutionProfile>> {
        let filter = FillFilter { symbol: Some(symbol.to_string()), ..FillFilter::default() };
        let records = self.store.list_fill_records(&filter).await?;
        let Some(profile) = profile_from_fills(symbol, &records, Utc::now()) else {
            return Ok(None);
        };
        self.store.upsert_symbol_profile(&profile).await?;
        Ok(Some(profile))
    }

    /// Refresh the profile of every symbol with at least one fill.
    pub async fn update_all_symbol_profiles(&self) -> Result<usize> {
        let records = self.store.list_fill_records(&FillFilter::default()).await?;
        let symbols: BTreeSet<String> = records.into_iter().map(|r| r.symbol).collect();
        let mut updated = 0;
        for symbol in &symbols {
            if self.update_symbol_profile(symbol).await?.is_some() {
                updated += 1;
            }
        }
        info!("refreshed {updated} symbol execution profiles");
        Ok(updated)
    }
}
