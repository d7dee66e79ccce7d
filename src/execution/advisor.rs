//! Order-type, price-band and timing advice for a signal.
//!
//! Always a LIMIT order; the band and time-in-force tighten as the book
//! gets better. Swing advice is more patient than day advice.

use serde::{Deserialize, Serialize};

use super::quality::SymbolExecutionProfile;
use crate::config::ExecutionConfig;
use crate::signal::Signal;
use crate::utils::error::{Error, Result};
use crate::utils::round_to;
use crate::utils::types::TradingKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Day,
    Ioc,
    Gtc,
    Fok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketLegs {
    pub stop: f64,
    pub target1: Option<f64>,
    pub target2: Option<f64>,
    pub order_structure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrostructureSummary {
    pub spread_bps: Option<f64>,
    pub total_depth: Option<f64>,
    pub order_imbalance: Option<f64>,
    pub execution_quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSuggestion {
    pub order_type: OrderType,
    /// `[low, high]` acceptable limit prices
    pub price_band: [f64; 2],
    pub time_in_force: TimeInForce,
    pub entry_strategy: String,
    pub bracket_legs: BracketLegs,
    pub suggested_size: u32,
    pub rationale: String,
    pub microstructure_summary: MicrostructureSummary,
}

impl ExecutionSuggestion {
    /// Half-width of the band as a fraction of its midpoint.
    pub fn band_half_width_pct(&self) -> f64 {
        let [lo, hi] = self.price_band;
        let mid = (lo + hi) / 2.0;
        if mid <= 0.0 {
            0.0
        } else {
            (hi - lo) / 2.0 / mid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryRecommendation {
    EnterNow,
    WaitForPullback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTiming {
    pub recommendation: EntryRecommendation,
    pub wait_reason: Option<String>,
    pub pullback_target: Option<f64>,
    pub current_price: f64,
    /// Signed move from entry in the trade's favour, fraction of entry
    pub move_from_entry_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ExecutionAdvisor {
    config: ExecutionConfig,
}

impl ExecutionAdvisor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn suggest(&self, signal: &Signal, kind: TradingKind) -> ExecutionSuggestion {
        self.suggest_with_profile(signal, kind, None)
    }

    /// Like [`suggest`](Self::suggest), biased by the symbol's fill history.
    pub fn suggest_with_profile(
        &self,
        signal: &Signal,
        kind: TradingKind,
        profile: Option<&SymbolExecutionProfile>,
    ) -> ExecutionSuggestion {
        let c = &self.config;
        let f = &signal.features;
        let spread = f.spread_bps;
        let quality = f.execution_quality();
        let depth = f.total_depth();
        let mut size = signal.suggested_size;
        let mut rationale = Vec::new();

        let slippage_prone = profile
            .filter(|p| p.fill_count >= c.profile_min_fills && p.avg_slippage_bps > c.profile_high_slippage_bps);
        if let Some(p) = slippage_prone {
            rationale.push(format!(
                "{} has averaged {:.0} bps slippage over {} fills; favour patient limit orders",
                signal.symbol, p.avg_slippage_bps, p.fill_count
            ));
        }

        let (band, tif, entry_strategy) = match kind {
            | TradingKind::Day => {
                if spread.map_or(false, |s| s > c.day_wide_spread_bps) || quality < c.day_min_quality {
                    rationale.push(format!(
                        "spread {} / quality {:.1} calls for a tight limit",
                        spread.map_or_else(|| "unknown".to_string(), |s| format!("{s:.1} bps")),
                        quality
                    ));
                    if let Some(d) = depth.filter(|&d| d < c.thin_depth_usd) {
                        size = ((size as f64 * c.thin_depth_size_factor).floor() as u32).max(1);
                        rationale.push(format!("size reduced: only ${d:.0} displayed depth"));
                    }
                    (
                        c.day_wide_band_pct,
                        TimeInForce::Day,
                        "Use a limit order close to the entry to avoid slippage; do not chase if it runs.".to_string(),
                    )
                } else if spread.map_or(false, |s| s < c.day_tight_spread_bps)
                    && quality >= c.day_tight_min_quality
                    && slippage_prone.is_none()
                {
                    rationale.push("tight, deep book: take liquidity immediately or not at all".to_string());
                    (
                        c.day_tight_band_pct,
                        TimeInForce::Ioc,
                        "Limit IOC at the entry: fills immediately or cancels.".to_string(),
                    )
                } else {
                    (
                        c.day_default_band_pct,
                        TimeInForce::Day,
                        "Limit order within the price band around the entry.".to_string(),
                    )
                }
            }
            | TradingKind::Swing => {
                if spread.map_or(false, |s| s > c.swing_wide_spread_bps) {
                    rationale.push(format!("wide spread {:.1} bps", spread.unwrap_or_default()));
                    (
                        c.swing_wide_band_pct,
                        TimeInForce::Day,
                        "Wide market: consider waiting for better entry.".to_string(),
                    )
                } else {
                    (
                        c.swing_default_band_pct,
                        TimeInForce::Day,
                        "Limit order near the entry; consider entering on pullback to VWAP.".to_string(),
                    )
                }
            }
        };

        let entry = signal.entry_price;
        let price_band = [round_to(entry * (1.0 - band), 4), round_to(entry * (1.0 + band), 4)];
        let target1 = signal.target_prices.first().copied();
        let target2 = signal.target_prices.get(1).copied();
        let order_structure = match target2 {
            | Some(_) => "bracket: entry + stop + split take-profit (half at target 1, rest at target 2)",
            | None => "bracket: entry + OCO stop/take-profit",
        };
        if rationale.is_empty() {
            rationale.push(format!("{} {} at {:.2}", signal.side, signal.symbol, entry));
        }

        ExecutionSuggestion {
            order_type: OrderType::Limit,
            price_band,
            time_in_force: tif,
            entry_strategy,
            bracket_legs: BracketLegs {
                stop: signal.stop_price,
                target1,
                target2,
                order_structure: order_structure.to_string(),
            },
            suggested_size: size,
            rationale: rationale.join("; "),
            microstructure_summary: MicrostructureSummary {
                spread_bps: spread,
                total_depth: depth,
                order_imbalance: f.order_imbalance,
                execution_quality_score: quality,
            },
        }
    }

    /// Enter now, or wait for a pullback if price already ran in the trade's favour.
    pub fn suggest_entry_timing(&self, signal: &Signal, current_price: f64) -> Result<EntryTiming> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(Error::InvalidArgument(format!("current price must be positive, got {current_price}")));
        }
        let c = &self.config;
        let entry = signal.entry_price;
        let sign = signal.side.sign();
        let moved = (current_price - entry) / entry * sign;

        let enter = |moved| EntryTiming {
            recommendation: EntryRecommendation::EnterNow,
            wait_reason: None,
            pullback_target: None,
            current_price,
            move_from_entry_pct: moved,
        };

        if moved.abs() <= c.enter_now_tolerance_pct {
            return Ok(enter(moved));
        }
        if moved > c.pullback_trigger_pct {
            let target = round_to(entry * (1.0 + sign * c.pullback_target_pct), 4);
            return Ok(EntryTiming {
                recommendation: EntryRecommendation::WaitForPullback,
                wait_reason: Some(format!(
                    "price already {:.2}% past the entry; wait for a pullback toward {:.2}",
                    moved * 100.0,
                    target
                )),
                pullback_target: Some(target),
                current_price,
                move_from_entry_pct: moved,
            });
        }
        Ok(enter(moved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::risk::TimeStop;
    use crate::universe::UniverseSource;
    use crate::utils::types::{DayMode, Side, SwingStrategy, TradingStyle};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn signal(side: Side, spread: Option<f64>, quality: f64, depth: Option<f64>) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: "TSLA".to_string(),
            side,
            style: TradingStyle::Day(DayMode::Aggressive),
            score: 6.0,
            features: FeatureSet {
                spread_bps: spread,
                execution_quality_score: Some(quality),
                bid_depth: depth.map(|d| d / 2.0),
                ask_depth: depth.map(|d| d / 2.0),
                ..FeatureSet::default()
            },
            entry_price: 200.0,
            stop_price: if side == Side::Long { 197.0 } else { 203.0 },
            target_prices: if side == Side::Long { vec![208.0, 214.0] } else { vec![192.0, 186.0] },
            time_stop: TimeStop::Minutes(25),
            suggested_size: 100,
            universe_source: UniverseSource::DynamicMovers,
            data_provider: "polygon".to_string(),
            generated_at: Utc::now(),
            notes: vec![],
        }
    }

    fn advisor() -> ExecutionAdvisor {
        ExecutionAdvisor::new(ExecutionConfig::default())
    }

    #[test]
    fn wide_spread_day_advice() {
        let s = advisor().suggest(&signal(Side::Long, Some(80.0), 6.0, Some(400_000.0)), TradingKind::Day);
        assert_eq!(s.order_type, OrderType::Limit);
        assert_eq!(s.time_in_force, TimeInForce::Day);
        assert!((s.band_half_width_pct() - 0.0005).abs() < 1e-6);
        assert!(s.entry_strategy.contains("avoid slippage"));
        assert_eq!(s.suggested_size, 100);
    }

    #[test]
    fn thin_book_halves_size() {
        let s = advisor().suggest(&signal(Side::Long, Some(25.0), 4.0, Some(30_000.0)), TradingKind::Day);
        assert_eq!(s.suggested_size, 50);
        assert!(s.rationale.contains("size reduced"));
    }

    #[test]
    fn tight_book_gets_ioc() {
        let s = advisor().suggest(&signal(Side::Long, Some(4.0), 8.0, Some(2e6)), TradingKind::Day);
        assert_eq!(s.time_in_force, TimeInForce::Ioc);
        assert!(s.band_half_width_pct() < 0.0005);
        assert_eq!(s.bracket_legs.target2, Some(214.0));
    }

    #[test]
    fn slippage_history_blocks_ioc() {
        let profile = SymbolExecutionProfile {
            symbol: "TSLA".to_string(),
            avg_slippage_bps: 40.0,
            avg_quality_score: 5.0,
            fill_count: 4,
            updated_at: Utc::now(),
        };
        let sig = signal(Side::Long, Some(4.0), 8.0, Some(2e6));
        let s = advisor().suggest_with_profile(&sig, TradingKind::Day, Some(&profile));
        assert_eq!(s.time_in_force, TimeInForce::Day);
        assert!(s.rationale.contains("40 bps"));
    }

    #[test]
    fn default_day_band() {
        let s = advisor().suggest(&signal(Side::Short, Some(15.0), 6.0, None), TradingKind::Day);
        assert_eq!(s.time_in_force, TimeInForce::Day);
        assert!((s.band_half_width_pct() - 0.001).abs() < 1e-6);
    }

    #[test]
    fn swing_advice() {
        let mut sig = signal(Side::Long, Some(45.0), 6.0, None);
        sig.style = TradingStyle::Swing(SwingStrategy::Breakout);
        let wide = advisor().suggest(&sig, TradingKind::Swing);
        assert!(wide.entry_strategy.contains("consider waiting for better entry"));
        assert!((wide.band_half_width_pct() - 0.005).abs() < 1e-6);
        sig.features.spread_bps = Some(12.0);
        let normal = advisor().suggest(&sig, TradingKind::Swing);
        assert!(normal.entry_strategy.contains("pullback to VWAP"));
    }

    #[test]
    fn entry_timing() {
        let a = advisor();
        let long = signal(Side::Long, None, 5.0, None);
        let near = a.suggest_entry_timing(&long, 200.1).unwrap();
        assert_eq!(near.recommendation, EntryRecommendation::EnterNow);
        let ran = a.suggest_entry_timing(&long, 201.5).unwrap();
        assert_eq!(ran.recommendation, EntryRecommendation::WaitForPullback);
        assert_eq!(ran.pullback_target, Some(200.4));
        let middling = a.suggest_entry_timing(&long, 200.6).unwrap();
        assert_eq!(middling.recommendation, EntryRecommendation::EnterNow);

        let short = signal(Side::Short, None, 5.0, None);
        let ran_down = a.suggest_entry_timing(&short, 198.0).unwrap();
        assert_eq!(ran_down.pullback_target, Some(199.6));
        assert_matches!(a.suggest_entry_timing(&short, -1.0), Err(Error::InvalidArgument(_)));
    }
}
