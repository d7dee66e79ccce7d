//! Signal scoring.
//!
//! Day-trading scores add three saturating components (momentum, relative
//! volume, volatility) after mode gates. Swing strategies score their own
//! feature subsets. Every score is damped by poor execution quality and
//! clamped to [0, 10]; candidates under the style's threshold are rejected.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::features::{FeatureSet, Rejection};
use crate::utils::types::{DayMode, Side, SwingStrategy, TradingStyle};

/// `cap * (1 - e^(-x/scale))`: monotonic, zero at zero, never above `cap`.
pub fn saturate(x: f64, scale: f64, cap: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 || scale <= 0.0 {
        return 0.0;
    }
    cap * (1.0 - (-x / scale).exp())
}

/// A candidate that cleared its gates and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub score: f64,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct SignalScorer {
    config: ScoringConfig,
}

impl SignalScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self, style: TradingStyle) -> f64 {
        match style {
            | TradingStyle::Day(mode) => self.config.gates(mode).quality_threshold,
            | TradingStyle::Swing(_) => self.config.swing.quality_threshold,
        }
    }

    /// Raw score for `side`, with no gates applied.
    pub fn score(&self, features: &FeatureSet, style: TradingStyle, side: Side) -> f64 {
        let raw = match style {
            | TradingStyle::Day(_) => self.day_components(features, side),
            | TradingStyle::Swing(strategy) => self.swing_raw(features, strategy),
        };
        self.apply_quality_penalty(raw, features.execution_quality())
    }

    fn apply_quality_penalty(&self, raw: f64, quality: f64) -> f64 {
        let factor = if quality < self.config.very_low_execution_quality {
            0.8
        } else if quality < self.config.low_execution_quality {
            0.9
        } else {
            1.0
        };
        (raw * factor).clamp(0.0, 10.0)
    }

    fn day_components(&self, f: &FeatureSet, side: Side) -> f64 {
        let c = &self.config;
        let momentum = f.momentum_15m.or(f.momentum_5m).unwrap_or(0.0) * side.sign();
        let volume = f.volume_ratio.map_or(0.0, |r| r - 1.0);
        let volatility = f.realized_vol.unwrap_or(0.0);
        saturate(momentum, c.momentum_scale, c.momentum_cap)
            + saturate(volume, c.volume_scale, c.volume_cap)
            + saturate(volatility, c.volatility_scale, c.volatility_cap)
    }

    fn swing_raw(&self, f: &FeatureSet, strategy: SwingStrategy) -> f64 {
        let rvol_bonus = |rvol: f64| ((rvol - 1.0) * 5.0).clamp(0.0, 5.0);
        match strategy {
            | SwingStrategy::Momentum => {
                f.momentum_5d.map_or(0.0, |m| m.abs() * 100.0) + f.rvol_5d.map_or(0.0, rvol_bonus)
            }
            | SwingStrategy::Breakout => {
                f.breakout_20d.map_or(0.0, |b| b.max(0.0) * 200.0) + f.rvol_5d.map_or(0.0, rvol_bonus)
            }
            | SwingStrategy::MeanReversion => {
                let (Some(rsi), Some(dist)) = (f.rsi_14, f.dist_ma20) else {
                    return 0.0;
                };
                let t = &self.config.swing;
                let extremity = if rsi > t.rsi_overbought {
                    (rsi - t.rsi_overbought) / (100.0 - t.rsi_overbought)
                } else if rsi < t.rsi_oversold {
                    (t.rsi_oversold - rsi) / t.rsi_oversold
                } else {
                    0.0
                };
                extremity * 10.0 + (dist.abs() * 50.0).min(5.0)
            }
        }
    }

    /// Gates, side selection, scoring and the quality threshold.
    pub fn evaluate(&self, features: &FeatureSet, style: TradingStyle) -> Result<Scored, Rejection> {
        let side = match style {
            | TradingStyle::Day(mode) => self.day_gates(features, mode)?,
            | TradingStyle::Swing(strategy) => self.swing_gates(features, strategy)?,
        };
        let score = self.score(features, style, side);
        let threshold = self.threshold(style);
        if score < threshold {
            return Err(Rejection::Quality { score, threshold });
        }
        Ok(Scored { score, side })
    }

    fn day_gates(&self, f: &FeatureSet, mode: DayMode) -> Result<Side, Rejection> {
        let g = self.config.gates(mode);
        if let Some(vol) = f.realized_vol {
            if vol > g.max_volatility {
                return Err(Rejection::Volatility { value: vol, limit: g.max_volatility });
            }
        }
        if g.min_day_volume > 0.0 {
            let volume = f.day_volume.unwrap_or(0.0);
            if volume < g.min_day_volume {
                return Err(Rejection::Liquidity { value: volume, limit: g.min_day_volume });
            }
        }
        let m = f.momentum_15m.or(f.momentum_5m).unwrap_or(0.0);
        let passes = if g.long_only { m >= g.min_momentum } else { m.abs() >= g.min_momentum };
        if !passes || m == 0.0 {
            return Err(Rejection::Momentum { value: m, limit: g.min_momentum });
        }
        Ok(Side::from_direction(m))
    }

    fn swing_gates(&self, f: &FeatureSet, strategy: SwingStrategy) -> Result<Side, Rejection> {
        let t = &self.config.swing;
        let rvol = f.rvol_5d.unwrap_or(1.0);
        match strategy {
            | SwingStrategy::Momentum => {
                let m = f.momentum_5d.unwrap_or(0.0);
                if m.abs() < t.momentum_min_move {
                    return Err(Rejection::Momentum { value: m, limit: t.momentum_min_move });
                }
                if rvol < t.momentum_min_rvol {
                    return Err(Rejection::NoSetup(format!("relative volume {rvol:.2} < {:.2}", t.momentum_min_rvol)));
                }
                Ok(Side::from_direction(m))
            }
            | SwingStrategy::Breakout => {
                let b = f.breakout_20d.unwrap_or(0.0);
                if b < t.breakout_min_strength {
                    return Err(Rejection::Momentum { value: b, limit: t.breakout_min_strength });
                }
                if rvol < t.breakout_min_rvol {
                    return Err(Rejection::NoSetup(format!("relative volume {rvol:.2} < {:.2}", t.breakout_min_rvol)));
                }
                Ok(Side::Long)
            }
            | SwingStrategy::MeanReversion => {
                let d = f.dist_ma20.unwrap_or(0.0);
                if d.abs() < t.mean_reversion_min_distance {
                    return Err(Rejection::Momentum { value: d, limit: t.mean_reversion_min_distance });
                }
                match f.rsi_14 {
                    // stretched above the average: fade down
                    | Some(rsi) if rsi > t.rsi_overbought && d > 0.0 => Ok(Side::Short),
                    | Some(rsi) if rsi < t.rsi_oversold && d < 0.0 => Ok(Side::Long),
                    | rsi => Err(Rejection::NoSetup(format!(
                        "RSI {} not extreme in the direction of a {:+.1}% stretch",
                        rsi.map_or_else(|| "n/a".to_string(), |r| format!("{r:.1}")),
                        d * 100.0
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn scorer() -> SignalScorer {
        SignalScorer::new(ScoringConfig::default())
    }

    fn day_features(momentum: f64, vol: f64, volume: f64) -> FeatureSet {
        FeatureSet {
            momentum_15m: Some(momentum),
            realized_vol: Some(vol),
            volume_ratio: Some(1.8),
            day_volume: Some(volume),
            execution_quality_score: Some(8.0),
            ..FeatureSet::default()
        }
    }

    #[test]
    fn saturation_is_bounded_and_monotonic() {
        assert_eq!(saturate(0.0, 1.0, 3.0), 0.0);
        assert_eq!(saturate(-1.0, 1.0, 3.0), 0.0);
        let a = saturate(0.5, 1.0, 3.0);
        let b = saturate(5.0, 1.0, 3.0);
        assert!(a < b && b < 3.0);
        assert!(saturate(1e9, 1.0, 3.0) <= 3.0);
    }

    #[test]
    fn safe_long_passes() {
        let s = scorer().evaluate(&day_features(0.012, 0.02, 9_000_000.0), TradingStyle::Day(DayMode::Safe)).unwrap();
        assert_eq!(s.side, Side::Long);
        assert!(s.score >= 2.5 && s.score <= 10.0);
    }

    #[test]
    fn safe_gates() {
        let sc = scorer();
        let safe = TradingStyle::Day(DayMode::Safe);
        assert_matches!(sc.evaluate(&day_features(0.01, 0.05, 9e6), safe), Err(Rejection::Volatility { .. }));
        assert_matches!(sc.evaluate(&day_features(0.01, 0.02, 1e6), safe), Err(Rejection::Liquidity { .. }));
        assert_matches!(sc.evaluate(&day_features(-0.01, 0.02, 9e6), safe), Err(Rejection::Momentum { .. }));
    }

    #[test]
    fn aggressive_takes_shorts() {
        let s = scorer()
            .evaluate(&day_features(-0.015, 0.06, 200_000.0), TradingStyle::Day(DayMode::Aggressive))
            .unwrap();
        assert_eq!(s.side, Side::Short);
    }

    #[test]
    fn weak_candidate_is_discarded() {
        let f = FeatureSet {
            momentum_15m: Some(0.0015),
            realized_vol: Some(0.001),
            volume_ratio: Some(0.9),
            day_volume: Some(9e6),
            ..FeatureSet::default()
        };
        assert_matches!(
            scorer().evaluate(&f, TradingStyle::Day(DayMode::Safe)),
            Err(Rejection::Quality { threshold, .. }) if threshold == 2.5
        );
    }

    #[test]
    fn poor_execution_quality_damps_score() {
        let sc = scorer();
        let style = TradingStyle::Day(DayMode::Aggressive);
        let good = day_features(0.01, 0.02, 1e6);
        let poor = FeatureSet { execution_quality_score: Some(2.0), ..good.clone() };
        let ratio = sc.score(&poor, style, Side::Long) / sc.score(&good, style, Side::Long);
        assert!((ratio - 0.8).abs() < 1e-9);
    }

    #[test]
    fn score_is_pure() {
        let sc = scorer();
        let f = day_features(0.01, 0.02, 9e6);
        let style = TradingStyle::Day(DayMode::Safe);
        assert_eq!(sc.score(&f, style, Side::Long), sc.score(&f, style, Side::Long));
    }

    #[test]
    fn swing_momentum() {
        let f = FeatureSet { momentum_5d: Some(0.04), rvol_5d: Some(1.5), ..FeatureSet::default() };
        let s = scorer().evaluate(&f, TradingStyle::Swing(SwingStrategy::Momentum)).unwrap();
        assert_eq!(s.side, Side::Long);
        // 4.0 + 2.5
        assert!((s.score - 6.5).abs() < 1e-9);
        let thin = FeatureSet { rvol_5d: Some(1.1), ..f };
        assert_matches!(
            scorer().evaluate(&thin, TradingStyle::Swing(SwingStrategy::Momentum)),
            Err(Rejection::NoSetup(_))
        );
    }

    #[test]
    fn swing_breakout_is_long() {
        let f = FeatureSet { breakout_20d: Some(0.015), rvol_5d: Some(1.4), ..FeatureSet::default() };
        let s = scorer().evaluate(&f, TradingStyle::Swing(SwingStrategy::Breakout)).unwrap();
        assert_eq!(s.side, Side::Long);
        assert!((s.score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn mean_reversion_direction() {
        let overbought = FeatureSet { rsi_14: Some(82.0), dist_ma20: Some(0.08), ..FeatureSet::default() };
        let s = scorer().evaluate(&overbought, TradingStyle::Swing(SwingStrategy::MeanReversion)).unwrap();
        assert_eq!(s.side, Side::Short);
        let oversold = FeatureSet { rsi_14: Some(22.0), dist_ma20: Some(-0.07), ..FeatureSet::default() };
        let s = scorer().evaluate(&oversold, TradingStyle::Swing(SwingStrategy::MeanReversion)).unwrap();
        assert_eq!(s.side, Side::Long);
        let neutral = FeatureSet { rsi_14: Some(55.0), dist_ma20: Some(0.07), ..FeatureSet::default() };
        assert_matches!(
            scorer().evaluate(&neutral, TradingStyle::Swing(SwingStrategy::MeanReversion)),
            Err(Rejection::NoSetup(_))
        );
    }
}
