//! Bracket construction: stop, take-profit targets, time stop and size.
//!
//! Percentages are fixed per mode or strategy, not derived from volatility.
//! SHORT brackets mirror LONG ones around the entry.

pub mod position_sizer;

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::{BracketParams, RiskConfig};
use crate::utils::error::{Error, Result};
use crate::utils::round_price;
use crate::utils::types::{DayMode, Side, SwingStrategy, TradingStyle};
use position_sizer::PositionSizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStop {
    Minutes(u32),
    Days(u32),
}

impl TimeStop {
    pub fn as_duration(&self) -> Duration {
        match *self {
            | TimeStop::Minutes(m) => Duration::minutes(m as i64),
            | TimeStop::Days(d) => Duration::days(d as i64),
        }
    }
}

impl fmt::Display for TimeStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            | TimeStop::Minutes(m) => write!(f, "{m} min"),
            | TimeStop::Days(d) => write!(f, "{d} days"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub entry: f64,
    pub stop: f64,
    /// Nearest target first
    pub targets: Vec<f64>,
    pub time_stop: TimeStop,
    pub size: u32,
}

impl Bracket {
    /// Stop on the losing side and every target beyond the entry on the
    /// winning side, nearest first.
    pub fn is_consistent(&self, side: Side) -> bool {
        let s = side.sign();
        if self.targets.is_empty() || (self.entry - self.stop) * s <= 0.0 {
            return false;
        }
        let mut prev = self.entry;
        for &t in &self.targets {
            if (t - prev) * s <= 0.0 {
                return false;
            }
            prev = t;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct BracketBuilder {
    config: RiskConfig,
    sizer: Box<dyn PositionSizer>,
}

impl BracketBuilder {
    pub fn new(config: RiskConfig) -> Self {
        let sizer = position_sizer::from_config(&config.position_sizer);
        Self { config, sizer }
    }

    pub fn with_sizer(config: RiskConfig, sizer: Box<dyn PositionSizer>) -> Self {
        Self { config, sizer }
    }

    pub fn params(&self, style: TradingStyle) -> &BracketParams {
        match style {
            | TradingStyle::Day(DayMode::Safe) => &self.config.safe,
            | TradingStyle::Day(DayMode::Aggressive) => &self.config.aggressive,
            | TradingStyle::Swing(SwingStrategy::Momentum) => &self.config.momentum,
            | TradingStyle::Swing(SwingStrategy::Breakout) => &self.config.breakout,
            | TradingStyle::Swing(SwingStrategy::MeanReversion) => &self.config.mean_reversion,
        }
    }

    /// Pure function of its inputs and the configured percentages.
    pub fn build(&self, entry_price: f64, side: Side, style: TradingStyle) -> Result<Bracket> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(Error::InvalidArgument(format!("entry price must be positive, got {entry_price}")));
        }
        let p = self.params(style);
        let s = side.sign();
        let entry = round_price(entry_price);
        let stop = round_price(entry * (1.0 - s * p.stop_pct));
        let mut targets = vec![round_price(entry * (1.0 + s * p.target1_pct))];
        if let Some(t2) = p.target2_pct {
            let t2 = round_price(entry * (1.0 + s * t2));
            // Rounding can collapse close targets on very cheap symbols.
            if targets.last().map_or(true, |&t1| (t2 - t1) * s > 0.0) {
                targets.push(t2);
            }
        }
        let bracket = Bracket { entry, stop, targets, time_stop: p.time_stop, size: self.sizer.size(entry, stop) };
        if !bracket.is_consistent(side) {
            return Err(Error::DataError(format!("price {entry_price} too small for a {style} bracket")));
        }
        Ok(bracket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::position_sizer::PositionSizerConfig;
    use rstest::rstest;

    fn builder() -> BracketBuilder {
        BracketBuilder::new(RiskConfig::default())
    }

    #[test]
    fn safe_long_bracket() {
        let b = builder().build(100.0, Side::Long, TradingStyle::Day(DayMode::Safe)).unwrap();
        assert_eq!(b.stop, 98.0);
        assert_eq!(b.targets, vec![103.0, 105.0]);
        assert_eq!(b.time_stop, TimeStop::Minutes(45));
        assert_eq!(b.size, 100);
    }

    #[test]
    fn aggressive_short_is_mirrored() {
        let b = builder().build(200.0, Side::Short, TradingStyle::Day(DayMode::Aggressive)).unwrap();
        assert_eq!(b.stop, 203.0);
        assert_eq!(b.targets, vec![192.0, 186.0]);
        assert_eq!(b.time_stop, TimeStop::Minutes(25));
        assert!(b.is_consistent(Side::Short));
    }

    #[rstest]
    #[case(SwingStrategy::Momentum, 96.0, 106.0, 110.0, 3)]
    #[case(SwingStrategy::Breakout, 96.5, 107.0, 112.0, 4)]
    #[case(SwingStrategy::MeanReversion, 97.0, 105.0, 108.0, 2)]
    fn swing_brackets(
        #[case] strategy: SwingStrategy,
        #[case] stop: f64,
        #[case] t1: f64,
        #[case] t2: f64,
        #[case] days: u32,
    ) {
        let b = builder().build(100.0, Side::Long, TradingStyle::Swing(strategy)).unwrap();
        assert_eq!(b.stop, stop);
        assert_eq!(b.targets, vec![t1, t2]);
        assert_eq!(b.time_stop, TimeStop::Days(days));
    }

    #[test]
    fn build_is_deterministic() {
        let b = builder();
        for style in TradingStyle::ALL {
            for side in [Side::Long, Side::Short] {
                let first = b.build(37.77, side, style).unwrap();
                assert_eq!(first, b.build(37.77, side, style).unwrap());
                assert!(first.is_consistent(side));
            }
        }
    }

    #[test]
    fn invalid_entry_rejected() {
        assert!(builder().build(0.0, Side::Long, TradingStyle::Day(DayMode::Safe)).is_err());
        assert!(builder().build(f64::NAN, Side::Long, TradingStyle::Day(DayMode::Safe)).is_err());
    }

    #[test]
    fn risk_budget_sizing() {
        let cfg = RiskConfig {
            position_sizer: PositionSizerConfig::RiskBudget { equity: 25_000.0, risk_pct: 0.005, max_shares: 1_000 },
            ..RiskConfig::default()
        };
        let b = BracketBuilder::new(cfg).build(50.0, Side::Long, TradingStyle::Day(DayMode::Safe)).unwrap();
        // $125 risk over a $1 stop distance
        assert_eq!(b.size, 125);
    }
}
