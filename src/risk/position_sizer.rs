//! Position sizing policies.
//! Each implementation turns an entry/stop pair into a suggested share count.

use crate::config::position_sizer::PositionSizerConfig;

/// Position sizing interface.
pub trait PositionSizer: Send + Sync + std::fmt::Debug {
    /// Shares to trade for an entry at `entry` protected by `stop`.
    fn size(&self, entry: f64, stop: f64) -> u32;

    fn box_clone(&self) -> Box<dyn PositionSizer>;
}

impl Clone for Box<dyn PositionSizer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Flat share count, used when no account size is known.
#[derive(Debug, Clone)]
pub struct FixedShareSizer {
    pub shares: u32,
}

impl FixedShareSizer {
    pub fn new(shares: u32) -> Self {
        Self { shares }
    }
}

impl PositionSizer for FixedShareSizer {
    fn size(&self, _entry: f64, _stop: f64) -> u32 {
        self.shares
    }

    fn box_clone(&self) -> Box<dyn PositionSizer> {
        Box::new(self.clone())
    }
}

/// Fixed-fractional risk: lose at most `equity * risk_pct` if the stop is hit.
///
/// shares = floor(equity * risk_pct / |entry - stop|), capped at `max_shares`
#[derive(Debug, Clone)]
pub struct RiskBudgetSizer {
    pub equity: f64,
    pub risk_pct: f64,
    pub max_shares: u32,
}

impl RiskBudgetSizer {
    pub fn new(equity: f64, risk_pct: f64, max_shares: u32) -> Self {
        Self { equity, risk_pct, max_shares }
    }
}

impl PositionSizer for RiskBudgetSizer {
    fn size(&self, entry: f64, stop: f64) -> u32 {
        let per_share = (entry - stop).abs();
        if per_share <= 0.0 || !per_share.is_finite() || self.equity <= 0.0 {
            return 0;
        }
        let budget = self.equity * self.risk_pct.clamp(0.0, 1.0);
        let shares = (budget / per_share).floor();
        if shares >= self.max_shares as f64 {
            self.max_shares
        } else {
            shares.max(0.0) as u32
        }
    }

    fn box_clone(&self) -> Box<dyn PositionSizer> {
        Box::new(self.clone())
    }
}

pub fn from_config(cfg: &PositionSizerConfig) -> Box<dyn PositionSizer> {
    match *cfg {
        | PositionSizerConfig::FixedShares { shares } => Box::new(FixedShareSizer::new(shares)),
        | PositionSizerConfig::RiskBudget { equity, risk_pct, max_shares } => {
            Box::new(RiskBudgetSizer::new(equity, risk_pct, max_shares))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ignores_prices() {
        let s = FixedShareSizer::new(100);
        assert_eq!(s.size(10.0, 9.8), 100);
        assert_eq!(s.box_clone().size(500.0, 490.0), 100);
    }

    #[test]
    fn risk_budget_divides_by_stop_distance() {
        // $50k * 0.5% = $250 risk, $2 per share
        let s = RiskBudgetSizer::new(50_000.0, 0.005, 10_000);
        assert_eq!(s.size(100.0, 98.0), 125);
        assert_eq!(s.size(100.0, 102.0), 125);
        assert_eq!(s.size(100.0, 100.0), 0);
    }

    #[test]
    fn risk_budget_capped() {
        let s = RiskBudgetSizer::new(1_000_000.0, 0.012, 500);
        assert_eq!(s.size(10.0, 9.85), 500);
    }

    #[test]
    fn built_from_config() {
        let s = from_config(&PositionSizerConfig::default());
        assert_eq!(s.size(1.0, 0.5), 100);
    }
}
