//! Position sizer configuration structs for serde deserialization.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionSizerConfig {
    /// Flat share count, used when no account size is known.
    FixedShares { shares: u32 },
    /// Risk a fraction of `equity` between entry and stop.
    RiskBudget { equity: f64, risk_pct: f64, max_shares: u32 },
}

impl Default for PositionSizerConfig {
    fn default() -> Self {
        PositionSizerConfig::FixedShares { shares: 100 }
    }
}
