//! The Signal record and its assembly.

pub mod assembler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::FeatureSet;
use crate::risk::TimeStop;
use crate::universe::UniverseSource;
use crate::utils::types::{Side, TradingKind, TradingStyle};

pub use assembler::{Candidate, SignalAssembler};

/// A point-in-time trading idea. Built once by the assembler and never
/// mutated afterwards; persistence owns it from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub style: TradingStyle,
    pub score: f64,
    pub features: FeatureSet,
    pub entry_price: f64,
    pub stop_price: f64,
    /// Nearest first
    pub target_prices: Vec<f64>,
    pub time_stop: TimeStop,
    pub suggested_size: u32,
    pub universe_source: UniverseSource,
    /// Bar provider that served the data
    pub data_provider: String,
    pub generated_at: DateTime<Utc>,
    pub notes: Vec<String>,
}

impl Signal {
    pub fn kind(&self) -> TradingKind {
        self.style.kind()
    }

    pub fn first_target(&self) -> Option<f64> {
        self.target_prices.first().copied()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.generated_at + self.time_stop.as_duration()
    }
}
