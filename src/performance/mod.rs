//! Signal outcomes and per-style performance rollups

mod metrics;
mod outcome;

pub use metrics::{max_drawdown, rollup, sharpe, Period, StrategyPerformance};
pub use outcome::{evaluate_outcome, ExitReason, SignalOutcome};
