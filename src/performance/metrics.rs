use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::outcome::SignalOutcome;
use crate::signal::Signal;
use crate::utils::types::TradingStyle;

/// Half-open window `[start, end)` of signal generation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        Self { start: now - Duration::days(days as i64), end: now }
    }

    /// The UTC calendar day containing `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        Self { start, end: start + Duration::days(1) }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Append-only performance snapshot for one style over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub style: TradingStyle,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of the cumulative pnl curve, as a positive fraction
    pub max_drawdown: f64,
    pub avg_pnl_per_signal: f64,
    pub total_signals: u32,
    pub signals_evaluated: u32,
    pub created_at: DateTime<Utc>,
}

impl StrategyPerformance {
    pub fn period(&self) -> Period {
        Period::new(self.period_start, self.period_end)
    }
}

/// Roll up outcomes of `style` signals generated inside `period`. Outcomes
/// whose signal is not among those are ignored.
pub fn rollup(
    style: TradingStyle,
    period: Period,
    signals: &[Signal],
    outcomes: &[SignalOutcome],
) -> StrategyPerformance {
    let ids: HashSet<_> = signals
        .iter()
        .filter(|s| s.style == style && period.contains(s.generated_at))
        .map(|s| s.id)
        .collect();

    let mut evaluated: Vec<&SignalOutcome> = outcomes.iter().filter(|o| ids.contains(&o.signal_id)).collect();
    evaluated.sort_by_key(|o| o.exit_time);
    let pnls: Vec<f64> = evaluated.iter().map(|o| o.pnl_pct).collect();

    let n = pnls.len();
    let (win_rate, avg) = if n == 0 {
        (0.0, 0.0)
    } else {
        let wins = pnls.iter().filter(|&&p| p > 0.0).count();
        (wins as f64 / n as f64, pnls.iter().mean())
    };

    StrategyPerformance {
        style,
        period_start: period.start,
        period_end: period.end,
        win_rate,
        sharpe_ratio: sharpe(&pnls),
        max_drawdown: max_drawdown(&pnls),
        avg_pnl_per_signal: avg,
        total_signals: ids.len() as u32,
        signals_evaluated: n as u32,
        created_at: Utc::now(),
    }
}

/// Per-signal Sharpe: mean over sample standard deviation. Zero when
/// undefined (fewer than two samples or no dispersion).
pub fn sharpe(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let sd = pnls.iter().std_dev();
    if !sd.is_finite() || sd <= f64::EPSILON {
        return 0.0;
    }
    pnls.iter().mean() / sd
}

pub fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for p in pnls {
        equity += p;
        peak = peak.max(equity);
        worst = worst.max(peak - equity);
    }
    worst
}
