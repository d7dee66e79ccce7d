//! Walk post-signal bars to decide how a signal would have played out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signal::Signal;
use crate::utils::error::{Error, Result};
use crate::utils::types::{Bar, TradingStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Stop,
    Target,
    TimeStop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: Uuid,
    pub symbol: String,
    pub style: TradingStyle,
    pub exit_reason: ExitReason,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    /// Fractional return in the signal's direction
    pub pnl_pct: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl SignalOutcome {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

/// First bar touching the stop exits at the stop; first bar touching target
/// 1 exits there; a bar touching both counts as the stop. Otherwise the
/// position closes at the last bar inside the time stop.
pub fn evaluate_outcome(signal: &Signal, bars_after: &[Bar]) -> Result<SignalOutcome> {
    let expires = signal.expires_at();
    let window: Vec<&Bar> = bars_after
        .iter()
        .filter(|b| b.timestamp > signal.generated_at && b.timestamp <= expires)
        .collect();
    let Some(last) = window.last() else {
        return Err(Error::DataError(format!("{}: no bars inside the signal's time stop", signal.symbol)));
    };
    let target = signal
        .first_target()
        .ok_or_else(|| Error::DataError(format!("{}: signal has no target", signal.symbol)))?;

    let sign = signal.side.sign();
    let (reason, price, time) = window
        .iter()
        .find_map(|b| {
            // adverse / favourable extremes of the bar for this side
            let (adverse, favourable) = if sign > 0.0 { (b.low, b.high) } else { (b.high, b.low) };
            if (adverse - signal.stop_price) * sign <= 0.0 {
                Some((ExitReason::Stop, signal.stop_price, b.timestamp))
            } else if (favourable - target) * sign >= 0.0 {
                Some((ExitReason::Target, target, b.timestamp))
            } else {
                None
            }
        })
        .unwrap_or((ExitReason::TimeStop, last.close, last.timestamp));

    Ok(SignalOutcome {
        signal_id: signal.id,
        symbol: signal.symbol.clone(),
        style: signal.style,
        exit_reason: reason,
        exit_price: price,
        exit_time: time,
        pnl_pct: (price - signal.entry_price) / signal.entry_price * sign,
        evaluated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::risk::TimeStop;
    use crate::universe::UniverseSource;
    use crate::utils::types::{DayMode, Side};
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn signal(side: Side) -> Signal {
        let long = side == Side::Long;
        Signal {
            id: Uuid::new_v4(),
            symbol: "META".to_string(),
            side,
            style: TradingStyle::Day(DayMode::Safe),
            score: 5.0,
            features: FeatureSet::default(),
            entry_price: 100.0,
            stop_price: if long { 98.0 } else { 102.0 },
            target_prices: if long { vec![103.0, 105.0] } else { vec![97.0, 95.0] },
            time_stop: TimeStop::Minutes(45),
            suggested_size: 100,
            universe_source: UniverseSource::Core,
            data_provider: "test".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap(),
            notes: vec![],
        }
    }

    fn bar(sig: &Signal, minutes: i64, low: f64, high: f64, close: f64) -> Bar {
        Bar { timestamp: sig.generated_at + Duration::minutes(minutes), open: close, high, low, close, volume: 1.0 }
    }

    #[test]
    fn target_hit_long() {
        let s = signal(Side::Long);
        let bars = vec![bar(&s, 5, 99.0, 101.0, 100.5), bar(&s, 10, 100.0, 103.2, 103.0)];
        let o = evaluate_outcome(&s, &bars).unwrap();
        assert_eq!(o.exit_reason, ExitReason::Target);
        assert!((o.pnl_pct - 0.03).abs() < 1e-12);
        assert!(o.is_win());
    }

    #[test]
    fn stop_wins_ties() {
        let s = signal(Side::Long);
        let bars = vec![bar(&s, 5, 97.5, 103.5, 100.0)];
        let o = evaluate_outcome(&s, &bars).unwrap();
        assert_eq!(o.exit_reason, ExitReason::Stop);
        assert!((o.pnl_pct + 0.02).abs() < 1e-12);
    }

    #[test]
    fn short_stop_and_time_stop() {
        let s = signal(Side::Short);
        let stopped = evaluate_outcome(&s, &[bar(&s, 5, 100.0, 102.1, 101.0)]).unwrap();
        assert_eq!(stopped.exit_reason, ExitReason::Stop);
        // the 60-minute bar is past the 45-minute time stop
        let bars = vec![bar(&s, 5, 99.0, 101.0, 99.5), bar(&s, 40, 98.5, 99.6, 99.0), bar(&s, 60, 90.0, 91.0, 90.0)];
        let timed = evaluate_outcome(&s, &bars).unwrap();
        assert_eq!(timed.exit_reason, ExitReason::TimeStop);
        assert_eq!(timed.exit_price, 99.0);
        assert!((timed.pnl_pct - 0.01).abs() < 1e-12);
    }

    #[test]
    fn needs_bars() {
        let s = signal(Side::Long);
        assert_matches!(evaluate_outcome(&s, &[]), Err(Error::DataError(_)));
        let before = vec![bar(&s, -5, 90.0, 110.0, 100.0)];
        assert!(evaluate_outcome(&s, &before).is_err());
    }
}
