//! Small indicator helpers over [`Bar`] series.
//!
//! Rolling means, maxima and ATR come from the `ta` crate; RSI uses simple
//! (not exponentially smoothed) average gains and losses.

use ta::indicators::{AverageTrueRange, Maximum, SimpleMovingAverage};
use ta::{Close, High, Low, Next, Open, Volume};

use crate::utils::types::Bar;

impl Open for Bar {
    fn open(&self) -> f64 {
        self.open
    }
}

impl High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

impl Volume for Bar {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Last value of a `period` simple moving average; `None` until the window fills.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut ind = SimpleMovingAverage::new(period).ok()?;
    let mut last = None;
    for &v in values {
        last = Some(ind.next(v));
    }
    last
}

/// Highest high over the last `period` bars.
pub fn highest_high(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.is_empty() {
        return None;
    }
    let mut ind = Maximum::new(period).ok()?;
    let mut last = None;
    for b in bars {
        last = Some(ind.next(b));
    }
    last
}

/// Average true range over `period` bars, in price units.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let mut ind = AverageTrueRange::new(period).ok()?;
    let mut last = None;
    for b in bars {
        last = Some(ind.next(b));
    }
    last
}

/// RSI from simple averages of the last `period` close-to-close changes.
pub fn simple_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Volume-weighted average close.
pub fn vwap(bars: &[Bar]) -> Option<f64> {
    let (pv, v) = bars.iter().fold((0.0, 0.0), |(pv, v), b| (pv + b.close * b.volume, v + b.volume));
    (v > 0.0).then(|| pv / v)
}

/// Fractional change from `from` to `to`.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| (to - from) / from)
}
