//! Common types used throughout the signal engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One OHLCV bar. Series are ascending by timestamp, one bar per interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Intrabar range as a fraction of `reference` price.
    pub fn range_pct(&self, reference: f64) -> f64 {
        if reference <= 0.0 {
            return 0.0;
        }
        (self.high - self.low).max(0.0) / reference
    }
}

/// Bar interval requested from providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarInterval {
    OneMinute,
    FiveMinute,
    Daily,
}

impl BarInterval {
    pub fn minutes(&self) -> u32 {
        match self {
            | BarInterval::OneMinute => 1,
            | BarInterval::FiveMinute => 5,
            | BarInterval::Daily => 390,
        }
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, BarInterval::Daily)
    }

    /// Calendar days of history to request so enough bars come back.
    pub fn lookback_days(&self) -> i64 {
        match self {
            | BarInterval::OneMinute | BarInterval::FiveMinute => 4,
            | BarInterval::Daily => 45,
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            | BarInterval::OneMinute => write!(f, "1m"),
            | BarInterval::FiveMinute => write!(f, "5m"),
            | BarInterval::Daily => write!(f, "1d"),
        }
    }
}

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(&self) -> f64 {
        match self {
            | Side::Long => 1.0,
            | Side::Short => -1.0,
        }
    }

    /// Side implied by the sign of a directional feature.
    pub fn from_direction(value: f64) -> Self {
        if value > 0.0 {
            Side::Long
        } else {
            Side::Short
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            | Side::Long => write!(f, "LONG"),
            | Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Day-trading risk mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayMode {
    Safe,
    Aggressive,
}

impl DayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            | DayMode::Safe => "SAFE",
            | DayMode::Aggressive => "AGGRESSIVE",
        }
    }
}

impl fmt::Display for DayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            | "SAFE" => Ok(DayMode::Safe),
            | "AGGRESSIVE" => Ok(DayMode::Aggressive),
            | other => Err(Error::InvalidArgument(format!("unknown day-trading mode: {other}"))),
        }
    }
}

/// Swing-trading strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingStrategy {
    Momentum,
    Breakout,
    MeanReversion,
}

impl SwingStrategy {
    pub const ALL: [SwingStrategy; 3] =
        [SwingStrategy::Momentum, SwingStrategy::Breakout, SwingStrategy::MeanReversion];

    pub fn as_str(&self) -> &'static str {
        match self {
            | SwingStrategy::Momentum => "MOMENTUM",
            | SwingStrategy::Breakout => "BREAKOUT",
            | SwingStrategy::MeanReversion => "MEAN_REVERSION",
        }
    }
}

impl fmt::Display for SwingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            | "MOMENTUM" => Ok(SwingStrategy::Momentum),
            | "BREAKOUT" => Ok(SwingStrategy::Breakout),
            | "MEAN_REVERSION" => Ok(SwingStrategy::MeanReversion),
            | other => Err(Error::InvalidArgument(format!("unknown swing strategy: {other}"))),
        }
    }
}

/// Either a day-trading mode or a swing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TradingStyle {
    Day(DayMode),
    Swing(SwingStrategy),
}

impl TradingStyle {
    pub const ALL: [TradingStyle; 5] = [
        TradingStyle::Day(DayMode::Safe),
        TradingStyle::Day(DayMode::Aggressive),
        TradingStyle::Swing(SwingStrategy::Momentum),
        TradingStyle::Swing(SwingStrategy::Breakout),
        TradingStyle::Swing(SwingStrategy::MeanReversion),
    ];

    pub fn kind(&self) -> TradingKind {
        match self {
            | TradingStyle::Day(_) => TradingKind::Day,
            | TradingStyle::Swing(_) => TradingKind::Swing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            | TradingStyle::Day(mode) => mode.as_str(),
            | TradingStyle::Swing(strategy) => strategy.as_str(),
        }
    }
}

impl fmt::Display for TradingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.label())
    }
}

/// Holding horizon of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingKind {
    Day,
    Swing,
}

impl fmt::Display for TradingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            | TradingKind::Day => write!(f, "day"),
            | TradingKind::Swing => write!(f, "swing"),
        }
    }
}

impl FromStr for TradingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            | "day" => Ok(TradingKind::Day),
            | "swing" => Ok(TradingKind::Swing),
            | other => Err(Error::InvalidArgument(format!("unknown trading kind: {other}"))),
        }
    }
}
