//! Feature extraction from bars and order-book state.
//!
//! A [`FeatureSet`] is a fixed, versioned record of optional floats. A
//! missing value is neutral for every consumer.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{FeaturesConfig, MicrostructureConfig};
use crate::indicators::{atr, highest_high, pct_change, simple_rsi, sma, vwap};
use crate::microstructure::{execution_quality_score, MicrostructureSnapshot};
use crate::utils::types::{Bar, BarInterval};

pub const FEATURE_VERSION: &str = "v2";

/// Why a candidate was dropped before it became a signal.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("insufficient bars: have {have}, need {need}")]
    InsufficientBars { have: usize, need: usize },
    #[error("gap of {pct:.4} between consecutive closes")]
    Gap { pct: f64 },
    #[error("zero volume over the last {bars} bars")]
    Halted { bars: usize },
    #[error("realized volatility {value:.4} above {limit:.4}")]
    Volatility { value: f64, limit: f64 },
    #[error("day volume {value:.0} below {limit:.0}")]
    Liquidity { value: f64, limit: f64 },
    #[error("momentum {value:.5} below {limit:.5}")]
    Momentum { value: f64, limit: f64 },
    #[error("no setup: {0}")]
    NoSetup(String),
    #[error("score {score:.2} below threshold {threshold:.2}")]
    Quality { score: f64, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    pub version: String,
    // intraday
    pub momentum_5m: Option<f64>,
    pub momentum_15m: Option<f64>,
    pub realized_vol: Option<f64>,
    pub vwap_dist_pct: Option<f64>,
    pub breakout_pct: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub day_volume: Option<f64>,
    pub gap_pct: Option<f64>,
    // order book
    pub spread_bps: Option<f64>,
    pub order_imbalance: Option<f64>,
    pub depth_imbalance: Option<f64>,
    pub bid_depth: Option<f64>,
    pub ask_depth: Option<f64>,
    pub execution_quality_score: Option<f64>,
    // daily
    pub momentum_5d: Option<f64>,
    pub rvol_5d: Option<f64>,
    pub breakout_20d: Option<f64>,
    pub rsi_14: Option<f64>,
    pub dist_ma20: Option<f64>,
    pub atr_1d: Option<f64>,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            version: FEATURE_VERSION.to_string(),
            momentum_5m: None,
            momentum_15m: None,
            realized_vol: None,
            vwap_dist_pct: None,
            breakout_pct: None,
            volume_ratio: None,
            day_volume: None,
            gap_pct: None,
            spread_bps: None,
            order_imbalance: None,
            depth_imbalance: None,
            bid_depth: None,
            ask_depth: None,
            execution_quality_score: None,
            momentum_5d: None,
            rvol_5d: None,
            breakout_20d: None,
            rsi_14: None,
            dist_ma20: None,
            atr_1d: None,
        }
    }
}

impl FeatureSet {
    /// Present features keyed by vocabulary name.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        [
            ("momentum_5m", self.momentum_5m),
            ("momentum_15m", self.momentum_15m),
            ("realized_vol", self.realized_vol),
            ("vwap_dist_pct", self.vwap_dist_pct),
            ("breakout_pct", self.breakout_pct),
            ("volume_ratio", self.volume_ratio),
            ("day_volume", self.day_volume),
            ("gap_pct", self.gap_pct),
            ("spread_bps", self.spread_bps),
            ("order_imbalance", self.order_imbalance),
            ("depth_imbalance", self.depth_imbalance),
            ("bid_depth", self.bid_depth),
            ("ask_depth", self.ask_depth),
            ("execution_quality_score", self.execution_quality_score),
            ("momentum_5d", self.momentum_5d),
            ("rvol_5d", self.rvol_5d),
            ("breakout_20d", self.breakout_20d),
            ("rsi_14", self.rsi_14),
            ("dist_ma20", self.dist_ma20),
            ("atr_1d", self.atr_1d),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.to_map().get(name).copied()
    }

    /// Execution quality, neutral when unknown.
    pub fn execution_quality(&self) -> f64 {
        self.execution_quality_score.unwrap_or(5.0)
    }

    /// Total displayed depth in dollars, when a snapshot was seen.
    pub fn total_depth(&self) -> Option<f64> {
        match (self.bid_depth, self.ask_depth) {
            | (Some(b), Some(a)) => Some(b + a),
            | _ => None,
        }
    }

    fn apply_microstructure(&mut self, cfg: &MicrostructureConfig, snapshot: Option<&MicrostructureSnapshot>) {
        if let Some(s) = snapshot {
            self.spread_bps = Some(s.spread_bps);
            self.order_imbalance = Some(s.order_imbalance);
            self.depth_imbalance = Some(s.depth_imbalance);
            self.bid_depth = Some(s.bid_depth);
            self.ask_depth = Some(s.ask_depth);
        }
        self.execution_quality_score = Some(execution_quality_score(cfg, snapshot));
    }
}

fn market_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&New_York).date_naive()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeaturesConfig,
    micro: MicrostructureConfig,
    fast_interval: BarInterval,
    min_intraday_bars: usize,
    min_daily_bars: usize,
}

impl FeatureExtractor {
    pub fn new(
        config: FeaturesConfig,
        micro: MicrostructureConfig,
        fast_interval: BarInterval,
        min_intraday_bars: usize,
        min_daily_bars: usize,
    ) -> Self {
        Self { config, micro, fast_interval, min_intraday_bars, min_daily_bars }
    }

    /// Bars spanning `minutes` on the fast interval, at least one.
    fn bars_for(&self, minutes: u32) -> usize {
        ((minutes / self.fast_interval.minutes().max(1)) as usize).max(1)
    }

    fn check_guards(&self, bars: &[Bar], halt_bars: usize) -> Result<Option<f64>, Rejection> {
        let n = bars.len();
        let halt = halt_bars.min(n);
        if halt > 0 && bars[n - halt..].iter().all(|b| b.volume <= 0.0) {
            return Err(Rejection::Halted { bars: halt });
        }
        let gap = if n >= 2 { pct_change(bars[n - 2].close, bars[n - 1].close) } else { None };
        if let Some(g) = gap {
            if g.abs() >= self.config.gap_threshold {
                return Err(Rejection::Gap { pct: g });
            }
        }
        Ok(gap)
    }

    /// Intraday features from `fast` bars, with `slow` daily bars (possibly
    /// empty) supplying the N-day high.
    pub fn extract(
        &self,
        fast: &[Bar],
        slow: &[Bar],
        snapshot: Option<&MicrostructureSnapshot>,
    ) -> Result<FeatureSet, Rejection> {
        let n = fast.len();
        if n < self.min_intraday_bars.max(2) {
            return Err(Rejection::InsufficientBars { have: n, need: self.min_intraday_bars.max(2) });
        }
        let gap = self.check_guards(fast, self.config.halt_bars)?;
        let last = &fast[n - 1];
        let price = last.close;
        let close_back = |k: usize| fast.get(n.checked_sub(k + 1)?).map(|b| b.close);

        let mut fs = FeatureSet { gap_pct: gap, ..FeatureSet::default() };
        fs.momentum_5m = close_back(self.bars_for(5)).and_then(|p| pct_change(p, price));
        fs.momentum_15m = close_back(self.bars_for(15)).and_then(|p| pct_change(p, price));

        let vol_window = &fast[n.saturating_sub(self.config.volatility_window)..];
        fs.realized_vol = mean(vol_window.iter().map(|b| b.range_pct(b.close)));

        fs.vwap_dist_pct = vwap(fast).and_then(|v| pct_change(v, price));

        let k = self.config.volume_window;
        if n >= 2 * k && k > 0 {
            let recent = mean(fast[n - k..].iter().map(|b| b.volume));
            let prior = mean(fast[n - 2 * k..n - k].iter().map(|b| b.volume));
            if let (Some(r), Some(p)) = (recent, prior) {
                fs.volume_ratio = (p > 0.0).then(|| r / p);
            }
        }

        let today = market_date(last.timestamp);
        fs.day_volume = Some(fast.iter().filter(|b| market_date(b.timestamp) == today).map(|b| b.volume).sum());

        let prior_days: Vec<Bar> = slow.iter().filter(|b| market_date(b.timestamp) < today).copied().collect();
        let reference_high = if prior_days.is_empty() {
            highest_high(&fast[..n - 1], n - 1)
        } else {
            highest_high(&prior_days, self.config.breakout_lookback_days)
        };
        fs.breakout_pct = reference_high.and_then(|h| pct_change(h, last.high));

        fs.apply_microstructure(&self.micro, snapshot);
        Ok(fs)
    }

    /// Daily features for swing strategies.
    pub fn extract_daily(
        &self,
        daily: &[Bar],
        snapshot: Option<&MicrostructureSnapshot>,
    ) -> Result<FeatureSet, Rejection> {
        let n = daily.len();
        if n < self.min_daily_bars.max(2) {
            return Err(Rejection::InsufficientBars { have: n, need: self.min_daily_bars.max(2) });
        }
        // Multi-day moves are the signal here, so only the halt guard applies.
        self.check_halt_only(daily)?;
        let last = &daily[n - 1];
        let price = last.close;
        let closes: Vec<f64> = daily.iter().map(|b| b.close).collect();

        let mut fs = FeatureSet::default();
        if n > 5 {
            fs.momentum_5d = pct_change(closes[n - 6], price);
        }

        let k = self.config.volume_window;
        if k > 0 && n >= 2 * k {
            let recent = mean(daily[n - k..].iter().map(|b| b.volume));
            // up to three windows of baseline volume
            let start = (n - k).saturating_sub(3 * k);
            let prior = mean(daily[start..n - k].iter().map(|b| b.volume));
            if let (Some(r), Some(p)) = (recent, prior) {
                fs.rvol_5d = (p > 0.0).then(|| r / p);
            }
        }

        let lookback = self.config.breakout_lookback_days;
        if n > lookback {
            let prior = &daily[n - 1 - lookback..n - 1];
            fs.breakout_20d = highest_high(prior, lookback).and_then(|h| pct_change(h, price));
        }

        fs.rsi_14 = simple_rsi(&closes, self.config.rsi_period);
        fs.dist_ma20 = sma(&closes, self.config.ma_period).and_then(|ma| pct_change(ma, price));
        fs.atr_1d = atr(daily, self.config.atr_period);

        let vol_window = &daily[n.saturating_sub(self.config.volatility_window)..];
        fs.realized_vol = mean(vol_window.iter().map(|b| b.range_pct(b.close)));
        fs.day_volume = Some(last.volume);

        fs.apply_microstructure(&self.micro, snapshot);
        Ok(fs)
    }

    fn check_halt_only(&self, bars: &[Bar]) -> Result<(), Rejection> {
        match bars.last() {
            | Some(b) if b.volume <= 0.0 => Err(Rejection::Halted { bars: 1 }),
            | _ => Ok(()),
        }
    }
}
