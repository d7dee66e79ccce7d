//! Configuration module for the signal engine.
//!
//! Every threshold below is an empirically tuned default, not a derived
//! value. Override any of them from `config.toml`; omitted keys keep the
//! defaults.

pub mod position_sizer;

use crate::risk::TimeStop;
use crate::utils::error::{Error, Result};
use crate::utils::types::DayMode;
use position_sizer::PositionSizerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration file version
    pub version: String,
    pub app: AppConfig,
    pub providers: ProvidersConfig,
    pub universe: UniverseConfig,
    pub microstructure: MicrostructureConfig,
    pub features: FeaturesConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub maintenance: MaintenanceConfig,
}

/// Application-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,
    /// Path to the data directory
    pub data_dir: String,
}

/// Market-data provider credentials and call budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub polygon_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub alpaca_api_key_id: Option<String>,
    pub alpaca_api_secret_key: Option<String>,

    pub polygon_base_url: String,
    pub finnhub_base_url: String,
    pub alpha_vantage_base_url: String,
    pub alpaca_data_base_url: String,

    /// Timeout applied to every single provider request
    pub request_timeout_ms: u64,
    /// Upper bound on symbols processed concurrently in one scan
    pub max_concurrent_symbols: usize,
    /// Hard ceiling for one symbol's whole fetch/score task
    pub symbol_budget_ms: u64,
    /// Minimum intraday bars for a usable series
    pub min_intraday_bars: usize,
    /// Minimum daily bars for a usable series
    pub min_daily_bars: usize,
    /// Fetch daily bars alongside intraday ones for the N-day breakout feature;
    /// capped at one `request_timeout_ms` and dropped when it overruns
    pub fetch_daily_context: bool,
}

/// Sanity filters applied to top movers for one mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryFilter {
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume: f64,
    pub min_market_cap: f64,
    /// Fractional cap on absolute daily change, before the time-of-day multiplier
    pub base_max_change_pct: f64,
}

/// Universe discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub use_dynamic_discovery: bool,
    pub safe: DiscoveryFilter,
    pub aggressive: DiscoveryFilter,
    /// Local market hour before which the early multiplier applies
    pub early_session_end_hour: u32,
    /// Local market hour from which the late multiplier applies
    pub late_session_start_hour: u32,
    pub early_session_multiplier: f64,
    pub late_session_multiplier: f64,
    pub market_timezone: String,
    /// Dynamic scans yielding fewer symbols than this fall back to the curated list
    pub min_dynamic_symbols: usize,
    pub max_symbols: usize,
    pub cache_ttl_secs: u64,
    pub safe_core: Vec<String>,
    pub aggressive_core: Vec<String>,
    pub swing_core: Vec<String>,
    pub swing_max_symbols: usize,
    /// Swing scans use the AGGRESSIVE movers scan instead of the swing list
    pub swing_dynamic_discovery: bool,
}

impl UniverseConfig {
    pub fn filter(&self, mode: DayMode) -> &DiscoveryFilter {
        match mode {
            | DayMode::Safe => &self.safe,
            | DayMode::Aggressive => &self.aggressive,
        }
    }

    pub fn core(&self, mode: DayMode) -> &[String] {
        match mode {
            | DayMode::Safe => &self.safe_core,
            | DayMode::Aggressive => &self.aggressive_core,
        }
    }
}

/// Order-book tradeability and execution-quality parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrostructureConfig {
    pub safe_max_spread_bps: f64,
    pub aggressive_max_spread_bps: f64,
    pub safe_min_depth_usd: f64,
    pub aggressive_min_depth_usd: f64,
    /// Spread above this fraction of the limit raises a warning
    pub spread_warning_ratio: f64,
    /// Depth below this multiple of the floor raises a warning
    pub depth_warning_ratio: f64,
    pub imbalance_warning: f64,
    /// Quality score used when no snapshot is available
    pub neutral_quality_score: f64,
    /// Upper bounds (exclusive) of the spread buckets scoring 4, 3, 2, 1
    pub spread_bands_bps: [f64; 4],
    /// Lower bounds (inclusive) of the depth buckets scoring 3, 2, 1
    pub depth_bands_usd: [f64; 3],
    /// Upper bounds (exclusive) of |order imbalance| buckets scoring 3, 2, 1
    pub imbalance_bands: [f64; 3],
    pub snapshot_ttl_secs: u64,
}

impl MicrostructureConfig {
    pub fn max_spread_bps(&self, mode: DayMode) -> f64 {
        match mode {
            | DayMode::Safe => self.safe_max_spread_bps,
            | DayMode::Aggressive => self.aggressive_max_spread_bps,
        }
    }

    pub fn min_depth_usd(&self, mode: DayMode) -> f64 {
        match mode {
            | DayMode::Safe => self.safe_min_depth_usd,
            | DayMode::Aggressive => self.aggressive_min_depth_usd,
        }
    }
}

/// Feature-extraction windows and guards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Bars averaged for realized volatility
    pub volatility_window: usize,
    /// Bars in each half of the relative-volume comparison
    pub volume_window: usize,
    /// Close-to-close move treated as a gap
    pub gap_threshold: f64,
    /// Trailing zero-volume bars treated as a halt
    pub halt_bars: usize,
    /// Daily bars forming the N-day high
    pub breakout_lookback_days: usize,
    pub rsi_period: usize,
    pub ma_period: usize,
    pub atr_period: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            volatility_window: 20,
            volume_window: 5,
            gap_threshold: 0.05,
            halt_bars: 5,
            breakout_lookback_days: 20,
            rsi_period: 14,
            ma_period: 20,
            atr_period: 14,
        }
    }
}

/// Pre-scoring gates for one day-trading mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModeGates {
    pub max_volatility: f64,
    pub min_day_volume: f64,
    pub min_momentum: f64,
    /// SAFE only takes positive momentum; AGGRESSIVE accepts either sign
    pub long_only: bool,
    pub quality_threshold: f64,
}

/// Swing strategy minimums
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingThresholds {
    pub momentum_min_move: f64,
    pub momentum_min_rvol: f64,
    pub breakout_min_strength: f64,
    pub breakout_min_rvol: f64,
    pub mean_reversion_min_distance: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub quality_threshold: f64,
}

/// Signal scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub safe: ModeGates,
    pub aggressive: ModeGates,
    /// Saturating component `cap * (1 - exp(-x / scale))`
    pub momentum_scale: f64,
    pub momentum_cap: f64,
    pub volume_scale: f64,
    pub volume_cap: f64,
    pub volatility_scale: f64,
    pub volatility_cap: f64,
    /// Execution-quality score under which the final score is damped
    pub low_execution_quality: f64,
    pub very_low_execution_quality: f64,
    pub swing: SwingThresholds,
}

impl ScoringConfig {
    pub fn gates(&self, mode: DayMode) -> &ModeGates {
        match mode {
            | DayMode::Safe => &self.safe,
            | DayMode::Aggressive => &self.aggressive,
        }
    }
}

/// Fixed bracket percentages for one mode or strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BracketParams {
    pub stop_pct: f64,
    pub target1_pct: f64,
    pub target2_pct: Option<f64>,
    pub time_stop: TimeStop,
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub safe: BracketParams,
    pub aggressive: BracketParams,
    pub momentum: BracketParams,
    pub breakout: BracketParams,
    pub mean_reversion: BracketParams,
    pub position_sizer: PositionSizerConfig,
}

/// Execution advisor and fill-quality parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub day_wide_spread_bps: f64,
    pub day_min_quality: f64,
    pub day_tight_spread_bps: f64,
    pub day_tight_min_quality: f64,
    /// Half-widths of the limit price band, as fractions of entry
    pub day_wide_band_pct: f64,
    pub day_tight_band_pct: f64,
    pub day_default_band_pct: f64,
    pub thin_depth_usd: f64,
    pub thin_depth_size_factor: f64,
    pub swing_wide_spread_bps: f64,
    pub swing_wide_band_pct: f64,
    pub swing_default_band_pct: f64,
    pub enter_now_tolerance_pct: f64,
    pub pullback_trigger_pct: f64,
    pub pullback_target_pct: f64,
    /// Chase thresholds in percent points of slippage
    pub day_chase_threshold_pct: f64,
    pub swing_chase_threshold_pct: f64,
    pub profile_min_fills: u32,
    pub profile_high_slippage_bps: f64,
    pub stats_default_days: i64,
}

/// Picks cache TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub day_picks_ttl_secs: u64,
    pub swing_picks_ttl_secs: u64,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; `None` uses the platform data dir
    pub sqlite_path: Option<String>,
    /// Keep everything in memory (tests, dry runs)
    pub in_memory: bool,
}

/// Background profile refresh and performance rollups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Trailing window for strategy performance snapshots
    pub rollup_days: u32,
    /// Fetch post-signal bars and record outcomes for expired signals
    pub evaluate_outcomes: bool,
    /// Most signals evaluated per run
    pub max_outcome_evaluations: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { rollup_days: 30, evaluate_outcomes: true, max_outcome_evaluations: 200 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            app: AppConfig::default(),
            providers: ProvidersConfig::default(),
            universe: UniverseConfig::default(),
            microstructure: MicrostructureConfig::default(),
            features: FeaturesConfig::default(),
            scoring: ScoringConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), data_dir: "./data".to_string() }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            polygon_api_key: None,
            finnhub_api_key: None,
            alpha_vantage_api_key: None,
            alpaca_api_key_id: None,
            alpaca_api_secret_key: None,
            polygon_base_url: "https://api.polygon.io".to_string(),
            finnhub_base_url: "https://finnhub.io/api/v1".to_string(),
            alpha_vantage_base_url: "https://www.alphavantage.co".to_string(),
            alpaca_data_base_url: "https://data.alpaca.markets".to_string(),
            request_timeout_ms: 2_500,
            max_concurrent_symbols: 100,
            symbol_budget_ms: 9_000,
            min_intraday_bars: 10,
            min_daily_bars: 10,
            fetch_daily_context: true,
        }
    }
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            use_dynamic_discovery: true,
            safe: DiscoveryFilter {
                min_price: 5.0,
                max_price: 500.0,
                min_volume: 5_000_000.0,
                min_market_cap: 50_000_000_000.0,
                base_max_change_pct: 0.15,
            },
            aggressive: DiscoveryFilter {
                min_price: 2.0,
                max_price: 500.0,
                min_volume: 1_000_000.0,
                min_market_cap: 1_000_000_000.0,
                base_max_change_pct: 0.30,
            },
            early_session_end_hour: 10,
            late_session_start_hour: 14,
            early_session_multiplier: 1.67,
            late_session_multiplier: 0.33,
            market_timezone: "America/New_York".to_string(),
            min_dynamic_symbols: 10,
            max_symbols: 100,
            cache_ttl_secs: 60,
            safe_core: symbols(&[
                "AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "TSLA", "JPM", "V", "JNJ", "WMT",
                "PG", "MA", "HD", "DIS", "NFLX", "BAC", "XOM", "CVX", "ABBV",
            ]),
            aggressive_core: symbols(&[
                "AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "TSLA", "AMD", "INTC", "CRM",
                "NFLX", "PYPL", "ADBE", "UBER", "LYFT", "RBLX", "SOFI", "PLTR", "HOOD", "COIN",
                "SNOW", "NET", "ZM", "DOCN", "CRWD", "ZS", "OKTA", "DDOG", "MDB", "ESTC", "SQ",
                "SHOP", "ROKU", "SPOT", "TWLO", "FROG", "BILL", "ASAN", "UPST", "AFRM",
            ]),
            swing_core: symbols(&[
                "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "JPM", "V", "JNJ", "WMT",
                "PG", "MA", "UNH", "HD", "DIS", "BAC", "ADBE", "NFLX", "CRM", "PYPL", "INTC",
                "CMCSA", "PEP", "TMO", "COST", "AVGO", "CSCO", "ABT", "NKE", "MRK", "TXN", "QCOM",
                "ACN", "DHR", "VZ", "LIN", "NEE", "WFC", "PM",
            ]),
            swing_max_symbols: 50,
            swing_dynamic_discovery: false,
        }
    }
}

impl Default for MicrostructureConfig {
    fn default() -> Self {
        Self {
            safe_max_spread_bps: 50.0,
            aggressive_max_spread_bps: 100.0,
            safe_min_depth_usd: 100_000.0,
            aggressive_min_depth_usd: 50_000.0,
            spread_warning_ratio: 0.8,
            depth_warning_ratio: 1.5,
            imbalance_warning: 0.8,
            neutral_quality_score: 5.0,
            spread_bands_bps: [10.0, 25.0, 50.0, 100.0],
            depth_bands_usd: [1_000_000.0, 500_000.0, 100_000.0],
            imbalance_bands: [0.2, 0.4, 0.6],
            snapshot_ttl_secs: 15,
        }
    }
}

impl Default for SwingThresholds {
    fn default() -> Self {
        Self {
            momentum_min_move: 0.02,
            momentum_min_rvol: 1.2,
            breakout_min_strength: 0.01,
            breakout_min_rvol: 1.3,
            mean_reversion_min_distance: 0.05,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            quality_threshold: 2.0,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            safe: ModeGates {
                max_volatility: 0.03,
                min_day_volume: 5_000_000.0,
                min_momentum: 0.001,
                long_only: true,
                quality_threshold: 2.5,
            },
            aggressive: ModeGates {
                max_volatility: 0.08,
                min_day_volume: 0.0,
                min_momentum: 0.0001,
                long_only: false,
                quality_threshold: 2.0,
            },
            momentum_scale: 0.01,
            momentum_cap: 4.0,
            volume_scale: 1.0,
            volume_cap: 3.0,
            volatility_scale: 0.01,
            volatility_cap: 3.0,
            low_execution_quality: 4.0,
            very_low_execution_quality: 2.5,
            swing: SwingThresholds::default(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            safe: BracketParams {
                stop_pct: 0.02,
                target1_pct: 0.03,
                target2_pct: Some(0.05),
                time_stop: TimeStop::Minutes(45),
            },
            aggressive: BracketParams {
                stop_pct: 0.015,
                target1_pct: 0.04,
                target2_pct: Some(0.07),
                time_stop: TimeStop::Minutes(25),
            },
            momentum: BracketParams {
                stop_pct: 0.04,
                target1_pct: 0.06,
                target2_pct: Some(0.10),
                time_stop: TimeStop::Days(3),
            },
            breakout: BracketParams {
                stop_pct: 0.035,
                target1_pct: 0.07,
                target2_pct: Some(0.12),
                time_stop: TimeStop::Days(4),
            },
            mean_reversion: BracketParams {
                stop_pct: 0.03,
                target1_pct: 0.05,
                target2_pct: Some(0.08),
                time_stop: TimeStop::Days(2),
            },
            position_sizer: PositionSizerConfig::default(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            day_wide_spread_bps: 20.0,
            day_min_quality: 5.0,
            day_tight_spread_bps: 10.0,
            day_tight_min_quality: 7.0,
            day_wide_band_pct: 0.0005,
            day_tight_band_pct: 0.00025,
            day_default_band_pct: 0.001,
            thin_depth_usd: 50_000.0,
            thin_depth_size_factor: 0.5,
            swing_wide_spread_bps: 30.0,
            swing_wide_band_pct: 0.005,
            swing_default_band_pct: 0.002,
            enter_now_tolerance_pct: 0.001,
            pullback_trigger_pct: 0.005,
            pullback_target_pct: 0.002,
            day_chase_threshold_pct: 0.5,
            swing_chase_threshold_pct: 1.0,
            profile_min_fills: 3,
            profile_high_slippage_bps: 25.0,
            stats_default_days: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { day_picks_ttl_secs: 60, swing_picks_ttl_secs: 3_600 }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration as a TOML string
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Fill provider credentials from the environment when the file leaves them empty.
    pub fn with_env_overrides(mut self) -> Self {
        let p = &mut self.providers;
        for (slot, var) in [
            (&mut p.polygon_api_key, "POLYGON_API_KEY"),
            (&mut p.finnhub_api_key, "FINNHUB_API_KEY"),
            (&mut p.alpha_vantage_api_key, "ALPHA_VANTAGE_API_KEY"),
            (&mut p.alpaca_api_key_id, "APCA_API_KEY_ID"),
            (&mut p.alpaca_api_secret_key, "APCA_API_SECRET_KEY"),
        ] {
            if slot.as_deref().map_or(true, str::is_empty) {
                if let Ok(value) = env::var(var) {
                    if !value.is_empty() {
                        *slot = Some(value);
                    }
                }
            }
        }
        self
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.providers.request_timeout_ms == 0 {
            return Err(Error::ConfigError("providers.request_timeout_ms must be > 0".into()));
        }
        if self.providers.max_concurrent_symbols == 0 {
            return Err(Error::ConfigError("providers.max_concurrent_symbols must be > 0".into()));
        }
        if self.universe.early_session_end_hour > self.universe.late_session_start_hour {
            return Err(Error::ConfigError(
                "universe.early_session_end_hour must not exceed late_session_start_hour".into(),
            ));
        }
        self.universe
            .market_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| Error::ConfigError(format!("universe.market_timezone: {e}")))?;
        if self.maintenance.rollup_days == 0 {
            return Err(Error::ConfigError("maintenance.rollup_days must be > 0".into()));
        }
        for (name, b) in [
            ("safe", &self.risk.safe),
            ("aggressive", &self.risk.aggressive),
            ("momentum", &self.risk.momentum),
            ("breakout", &self.risk.breakout),
            ("mean_reversion", &self.risk.mean_reversion),
        ] {
            if b.stop_pct <= 0.0 || b.target1_pct <= 0.0 || b.stop_pct >= 1.0 {
                return Err(Error::ConfigError(format!("risk.{name}: percentages out of range")));
            }
            if let Some(t2) = b.target2_pct {
                if t2 < b.target1_pct {
                    return Err(Error::ConfigError(format!(
                        "risk.{name}: target2_pct must be at least target1_pct"
                    )));
                }
            }
        }
        Ok(())
    }
}
