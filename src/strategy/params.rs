//! Strategy Parameters
//!
//! Configuration structs for every engine component. Each struct is passed
//! explicitly to the constructor that needs it and validated there.
//! Defaults follow the production hourly-bar setup.

use serde::{Deserialize, Serialize};

/// How a Neutral machine decides to open a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Enter only on the tick where z crosses the entry band
    #[default]
    Crossing,
    /// Enter whenever |z| >= z_in while flat, regardless of the prior tick
    Level,
}

/// Rolling window lengths (in bars)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window for the rolling OLS hedge ratio
    pub beta_window: usize,
    /// Window for the spread mean/std used by the z-score
    pub zscore_window: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            beta_window: 200,
            zscore_window: 100,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.beta_window < 2 {
            return Err(ConfigError::InvalidWindow("beta_window", self.beta_window));
        }
        if self.zscore_window < 2 {
            return Err(ConfigError::InvalidWindow("zscore_window", self.zscore_window));
        }
        Ok(())
    }
}

/// Z-score bands for the entry/exit state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Entry band (e.g., 2.0 = enter beyond 2 std devs)
    pub z_in: f64,
    /// Exit band (flatten when |z| drops below)
    pub z_out: f64,
    /// Stop band (flatten when |z| rises above)
    pub z_stop: f64,
    pub entry_mode: EntryMode,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            z_in: 2.0,
            z_out: 0.5,
            z_stop: 3.5,
            entry_mode: EntryMode::Crossing,
        }
    }
}

impl ThresholdConfig {
    pub fn new(z_in: f64, z_out: f64, z_stop: f64) -> Self {
        Self {
            z_in,
            z_out,
            z_stop,
            entry_mode: EntryMode::Crossing,
        }
    }

    pub fn with_entry_mode(mut self, mode: EntryMode) -> Self {
        self.entry_mode = mode;
        self
    }

    /// Requires 0 < z_out < z_in < z_stop, all finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_finite = self.z_in.is_finite() && self.z_out.is_finite() && self.z_stop.is_finite();
        if !all_finite || self.z_out <= 0.0 {
            return Err(ConfigError::InvalidThresholds {
                z_in: self.z_in,
                z_out: self.z_out,
                z_stop: self.z_stop,
            });
        }
        if self.z_out >= self.z_in || self.z_in >= self.z_stop {
            return Err(ConfigError::InvalidThresholds {
                z_in: self.z_in,
                z_out: self.z_out,
                z_stop: self.z_stop,
            });
        }
        Ok(())
    }
}

/// Volatility-targeting position sizing limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Target dollar P&L for a one-sigma spread move
    pub target_sigma_usd: f64,
    /// Hard cap on either leg's notional
    pub max_notional_per_leg: f64,
    /// Maximum fraction of average daily volume per leg
    pub max_adv_fraction: f64,
    /// Legs below this notional are not traded at all
    pub min_notional_per_leg: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            target_sigma_usd: 200.0,
            max_notional_per_leg: 25_000.0,
            max_adv_fraction: 0.05,
            min_notional_per_leg: 100.0,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_sigma_usd.is_finite() && self.target_sigma_usd > 0.0) {
            return Err(ConfigError::InvalidSizing(format!(
                "target_sigma_usd must be > 0, got {}",
                self.target_sigma_usd
            )));
        }
        if !(self.max_notional_per_leg.is_finite() && self.max_notional_per_leg > 0.0) {
            return Err(ConfigError::InvalidSizing(format!(
                "max_notional_per_leg must be > 0, got {}",
                self.max_notional_per_leg
            )));
        }
        if !(self.max_adv_fraction > 0.0 && self.max_adv_fraction <= 1.0) {
            return Err(ConfigError::InvalidSizing(format!(
                "max_adv_fraction must be in (0, 1], got {}",
                self.max_adv_fraction
            )));
        }
        if !(self.min_notional_per_leg >= 0.0
            && self.min_notional_per_leg < self.max_notional_per_leg)
        {
            return Err(ConfigError::InvalidSizing(format!(
                "min_notional_per_leg must be in [0, max_notional_per_leg), got {}",
                self.min_notional_per_leg
            )));
        }
        Ok(())
    }
}

/// Trading cost assumptions in basis points of traded notional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            fee_bps: 10.0,
            slippage_bps: 5.0,
        }
    }
}

impl CostConfig {
    pub fn zero() -> Self {
        Self {
            fee_bps: 0.0,
            slippage_bps: 0.0,
        }
    }

    /// Combined cost as a fraction of notional
    pub fn total_rate(&self) -> f64 {
        (self.fee_bps + self.slippage_bps) / 10_000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fee_bps >= 0.0 && self.fee_bps <= 1_000.0) {
            return Err(ConfigError::InvalidCosts(self.fee_bps));
        }
        if !(self.slippage_bps >= 0.0 && self.slippage_bps <= 1_000.0) {
            return Err(ConfigError::InvalidCosts(self.slippage_bps));
        }
        Ok(())
    }
}

/// Cointegration gate parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CointegrationConfig {
    /// Both p-values must be strictly below this
    pub adf_threshold: f64,
    /// Accepted half-life range in bars
    pub min_half_life: f64,
    pub max_half_life: f64,
    /// Number of most recent aligned bars tested
    pub lookback: usize,
}

impl Default for CointegrationConfig {
    fn default() -> Self {
        Self {
            adf_threshold: 0.05,
            min_half_life: 1.0,
            max_half_life: 30.0,
            lookback: 500,
        }
    }
}

impl CointegrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.adf_threshold > 0.0 && self.adf_threshold < 1.0) {
            return Err(ConfigError::InvalidCointegration(format!(
                "adf_threshold must be in (0, 1), got {}",
                self.adf_threshold
            )));
        }
        if !(self.min_half_life >= 0.0 && self.min_half_life < self.max_half_life) {
            return Err(ConfigError::InvalidCointegration(format!(
                "half-life range [{}, {}] is empty",
                self.min_half_life, self.max_half_life
            )));
        }
        if self.lookback < 100 {
            return Err(ConfigError::InvalidCointegration(format!(
                "lookback must be >= 100, got {}",
                self.lookback
            )));
        }
        Ok(())
    }
}

/// Backtest account parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Bars per year for annualization; inferred from bar spacing when absent
    pub bars_per_year: Option<f64>,
    /// Freeze leg units at entry instead of re-sizing on every bar
    pub hold_units_until_exit: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            bars_per_year: None,
            hold_units_until_exit: false,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InvalidCapital(self.initial_capital));
        }
        if let Some(bars) = self.bars_per_year {
            if !(bars.is_finite() && bars > 0.0) {
                return Err(ConfigError::InvalidBarsPerYear(bars));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {0}: {1} (minimum 2)")]
    InvalidWindow(&'static str, usize),
    #[error("Invalid thresholds: z_in={z_in}, z_out={z_out}, z_stop={z_stop} (need 0 < z_out < z_in < z_stop)")]
    InvalidThresholds { z_in: f64, z_out: f64, z_stop: f64 },
    #[error("Invalid sizing: {0}")]
    InvalidSizing(String),
    #[error("Invalid cost: {0} bps (must be 0-1000)")]
    InvalidCosts(f64),
    #[error("Invalid cointegration settings: {0}")]
    InvalidCointegration(String),
    #[error("Invalid initial capital: {0} (must be > 0)")]
    InvalidCapital(f64),
    #[error("Invalid bars per year: {0} (must be > 0)")]
    InvalidBarsPerYear(f64),
}
