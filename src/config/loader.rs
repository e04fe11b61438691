//! Configuration Loader
//!
//! Loads and validates the engine configuration from a TOML file. Every
//! section is optional and falls back to the production defaults, so a file
//! only needs the `[[pairs]]` it wants to trade.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::strategy::params::{
    BacktestConfig, CointegrationConfig, ConfigError, CostConfig, SizingConfig, ThresholdConfig,
    WindowConfig,
};

/// Overrides `[state] dir`
pub const STATE_DIR_ENV: &str = "PAIRS_STATE_DIR";
/// Overrides `[logging] level`
pub const LOG_LEVEL_ENV: &str = "PAIRS_LOG_LEVEL";

/// Main configuration structure matching pairs.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub windows: WindowConfig,
    pub thresholds: ThresholdConfig,
    pub risk: SizingConfig,
    pub costs: CostConfig,
    pub cointegration: CointegrationConfig,
    pub backtest: BacktestConfig,
    pub filters: FiltersSection,
    pub state: StateSection,
    pub logging: LoggingSection,
    pub pairs: Vec<PairSection>,
}

/// Tradability filters applied by the scanner
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersSection {
    /// Minimum average daily dollar volume on each leg
    pub min_adv_usd: f64,
    /// Bars in one trading day, used for the ADV window
    pub bars_per_day: usize,
    /// Most recent complete days averaged for ADV
    pub adv_days: usize,
    /// Skip signal processing for pairs failing the cointegration gate
    pub require_cointegration: bool,
    /// Ignore the ADV filter (for assets without volume data)
    pub bypass_adv: bool,
}

impl Default for FiltersSection {
    fn default() -> Self {
        Self {
            min_adv_usd: 5_000_000.0,
            bars_per_day: 24,
            adv_days: 30,
            require_cointegration: true,
            bypass_adv: false,
        }
    }
}

/// Persisted position state location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub dir: PathBuf,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// One tradable pair: Y is the dependent leg, X the hedge leg
#[derive(Debug, Clone, Deserialize)]
pub struct PairSection {
    pub name: String,
    pub asset_y: String,
    pub asset_x: String,
    /// Price-history CSV for the Y leg
    pub y_file: PathBuf,
    /// Price-history CSV for the X leg
    pub x_file: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    Invalid(#[from] ConfigError),
    #[error("Validation failed: {0}")]
    Pairs(String),
}

/// Load configuration from a TOML file.
///
/// Reads `.env` first so `PAIRS_STATE_DIR` / `PAIRS_LOG_LEVEL` can live
/// there, then expands `~` in every path and validates.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, LoaderError> {
    dotenvy::dotenv().ok();
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.expand_paths();
    config.validate()?;
    Ok(config)
}

/// Parse without touching the environment or filesystem
pub fn parse_config(content: &str) -> Result<AppConfig, LoaderError> {
    Ok(toml::from_str(content)?)
}

impl AppConfig {
    /// Apply environment overrides; `lookup` returns the variable's value if set
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.state.dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    fn expand_paths(&mut self) {
        self.state.dir = expand(&self.state.dir);
        for pair in &mut self.pairs {
            pair.y_file = expand(&pair.y_file);
            pair.x_file = expand(&pair.x_file);
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), LoaderError> {
        self.windows.validate()?;
        self.thresholds.validate()?;
        self.risk.validate()?;
        self.costs.validate()?;
        self.cointegration.validate()?;
        self.backtest.validate()?;

        if !(self.filters.min_adv_usd >= 0.0 && self.filters.min_adv_usd.is_finite()) {
            return Err(LoaderError::Pairs(format!(
                "min_adv_usd must be >= 0, got {}",
                self.filters.min_adv_usd
            )));
        }
        if self.filters.bars_per_day == 0 {
            return Err(LoaderError::Pairs("bars_per_day must be > 0".to_string()));
        }
        if self.filters.adv_days == 0 {
            return Err(LoaderError::Pairs("adv_days must be > 0".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for pair in &self.pairs {
            if pair.name.trim().is_empty() {
                return Err(LoaderError::Pairs("pair name cannot be empty".to_string()));
            }
            if !seen.insert(pair.name.as_str()) {
                return Err(LoaderError::Pairs(format!("duplicate pair name: {}", pair.name)));
            }
            if pair.asset_y == pair.asset_x {
                return Err(LoaderError::Pairs(format!(
                    "pair {} uses {} on both legs",
                    pair.name, pair.asset_y
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_pairs(&self) -> impl Iterator<Item = &PairSection> {
        self.pairs.iter().filter(|p| p.enabled)
    }

    pub fn pair(&self, name: &str) -> Option<&PairSection> {
        self.pairs.iter().find(|p| p.name == name)
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.to_path_buf(),
    }
}
