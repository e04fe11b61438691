//! Strategy Layer - Statistical pairs trading
//!
//! - `hedge_ratio`: rolling OLS beta of log(Y) on log(X)
//! - `spread`: log spread, rolling z-score and signal diagnostics
//! - `stats`: OLS, ADF and MacKinnon p-values
//! - `cointegration`: two-step and Engle-Granger gate with half-life bounds
//! - `state_machine`: crossing-based entry/exit with persisted state
//! - `sizing`: volatility-targeted leg notionals with caps
//! - `params`: configuration structs and validation

pub mod cointegration;
pub mod hedge_ratio;
pub mod params;
pub mod sizing;
pub mod spread;
pub mod state_machine;
pub mod stats;

pub use cointegration::{CointegrationResult, CointegrationValidator};
pub use hedge_ratio::{rolling_beta, rolling_beta_stats, static_hedge_ratio, BetaStats};
pub use params::{
    BacktestConfig, CointegrationConfig, ConfigError, CostConfig, EntryMode, SizingConfig,
    ThresholdConfig, WindowConfig,
};
pub use sizing::{PositionSizeResult, PositionSizer, SizingRequest};
pub use spread::{calculate_all_signals, signal_quality, SignalQuality};
pub use state_machine::{PersistPolicy, PositionInfo, SignalStateMachine};
