//! Domain Layer - Core data types for the pairs engine
//!
//! Pure value types with no I/O. Everything external is reached through
//! the ports layer.
//!
//! - `series`: price observations and timestamp alignment
//! - `signal`: per-bar pair statistics, position state and emitted signals
//! - `trade`: simulated trades and equity points

pub mod series;
pub mod signal;
pub mod trade;

pub use series::{AlignedPair, PriceHistory, PricePoint, PriceSeries, SeriesError};
pub use signal::{PositionState, SignalKind, SignalRow, SignalTable, Tick, TradingSignal};
pub use trade::{BacktestTrade, EquityPoint, ExitReason, OpenTrade, TradeDirection};
