//! Backtest Layer - vectorized historical simulation of the pair strategy
//!
//! `simulator` replays a signal table with next-bar execution and cost
//! accounting; `metrics` scores the resulting equity curve and trades.

pub mod metrics;
pub mod simulator;

pub use metrics::{compute_metrics, infer_bars_per_year, PerformanceMetrics};
pub use simulator::{BacktestReport, BacktestSimulator, BarPnl};
