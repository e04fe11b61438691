//! Pairs Engine - Signal & Backtest Library
//!
//! Statistical-arbitrage signals for two-asset spreads: rolling hedge
//! ratios, log-spread z-scores, a cointegration gate, a persisted
//! crossing-based state machine, volatility-targeted sizing and a
//! vectorized backtester that replays the same rules.
//!
//! # Modules
//!
//! - `domain`: Core data types (PriceSeries, SignalRow, TradingSignal, BacktestTrade)
//! - `strategy`: Hedge ratio, spread, cointegration, state machine, sizing
//! - `backtest`: Vectorized simulator and performance metrics
//! - `ports`: Trait abstractions (StateStore)
//! - `adapters`: CSV prices, JSON state files, CLI
//! - `config`: Configuration loading and validation
//! - `application`: Scanner and multi-pair backtest use cases

pub mod adapters;
pub mod application;
pub mod backtest;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;
