//! Application Layer - use cases over the strategy and adapters
//!
//! - `scanner`: one scheduling tick across all configured pairs
//! - `multi_backtest`: parallel backtests of every enabled pair

pub mod multi_backtest;
pub mod scanner;

pub use multi_backtest::{
    backtest_pair, run_multi_backtest, write_summary_csv, BacktestWindow, MultiBacktestResult,
    PairBacktest, PairBacktestError, PairBacktestSummary,
};
pub use scanner::{confidence_score, PairScanner, ScanOutcome, ScanStatus};
