//! CLI Command Definitions
//!
//! Argument structs for every pairs-engine subcommand. Dispatch lives in
//! the binary.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::adapters::csv_prices::parse_timestamp;

const DEFAULT_CONFIG: &str = "config/pairs.toml";

/// Pairs trading signal & backtest engine
#[derive(Parser, Debug)]
#[command(
    name = "pairs-engine",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Pairs trading signal & backtest engine",
    long_about = "Computes rolling hedge ratios and spread z-scores for configured asset \
                  pairs, gates them on cointegration, emits crossing-based entry/exit \
                  signals with persisted per-pair state, and backtests the same rules."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate the latest bar of every enabled pair
    Scan(ScanCmd),

    /// Backtest a single pair
    Backtest(BacktestCmd),

    /// Backtest every enabled pair and write a summary CSV
    MultiBacktest(MultiBacktestCmd),

    /// Run the cointegration test on configured pairs
    Coint(CointCmd),

    /// Reset persisted position state to neutral
    ResetState(ResetStateCmd),
}

/// Scan all pairs for signals
#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Only scan this pair
    #[arg(short, long, value_name = "PAIR")]
    pub pair: Option<String>,

    /// Enter on |z| >= z_in while flat instead of requiring a crossing
    #[arg(long)]
    pub level_trigger: bool,

    /// Skip the average-daily-volume filter
    #[arg(long)]
    pub ignore_adv: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

/// Backtest one pair
#[derive(Parser, Debug)]
pub struct BacktestCmd {
    /// Pair name from the configuration
    #[arg(short, long, value_name = "PAIR")]
    pub pair: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// First bar to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub start: Option<DateTime<Utc>>,

    /// Last bar to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub end: Option<DateTime<Utc>>,

    /// Override starting capital
    #[arg(long, value_name = "AMOUNT")]
    pub capital: Option<f64>,

    /// Override entry threshold
    #[arg(long, value_name = "Z")]
    pub z_in: Option<f64>,

    /// Override exit threshold
    #[arg(long, value_name = "Z")]
    pub z_out: Option<f64>,

    /// Override stop threshold
    #[arg(long, value_name = "Z")]
    pub z_stop: Option<f64>,

    /// Print every closed trade
    #[arg(short, long)]
    pub trades: bool,

    /// Export per-bar P&L to CSV
    #[arg(long, value_name = "FILE")]
    pub export_csv: Option<PathBuf>,

    /// Export the full report to JSON
    #[arg(long, value_name = "FILE")]
    pub export_json: Option<PathBuf>,
}

/// Backtest every enabled pair
#[derive(Parser, Debug)]
pub struct MultiBacktestCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// First bar to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub start: Option<DateTime<Utc>>,

    /// Last bar to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub end: Option<DateTime<Utc>>,

    /// Directory for the summary CSV
    #[arg(long, value_name = "DIR", default_value = "reports")]
    pub out_dir: PathBuf,

    /// Only backtest the first N enabled pairs
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Cointegration report
#[derive(Parser, Debug)]
pub struct CointCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Only test this pair (default: all enabled pairs)
    #[arg(short, long, value_name = "PAIR")]
    pub pair: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Reset persisted state
#[derive(Parser, Debug)]
pub struct ResetStateCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Pair to reset
    #[arg(short, long, value_name = "PAIR", required_unless_present = "all")]
    pub pair: Option<String>,

    /// Reset every configured pair
    #[arg(long, conflicts_with = "pair")]
    pub all: bool,
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or any format the price loader reads
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    parse_timestamp(value).ok_or_else(|| format!("invalid date: {value}"))
}
