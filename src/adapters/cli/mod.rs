//! CLI Adapter
//!
//! Command-line interface for the pairs engine.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    parse_date, BacktestCmd, CliApp, CointCmd, Command, MultiBacktestCmd, ResetStateCmd, ScanCmd,
};

/// Parse the process arguments
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}
