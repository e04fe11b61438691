//! Adapters Layer - External System Implementations
//!
//! This module contains the I/O side of the engine:
//! - CSV: price-history loading and writing
//! - State file: JSON implementation of the `StateStore` port
//! - CLI: Command-line argument definitions

pub mod cli;
pub mod csv_prices;
pub mod state_file;

pub use cli::CliApp;
pub use csv_prices::{load_price_history, write_price_history, PriceLoadError};
pub use state_file::JsonFileStateStore;
