//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    AppConfig, FiltersSection, LoaderError, LoggingSection, PairSection, StateSection,
    load_config, parse_config,
};
