//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, the engine reaches persisted state
//! only through the `StateStore` trait. Adapters provide the file-backed
//! implementation; the in-memory one lives here for tests and dry runs.

pub mod state_store;

pub use state_store::{InMemoryStateStore, PersistedState, StateStore, StateStoreError};
