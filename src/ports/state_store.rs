//! State Store Port
//!
//! Persistence seam for the signal state machine. One snapshot per pair,
//! keyed by pair identifier. Callers serialize access per pair; there is
//! never more than one writer for a given key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::signal::PositionState;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("State I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize state: {0}")]
    Serialization(String),

    #[error("State snapshot is corrupted: {0}")]
    Corrupted(String),
}

/// Everything the state machine needs to resume after a restart
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub state: PositionState,
    pub entry_zscore: Option<f64>,
    pub entry_timestamp: Option<DateTime<Utc>>,
    pub entry_beta: Option<f64>,
    pub previous_zscore: Option<f64>,
    /// Timestamp of the last tick that updated this snapshot
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Reject snapshots the state machine cannot safely resume from
    pub fn validate(&self) -> Result<(), StateStoreError> {
        let numbers = [
            ("entry_zscore", self.entry_zscore),
            ("entry_beta", self.entry_beta),
            ("previous_zscore", self.previous_zscore),
        ];
        for (name, value) in numbers {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(StateStoreError::Corrupted(format!("{} is not finite", name)));
                }
            }
        }

        if !self.state.is_neutral() {
            if self.entry_zscore.is_none() {
                return Err(StateStoreError::Corrupted(format!(
                    "{} without entry z-score",
                    self.state
                )));
            }
            if self.entry_timestamp.is_none() {
                return Err(StateStoreError::Corrupted(format!(
                    "{} without entry timestamp",
                    self.state
                )));
            }
        }
        Ok(())
    }
}

/// Persisted-state port
#[cfg_attr(test, mockall::automock)]
pub trait StateStore {
    /// `Ok(None)` when nothing has been stored for the pair yet
    fn load(&self, pair_id: &str) -> Result<Option<PersistedState>, StateStoreError>;

    /// Replace the stored snapshot atomically
    fn save(&self, pair_id: &str, state: &PersistedState) -> Result<(), StateStoreError>;

    fn clear(&self, pair_id: &str) -> Result<(), StateStoreError>;
}

impl<T: StateStore + ?Sized> StateStore for &T {
    fn load(&self, pair_id: &str) -> Result<Option<PersistedState>, StateStoreError> {
        (**self).load(pair_id)
    }

    fn save(&self, pair_id: &str, state: &PersistedState) -> Result<(), StateStoreError> {
        (**self).save(pair_id, state)
    }

    fn clear(&self, pair_id: &str) -> Result<(), StateStoreError> {
        (**self).clear(pair_id)
    }
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn load(&self, pair_id: &str) -> Result<Option<PersistedState>, StateStoreError> {
        (**self).load(pair_id)
    }

    fn save(&self, pair_id: &str, state: &PersistedState) -> Result<(), StateStoreError> {
        (**self).save(pair_id, state)
    }

    fn clear(&self, pair_id: &str) -> Result<(), StateStoreError> {
        (**self).clear(pair_id)
    }
}

/// Map-backed store for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: Mutex<HashMap<String, PersistedState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs with a stored snapshot
    pub fn len(&self) -> usize {
        self.states.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StateStoreError {
        StateStoreError::Corrupted("state map lock poisoned".to_string())
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, pair_id: &str) -> Result<Option<PersistedState>, StateStoreError> {
        let states = self.states.lock().map_err(|_| Self::poisoned())?;
        Ok(states.get(pair_id).cloned())
    }

    fn save(&self, pair_id: &str, state: &PersistedState) -> Result<(), StateStoreError> {
        let mut states = self.states.lock().map_err(|_| Self::poisoned())?;
        states.insert(pair_id.to_string(), state.clone());
        Ok(())
    }

    fn clear(&self, pair_id: &str) -> Result<(), StateStoreError> {
        let mut states = self.states.lock().map_err(|_| Self::poisoned())?;
        states.remove(pair_id);
        Ok(())
    }
}
