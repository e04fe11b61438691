//! JSON File State Store
//!
//! One `state_<pair>.json` per pair inside a state directory. Writes go to
//! a temporary file in the same directory which is then renamed over the
//! target, so a reader sees either the old snapshot or the new one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::ports::state_store::{PersistedState, StateStore, StateStoreError};

#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot for `pair_id`
    pub fn path_for(&self, pair_id: &str) -> PathBuf {
        self.dir.join(format!("state_{}.json", slug(pair_id)))
    }
}

/// File-name-safe encoding of a pair id. ASCII letters, digits and '-' are
/// kept; every other byte (including '_') becomes `_` plus two hex digits,
/// so distinct ids never share a file.
fn slug(pair_id: &str) -> String {
    let mut out = String::with_capacity(pair_id.len());
    for byte in pair_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{:02x}", byte));
        }
    }
    out
}

impl StateStore for JsonFileStateStore {
    fn load(&self, pair_id: &str) -> Result<Option<PersistedState>, StateStoreError> {
        let path = self.path_for(pair_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Err(StateStoreError::Corrupted(format!(
                "{} is empty",
                path.display()
            )));
        }

        let state: PersistedState = serde_json::from_str(&content)
            .map_err(|e| StateStoreError::Corrupted(format!("{}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    fn save(&self, pair_id: &str, state: &PersistedState) -> Result<(), StateStoreError> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateStoreError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;

        let path = self.path_for(pair_id);
        tmp.persist(&path).map_err(|e| StateStoreError::Io(e.error))?;

        tracing::debug!(pair = %pair_id, path = %path.display(), "State file written");
        Ok(())
    }

    fn clear(&self, pair_id: &str) -> Result<(), StateStoreError> {
        let path = self.path_for(pair_id);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::info!(pair = %pair_id, path = %path.display(), "State file deleted");
        }
        Ok(())
    }
}
