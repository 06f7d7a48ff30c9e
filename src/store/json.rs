//! JSON files under the state directory.
//!
//! | File | Contents |
//! |------|----------|
//! | `usage_cache.json` | last successful snapshot |
//! | `preferences.json` | [`SchedulingState`] |
//!
//! Writes go through a temp file and rename. Malformed files are logged and
//! treated as absent so a corrupt cache never wedges the daemon.

use super::{PreferencesUpdate, SchedulingState, StateStore, write_atomic};
use crate::error::{Result, SyncError};
use crate::usage::UsageSnapshot;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const USAGE_CACHE_FILE: &str = "usage_cache.json";
const PREFERENCES_FILE: &str = "preferences.json";
const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CachedUsageRecord {
    version: u32,
    snapshot: UsageSnapshot,
}

/// File-backed [`StateStore`].
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes preference read-modify-write and cache replacement.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.join(USAGE_CACHE_FILE)
    }

    fn preferences_path(&self) -> PathBuf {
        self.dir.join(PREFERENCES_FILE)
    }

    fn read_preferences(&self) -> Result<SchedulingState> {
        Ok(read_json_file::<SchedulingState>(&self.preferences_path())?
            .unwrap_or_default()
            .normalized())
    }
}

impl StateStore for JsonFileStore {
    fn load_cached_usage(&self) -> Result<Option<UsageSnapshot>> {
        let record = read_json_file::<CachedUsageRecord>(&self.cache_path())?;
        Ok(record.and_then(|r| {
            if r.version == CACHE_FORMAT_VERSION {
                Some(r.snapshot)
            } else {
                tracing::warn!("discarding usage cache with unknown version {}", r.version);
                None
            }
        }))
    }

    fn save_cached_usage(&self, snapshot: &UsageSnapshot) -> Result<()> {
        let record = CachedUsageRecord {
            version: CACHE_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        let _guard = self.write_lock.lock();
        write_atomic(&self.cache_path(), &json)
            .map_err(|e| SyncError::Store(format!("failed to write usage cache: {e}")))
    }

    fn load_preferences(&self) -> Result<SchedulingState> {
        self.read_preferences()
    }

    fn save_preferences(&self, update: &PreferencesUpdate) -> Result<SchedulingState> {
        let _guard = self.write_lock.lock();
        let next = update.apply_to(self.read_preferences()?);
        let json = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.preferences_path(), &json)
            .map_err(|e| SyncError::Store(format!("failed to write preferences: {e}")))?;
        Ok(next)
    }
}

/// Read and decode a JSON file. Missing or malformed files yield `None`.
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SyncError::Store(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("ignoring malformed state file at {}: {e}", path.display());
            Ok(None)
        }
    }
}
