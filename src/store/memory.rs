//! In-process [`StateStore`] for embedding and tests.

use super::{PreferencesUpdate, SchedulingState, StateStore};
use crate::error::Result;
use crate::usage::UsageSnapshot;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    cached: Option<UsageSnapshot>,
    preferences: SchedulingState,
}

/// Volatile store; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_preferences(self, preferences: SchedulingState) -> Self {
        self.inner.lock().preferences = preferences.normalized();
        self
    }

    #[must_use]
    pub fn with_cached_usage(self, snapshot: UsageSnapshot) -> Self {
        self.inner.lock().cached = Some(snapshot);
        self
    }
}

impl StateStore for MemoryStore {
    fn load_cached_usage(&self) -> Result<Option<UsageSnapshot>> {
        Ok(self.inner.lock().cached.clone())
    }

    fn save_cached_usage(&self, snapshot: &UsageSnapshot) -> Result<()> {
        self.inner.lock().cached = Some(snapshot.clone());
        Ok(())
    }

    fn load_preferences(&self) -> Result<SchedulingState> {
        Ok(self.inner.lock().preferences)
    }

    fn save_preferences(&self, update: &PreferencesUpdate) -> Result<SchedulingState> {
        let mut inner = self.inner.lock();
        inner.preferences = update.apply_to(inner.preferences);
        Ok(inner.preferences)
    }
}
