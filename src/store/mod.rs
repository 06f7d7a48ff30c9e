//! Durable state: the cached usage snapshot and scheduling preferences.
//!
//! Each record is replaced as a whole; readers never observe a partially
//! written snapshot or preference set.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::usage::UsageSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Shortest allowed chain interval.
pub const MIN_REFRESH_INTERVAL_SECS: u32 = 5;
/// Longest allowed chain interval.
pub const MAX_REFRESH_INTERVAL_SECS: u32 = 300;
/// Chain interval used until the user picks one.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u32 = 30;

/// Clamp a refresh interval into the supported range.
#[must_use]
pub fn clamp_refresh_interval(seconds: u32) -> u32 {
    seconds.clamp(MIN_REFRESH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS)
}

/// Preferences and notification watermark that survive restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingState {
    /// Chain re-arm interval in seconds, within `[5, 300]`.
    pub refresh_interval_seconds: u32,
    /// Highest milestone already announced in the current climb.
    pub last_notified_threshold: Option<u8>,
    pub notify_on_reset: bool,
    pub notify_on_usage_thresholds: bool,
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECS,
            last_notified_threshold: None,
            notify_on_reset: true,
            notify_on_usage_thresholds: true,
        }
    }
}

impl SchedulingState {
    /// Copy with the interval clamped into range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.refresh_interval_seconds = clamp_refresh_interval(self.refresh_interval_seconds);
        self
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(clamp_refresh_interval(
            self.refresh_interval_seconds,
        )))
    }
}

/// Partial preferences update. `None` leaves a field untouched.
///
/// The watermark is doubly optional: `Some(None)` clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreferencesUpdate {
    pub refresh_interval_seconds: Option<u32>,
    pub last_notified_threshold: Option<Option<u8>>,
    pub notify_on_reset: Option<bool>,
    pub notify_on_usage_thresholds: Option<bool>,
}

impl PreferencesUpdate {
    pub fn refresh_interval(seconds: u32) -> Self {
        Self {
            refresh_interval_seconds: Some(seconds),
            ..Self::default()
        }
    }

    pub fn watermark(threshold: Option<u8>) -> Self {
        Self {
            last_notified_threshold: Some(threshold),
            ..Self::default()
        }
    }

    pub fn notify_on_reset(enabled: bool) -> Self {
        Self {
            notify_on_reset: Some(enabled),
            ..Self::default()
        }
    }

    pub fn notify_on_usage_thresholds(enabled: bool) -> Self {
        Self {
            notify_on_usage_thresholds: Some(enabled),
            ..Self::default()
        }
    }

    /// Apply onto `state`, clamping the interval.
    #[must_use]
    pub fn apply_to(&self, mut state: SchedulingState) -> SchedulingState {
        if let Some(seconds) = self.refresh_interval_seconds {
            state.refresh_interval_seconds = clamp_refresh_interval(seconds);
        }
        if let Some(watermark) = self.last_notified_threshold {
            state.last_notified_threshold = watermark;
        }
        if let Some(enabled) = self.notify_on_reset {
            state.notify_on_reset = enabled;
        }
        if let Some(enabled) = self.notify_on_usage_thresholds {
            state.notify_on_usage_thresholds = enabled;
        }
        state.normalized()
    }
}

/// Persistence for the sync engine.
///
/// `save_preferences` is a transactional read-modify-write: concurrent
/// partial updates never lose each other's fields.
pub trait StateStore: Send + Sync {
    fn load_cached_usage(&self) -> Result<Option<UsageSnapshot>>;

    fn save_cached_usage(&self, snapshot: &UsageSnapshot) -> Result<()>;

    /// Stored preferences with the interval clamped, or defaults.
    fn load_preferences(&self) -> Result<SchedulingState>;

    /// Merge `update` into the stored preferences and return the result.
    fn save_preferences(&self, update: &PreferencesUpdate) -> Result<SchedulingState>;
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_match_first_launch() {
        let state = SchedulingState::default();
        assert_eq!(state.refresh_interval_seconds, 30);
        assert_eq!(state.last_notified_threshold, None);
        assert!(state.notify_on_reset);
        assert!(state.notify_on_usage_thresholds);
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(clamp_refresh_interval(0), 5);
        assert_eq!(clamp_refresh_interval(45), 45);
        assert_eq!(clamp_refresh_interval(10_000), 300);

        let state = SchedulingState {
            refresh_interval_seconds: 1,
            ..SchedulingState::default()
        };
        assert_eq!(state.normalized().refresh_interval_seconds, 5);
        assert_eq!(state.refresh_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_update_leaves_other_fields() {
        let base = SchedulingState {
            last_notified_threshold: Some(85),
            ..SchedulingState::default()
        };
        let next = PreferencesUpdate::notify_on_reset(false).apply_to(base);
        assert!(!next.notify_on_reset);
        assert_eq!(next.last_notified_threshold, Some(85));
        assert_eq!(next.refresh_interval_seconds, 30);
    }

    #[test]
    fn watermark_update_distinguishes_clear_from_untouched() {
        let base = SchedulingState {
            last_notified_threshold: Some(90),
            ..SchedulingState::default()
        };
        assert_eq!(
            PreferencesUpdate::default()
                .apply_to(base)
                .last_notified_threshold,
            Some(90)
        );
        assert_eq!(
            PreferencesUpdate::watermark(None)
                .apply_to(base)
                .last_notified_threshold,
            None
        );
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let state: SchedulingState =
            serde_json::from_str(r#"{"notify_on_reset": false}"#).unwrap();
        assert!(!state.notify_on_reset);
        assert!(state.notify_on_usage_thresholds);
        assert_eq!(state.refresh_interval_seconds, 30);
    }
}
