//! Centralized directory paths for usage-sync.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (cache, preferences, history) | `~/Library/Application Support/usage-sync/` | `~/.local/share/usage-sync/` |
//! | Config (`config.toml`, credentials) | `~/Library/Application Support/usage-sync/` | `~/.config/usage-sync/` |
//!
//! # Environment Overrides
//!
//! - `USAGE_SYNC_DATA_DIR` overrides [`data_dir`]
//! - `USAGE_SYNC_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

const APP_DIR_NAME: &str = "usage-sync";

/// Application data directory.
///
/// Holds the cached usage snapshot, scheduling preferences and cycle
/// history.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("USAGE_SYNC_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/usage-sync-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("USAGE_SYNC_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/usage-sync-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Stored session credentials (`config_dir()/credentials.json`).
#[must_use]
pub fn credentials_file() -> PathBuf {
    config_dir().join("credentials.json")
}

/// Daemon log directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
