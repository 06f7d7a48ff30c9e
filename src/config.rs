//! Daemon configuration loaded from `config.toml`.

use crate::scheduler::FallbackPolicy;
use crate::usage::client::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Usage endpoint settings.
    pub api: ApiConfig,
    /// Scheduling and rate limiting.
    pub sync: SyncSettings,
    /// Where state files live.
    pub storage: StorageConfig,
}

/// Usage endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, without the `api/` path.
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: format!("{DEFAULT_BASE_URL}/"),
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            user_agent: format!("usage-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Scheduling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Minimum spacing between fetch attempts.
    pub min_fetch_interval_secs: u64,
    /// Period of the fallback strategy.
    pub fallback_period_secs: u64,
    /// Fallback retries per period after a transient failure.
    pub fallback_max_retries: u32,
    /// First fallback retry delay; doubles per retry.
    pub fallback_initial_backoff_secs: u64,
    /// Delay before the first chain cycle after startup.
    pub startup_delay_secs: u32,
    /// Cycle-history entries kept before trimming.
    pub history_limit: usize,
    /// How often the daemon re-reads credentials and preferences written by
    /// control commands.
    pub control_poll_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_fetch_interval_secs: 5,
            fallback_period_secs: 900,
            fallback_max_retries: 3,
            fallback_initial_backoff_secs: 30,
            startup_delay_secs: 5,
            history_limit: 200,
            control_poll_secs: 5,
        }
    }
}

/// State directory override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to [`crate::app_dirs::data_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SyncError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Clamp values into workable ranges, warning about each change.
    #[must_use]
    pub fn validate(mut self) -> Self {
        fn clamp_warn<T: PartialOrd + Copy + std::fmt::Display>(
            name: &str,
            value: &mut T,
            min: T,
            max: T,
        ) {
            let clamped = if *value < min {
                min
            } else if *value > max {
                max
            } else {
                *value
            };
            if clamped != *value {
                tracing::warn!("config {name}={value} out of range, using {clamped}");
                *value = clamped;
            }
        }

        let sync = &mut self.sync;
        clamp_warn("api.connect_timeout_secs", &mut self.api.connect_timeout_secs, 1, 300);
        clamp_warn("api.read_timeout_secs", &mut self.api.read_timeout_secs, 1, 300);
        clamp_warn("sync.min_fetch_interval_secs", &mut sync.min_fetch_interval_secs, 5, 300);
        clamp_warn("sync.fallback_period_secs", &mut sync.fallback_period_secs, 60, 86_400);
        clamp_warn("sync.fallback_max_retries", &mut sync.fallback_max_retries, 0, 10);
        clamp_warn(
            "sync.fallback_initial_backoff_secs",
            &mut sync.fallback_initial_backoff_secs,
            1,
            3_600,
        );
        clamp_warn("sync.startup_delay_secs", &mut sync.startup_delay_secs, 5, 300);
        clamp_warn("sync.history_limit", &mut sync.history_limit, 2, 10_000);
        clamp_warn("sync.control_poll_secs", &mut sync.control_poll_secs, 1, 300);
        if self.api.base_url.trim().is_empty() {
            tracing::warn!("config api.base_url is empty, using {DEFAULT_BASE_URL}");
            self.api.base_url = DEFAULT_BASE_URL.to_owned();
        }
        self
    }

    /// Directory for cache, preferences and history.
    pub fn state_dir(&self) -> PathBuf {
        self.storage
            .state_dir
            .clone()
            .unwrap_or_else(crate::app_dirs::data_dir)
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            period: Duration::from_secs(self.sync.fallback_period_secs),
            initial_backoff: Duration::from_secs(self.sync.fallback_initial_backoff_secs),
            max_retries: self.sync.fallback_max_retries,
        }
    }

    pub fn control_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.control_poll_secs)
    }

    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.sync.min_fetch_interval_secs)
    }

    /// Upper bound on one whole fetch. The HTTP client applies
    /// `read_timeout_secs` per read on top of this.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.api.read_timeout_secs)
    }
}
