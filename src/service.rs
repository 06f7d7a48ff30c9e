//! Application-facing facade over the scheduler, store and credentials.
//!
//! Mirrors what a settings screen does: start syncing once credentials
//! exist, reschedule when the interval changes, tear everything down on
//! logout. A daemon whose settings are edited by other processes runs
//! [`UsageService::supervise`] to pick those edits up from disk.

use crate::config::SyncConfig;
use crate::credentials::{CredentialStore, FileCredentialStore, SessionCredentials};
use crate::error::Result;
use crate::notify::Notifier;
use crate::publish::WatchPublisher;
use crate::scheduler::{Scheduler, StrategyState};
use crate::store::{JsonFileStore, PreferencesUpdate, SchedulingState, StateStore};
use crate::sync::{CycleOutcome, CycleRecord, SyncExecutor};
use crate::usage::{ClaudeUsageClient, UsageError, UsageFetcher, UsageSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cycle-history file inside the state directory.
pub const HISTORY_FILE: &str = "history.json";

pub struct UsageService {
    config: SyncConfig,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn StateStore>,
    publisher: Arc<WatchPublisher>,
    scheduler: Scheduler,
    /// Chain interval last applied to the scheduler, `None` while stopped.
    applied_interval: Mutex<Option<u32>>,
}

impl UsageService {
    /// Production wiring: credentials file, JSON state under the configured
    /// state directory, HTTP client against the configured API.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built or existing history cannot
    /// be read.
    pub fn from_config(config: &SyncConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::default_location());
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(config.state_dir()));
        let fetcher: Arc<dyn UsageFetcher> = Arc::new(ClaudeUsageClient::new(
            &config.api,
            Arc::clone(&credentials),
        )?);
        Self::with_parts(config, fetcher, credentials, store, notifier)
    }

    /// Wire the service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Fails if existing history cannot be read.
    pub fn with_parts(
        config: &SyncConfig,
        fetcher: Arc<dyn UsageFetcher>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let cached = store.load_cached_usage().unwrap_or_else(|e| {
            warn!("cannot read cached usage: {e}");
            None
        });
        let publisher = Arc::new(WatchPublisher::new(cached));
        let executor = SyncExecutor::new(
            fetcher,
            Arc::clone(&store),
            notifier,
            publisher.clone(),
        )
        .with_min_fetch_interval(config.min_fetch_interval())
        .with_fetch_timeout(config.fetch_timeout());

        let scheduler = Scheduler::builder(Arc::new(executor))
            .with_fallback_policy(config.fallback_policy())
            .with_history_limit(config.sync.history_limit)
            .with_history_path(config.state_dir().join(HISTORY_FILE))
            .build()?;

        Ok(Self {
            config: config.clone(),
            credentials,
            store,
            publisher,
            scheduler,
            applied_interval: Mutex::new(None),
        })
    }

    /// Start both strategies if credentials are configured. Returns whether
    /// syncing was started.
    pub fn ensure_running(&self) -> bool {
        if self.credentials.load().is_none() {
            info!("no credentials configured, background sync not started");
            return false;
        }
        let interval = self
            .store
            .load_preferences()
            .unwrap_or_else(|e| {
                warn!("cannot read preferences, using defaults: {e}");
                SchedulingState::default()
            })
            .refresh_interval_seconds;
        *self.applied_interval.lock() = Some(interval);
        self.scheduler.schedule_sync(self.config.sync.startup_delay_secs);
        self.scheduler.schedule_periodic_fallback();
        true
    }

    /// Align the schedule with credentials and preferences on disk.
    ///
    /// Starts both strategies once credentials appear, tears them down once
    /// credentials are gone, and re-arms the chain when the stored interval
    /// differs from the one last applied.
    pub fn reconcile(&self) -> Result<()> {
        if self.credentials.load().is_none() {
            let running = !self.scheduler.chain_state().is_idle()
                || !self.scheduler.fallback_state().is_idle();
            if running {
                info!("credentials removed, stopping background sync");
                self.scheduler.cancel_all();
            }
            *self.applied_interval.lock() = None;
            return Ok(());
        }

        let prefs = self.store.load_preferences()?;
        let interval = prefs.refresh_interval_seconds;
        let mut applied = self.applied_interval.lock();
        if self.scheduler.chain_state().is_idle() {
            info!("credentials found, syncing every {interval}s");
            self.scheduler.schedule_sync(interval);
        } else if *applied != Some(interval) {
            info!("refresh interval changed to {interval}s");
            self.scheduler.schedule_sync(interval);
        }
        *applied = Some(interval);
        self.scheduler.schedule_periodic_fallback();
        Ok(())
    }

    /// Call [`reconcile`](Self::reconcile) every `period` until `shutdown`
    /// is cancelled.
    pub async fn supervise(&self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.reconcile() {
                warn!("cannot reconcile schedule: {e}");
            }
        }
        debug!("supervision stopped");
    }

    /// Store credentials and start syncing at the configured interval.
    pub fn configure(&self, credentials: &SessionCredentials) -> Result<()> {
        self.credentials.save(credentials)?;
        let prefs = self.store.load_preferences()?;
        info!(
            "credentials saved for organization {}, syncing every {}s",
            credentials.org_id, prefs.refresh_interval_seconds
        );
        *self.applied_interval.lock() = Some(prefs.refresh_interval_seconds);
        self.scheduler.schedule_sync(prefs.refresh_interval_seconds);
        self.scheduler.schedule_periodic_fallback();
        Ok(())
    }

    /// Persist a new chain interval (clamped) and reschedule the chain.
    pub fn set_refresh_interval(&self, seconds: u32) -> Result<SchedulingState> {
        let prefs = self
            .store
            .save_preferences(&PreferencesUpdate::refresh_interval(seconds))?;
        if self.credentials.load().is_some() {
            *self.applied_interval.lock() = Some(prefs.refresh_interval_seconds);
            self.scheduler.schedule_sync(prefs.refresh_interval_seconds);
        }
        Ok(prefs)
    }

    /// Takes effect on the next cycle.
    pub fn set_notify_on_reset(&self, enabled: bool) -> Result<SchedulingState> {
        self.store
            .save_preferences(&PreferencesUpdate::notify_on_reset(enabled))
    }

    /// Takes effect on the next cycle.
    pub fn set_notify_on_usage_thresholds(&self, enabled: bool) -> Result<SchedulingState> {
        self.store
            .save_preferences(&PreferencesUpdate::notify_on_usage_thresholds(enabled))
    }

    /// Forget credentials and stop all scheduled work. Cached usage is kept.
    pub fn clear_credentials(&self) -> Result<()> {
        self.credentials.clear()?;
        *self.applied_interval.lock() = None;
        self.scheduler.cancel_all();
        info!("credentials cleared, background sync stopped");
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.load().is_some()
    }

    pub fn credentials(&self) -> Option<SessionCredentials> {
        self.credentials.load()
    }

    pub fn cached_usage(&self) -> Result<Option<UsageSnapshot>> {
        self.store.load_cached_usage()
    }

    pub fn preferences(&self) -> Result<SchedulingState> {
        self.store.load_preferences()
    }

    /// Error kind of the latest cycle, for a transient banner.
    pub fn last_error(&self) -> Option<UsageError> {
        self.scheduler.last_error()
    }

    /// Observe every freshly fetched snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<UsageSnapshot>> {
        self.publisher.subscribe()
    }

    /// Fetch immediately, outside the scheduled strategies.
    pub async fn sync_now(&self) -> CycleOutcome {
        self.scheduler.sync_now().await
    }

    pub fn history(&self) -> Vec<CycleRecord> {
        self.scheduler.history()
    }

    pub fn chain_state(&self) -> StrategyState {
        self.scheduler.chain_state()
    }

    pub fn fallback_state(&self) -> StrategyState {
        self.scheduler.fallback_state()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stop scheduling.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }
}
