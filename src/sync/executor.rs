//! One fetch-persist-notify cycle.

use super::cycle::{CycleOutcome, CycleResult, CycleTrigger};
use super::guard::FetchGuard;
use crate::notify::{Notification, Notifier, decide, display_percent, is_session_reset};
use crate::publish::UsagePublisher;
use crate::store::{PreferencesUpdate, SchedulingState, StateStore};
use crate::usage::{UsageError, UsageFetcher, UsageSnapshot};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default minimum spacing between fetch attempts.
pub const DEFAULT_MIN_FETCH_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs sync cycles against the injected collaborators.
///
/// Shared by the chain and the fallback. Overlapping cycles are serialized
/// so reads and writes of the cached snapshot and the watermark never
/// interleave.
pub struct SyncExecutor {
    fetcher: Arc<dyn UsageFetcher>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn UsagePublisher>,
    guard: FetchGuard,
    cycle_lock: tokio::sync::Mutex<()>,
    fetch_timeout: Duration,
    attempts: AtomicU64,
}

impl SyncExecutor {
    pub fn new(
        fetcher: Arc<dyn UsageFetcher>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        publisher: Arc<dyn UsagePublisher>,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            publisher,
            guard: FetchGuard::new(DEFAULT_MIN_FETCH_INTERVAL),
            cycle_lock: tokio::sync::Mutex::new(()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            attempts: AtomicU64::new(0),
        }
    }

    /// Override the minimum spacing between fetch attempts.
    #[must_use]
    pub fn with_min_fetch_interval(mut self, interval: Duration) -> Self {
        self.guard = FetchGuard::new(interval);
        self
    }

    /// Override the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Chain interval as currently configured. Falls back to the default
    /// when preferences cannot be read.
    pub fn refresh_interval(&self) -> Duration {
        match self.store.load_preferences() {
            Ok(prefs) => prefs.refresh_interval(),
            Err(e) => {
                warn!("cannot read refresh interval, using default: {e}");
                SchedulingState::default().refresh_interval()
            }
        }
    }

    /// Run one cycle. Never fails; errors are carried in the outcome.
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> CycleOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();

        // Checked before waiting on the cycle lock so a concurrent trigger
        // fails fast instead of queueing.
        let result = if self.guard.try_acquire() {
            let _cycle = self.cycle_lock.lock().await;
            self.fetch_and_apply().await
        } else {
            debug!(
                "sync attempt {attempt} ({trigger}) rejected, next allowed in {:?}",
                self.guard.remaining()
            );
            CycleResult::Failure(UsageError::RateLimited)
        };

        let outcome = CycleOutcome {
            trigger,
            attempt,
            started_at,
            finished_at: Utc::now(),
            result,
        };
        match outcome.error() {
            None => info!(attempt, %trigger, "sync {}", outcome.summary()),
            Some(err) if err.is_transient() => {
                warn!(attempt, %trigger, "sync {}", outcome.summary())
            }
            Some(_) => info!(attempt, %trigger, "sync {}", outcome.summary()),
        }
        outcome
    }

    async fn fetch_and_apply(&self) -> CycleResult {
        let previous = match self.store.load_cached_usage() {
            Ok(cached) => cached.and_then(|s| s.session_utilization()),
            Err(e) => {
                return CycleResult::Failure(UsageError::Unknown(format!(
                    "cannot read cached usage: {e}"
                )));
            }
        };

        let snapshot = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_usage())
            .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return CycleResult::Failure(e),
            Err(_) => {
                debug!("fetch timed out after {:?}", self.fetch_timeout);
                return CycleResult::Failure(UsageError::NetworkError);
            }
        };

        if let Err(e) = self.store.save_cached_usage(&snapshot) {
            return CycleResult::Failure(UsageError::Unknown(format!(
                "cannot persist usage: {e}"
            )));
        }
        self.publisher.publish(&snapshot);

        let notifications = self.apply_notifications(previous, &snapshot).await;
        CycleResult::Success {
            snapshot,
            notifications,
        }
    }

    /// Session reset and milestone handling for a fresh snapshot. Returns
    /// the notifications that were dispatched successfully.
    async fn apply_notifications(
        &self,
        previous: Option<f64>,
        snapshot: &UsageSnapshot,
    ) -> Vec<Notification> {
        let current = snapshot.session_utilization();
        let prefs = match self.store.load_preferences() {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("cannot read preferences, skipping notifications: {e}");
                return Vec::new();
            }
        };
        let mut sent = Vec::new();

        if is_session_reset(previous, current) {
            if prefs.notify_on_reset {
                match self.notifier.notify_session_reset().await {
                    Ok(()) => sent.push(Notification::SessionReset),
                    Err(e) => warn!("session reset notification failed: {e}"),
                }
            } else {
                debug!("session reset detected, notification disabled");
            }
        }

        let decision = decide(
            previous,
            current,
            prefs.last_notified_threshold,
            prefs.notify_on_usage_thresholds,
        );
        if let Some(threshold) = decision.notify {
            let current_percent = display_percent(current.unwrap_or_default());
            match self
                .notifier
                .notify_usage_milestone(current_percent, threshold)
                .await
            {
                Ok(()) => sent.push(Notification::UsageMilestone {
                    current_percent,
                    threshold,
                }),
                Err(e) => warn!("usage milestone notification failed: {e}"),
            }
        }
        if decision.watermark_changed(prefs.last_notified_threshold) {
            debug!(
                "milestone watermark {:?} -> {:?}",
                prefs.last_notified_threshold, decision.watermark
            );
            if let Err(e) = self
                .store
                .save_preferences(&PreferencesUpdate::watermark(decision.watermark))
            {
                warn!("cannot persist milestone watermark: {e}");
            }
        }

        sent
    }
}
