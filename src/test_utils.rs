//! Shared fakes for the sync engine's unit tests.

use crate::notify::{Notification, Notifier};
use crate::usage::{UsageError, UsageFetcher, UsageMetric, UsageSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Snapshot with only the session window populated.
pub fn session_snapshot(utilization: f64) -> UsageSnapshot {
    UsageSnapshot::empty(Utc::now()).with_five_hour(UsageMetric::new(utilization, None))
}

/// Fetcher that replays a script of results, then repeats the last one.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<UsageSnapshot, UsageError>>>,
    last: Mutex<Result<UsageSnapshot, UsageError>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<UsageSnapshot, UsageError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Err(UsageError::NetworkError)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetcher that returns `utilization` for every call.
    pub fn constant(utilization: f64) -> Self {
        Self::new(vec![Ok(session_snapshot(utilization))])
    }

    /// Fetcher that fails every call with `error`.
    pub fn failing(error: UsageError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageFetcher for ScriptedFetcher {
    async fn fetch_usage(&self) -> Result<UsageSnapshot, UsageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(next) = next {
            *last = next;
        }
        match &*last {
            Ok(snapshot) => Ok(UsageSnapshot {
                fetched_at: Utc::now(),
                ..snapshot.clone()
            }),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Notifier that records every dispatch.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Notifier whose every dispatch errors after recording.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    fn record(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().push(notification);
        if self.fail {
            anyhow::bail!("notification service unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_session_reset(&self) -> anyhow::Result<()> {
        self.record(Notification::SessionReset)
    }

    async fn notify_usage_milestone(
        &self,
        current_percent: u8,
        crossed_threshold: u8,
    ) -> anyhow::Result<()> {
        self.record(Notification::UsageMilestone {
            current_percent,
            threshold: crossed_threshold,
        })
    }
}
