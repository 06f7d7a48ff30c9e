//! Notification dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Fixed identifier for the session-reset notification.
pub const SESSION_RESET_ID: u32 = 1001;

/// Base identifier for milestone notifications; the threshold is added.
pub const MILESTONE_ID_BASE: u32 = 2000;

/// A user-facing notification raised by a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The five-hour window started over.
    SessionReset,
    /// Session utilization reached a new threshold.
    UsageMilestone {
        current_percent: u8,
        threshold: u8,
    },
}

impl Notification {
    /// Stable identifier. Dispatching twice with the same id replaces the
    /// earlier notification on platforms that support it.
    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            Self::SessionReset => SESSION_RESET_ID,
            Self::UsageMilestone { threshold, .. } => MILESTONE_ID_BASE + u32::from(*threshold),
        }
    }

    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::SessionReset => "Session reset".to_owned(),
            Self::UsageMilestone { threshold, .. } => format!("Usage reached {threshold}%"),
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::SessionReset => "Your 5-hour session window has reset.".to_owned(),
            Self::UsageMilestone {
                current_percent, ..
            } => format!("Session usage is at {current_percent}% of the 5-hour limit."),
        }
    }
}

/// Notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_session_reset(&self) -> anyhow::Result<()>;

    async fn notify_usage_milestone(
        &self,
        current_percent: u8,
        crossed_threshold: u8,
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl TracingNotifier {
    fn emit(notification: Notification) {
        tracing::info!(
            id = notification.id(),
            "{}: {}",
            notification.title(),
            notification.body()
        );
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_session_reset(&self) -> anyhow::Result<()> {
        Self::emit(Notification::SessionReset);
        Ok(())
    }

    async fn notify_usage_milestone(
        &self,
        current_percent: u8,
        crossed_threshold: u8,
    ) -> anyhow::Result<()> {
        Self::emit(Notification::UsageMilestone {
            current_percent,
            threshold: crossed_threshold,
        });
        Ok(())
    }
}

/// Forwards notifications over an mpsc channel to an embedding UI.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Notifier plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify_session_reset(&self) -> anyhow::Result<()> {
        self.send(Notification::SessionReset)
    }

    async fn notify_usage_milestone(
        &self,
        current_percent: u8,
        crossed_threshold: u8,
    ) -> anyhow::Result<()> {
        self.send(Notification::UsageMilestone {
            current_percent,
            threshold: crossed_threshold,
        })
    }
}
