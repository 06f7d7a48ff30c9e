//! Types describing one sync cycle.

use crate::notify::Notification;
use crate::usage::{UsageError, UsageSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum CycleTrigger {
    /// The self-rescheduling chain fired.
    Chain,
    /// The periodic fallback fired. `attempt` is 0 for the scheduled run and
    /// counts up for backoff retries.
    Fallback { attempt: u32 },
    /// Explicit request (CLI `sync-once`, UI refresh).
    Manual,
}

impl std::fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chain => write!(f, "chain"),
            Self::Fallback { attempt: 0 } => write!(f, "fallback"),
            Self::Fallback { attempt } => write!(f, "fallback retry {attempt}"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    Success {
        snapshot: UsageSnapshot,
        notifications: Vec<Notification>,
    },
    Failure(UsageError),
}

/// Completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub trigger: CycleTrigger,
    /// Process-wide attempt counter, starting at 1.
    pub attempt: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: CycleResult,
}

impl CycleOutcome {
    pub fn error(&self) -> Option<&UsageError> {
        match &self.result {
            CycleResult::Failure(err) => Some(err),
            CycleResult::Success { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, CycleResult::Success { .. })
    }

    /// One-line description for logs and history.
    pub fn summary(&self) -> String {
        match &self.result {
            CycleResult::Success {
                snapshot,
                notifications,
            } => {
                let session = snapshot
                    .session_utilization()
                    .map_or_else(|| "n/a".to_owned(), |u| format!("{u:.1}%"));
                if notifications.is_empty() {
                    format!("ok session={session}")
                } else {
                    let ids: Vec<String> =
                        notifications.iter().map(|n| n.id().to_string()).collect();
                    format!("ok session={session} notified=[{}]", ids.join(","))
                }
            }
            CycleResult::Failure(err) => format!("failed: {err}"),
        }
    }
}
