//! Scheduling strategies and their observable state.

use std::time::Duration;

/// The two independent ways a cycle gets scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Self-rescheduling one-shot chain at the user's refresh interval.
    Chain,
    /// Periodic safety net in case the chain dies.
    Fallback,
}

impl Strategy {
    /// Unique work name. At most one entry per name exists at a time.
    #[must_use]
    pub fn work_name(self) -> &'static str {
        match self {
            Self::Chain => "usage_sync_chain",
            Self::Fallback => "usage_sync_periodic",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.work_name())
    }
}

/// Snapshot of a strategy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    /// Nothing armed.
    Idle,
    /// Armed; fires after `due_in`.
    Scheduled { due_in: Duration },
    /// A cycle is executing. `next_due_in` is set when another entry is
    /// already armed behind it.
    Running { next_due_in: Option<Duration> },
}

impl StrategyState {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scheduled { due_in } => write!(f, "scheduled in {}s", due_in.as_secs()),
            Self::Running { next_due_in: None } => write!(f, "running"),
            Self::Running {
                next_due_in: Some(due_in),
            } => write!(f, "running, next in {}s", due_in.as_secs()),
        }
    }
}

/// Fallback cadence and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub period: Duration,
    pub initial_backoff: Duration,
    /// Retries per period after a transient failure.
    pub max_retries: u32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(15 * 60),
            initial_backoff: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl FallbackPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time and
    /// never exceeds half the period.
    #[must_use]
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.period / 2)
    }
}
