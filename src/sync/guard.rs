//! Minimum spacing between fetch attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const NEVER: u64 = u64::MAX;

/// Rate guard shared by every trigger.
///
/// Records the time of the last *attempt* (successful or not) and refuses a
/// new one until `min_interval` has elapsed. Lock-free so a rejected trigger
/// returns immediately.
#[derive(Debug)]
pub struct FetchGuard {
    origin: Instant,
    min_interval: Duration,
    last_attempt_ms: AtomicU64,
}

impl FetchGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            min_interval,
            last_attempt_ms: AtomicU64::new(NEVER),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(NEVER - 1)
    }

    /// Claim the next attempt slot. Returns `false` if the last attempt was
    /// too recent; the stored timestamp is left untouched in that case.
    pub fn try_acquire(&self) -> bool {
        let now = self.now_ms();
        let min_ms = u64::try_from(self.min_interval.as_millis()).unwrap_or(NEVER);
        let mut last = self.last_attempt_ms.load(Ordering::Acquire);
        loop {
            if last != NEVER && now.saturating_sub(last) < min_ms {
                return false;
            }
            match self.last_attempt_ms.compare_exchange_weak(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }

    /// Time until the next attempt would be allowed.
    pub fn remaining(&self) -> Duration {
        let last = self.last_attempt_ms.load(Ordering::Acquire);
        if last == NEVER {
            return Duration::ZERO;
        }
        let elapsed = Duration::from_millis(self.now_ms().saturating_sub(last));
        self.min_interval.saturating_sub(elapsed)
    }
}
