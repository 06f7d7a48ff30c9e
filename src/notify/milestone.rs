//! Milestone and session-reset decisions for one cycle.
//!
//! The caller captures the previous and current session utilization and the
//! stored watermark, asks [`decide`] what to do, dispatches the notification
//! and persists the new watermark.

use super::threshold::{highest_crossed, highest_reached};

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneDecision {
    /// Threshold to announce, if any.
    pub notify: Option<u8>,
    /// Watermark to store after this cycle.
    pub watermark: Option<u8>,
}

impl MilestoneDecision {
    /// `true` when the stored watermark must be rewritten.
    #[must_use]
    pub fn watermark_changed(&self, stored: Option<u8>) -> bool {
        self.watermark != stored
    }
}

/// Decide whether to announce a usage milestone and where the watermark
/// moves.
///
/// - Below the first rung (or no reading) the watermark is cleared so the
///   next climb announces again.
/// - Otherwise the candidate is the highest threshold crossed since the
///   previous reading. When nothing was crossed and the watermark is empty,
///   the highest threshold already reached is used instead, so a user who
///   turns notifications on while above 75% still hears about it once.
/// - A candidate is announced only if it beats the watermark and `enabled`
///   is set.
/// - The watermark advances to the highest reached threshold even when
///   `enabled` is false, which stops a backlog from firing on re-enable.
#[must_use]
pub fn decide(
    previous: Option<f64>,
    current: Option<f64>,
    watermark: Option<u8>,
    enabled: bool,
) -> MilestoneDecision {
    let Some(reached) = highest_reached(current) else {
        return MilestoneDecision {
            notify: None,
            watermark: None,
        };
    };

    let candidate = highest_crossed(previous, current).or(if watermark.is_none() {
        Some(reached)
    } else {
        None
    });

    let beats_watermark = |t: u8| watermark.is_none_or(|w| t > w);
    let notify = candidate.filter(|&t| enabled && beats_watermark(t));

    let watermark = if beats_watermark(reached) {
        Some(reached)
    } else {
        watermark
    };

    MilestoneDecision { notify, watermark }
}

/// A fresh session window: usage went from something to exactly zero.
#[must_use]
pub fn is_session_reset(previous: Option<f64>, current: Option<f64>) -> bool {
    matches!((previous, current), (Some(p), Some(c)) if p > 0.0 && c == 0.0)
}

/// Utilization as a whole percentage for notification text.
#[must_use]
pub fn display_percent(utilization: f64) -> u8 {
    if utilization.is_nan() {
        return 0;
    }
    // Clamped to [0, 100] so the cast cannot truncate.
    utilization.clamp(0.0, 100.0).round() as u8
}
