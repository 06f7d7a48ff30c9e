//! Threshold ladder evaluation for session utilization.
//!
//! All functions are pure: given the same inputs they return the same
//! answer, and they never look at stored state.

/// Utilization percentages that trigger a milestone notification.
pub const THRESHOLDS: [u8; 5] = [75, 80, 85, 90, 100];

/// Clamp into `[0, 100]`. NaN is treated as absent.
fn clamp_percent(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 100.0))
    }
}

/// Largest threshold at or below `current`.
///
/// Returns `None` when `current` is absent, NaN, or below the first rung.
#[must_use]
pub fn highest_reached(current: Option<f64>) -> Option<u8> {
    let current = clamp_percent(current?)?;
    THRESHOLDS
        .iter()
        .rev()
        .copied()
        .find(|&t| current >= f64::from(t))
}

/// Largest threshold `t` with `previous < t <= current`.
///
/// With no previous reading this is [`highest_reached`]. Falling or flat
/// utilization never crosses anything.
#[must_use]
pub fn highest_crossed(previous: Option<f64>, current: Option<f64>) -> Option<u8> {
    let current = clamp_percent(current?)?;
    let Some(previous) = previous.and_then(clamp_percent) else {
        return highest_reached(Some(current));
    };
    THRESHOLDS.iter().rev().copied().find(|&t| {
        let t = f64::from(t);
        previous < t && t <= current
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reached_picks_largest_rung() {
        assert_eq!(highest_reached(None), None);
        assert_eq!(highest_reached(Some(0.0)), None);
        assert_eq!(highest_reached(Some(74.99)), None);
        assert_eq!(highest_reached(Some(75.0)), Some(75));
        assert_eq!(highest_reached(Some(84.9)), Some(80));
        assert_eq!(highest_reached(Some(99.9)), Some(90));
        assert_eq!(highest_reached(Some(100.0)), Some(100));
        assert_eq!(highest_reached(Some(150.0)), Some(100));
        assert_eq!(highest_reached(Some(-3.0)), None);
        assert_eq!(highest_reached(Some(f64::NAN)), None);
    }

    #[test]
    fn crossed_examples() {
        assert_eq!(highest_crossed(Some(70.0), Some(82.0)), Some(80));
        assert_eq!(highest_crossed(Some(70.0), Some(100.0)), Some(100));
        assert_eq!(highest_crossed(Some(80.0), Some(84.0)), None);
        assert_eq!(highest_crossed(Some(79.9), Some(80.0)), Some(80));
        assert_eq!(highest_crossed(Some(90.0), Some(50.0)), None);
        assert_eq!(highest_crossed(Some(100.0), Some(100.0)), None);
        assert_eq!(highest_crossed(Some(99.0), Some(120.0)), Some(100));
        assert_eq!(highest_crossed(Some(75.0), Some(88.0)), Some(85));
        assert_eq!(highest_crossed(Some(74.0), Some(91.0)), Some(90));
        assert_eq!(highest_crossed(Some(88.0), Some(89.0)), None);
        assert_eq!(highest_crossed(Some(89.0), Some(90.0)), Some(90));
        assert_eq!(highest_crossed(Some(99.0), Some(100.0)), Some(100));
    }

    #[test]
    fn crossed_without_previous_falls_back_to_reached() {
        assert_eq!(highest_crossed(None, Some(88.0)), Some(85));
        assert_eq!(highest_crossed(None, Some(10.0)), None);
        assert_eq!(highest_crossed(Some(f64::NAN), Some(76.0)), Some(75));
    }

    #[test]
    fn crossed_without_current_is_none() {
        assert_eq!(highest_crossed(Some(50.0), None), None);
        assert_eq!(highest_crossed(None, None), None);
        assert_eq!(highest_crossed(Some(50.0), Some(f64::NAN)), None);
    }

    proptest! {
        #[test]
        fn reached_is_a_rung_not_above_current(current in -50.0f64..200.0) {
            if let Some(t) = highest_reached(Some(current)) {
                prop_assert!(THRESHOLDS.contains(&t));
                prop_assert!(f64::from(t) <= current.clamp(0.0, 100.0));
            } else {
                prop_assert!(current < 75.0);
            }
        }

        #[test]
        fn crossed_lies_strictly_between(prev in -10.0f64..110.0, cur in -10.0f64..110.0) {
            if let Some(t) = highest_crossed(Some(prev), Some(cur)) {
                let t = f64::from(t);
                prop_assert!(prev.clamp(0.0, 100.0) < t);
                prop_assert!(t <= cur.clamp(0.0, 100.0));
            }
        }

        #[test]
        fn falling_never_crosses(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (high, low) = if a >= b { (a, b) } else { (b, a) };
            prop_assert_eq!(highest_crossed(Some(high), Some(low)), None);
        }

        #[test]
        fn crossed_never_exceeds_reached(prev in 0.0f64..100.0, cur in 0.0f64..100.0) {
            let crossed = highest_crossed(Some(prev), Some(cur));
            let reached = highest_reached(Some(cur));
            if let Some(c) = crossed {
                prop_assert_eq!(Some(c), reached);
            }
        }
    }
}
