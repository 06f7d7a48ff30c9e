//! Usage snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse traffic-light status derived from a utilization percentage.
///
/// Never stored; always recomputed from [`UsageMetric::utilization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// Below 50%.
    Safe,
    /// 50% up to (but excluding) 80%.
    Moderate,
    /// 80% and above.
    Critical,
}

impl UsageStatus {
    /// Utilization at which the status becomes [`UsageStatus::Moderate`].
    pub const MODERATE_AT: f64 = 50.0;
    /// Utilization at which the status becomes [`UsageStatus::Critical`].
    pub const CRITICAL_AT: f64 = 80.0;

    /// Classify a utilization percentage.
    #[must_use]
    pub fn from_utilization(value: f64) -> Self {
        if value >= Self::CRITICAL_AT {
            Self::Critical
        } else if value >= Self::MODERATE_AT {
            Self::Moderate
        } else {
            Self::Safe
        }
    }
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Moderate => write!(f, "moderate"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One metered quota window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetric {
    /// Percentage of the quota consumed (0-100).
    pub utilization: f64,
    /// When the window resets, if the server reported it.
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
}

impl UsageMetric {
    pub fn new(utilization: f64, resets_at: Option<DateTime<Utc>>) -> Self {
        Self {
            utilization,
            resets_at,
        }
    }

    /// Status derived from the current utilization.
    #[must_use]
    pub fn status(&self) -> UsageStatus {
        UsageStatus::from_utilization(self.utilization)
    }

    /// Time remaining until the window resets, or `None` when unknown or
    /// already past.
    #[must_use]
    pub fn time_until_reset(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let resets_at = self.resets_at?;
        let remaining = resets_at - now;
        (remaining > chrono::Duration::zero()).then_some(remaining)
    }
}

/// Complete usage reading from one successful fetch.
///
/// Replaced wholesale on every successful fetch; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Rolling five-hour session window.
    #[serde(default)]
    pub five_hour: Option<UsageMetric>,
    /// Rolling seven-day window across all models.
    #[serde(default)]
    pub seven_day: Option<UsageMetric>,
    /// Seven-day window for Opus models.
    #[serde(default)]
    pub seven_day_opus: Option<UsageMetric>,
    /// Seven-day window for Sonnet models.
    #[serde(default)]
    pub seven_day_sonnet: Option<UsageMetric>,
    /// When the snapshot was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Create an empty snapshot stamped with `fetched_at`.
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            five_hour: None,
            seven_day: None,
            seven_day_opus: None,
            seven_day_sonnet: None,
            fetched_at,
        }
    }

    /// Replace the five-hour metric.
    #[must_use]
    pub fn with_five_hour(mut self, metric: UsageMetric) -> Self {
        self.five_hour = Some(metric);
        self
    }

    /// Replace the seven-day metric.
    #[must_use]
    pub fn with_seven_day(mut self, metric: UsageMetric) -> Self {
        self.seven_day = Some(metric);
        self
    }

    /// Five-hour utilization, the metric notifications are driven by.
    #[must_use]
    pub fn session_utilization(&self) -> Option<f64> {
        self.five_hour.as_ref().map(|m| m.utilization)
    }

    /// Present metrics paired with a display label, in display order.
    pub fn labeled_metrics(&self) -> impl Iterator<Item = (&'static str, &UsageMetric)> {
        [
            ("Session (5h)", self.five_hour.as_ref()),
            ("Weekly (all models)", self.seven_day.as_ref()),
            ("Weekly (Opus)", self.seven_day_opus.as_ref()),
            ("Weekly (Sonnet)", self.seven_day_sonnet.as_ref()),
        ]
        .into_iter()
        .filter_map(|(label, metric)| metric.map(|m| (label, m)))
    }
}
