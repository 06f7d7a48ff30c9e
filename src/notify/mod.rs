//! Threshold evaluation and notification dispatch.

pub mod milestone;
pub mod notifier;
pub mod threshold;

pub use milestone::{MilestoneDecision, decide, display_percent, is_session_reset};
pub use notifier::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use threshold::{THRESHOLDS, highest_crossed, highest_reached};
