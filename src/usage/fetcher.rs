//! Seam between the sync engine and whatever produces usage snapshots.

use super::error::UsageError;
use super::types::UsageSnapshot;
use async_trait::async_trait;

/// Produces one usage snapshot per call.
///
/// Implementations read credentials themselves and must report a missing
/// session key as [`UsageError::NoCredentials`] without touching the
/// network.
#[async_trait]
pub trait UsageFetcher: Send + Sync {
    async fn fetch_usage(&self) -> Result<UsageSnapshot, UsageError>;
}
