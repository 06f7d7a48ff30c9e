//! Usage data model and the HTTP client that fetches it.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod types;

pub use client::{ClaudeUsageClient, Organization};
pub use error::UsageError;
pub use fetcher::UsageFetcher;
pub use types::{UsageMetric, UsageSnapshot, UsageStatus};
