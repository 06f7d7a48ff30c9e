//! usage-sync: background sync engine for Claude usage metering.
//!
//! Polls the usage endpoint on a self-rescheduling chain backed by a
//! periodic fallback, caches the latest snapshot, and raises session-reset
//! and usage-milestone notifications as the five-hour session utilization
//! climbs the threshold ladder.
//!
//! # Architecture
//!
//! - **usage**: snapshot types, the error taxonomy and the HTTP client
//! - **notify**: threshold ladder, milestone decisions, notifier sinks
//! - **store**: cached snapshot and preferences (JSON files or memory)
//! - **sync**: one fetch cycle behind a rate guard, plus cycle history
//! - **scheduler**: chain and fallback strategies, cancellation
//! - **service**: the facade a UI or the daemon binary talks to

pub mod app_dirs;
pub mod config;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod publish;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sync;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use service::UsageService;
