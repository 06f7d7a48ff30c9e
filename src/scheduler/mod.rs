//! Background scheduling of sync cycles.
//!
//! Two strategies keep usage fresh: a self-rescheduling chain at the user's
//! refresh interval, and a 15 minute periodic fallback that catches a dead
//! chain. Both drive the same [`SyncExecutor`](crate::sync::SyncExecutor).

pub mod runner;
pub mod strategy;

pub use runner::{Scheduler, SchedulerBuilder};
pub use strategy::{FallbackPolicy, Strategy, StrategyState};
