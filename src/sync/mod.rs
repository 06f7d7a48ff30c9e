//! The sync cycle: rate guard, executor and cycle history.

pub mod cycle;
pub mod executor;
pub mod guard;
pub mod journal;

pub use cycle::{CycleOutcome, CycleResult, CycleTrigger};
pub use executor::SyncExecutor;
pub use guard::FetchGuard;
pub use journal::{CycleJournal, CycleRecord};
