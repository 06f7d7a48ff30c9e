//! Bounded history of completed cycles.
//!
//! Kept in memory and optionally mirrored to a JSON file so `usage-sync
//! history` can show what the daemon has been doing. When the journal grows
//! past its limit it drops the oldest half in one go.

use super::cycle::{CycleOutcome, CycleTrigger};
use crate::error::{Result, SyncError};
use crate::store::json::read_json_file;
use crate::store::write_atomic;
use crate::usage::UsageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Default maximum number of records.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Persisted form of a [`CycleOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub trigger: CycleTrigger,
    pub attempt: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<UsageError>,
    pub summary: String,
}

impl From<&CycleOutcome> for CycleRecord {
    fn from(outcome: &CycleOutcome) -> Self {
        Self {
            trigger: outcome.trigger,
            attempt: outcome.attempt,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            error: outcome.error().cloned(),
            summary: outcome.summary(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    #[serde(default)]
    records: Vec<CycleRecord>,
}

#[derive(Debug)]
pub struct CycleJournal {
    records: VecDeque<CycleRecord>,
    limit: usize,
    path: Option<PathBuf>,
}

impl CycleJournal {
    /// In-memory journal.
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit: limit.max(2),
            path: None,
        }
    }

    /// Journal mirrored to `path`, seeded from whatever is already there.
    pub fn open(path: PathBuf, limit: usize) -> Result<Self> {
        let mut journal = Self::new(limit);
        if let Some(file) = read_json_file::<JournalFile>(&path)? {
            journal.records.extend(file.records);
            journal.trim();
        }
        journal.path = Some(path);
        Ok(journal)
    }

    /// Read the records at `path` without holding a journal.
    pub fn read(path: &Path) -> Result<Vec<CycleRecord>> {
        Ok(read_json_file::<JournalFile>(path)?
            .map(|f| f.records)
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records, oldest first.
    pub fn records(&self) -> Vec<CycleRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&CycleRecord> {
        self.records.back()
    }

    /// Append a record and persist if file-backed. Persistence failures are
    /// logged; the in-memory journal is always updated.
    pub fn push(&mut self, record: CycleRecord) {
        self.records.push_back(record);
        self.trim();
        if let Err(e) = self.save() {
            tracing::warn!("cannot persist cycle history: {e}");
        }
    }

    fn trim(&mut self) {
        if self.records.len() <= self.limit {
            return;
        }
        let keep = self.limit / 2;
        let drop_count = self.records.len().saturating_sub(keep);
        self.records.drain(0..drop_count);
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = JournalFile {
            records: self.records(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &json)
            .map_err(|e| SyncError::Store(format!("cannot write cycle history: {e}")))
    }
}
