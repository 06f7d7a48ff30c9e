//! Chain and fallback scheduling around a [`SyncExecutor`].
//!
//! Each strategy owns one slot. Arming the chain replaces its pending entry
//! (a running cycle is left alone); arming the fallback keeps an existing
//! entry. Every armed entry carries a child of the current epoch token, so
//! [`Scheduler::cancel_all`] tears down everything at once while cycles that
//! are already executing finish without re-arming.

use crate::error::Result;
use crate::scheduler::strategy::{FallbackPolicy, Strategy, StrategyState};
use crate::store::clamp_refresh_interval;
use crate::sync::journal::DEFAULT_HISTORY_LIMIT;
use crate::sync::{CycleJournal, CycleOutcome, CycleRecord, CycleTrigger, SyncExecutor};
use crate::usage::UsageError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PendingEntry {
    id: u64,
    fire_at: Instant,
    cancel: CancellationToken,
}

struct FallbackEntry {
    id: u64,
    next_fire: Option<Instant>,
    running: bool,
}

struct Slots {
    epoch: u64,
    epoch_token: CancellationToken,
    next_id: u64,
    chain_pending: Option<PendingEntry>,
    chain_running: usize,
    fallback: Option<FallbackEntry>,
}

impl Slots {
    fn new() -> Self {
        Self {
            epoch: 0,
            epoch_token: CancellationToken::new(),
            next_id: 0,
            chain_pending: None,
            chain_running: 0,
            fallback: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner {
    executor: Arc<SyncExecutor>,
    policy: FallbackPolicy,
    slots: Mutex<Slots>,
    journal: Mutex<CycleJournal>,
    last_error: Mutex<Option<UsageError>>,
    outcome_tx: Option<mpsc::UnboundedSender<CycleOutcome>>,
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    executor: Arc<SyncExecutor>,
    policy: FallbackPolicy,
    history_limit: usize,
    history_path: Option<PathBuf>,
    outcome_tx: Option<mpsc::UnboundedSender<CycleOutcome>>,
}

impl SchedulerBuilder {
    /// Override the fallback cadence and retry policy.
    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the cycle-history limit.
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.history_limit = max_entries.max(2);
        self
    }

    /// Mirror cycle history to a JSON file.
    pub fn with_history_path(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// Send every completed outcome to `tx`.
    pub fn with_outcome_channel(mut self, tx: mpsc::UnboundedSender<CycleOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    /// # Errors
    ///
    /// Fails if an existing history file cannot be read.
    pub fn build(self) -> Result<Scheduler> {
        let journal = match self.history_path {
            Some(path) => CycleJournal::open(path, self.history_limit)?,
            None => CycleJournal::new(self.history_limit),
        };
        let last_error = journal.latest().and_then(|r| r.error.clone());
        Ok(Scheduler {
            inner: Arc::new(Inner {
                executor: self.executor,
                policy: self.policy,
                slots: Mutex::new(Slots::new()),
                journal: Mutex::new(journal),
                last_error: Mutex::new(last_error),
                outcome_tx: self.outcome_tx,
            }),
        })
    }
}

/// Dual-strategy background scheduler.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn builder(executor: Arc<SyncExecutor>) -> SchedulerBuilder {
        SchedulerBuilder {
            executor,
            policy: FallbackPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_path: None,
            outcome_tx: None,
        }
    }

    /// Scheduler with defaults and in-memory history.
    pub fn new(executor: Arc<SyncExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner::bare(executor)),
        }
    }

    pub fn executor(&self) -> &Arc<SyncExecutor> {
        &self.inner.executor
    }

    /// Arm the chain to fire in `interval_seconds` (clamped to [5, 300]),
    /// replacing any entry that has not fired yet.
    pub fn schedule_sync(&self, interval_seconds: u32) {
        let seconds = clamp_refresh_interval(interval_seconds);
        let mut slots = self.inner.slots.lock();
        self.inner
            .arm_chain_locked(&mut slots, Duration::from_secs(u64::from(seconds)));
    }

    /// Arm the periodic fallback unless it is already armed. Returns `true`
    /// when a new entry was created.
    pub fn schedule_periodic_fallback(&self) -> bool {
        let mut slots = self.inner.slots.lock();
        if slots.fallback.is_some() {
            debug!("{} already armed, keeping it", Strategy::Fallback);
            return false;
        }
        let id = slots.allocate_id();
        let cancel = slots.epoch_token.child_token();
        slots.fallback = Some(FallbackEntry {
            id,
            next_fire: Some(Instant::now() + self.inner.policy.period),
            running: false,
        });
        drop(slots);

        info!(
            "{} armed every {}s",
            Strategy::Fallback,
            self.inner.policy.period.as_secs()
        );
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.fallback_loop(id, cancel));
        true
    }

    /// Tear down both strategies. In-flight cycles complete but do not
    /// re-arm.
    pub fn cancel_all(&self) {
        let mut slots = self.inner.slots.lock();
        slots.epoch_token.cancel();
        slots.epoch += 1;
        slots.epoch_token = CancellationToken::new();
        slots.chain_pending = None;
        slots.fallback = None;
        info!("all sync work cancelled (epoch {})", slots.epoch);
    }

    /// Run a cycle right now, outside both strategies. The rate guard still
    /// applies.
    pub async fn sync_now(&self) -> CycleOutcome {
        let outcome = self.inner.executor.run_cycle(CycleTrigger::Manual).await;
        self.inner.record(&outcome);
        outcome
    }

    pub fn chain_state(&self) -> StrategyState {
        let slots = self.inner.slots.lock();
        let now = Instant::now();
        let pending = slots
            .chain_pending
            .as_ref()
            .map(|p| p.fire_at.saturating_duration_since(now));
        match (slots.chain_running > 0, pending) {
            (true, next_due_in) => StrategyState::Running { next_due_in },
            (false, Some(due_in)) => StrategyState::Scheduled { due_in },
            (false, None) => StrategyState::Idle,
        }
    }

    pub fn fallback_state(&self) -> StrategyState {
        let slots = self.inner.slots.lock();
        let now = Instant::now();
        match &slots.fallback {
            None => StrategyState::Idle,
            Some(entry) if entry.running => StrategyState::Running { next_due_in: None },
            Some(entry) => match entry.next_fire {
                Some(at) => StrategyState::Scheduled {
                    due_in: at.saturating_duration_since(now),
                },
                None => StrategyState::Running { next_due_in: None },
            },
        }
    }

    /// Number of chain entries waiting to fire (0 or 1).
    pub fn pending_chain_entries(&self) -> usize {
        usize::from(self.inner.slots.lock().chain_pending.is_some())
    }

    /// Cycle history, oldest first.
    pub fn history(&self) -> Vec<CycleRecord> {
        self.inner.journal.lock().records()
    }

    /// Error from the most recent cycle, cleared by the next success.
    pub fn last_error(&self) -> Option<UsageError> {
        self.inner.last_error.lock().clone()
    }
}

impl Inner {
    fn bare(executor: Arc<SyncExecutor>) -> Self {
        Self {
            executor,
            policy: FallbackPolicy::default(),
            slots: Mutex::new(Slots::new()),
            journal: Mutex::new(CycleJournal::new(DEFAULT_HISTORY_LIMIT)),
            last_error: Mutex::new(None),
            outcome_tx: None,
        }
    }

    fn arm_chain_locked(self: &Arc<Self>, slots: &mut Slots, delay: Duration) {
        let id = slots.allocate_id();
        let cancel = slots.epoch_token.child_token();
        let epoch = slots.epoch;
        let entry = PendingEntry {
            id,
            fire_at: Instant::now() + delay,
            cancel: cancel.clone(),
        };
        if let Some(replaced) = slots.chain_pending.replace(entry) {
            replaced.cancel.cancel();
            debug!("{} entry {} replaced", Strategy::Chain, replaced.id);
        }
        debug!("{} entry {id} armed in {}s", Strategy::Chain, delay.as_secs());

        let inner = Arc::clone(self);
        tokio::spawn(inner.chain_entry(id, epoch, delay, cancel));
    }

    async fn chain_entry(
        self: Arc<Self>,
        id: u64,
        epoch: u64,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        {
            let mut slots = self.slots.lock();
            if cancel.is_cancelled() || slots.chain_pending.as_ref().map(|p| p.id) != Some(id) {
                return;
            }
            slots.chain_pending = None;
            slots.chain_running += 1;
        }

        self.execute_scheduled(CycleTrigger::Chain).await;

        let interval = self.executor.refresh_interval();
        let mut slots = self.slots.lock();
        slots.chain_running = slots.chain_running.saturating_sub(1);
        if slots.epoch != epoch || slots.epoch_token.is_cancelled() {
            debug!("{} not re-armed: cancelled while running", Strategy::Chain);
            return;
        }
        if slots.chain_pending.is_some() {
            // Rescheduled while this cycle was running; that entry wins.
            return;
        }
        self.arm_chain_locked(&mut slots, interval);
    }

    async fn fallback_loop(self: Arc<Self>, id: u64, cancel: CancellationToken) {
        'periods: loop {
            if !self.update_fallback(id, |entry, policy| {
                entry.next_fire = Some(Instant::now() + policy.period);
                entry.running = false;
            }) {
                return;
            }

            tokio::select! {
                () = cancel.cancelled() => break 'periods,
                () = tokio::time::sleep(self.policy.period) => {}
            }
            if cancel.is_cancelled() {
                break;
            }

            let mut retry = 0;
            loop {
                if !self.update_fallback(id, |entry, _| {
                    entry.next_fire = None;
                    entry.running = true;
                }) {
                    return;
                }
                let outcome = self
                    .execute_scheduled(CycleTrigger::Fallback { attempt: retry })
                    .await;
                let transient = outcome
                    .as_ref()
                    .and_then(CycleOutcome::error)
                    .is_some_and(UsageError::is_transient);
                if !transient || retry >= self.policy.max_retries {
                    break;
                }

                retry += 1;
                let backoff = self.policy.backoff_for(retry);
                debug!("{} retry {retry} in {}s", Strategy::Fallback, backoff.as_secs());
                self.update_fallback(id, |entry, _| {
                    entry.next_fire = Some(Instant::now() + backoff);
                    entry.running = false;
                });
                tokio::select! {
                    () = cancel.cancelled() => break 'periods,
                    () = tokio::time::sleep(backoff) => {}
                }
            }
        }

        let mut slots = self.slots.lock();
        if slots.fallback.as_ref().map(|e| e.id) == Some(id) {
            slots.fallback = None;
        }
    }

    /// Apply `f` to the fallback slot if it still belongs to `id`.
    fn update_fallback(&self, id: u64, f: impl FnOnce(&mut FallbackEntry, &FallbackPolicy)) -> bool {
        let mut slots = self.slots.lock();
        match slots.fallback.as_mut() {
            Some(entry) if entry.id == id => {
                f(entry, &self.policy);
                true
            }
            _ => false,
        }
    }

    /// Run a strategy-triggered cycle on its own task. A panicking
    /// collaborator aborts only that cycle; the strategy carries on.
    async fn execute_scheduled(self: &Arc<Self>, trigger: CycleTrigger) -> Option<CycleOutcome> {
        let inner = Arc::clone(self);
        let cycle = tokio::spawn(async move {
            let outcome = inner.executor.run_cycle(trigger).await;
            inner.record(&outcome);
            outcome
        });
        match cycle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("{trigger} cycle aborted: {e}");
                None
            }
        }
    }

    fn record(&self, outcome: &CycleOutcome) {
        *self.last_error.lock() = outcome.error().cloned();
        self.journal.lock().push(CycleRecord::from(outcome));
        if let Some(tx) = &self.outcome_tx {
            if tx.send(outcome.clone()).is_err() {
                debug!("cycle outcome receiver dropped");
            }
        }
    }
}
