//! Best-effort fan-out of fresh snapshots to UI surfaces.

use crate::usage::UsageSnapshot;
use tokio::sync::watch;

/// Receives every successfully fetched snapshot.
///
/// Publishing must not block and cannot fail the cycle.
pub trait UsagePublisher: Send + Sync {
    fn publish(&self, snapshot: &UsageSnapshot);
}

/// Discards snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl UsagePublisher for NoopPublisher {
    fn publish(&self, _snapshot: &UsageSnapshot) {}
}

/// Holds the latest snapshot in a [`watch`] channel.
#[derive(Debug)]
pub struct WatchPublisher {
    tx: watch::Sender<Option<UsageSnapshot>>,
}

impl WatchPublisher {
    /// Publisher seeded with `initial` (typically the cached snapshot).
    pub fn new(initial: Option<UsageSnapshot>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Observe the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<UsageSnapshot>> {
        self.tx.subscribe()
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Option<UsageSnapshot> {
        self.tx.borrow().clone()
    }
}

impl UsagePublisher for WatchPublisher {
    fn publish(&self, snapshot: &UsageSnapshot) {
        // send_replace keeps the value even with no live receivers.
        self.tx.send_replace(Some(snapshot.clone()));
    }
}
