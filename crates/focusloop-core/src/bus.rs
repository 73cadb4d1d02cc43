//! Publish/subscribe primitive for observable service state.
//!
//! Thin wrapper over `tokio::sync::watch` chosen for its replay semantics:
//! a new subscriber's first read is the current value, and every later
//! `publish` wakes all subscribers. This is what the session, task, profile,
//! and sync services expose instead of shared mutable state.

use tokio::sync::watch;

/// A single observable value with last-value replay on subscribe.
#[derive(Debug)]
pub struct Publisher<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the current value and wake subscribers.
    ///
    /// Succeeds regardless of whether any subscriber exists.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// New receiver whose first read observes the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}
