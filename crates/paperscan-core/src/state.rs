//! Latest-value state holder for observable view state.
//!
//! Wraps a `tokio::sync::watch` channel: many subscribers, each sees the most
//! recent value and may skip intermediates. Updates are applied in place
//! under the channel's lock, so a newer state is never overwritten by a
//! stale one.

use tokio::sync::watch;

/// Observable state shared between a producer and any number of observers.
#[derive(Debug)]
pub struct StateHolder<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateHolder<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the current value.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the current value in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.tx.send_modify(f);
    }

    /// Subscribe to changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for StateHolder<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
