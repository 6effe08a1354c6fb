//! A keyed pool of background tasks.
//!
//! The install pipeline fans clone work out through this pool, one task per
//! package name. Submitting a key that already has a task in flight (or an
//! undrained result) evicts the prior state, so at most one task per key is
//! ever live. Draining hands back a [`Ticket`] that is awaited exactly
//! once.

use std::collections::HashMap;

use tokio::task::{JoinError, JoinHandle};

use crate::id::Name;

//================================================================================================
// Types
//================================================================================================

/// A keyed collection of in-flight background tasks.
pub struct Pool<T> {
    tasks: HashMap<Name, JoinHandle<T>>,
}

/// A drained task handle, consumed by [`Ticket::join`].
pub struct Ticket<T>(JoinHandle<T>);

//================================================================================================
// Impls
//================================================================================================

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool {
            tasks: HashMap::new(),
        }
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `task` in the background under `key`.
    ///
    /// Any prior task for the key is evicted and aborted.
    pub fn defer<F>(&mut self, key: Name, task: F)
    where
        F: std::future::Future<Output = T> + Send + 'static,
    {
        if let Some(prior) = self.tasks.insert(key, tokio::spawn(task)) {
            prior.abort();
        }
    }

    /// Removes and returns the task for `key`, if one is pending.
    pub fn drain(&mut self, key: &str) -> Option<Ticket<T>> {
        self.tasks.remove(key).map(Ticket)
    }

    /// Returns true when a task for `key` is pending.
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// The number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Ticket<T> {
    /// Waits for the task to finish, consuming the ticket.
    ///
    /// An `Err` means the task panicked or was evicted mid-flight.
    pub async fn join(self) -> Result<T, JoinError> {
        self.0.await
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

//================================================================================================
// Tests
//================================================================================================
