//! Per-key mutual exclusion for on-disk histories.
//!
//! Each patient history and each doctor audit trail is guarded by its own mutex. Writers on
//! different keys never contend; writers on the same key are serialised for the whole
//! read-append-commit sequence.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Table of lazily created per-key mutexes.
///
/// An entry lives only while some caller holds or waits on it, so the table stays as small as
/// the number of keys in flight.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The map shard guard is released before the per-key mutex is taken. A poisoned lock is
    /// recovered, since the guarded value is `()`. The entry is evicted once no other caller
    /// references it.
    pub(crate) fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);

        // The shard write lock is held while counting, so no caller can clone the entry meanwhile.
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}
