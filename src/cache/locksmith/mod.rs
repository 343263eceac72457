//! Key and transaction locking.
//!
//! The lock table maps keys to the owning queue; the write gate lets
//! every mutating action answer "may I write this key right now"
//! without touching the table when no transactions are active.
//! Serialization of contested operations happens on the per-cache
//! [`queue::TransactionQueue`], which is the only component that
//! mutates the table.

pub mod queue;

use std::cell::Cell;

use dashmap::DashMap;

use crate::cache::CacheKey;

thread_local! {
    // Queue id of the transaction worker currently executing on this
    // thread; zero everywhere else.
    static QUEUE_CONTEXT: Cell<u64> = const { Cell::new(0) };
}

/// Marks the current thread as the queue of `cache_id` for the
/// duration of the guard.
pub(crate) struct QueueGuard {
    previous: u64,
}

pub(crate) fn enter_queue(cache_id: u64) -> QueueGuard {
    let previous = QUEUE_CONTEXT.with(|ctx| ctx.replace(cache_id));
    QueueGuard { previous }
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        QUEUE_CONTEXT.with(|ctx| ctx.set(self.previous));
    }
}

/// True when the current thread is the transaction queue of the
/// cache identified by `cache_id`.
pub(crate) fn on_queue(cache_id: u64) -> bool {
    QUEUE_CONTEXT.with(|ctx| ctx.get()) == cache_id
}

/// Per-cache key lock table. At most one owner per key at any
/// instant; only the cache's queue worker acquires and releases.
#[derive(Debug)]
pub struct LockTable<K: CacheKey> {
    locks: DashMap<K, u64>,
}

impl<K: CacheKey> Default for LockTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey> LockTable<K> {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// True iff no lock exists for `key` or the calling context is
    /// the cache's transaction queue.
    pub fn write_allowed(&self, cache_id: u64, key: &K) -> bool {
        if self.locks.is_empty() || on_queue(cache_id) {
            return true;
        }
        !self.locks.contains_key(key)
    }

    /// Acquires every key in one step; fails without acquiring
    /// anything when any key is already held.
    ///
    /// Only the queue worker calls this, so the check-then-insert
    /// pair cannot race with another acquirer of the same cache.
    pub fn lock_all(&self, owner: u64, keys: &[K]) -> bool {
        if keys.iter().any(|key| self.locks.contains_key(key)) {
            return false;
        }
        for key in keys {
            self.locks.insert(key.clone(), owner);
        }
        true
    }

    /// Releases keys previously acquired by `owner`.
    pub fn unlock_all(&self, owner: u64, keys: &[K]) {
        for key in keys {
            self.locks.remove_if(key, |_, held_by| *held_by == owner);
        }
    }

    /// Number of currently held keys.
    pub fn held(&self) -> usize {
        self.locks.len()
    }
}
