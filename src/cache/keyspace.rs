//! Concurrent keyspace table.
//!
//! A sharded key→entry map offering per-key atomic primitives and the
//! bulk-match facilities used by the Janitor, the LRW policy and
//! inspection. Cross-key reads (counts, selects) observe a consistent
//! per-entry snapshot but are not linearizable across keys.

use dashmap::DashMap;

use crate::cache::entry::Entry;
use crate::cache::{CacheKey, CacheValue};

/// Shared concurrent mapping from key to [`Entry`].
///
/// The only shared mutable structure of a cache. All other services
/// coordinate through messages and react to what they observe here.
#[derive(Debug)]
pub struct KeyspaceTable<K: CacheKey, V> {
    map: DashMap<K, Entry<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Default for KeyspaceTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey, V: CacheValue> KeyspaceTable<K, V> {
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Inserts an entry, returning the displaced one if any.
    pub fn insert(&self, entry: Entry<K, V>) -> Option<Entry<K, V>> {
        self.map.insert(entry.key.clone(), entry)
    }

    /// Returns a snapshot of the entry stored under `key`.
    pub fn lookup(&self, key: &K) -> Option<Entry<K, V>> {
        self.map.get(key).map(|guard| guard.value().clone())
    }

    /// Removes the entry under `key`; true iff something was removed.
    pub fn delete(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    /// Removes and returns the entry under `key` in one step.
    pub fn take(&self, key: &K) -> Option<Entry<K, V>> {
        self.map.remove(key).map(|(_, entry)| entry)
    }

    /// Removes the entry under `key` only if it is dead at `now`,
    /// so a lazy purge cannot race a concurrent rewrite.
    pub fn delete_dead(&self, key: &K, now: u64) -> bool {
        self.map
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
    }

    /// Applies `apply` to the entry under `key` while holding its
    /// shard lock. Returns `false` when the key is absent.
    pub fn update_fields(&self, key: &K, apply: impl FnOnce(&mut Entry<K, V>)) -> bool {
        match self.map.get_mut(key) {
            Some(mut guard) => {
                apply(guard.value_mut());
                true
            }
            None => false,
        }
    }

    /// Runs `apply` against the entry under `key`, if present,
    /// returning its result. Atomic with respect to the key.
    pub fn compute_if_present<R>(
        &self,
        key: &K,
        apply: impl FnOnce(&mut Entry<K, V>) -> R,
    ) -> Option<R> {
        self.map.get_mut(key).map(|mut guard| apply(guard.value_mut()))
    }

    /// Inserts via `default` when absent, then applies `apply` to the
    /// stored entry. The whole step is atomic for the key.
    pub fn upsert<R>(
        &self,
        key: K,
        default: impl FnOnce() -> Entry<K, V>,
        apply: impl FnOnce(&mut Entry<K, V>) -> R,
    ) -> R {
        let mut guard = self.map.entry(key).or_insert_with(default);
        apply(guard.value_mut())
    }

    /// Collects entries whose `(touched, ttl)` satisfy `pred`.
    ///
    /// The predicate sees the metadata fields only, so callers bind a
    /// single wall-clock snapshot into it before the scan.
    pub fn select(&self, pred: impl Fn(u64, Option<u64>) -> bool) -> Vec<Entry<K, V>> {
        self.map
            .iter()
            .filter(|guard| pred(guard.touched, guard.ttl))
            .map(|guard| guard.value().clone())
            .collect()
    }

    /// Like [`KeyspaceTable::select`] but returns keys only.
    pub fn select_keys(&self, pred: impl Fn(u64, Option<u64>) -> bool) -> Vec<K> {
        self.map
            .iter()
            .filter(|guard| pred(guard.touched, guard.ttl))
            .map(|guard| guard.key().clone())
            .collect()
    }

    /// Collects `(touched, key)` metadata for every entry. Used by
    /// write-time eviction to order victims without cloning values.
    pub fn select_meta(&self) -> Vec<(u64, K)> {
        self.map
            .iter()
            .map(|guard| (guard.touched, guard.key().clone()))
            .collect()
    }

    /// Deletes every entry whose `(touched, ttl)` satisfy `pred` in a
    /// single pass, atomic per row. Returns the number removed.
    pub fn match_delete(&self, pred: impl Fn(u64, Option<u64>) -> bool) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if pred(entry.touched, entry.ttl) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of entries live at `now`.
    pub fn count_live(&self, now: u64) -> usize {
        self.map
            .iter()
            .filter(|guard| guard.is_live_at(now))
            .count()
    }

    /// Keys of entries live at `now`.
    pub fn keys_live(&self, now: u64) -> Vec<K> {
        self.map
            .iter()
            .filter(|guard| guard.is_live_at(now))
            .map(|guard| guard.key().clone())
            .collect()
    }

    /// Raw entry count, expired rows included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let removed = self.map.len();
        self.map.clear();
        removed
    }

    /// Estimated payload bytes of every stored entry.
    ///
    /// Computed by encoding each entry on demand; O(n) and
    /// approximate, intended for inspection rather than accounting.
    pub fn payload_bytes(&self) -> usize {
        let config = bincode::config::standard();
        self.map
            .iter()
            .filter_map(|guard| bincode::serde::encode_to_vec(guard.value(), config).ok())
            .map(|encoded| encoded.len())
            .sum()
    }

    /// Estimated total bytes including per-entry map overhead.
    pub fn size_bytes(&self) -> usize {
        let overhead = std::mem::size_of::<Entry<K, V>>() + std::mem::size_of::<usize>() * 2;
        self.payload_bytes() + self.map.len() * overhead
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::entry::now_millis;

    fn table() -> KeyspaceTable<String, u64> {
        KeyspaceTable::new()
    }

    #[test]
    fn test_insert_lookup_delete() {
        let t = table();
        assert!(t.insert(Entry::new("a".into(), 1, None)).is_none());
        assert!(t.insert(Entry::new("a".into(), 2, None)).is_some());

        let entry = t.lookup(&"a".to_string()).unwrap();
        assert_eq!(entry.value, 2);

        assert!(t.delete(&"a".to_string()));
        assert!(!t.delete(&"a".to_string()));
    }

    #[test]
    fn test_upsert_applies_to_both_branches() {
        let t = table();
        let new = t.upsert(
            "n".to_string(),
            || Entry::new("n".into(), 10, None),
            |entry| {
                entry.value += 5;
                entry.value
            },
        );
        assert_eq!(new, 15);

        let again = t.upsert(
            "n".to_string(),
            || Entry::new("n".into(), 10, None),
            |entry| {
                entry.value += 5;
                entry.value
            },
        );
        assert_eq!(again, 20);
    }

    #[test]
    fn test_match_delete_removes_expired_only() {
        let t = table();
        t.insert(Entry::new("old".into(), 1, Some(Duration::from_millis(1))));
        t.insert(Entry::new("new".into(), 2, Some(Duration::from_secs(60))));
        t.insert(Entry::new("keep".into(), 3, None));

        std::thread::sleep(Duration::from_millis(5));
        let now = now_millis();
        let removed = t.match_delete(|touched, ttl| match ttl {
            Some(ttl) => touched + ttl <= now,
            None => false,
        });

        assert_eq!(removed, 1);
        assert_eq!(t.len(), 2);
        assert!(t.lookup(&"old".to_string()).is_none());
    }

    #[test]
    fn test_select_sees_single_snapshot() {
        let t = table();
        t.insert(Entry::new("a".into(), 1, Some(Duration::from_millis(1))));
        t.insert(Entry::new("b".into(), 2, None));

        std::thread::sleep(Duration::from_millis(3));
        let now = now_millis();
        let dead = t.select(|touched, ttl| ttl.map(|t0| touched + t0 <= now).unwrap_or(false));
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key, "a");
    }

    #[test]
    fn test_live_counts_ignore_expired_rows() {
        let t = table();
        t.insert(Entry::new("x".into(), 1, Some(Duration::from_millis(1))));
        t.insert(Entry::new("y".into(), 2, None));

        std::thread::sleep(Duration::from_millis(3));
        let now = now_millis();
        assert_eq!(t.count_live(now), 1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.keys_live(now), vec!["y".to_string()]);
    }
}
