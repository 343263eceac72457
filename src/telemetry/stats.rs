//! Statistics collection.
//!
//! An async post-hook feeding a set of shared atomic counters. The
//! counters live on the cache core so the `stats` action can read
//! them without a round-trip to the hook thread; delivery order makes
//! the numbers eventually consistent with completed actions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::entry::now_millis;
use crate::cache::events::{Action, CacheEvent, EventOutcome, OutcomeValue};
use crate::cache::informant::{Hook, HookRegistration, HookSpec};
use crate::cache::{CacheKey, CacheValue};

/// Name under which the statistics hook registers.
pub const STATS_HOOK_NAME: &str = "stats";

/// Shared counter sink written by the stats hook.
#[derive(Debug)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    ignores: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    operations: Mutex<HashMap<&'static str, u64>>,
    started: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            ignores: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            operations: Mutex::new(HashMap::new()),
            started: AtomicU64::new(now_millis()),
        }
    }

    /// Folds one completed action into the counters.
    pub fn record_event<K, V>(&self, event: &CacheEvent<K, V>, outcome: &EventOutcome<K, V>) {
        *self.operations.lock().entry(event.action.name()).or_insert(0) += 1;

        if event.action == Action::Purge {
            if let EventOutcome::Ok(OutcomeValue::Count(count)) = outcome {
                self.expirations.fetch_add(*count as u64, Ordering::Relaxed);
            }
            return;
        }

        let is_read = matches!(event.action, Action::Get | Action::Fetch | Action::Take);
        match outcome {
            EventOutcome::Ok(OutcomeValue::Value(Some(_))) if is_read => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            EventOutcome::Ok(OutcomeValue::Value(None)) | EventOutcome::Missing if is_read => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            EventOutcome::Commit(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.loads.fetch_add(1, Ordering::Relaxed);
            }
            EventOutcome::Ignore(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.ignores.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        if matches!(
            event.action,
            Action::Set | Action::Update | Action::Incr | Action::Decr
        ) && matches!(outcome, EventOutcome::Ok(_))
        {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evictions are reported by the policy directly; they are not
    /// replayed as actions through the hook bus.
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.loads.store(0, Ordering::Relaxed);
        self.ignores.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.operations.lock().clear();
        self.started.store(now_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            ignores: self.ignores.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            operations: self
                .operations
                .lock()
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            started: self.started.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a cache's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Values committed by fallbacks.
    pub loads: u64,
    /// Values produced by fallbacks but not stored.
    pub ignores: u64,
    pub writes: u64,
    /// Entries removed by the size-bound policy.
    pub evictions: u64,
    /// Entries removed by TTL, lazily or by the Janitor.
    pub expirations: u64,
    /// Completed actions by name.
    pub operations: HashMap<String, u64>,
    /// Milliseconds since epoch when collection (re)started.
    pub started: u64,
}

impl StatsSnapshot {
    /// Hit rate over reads, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

struct StatsHook {
    counters: Arc<StatsCounters>,
}

impl<K: CacheKey, V: CacheValue> Hook<K, V> for StatsHook {
    fn on_event(
        &mut self,
        event: &CacheEvent<K, V>,
        outcome: Option<&EventOutcome<K, V>>,
    ) -> Option<EventOutcome<K, V>> {
        if let Some(outcome) = outcome {
            self.counters.record_event(event, outcome);
        }
        None
    }

    fn on_reset(&mut self) {
        self.counters.reset();
    }
}

/// Builds the async post-hook registration for a counter sink.
pub(crate) fn registration<K: CacheKey, V: CacheValue>(
    counters: Arc<StatsCounters>,
) -> HookRegistration<K, V> {
    HookRegistration::new(HookSpec::post(STATS_HOOK_NAME), Box::new(StatsHook { counters }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::events::EventArgs;

    type Event = CacheEvent<String, u32>;
    type Outcome = EventOutcome<String, u32>;

    fn get_event() -> Event {
        CacheEvent::new(Action::Get, EventArgs::Key("k".to_string()))
    }

    #[test]
    fn test_hits_misses_and_rate() {
        let counters = StatsCounters::new();
        let hit: Outcome = EventOutcome::Ok(OutcomeValue::Value(Some(1)));
        let miss: Outcome = EventOutcome::Missing;

        counters.record_event(&get_event(), &hit);
        counters.record_event(&get_event(), &hit);
        counters.record_event(&get_event(), &miss);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snapshot.operations.get("get"), Some(&3));
    }

    #[test]
    fn test_commit_counts_as_miss_and_load() {
        let counters = StatsCounters::new();
        let commit: Outcome = EventOutcome::Commit(7);
        counters.record_event(&get_event(), &commit);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.loads, 1);
        assert_eq!(snapshot.hits, 0);
    }

    #[test]
    fn test_purge_feeds_expirations() {
        let counters = StatsCounters::new();
        let purge: Event = CacheEvent::purge();
        let outcome: Outcome = EventOutcome::Ok(OutcomeValue::Count(4));
        counters.record_event(&purge, &outcome);

        assert_eq!(counters.snapshot().expirations, 4);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let counters = StatsCounters::new();
        counters.record_event(&get_event(), &EventOutcome::Missing);
        counters.record_evictions(9);
        counters.reset();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.evictions, 0);
        assert!(snapshot.operations.is_empty());
    }
}
