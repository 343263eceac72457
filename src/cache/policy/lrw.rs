//! Least-recently-written reference policy.
//!
//! LRW maintains no auxiliary index: it orders victims by the
//! `touched` timestamp already stored on every entry, ties broken by
//! key order. This trades precise LRU semantics for write throughput,
//! since the write timestamp is needed for TTL anyway.

use std::sync::Arc;

use crate::cache::actions::CacheCore;
use crate::cache::config::{CacheConfig, LimitConfig};
use crate::cache::events::{CacheEvent, EventOutcome};
use crate::cache::informant::{Hook, HookRegistration, HookSpec, Provision};
use crate::cache::{CacheKey, CacheValue};
use crate::stash::CacheRef;

/// Name under which the LRW hook registers with the Informant.
pub const LRW_HOOK_NAME: &str = "lrw_policy";

/// Builds the post-hook registration a limit installs at start.
pub(crate) fn registration<K: CacheKey, V: CacheValue>(
    limit: &LimitConfig,
) -> HookRegistration<K, V> {
    HookRegistration::new(
        HookSpec::post(LRW_HOOK_NAME).provide(Provision::Cache),
        Box::new(LrwHook {
            cache: None,
            limit: limit.clone(),
        }),
    )
}

/// The LRW observer: reacts to write-class actions once the keyspace
/// exceeds the configured bound.
struct LrwHook<K: CacheKey, V: CacheValue> {
    cache: Option<CacheRef<K, V>>,
    limit: LimitConfig,
}

impl<K: CacheKey, V: CacheValue> Hook<K, V> for LrwHook<K, V> {
    fn on_event(
        &mut self,
        event: &CacheEvent<K, V>,
        outcome: Option<&EventOutcome<K, V>>,
    ) -> Option<EventOutcome<K, V>> {
        if !event.action.may_grow() {
            return None;
        }
        if matches!(outcome, Some(EventOutcome::Error(_))) {
            return None;
        }
        if let Some(stash) = self.cache.as_ref().and_then(CacheRef::upgrade) {
            enforce(stash.core(), &self.limit);
        }
        None
    }

    fn on_provision(&mut self, cache: CacheRef<K, V>, config: Arc<CacheConfig<K, V>>) {
        self.cache = Some(cache);
        if let Some(limit) = &config.limit {
            self.limit = limit.clone();
        }
    }
}

/// Brings the keyspace back under the bound: purge dead entries
/// first, then delete the oldest live ones by `(touched, key)`.
fn enforce<K: CacheKey, V: CacheValue>(core: &CacheCore<K, V>, limit: &LimitConfig) {
    let trigger = (limit.size as f64 * limit.options.threshold).ceil() as usize;
    if core.table.len() <= trigger {
        return;
    }

    core.purge_dead();
    let size = core.table.len();
    if size <= limit.size {
        return;
    }

    let evicted = evict_oldest(core, limit, size);
    core.record_evictions(evicted);
    log::debug!(
        "lrw reaction evicted {} entries ({} over a bound of {})",
        evicted,
        size - limit.size,
        limit.size
    );
}

fn evict_oldest<K: CacheKey, V: CacheValue>(
    core: &CacheCore<K, V>,
    limit: &LimitConfig,
    size: usize,
) -> usize {
    let victims = victim_count(size, limit);
    let mut meta = core.table.select_meta();
    meta.sort();
    meta.truncate(victims);

    let mut evicted = 0;
    for batch in meta.chunks(limit.options.batch_size) {
        for (_, key) in batch {
            if core.table.delete(key) {
                evicted += 1;
            }
        }
    }
    evicted
}

/// Overshoot plus reclaim headroom: removing this many lands the
/// keyspace at `size - ceil(size × reclaim)` entries.
fn victim_count(current: usize, limit: &LimitConfig) -> usize {
    let headroom = (limit.size as f64 * limit.reclaim).ceil() as usize;
    current.saturating_sub(limit.size) + headroom
}
