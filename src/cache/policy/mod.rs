//! Size-bound eviction policies.
//!
//! A policy is a small capability set: a strategy discriminant and
//! the hooks it installs into the post-hook chain. Policies observe
//! every write through those hooks and react when the size bound is
//! exceeded. Strategies are a closed set of tagged variants rather
//! than an open type hierarchy.

pub mod lrw;

use crate::cache::config::{EvictionStrategy, LimitConfig};
use crate::cache::informant::HookRegistration;
use crate::cache::{CacheKey, CacheValue};

/// Stable name of a strategy, used in logs and state inspection.
pub fn strategy_name(strategy: EvictionStrategy) -> &'static str {
    match strategy {
        EvictionStrategy::LeastRecentlyWritten => "lrw",
    }
}

/// Hooks a limit installs at cache start.
pub(crate) fn registrations_for<K: CacheKey, V: CacheValue>(
    limit: &LimitConfig,
) -> Vec<HookRegistration<K, V>> {
    match limit.policy {
        EvictionStrategy::LeastRecentlyWritten => vec![lrw::registration(limit)],
    }
}
