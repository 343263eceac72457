//! Startup pre-population.
//!
//! Warmers run once when a cache starts, producing pairs that are
//! written straight into the keyspace under the default TTL. A
//! blocking warmer completes before start returns; a non-blocking one
//! runs on a detached thread.

use std::sync::Arc;

use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

/// A startup routine producing initial cache contents.
pub trait Warmer<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Identifies the warmer in logs.
    fn name(&self) -> &str;

    /// Produces `(key, value, ttl)` triples to seed the cache with;
    /// `None` TTLs inherit the cache default.
    fn warm(&self) -> Result<Vec<(K, V, Option<std::time::Duration>)>, CacheError>;
}

/// A warmer plus its delivery mode.
pub struct WarmerSpec<K: CacheKey, V: CacheValue> {
    pub warmer: Arc<dyn Warmer<K, V>>,
    /// When true, cache start waits for this warmer to finish.
    pub blocking: bool,
}

impl<K: CacheKey, V: CacheValue> WarmerSpec<K, V> {
    pub fn blocking(warmer: impl Warmer<K, V> + 'static) -> Self {
        Self {
            warmer: Arc::new(warmer),
            blocking: true,
        }
    }

    pub fn background(warmer: impl Warmer<K, V> + 'static) -> Self {
        Self {
            warmer: Arc::new(warmer),
            blocking: false,
        }
    }
}

impl<K: CacheKey, V: CacheValue> Clone for WarmerSpec<K, V> {
    fn clone(&self) -> Self {
        Self {
            warmer: Arc::clone(&self.warmer),
            blocking: self.blocking,
        }
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for WarmerSpec<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmerSpec")
            .field("name", &self.warmer.name())
            .field("blocking", &self.blocking)
            .finish()
    }
}
