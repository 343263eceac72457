//! Cache entry record and wall-clock helpers.
//!
//! Every stored value is wrapped in an [`Entry`] carrying the write
//! timestamp and an optional TTL, both in milliseconds. Liveness is
//! always evaluated against an explicit `now` so that bulk operations
//! observe a single clock snapshot.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A stored cache record: key, write time, optional TTL and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    /// The key this entry is stored under.
    pub key: K,
    /// Milliseconds since epoch at last write.
    pub touched: u64,
    /// Time-to-live in milliseconds; `None` never expires.
    pub ttl: Option<u64>,
    /// The opaque payload.
    pub value: V,
}

impl<K, V> Entry<K, V> {
    /// Creates an entry touched now with an optional TTL.
    pub fn new(key: K, value: V, ttl: Option<Duration>) -> Self {
        Self {
            key,
            touched: now_millis(),
            ttl: ttl.map(|d| d.as_millis() as u64),
            value,
        }
    }

    /// An entry is live at `now` iff it has no TTL or the TTL window
    /// has not elapsed.
    pub fn is_live_at(&self, now: u64) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => self.touched + ttl > now,
        }
    }

    /// Inverse of [`Entry::is_live_at`].
    pub fn is_expired_at(&self, now: u64) -> bool {
        !self.is_live_at(now)
    }

    /// Remaining time before expiry at `now`; `None` when the entry
    /// has no TTL, zero when already expired.
    pub fn remaining_at(&self, now: u64) -> Option<Duration> {
        self.ttl.map(|ttl| {
            let expires = self.touched + ttl;
            Duration::from_millis(expires.saturating_sub(now))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = Entry::new("k", 1u32, None);
        assert!(entry.is_live_at(entry.touched));
        assert!(entry.is_live_at(entry.touched + u32::MAX as u64));
        assert_eq!(entry.remaining_at(entry.touched), None);
    }

    #[test]
    fn test_ttl_boundary_is_exclusive() {
        // Live strictly while touched + ttl > now; dead at the boundary.
        let entry = Entry::new("k", 1u32, Some(Duration::from_millis(50)));
        assert!(entry.is_live_at(entry.touched + 49));
        assert!(entry.is_expired_at(entry.touched + 50));
        assert!(entry.is_expired_at(entry.touched + 51));
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let entry = Entry::new("k", 1u32, Some(Duration::from_millis(10)));
        assert_eq!(
            entry.remaining_at(entry.touched + 4),
            Some(Duration::from_millis(6))
        );
        assert_eq!(
            entry.remaining_at(entry.touched + 500),
            Some(Duration::ZERO)
        );
    }
}
