//! Inspection targets.
//!
//! Diagnostic views over a running cache. Inspection reads raw state:
//! expired rows are reported, not purged, and record lookups bypass
//! lazy expiration deliberately.

use std::time::Duration;

use crate::cache::entry::Entry;
use crate::cache::expiration::JanitorRun;

/// What to inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspect<K> {
    /// Number of entries currently dead but not yet swept.
    ExpiredCount,
    /// Keys of entries currently dead but not yet swept.
    ExpiredKeys,
    /// Metadata of the last Janitor sweep; fails with
    /// `JanitorDisabled` when the sweeper is off.
    JanitorLast,
    /// Estimated total footprint in bytes.
    MemoryBytes,
    /// Estimated payload bytes only.
    MemoryBinary,
    /// Estimated footprint in machine words.
    MemoryWords,
    /// The raw stored record for a key, dead or alive.
    Record(K),
    /// A summary of the cache's services and counts.
    State,
}

/// A diagnostic answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inspection<K, V> {
    Count(usize),
    Keys(Vec<K>),
    /// `None` when the Janitor has not completed a sweep yet.
    Janitor(Option<JanitorRun>),
    Bytes(usize),
    Words(usize),
    Record(Option<Entry<K, V>>),
    State(CacheState),
}

/// Snapshot summary of a cache's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState {
    pub name: String,
    /// Raw entry count, dead rows included.
    pub entries: usize,
    /// Entries live at the snapshot instant.
    pub live: usize,
    pub transactional: bool,
    pub janitor_interval: Option<Duration>,
    /// Names of every registered hook.
    pub hooks: Vec<String>,
    /// Milliseconds since epoch when the cache started.
    pub started: u64,
}
