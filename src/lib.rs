//! Stash - embeddable in-process key/value cache
//!
//! A concurrent TTL cache with coordinated semantics: per-entry
//! expiration (lazy purge-on-read plus a periodic Janitor sweeper),
//! policy-driven size bounds, transactional multi-key operations
//! serialized on a per-cache queue, pre/post observer hooks around
//! every action, and fallback-driven population on read misses.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use stash::{Stash, Fetched};
//!
//! stash::start();
//!
//! let cache: Stash<String, String> = Stash::builder("sessions")
//!     .default_ttl(Duration::from_secs(60))
//!     .start()
//!     .expect("cache starts");
//!
//! cache.set("user:1".to_string(), "anna".to_string()).unwrap();
//! assert_eq!(
//!     cache.get(&"user:1".to_string()).unwrap(),
//!     Fetched::Ok("anna".to_string())
//! );
//! ```
//!
//! Caches are registered process-wide by name; call [`start`] once at
//! application startup and [`stop`] at teardown.

pub mod cache;
pub mod prelude;
pub mod telemetry;

mod error;
mod stash;

pub use cache::command::Command;
pub use cache::config::{CacheConfig, EvictionStrategy, ExpirationConfig, LimitConfig, PolicyOptions};
pub use cache::entry::Entry;
pub use cache::events::{Action, CacheEvent, EventArgs, EventOutcome, Fetched, OutcomeValue};
pub use cache::expiration::JanitorRun;
pub use cache::fallback::{FallbackConfig, FallbackDecision, FallbackState};
pub use cache::informant::{DeliveryMode, Hook, HookKind, HookSpec, Provision};
pub use cache::overseer::{is_started, start, stop};
pub use cache::warmer::{Warmer, WarmerSpec};
pub use cache::{CacheKey, CacheValue, CounterValue};
pub use error::CacheError;
pub use stash::{CacheRef, HookReset, ResetSpec, Stash, StashBuilder};
pub use telemetry::inspect::{CacheState, Inspect, Inspection};
pub use telemetry::stats::{StatsCounters, StatsSnapshot};
