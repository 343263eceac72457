//! Convenient imports for cache users.

pub use crate::cache::{CacheKey, CacheValue, CounterValue};
pub use crate::error::CacheError;
pub use crate::stash::{ResetSpec, Stash, StashBuilder};

pub use crate::cache::command::Command;
pub use crate::cache::config::{ExpirationConfig, LimitConfig, PolicyOptions};
pub use crate::cache::events::Fetched;
pub use crate::cache::fallback::{FallbackConfig, FallbackDecision};
pub use crate::cache::informant::{Hook, HookSpec, Provision};
pub use crate::cache::warmer::Warmer;
pub use crate::telemetry::inspect::{Inspect, Inspection};

// Serde traits user key/value types need.
pub use serde::{Deserialize, Serialize};
