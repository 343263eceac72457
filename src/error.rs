//! Error types shared across the cache engine.

use std::fmt;

/// Error produced by cache configuration, resolution and actions.
///
/// The engine never panics across an action boundary; every failure
/// surfaces as one of these reasons. Faults raised inside transaction
/// bodies or config transformations are caught and carried in
/// [`CacheError::Faulted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No cache is registered under the requested name.
    NoCache(String),
    /// The application services have not been started.
    NotStarted,
    /// The cache name is empty or already registered.
    InvalidName,
    /// A configuration option failed validation.
    InvalidOption(&'static str),
    /// The invoked command is unknown or malformed.
    InvalidCommand,
    /// The expiration options failed validation.
    InvalidExpiration,
    /// The fallback options failed validation.
    InvalidFallback,
    /// A hook descriptor failed validation.
    InvalidHook,
    /// The limit options failed validation.
    InvalidLimit,
    /// A warmer descriptor failed validation.
    InvalidWarmer,
    /// A bulk-match specification was malformed.
    InvalidMatch,
    /// The Janitor is not running for this cache.
    JanitorDisabled,
    /// Statistics collection is not enabled for this cache.
    StatsDisabled,
    /// The key is locked by an in-flight transaction.
    Locked,
    /// The stored value cannot be treated as a number.
    NonNumericValue,
    /// A dump or load path could not be opened or decoded.
    UnreachableFile(String),
    /// A caught runtime fault from user-supplied code.
    Faulted(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NoCache(name) => write!(f, "no cache registered as '{}'", name),
            CacheError::NotStarted => write!(f, "application services not started"),
            CacheError::InvalidName => write!(f, "invalid or already registered cache name"),
            CacheError::InvalidOption(opt) => write!(f, "invalid option: {}", opt),
            CacheError::InvalidCommand => write!(f, "invalid command"),
            CacheError::InvalidExpiration => write!(f, "invalid expiration options"),
            CacheError::InvalidFallback => write!(f, "invalid fallback options"),
            CacheError::InvalidHook => write!(f, "invalid hook descriptor"),
            CacheError::InvalidLimit => write!(f, "invalid limit options"),
            CacheError::InvalidWarmer => write!(f, "invalid warmer descriptor"),
            CacheError::InvalidMatch => write!(f, "invalid match specification"),
            CacheError::JanitorDisabled => write!(f, "janitor is disabled for this cache"),
            CacheError::StatsDisabled => write!(f, "statistics are disabled for this cache"),
            CacheError::Locked => write!(f, "key is locked by a transaction"),
            CacheError::NonNumericValue => write!(f, "stored value is not numeric"),
            CacheError::UnreachableFile(msg) => write!(f, "unreachable file: {}", msg),
            CacheError::Faulted(msg) => write!(f, "caught runtime fault: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = CacheError::NoCache("sessions".to_string());
        assert!(err.to_string().contains("sessions"));

        let err = CacheError::UnreachableFile("permission denied".to_string());
        assert!(err.to_string().contains("permission denied"));
    }
}
