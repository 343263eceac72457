//! Cache configuration records.
//!
//! A validated [`CacheConfig`] is the unit the Overseer registers and
//! swaps. It is read-mostly after start; every field that user code
//! can observe through a provision is carried here, while running
//! observers and workers are tracked by their owning services.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::command::Command;
use crate::cache::fallback::FallbackConfig;
use crate::cache::informant::HookSpec;
use crate::cache::warmer::WarmerSpec;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

/// TTL behavior of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationConfig {
    /// TTL applied to writes that do not specify one.
    pub default: Option<Duration>,
    /// Janitor wake interval; `None` disables the sweeper.
    pub interval: Option<Duration>,
    /// Purge dead entries on read (default true). When disabled,
    /// reads return dead entries until the Janitor claims them.
    pub lazy: bool,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            default: None,
            interval: Some(Duration::from_secs(3)),
            lazy: true,
        }
    }
}

impl ExpirationConfig {
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.default.map(|d| d.is_zero()).unwrap_or(false) {
            return Err(CacheError::InvalidExpiration);
        }
        if self.interval.map(|d| d.is_zero()).unwrap_or(false) {
            return Err(CacheError::InvalidExpiration);
        }
        Ok(())
    }
}

/// Eviction strategies the policy engine can install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// Evict by ascending write time, ties broken by key order.
    LeastRecentlyWritten,
}

/// Tuning knobs a policy receives alongside the size bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyOptions {
    /// Fraction of the bound at which the policy reacts.
    pub threshold: f64,
    /// Maximum deletions issued per reaction batch.
    pub batch_size: usize,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            batch_size: 500,
        }
    }
}

/// A size bound and the policy enforcing it.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitConfig {
    /// Upper bound on entry count, enforced with bounded overshoot.
    pub size: usize,
    pub policy: EvictionStrategy,
    /// Fraction of `size` reclaimed beyond the overshoot on each
    /// reaction.
    pub reclaim: f64,
    pub options: PolicyOptions,
}

impl LimitConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            policy: EvictionStrategy::LeastRecentlyWritten,
            reclaim: 0.1,
            options: PolicyOptions::default(),
        }
    }

    pub fn reclaim(mut self, reclaim: f64) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub fn options(mut self, options: PolicyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.size == 0 {
            return Err(CacheError::InvalidLimit);
        }
        if !(self.reclaim > 0.0 && self.reclaim <= 1.0) {
            return Err(CacheError::InvalidLimit);
        }
        if !(self.options.threshold > 0.0 && self.options.threshold <= 1.0) {
            return Err(CacheError::InvalidLimit);
        }
        if self.options.batch_size == 0 {
            return Err(CacheError::InvalidLimit);
        }
        Ok(())
    }
}

/// The full configuration record of a named cache.
pub struct CacheConfig<K: CacheKey, V: CacheValue> {
    pub name: String,
    pub expiration: ExpirationConfig,
    pub fallback: Option<FallbackConfig<K, V>>,
    /// Descriptors of every registered hook, policy and stats hooks
    /// included. Running observers are addressed by the Informant.
    pub hooks: Vec<HookSpec>,
    pub limit: Option<LimitConfig>,
    pub commands: HashMap<String, Command<V>>,
    /// Consult the lock table on every write. Promoted automatically
    /// by the first `transaction` call.
    pub transactional: bool,
    /// Install the statistics hook at start.
    pub record_stats: bool,
    pub warmers: Vec<WarmerSpec<K, V>>,
}

impl<K: CacheKey, V: CacheValue> CacheConfig<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration: ExpirationConfig::default(),
            fallback: None,
            hooks: Vec::new(),
            limit: None,
            commands: HashMap::new(),
            transactional: false,
            record_stats: false,
            warmers: Vec::new(),
        }
    }

    /// Validates every option record; detected before any service
    /// starts, so failures have no side effects.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(CacheError::InvalidName);
        }
        self.expiration.validate()?;
        if let Some(limit) = &self.limit {
            limit.validate()?;
        }
        for hook in &self.hooks {
            hook.validate()?;
        }
        if self.commands.keys().any(|name| name.is_empty()) {
            return Err(CacheError::InvalidCommand);
        }
        if self.warmers.iter().any(|w| w.warmer.name().is_empty()) {
            return Err(CacheError::InvalidWarmer);
        }
        Ok(())
    }
}

impl<K: CacheKey, V: CacheValue> Clone for CacheConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            expiration: self.expiration,
            fallback: self.fallback.clone(),
            hooks: self.hooks.clone(),
            limit: self.limit.clone(),
            commands: self.commands.clone(),
            transactional: self.transactional,
            record_stats: self.record_stats,
            warmers: self.warmers.clone(),
        }
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheConfig<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field("expiration", &self.expiration)
            .field("hooks", &self.hooks.len())
            .field("limit", &self.limit)
            .field("commands", &self.commands.len())
            .field("transactional", &self.transactional)
            .field("record_stats", &self.record_stats)
            .field("warmers", &self.warmers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Config = CacheConfig<String, u32>;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::new("users").validate().is_ok());
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(Config::new("").validate(), Err(CacheError::InvalidName));
        assert_eq!(
            Config::new("two words").validate(),
            Err(CacheError::InvalidName)
        );
    }

    #[test]
    fn test_expiration_validation() {
        let mut config = Config::new("c");
        config.expiration.default = Some(Duration::ZERO);
        assert_eq!(config.validate(), Err(CacheError::InvalidExpiration));

        let mut config = Config::new("c");
        config.expiration.interval = Some(Duration::ZERO);
        assert_eq!(config.validate(), Err(CacheError::InvalidExpiration));
    }

    #[test]
    fn test_limit_validation() {
        assert_eq!(
            LimitConfig::new(0).validate(),
            Err(CacheError::InvalidLimit)
        );
        assert_eq!(
            LimitConfig::new(10).reclaim(0.0).validate(),
            Err(CacheError::InvalidLimit)
        );
        assert_eq!(
            LimitConfig::new(10).reclaim(1.5).validate(),
            Err(CacheError::InvalidLimit)
        );
        assert!(LimitConfig::new(10).reclaim(1.0).validate().is_ok());
    }
}
