//! Public cache facade.
//!
//! [`Stash`] is a cheaply cloneable handle over the engine core; the
//! [`StashBuilder`] assembles a validated config, brings up the
//! worker services and registers the cache with the Overseer. Every
//! method on the handle is an action flowing through the hook
//! pipeline.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::cache::actions::{
    into_bool, into_count, into_fetched, into_int, into_keys, into_ttl, into_value, next_cache_id,
    CacheCore,
};
use crate::cache::command::Command;
use crate::cache::config::{CacheConfig, ExpirationConfig, LimitConfig};
use crate::cache::entry::Entry;
use crate::cache::events::{Action, CacheEvent, EventArgs, EventOutcome, Fetched, OutcomeKind, OutcomeValue};
use crate::cache::expiration::janitor::Janitor;
use crate::cache::fallback::{panic_message, FallbackConfig};
use crate::cache::informant::{Hook, HookRegistration, HookSpec, Informant};
use crate::cache::locksmith::queue::TransactionQueue;
use crate::cache::overseer::{self, CacheService};
use crate::cache::policy;
use crate::cache::warmer::{Warmer, WarmerSpec};
use crate::cache::{CacheKey, CacheValue, CounterValue};
use crate::error::CacheError;
use crate::telemetry::inspect::{Inspect, Inspection};
use crate::telemetry::stats::{self, StatsCounters, StatsSnapshot};

/// A handle to a running named cache.
///
/// Handles are cheap to clone and safe to share across threads; all
/// of them point at the same engine.
pub struct Stash<K: CacheKey, V: CacheValue> {
    core: Arc<CacheCore<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Clone for Stash<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for Stash<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stash").field("name", &self.core.name).finish()
    }
}

/// A non-owning reference to a cache, as handed to provisioned hooks.
///
/// Holding one never keeps a stopped cache alive; upgrade before use.
pub struct CacheRef<K: CacheKey, V: CacheValue> {
    inner: Weak<CacheCore<K, V>>,
}

impl<K: CacheKey, V: CacheValue> CacheRef<K, V> {
    pub fn upgrade(&self) -> Option<Stash<K, V>> {
        self.inner.upgrade().map(|core| Stash { core })
    }
}

impl<K: CacheKey, V: CacheValue> Clone for CacheRef<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheRef<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRef").finish_non_exhaustive()
    }
}

/// Which hooks a reset targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookReset {
    None,
    All,
    /// Every registered instance whose name matches resets.
    Named(Vec<String>),
}

/// What a `reset` action reinitializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSpec {
    pub entries: bool,
    pub hooks: HookReset,
}

impl ResetSpec {
    /// Entries and every hook.
    pub fn all() -> Self {
        Self {
            entries: true,
            hooks: HookReset::All,
        }
    }

    pub fn entries_only() -> Self {
        Self {
            entries: true,
            hooks: HookReset::None,
        }
    }

    pub fn hooks_only() -> Self {
        Self {
            entries: false,
            hooks: HookReset::All,
        }
    }

    pub fn hooks_named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: false,
            hooks: HookReset::Named(names.into_iter().map(Into::into).collect()),
        }
    }
}

/// Assembles and starts a cache.
pub struct StashBuilder<K: CacheKey, V: CacheValue> {
    config: CacheConfig<K, V>,
    hooks: Vec<HookRegistration<K, V>>,
}

impl<K: CacheKey, V: CacheValue> StashBuilder<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: CacheConfig::new(name),
            hooks: Vec::new(),
        }
    }

    /// TTL applied to writes that do not specify one.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.expiration.default = Some(ttl);
        self
    }

    /// Janitor wake interval.
    pub fn janitor_interval(mut self, interval: Duration) -> Self {
        self.config.expiration.interval = Some(interval);
        self
    }

    /// Disables the periodic sweeper entirely.
    pub fn no_janitor(mut self) -> Self {
        self.config.expiration.interval = None;
        self
    }

    /// Toggles purge-on-read.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.config.expiration.lazy = lazy;
        self
    }

    pub fn expiration(mut self, expiration: ExpirationConfig) -> Self {
        self.config.expiration = expiration;
        self
    }

    /// Size bound enforced by the configured policy.
    pub fn limit(mut self, limit: LimitConfig) -> Self {
        self.config.limit = Some(limit);
        self
    }

    /// Fallback consulted by read-through actions on a miss.
    pub fn fallback(mut self, fallback: FallbackConfig<K, V>) -> Self {
        self.config.fallback = Some(fallback);
        self
    }

    /// Registers an observer hook.
    pub fn hook(mut self, spec: HookSpec, hook: impl Hook<K, V> + 'static) -> Self {
        self.hooks.push(HookRegistration::new(spec, Box::new(hook)));
        self
    }

    /// Registers a named command for `invoke`.
    pub fn command(mut self, name: impl Into<String>, command: Command<V>) -> Self {
        self.config.commands.insert(name.into(), command);
        self
    }

    /// Registers a startup warmer.
    pub fn warmer(mut self, warmer: impl Warmer<K, V> + 'static) -> Self {
        self.config.warmers.push(WarmerSpec::blocking(warmer));
        self
    }

    /// Registers a warmer that seeds the cache on a background
    /// thread after start returns.
    pub fn background_warmer(mut self, warmer: impl Warmer<K, V> + 'static) -> Self {
        self.config.warmers.push(WarmerSpec::background(warmer));
        self
    }

    /// Consult the lock table on every write from the start, instead
    /// of waiting for the first transaction to promote the cache.
    pub fn transactional(mut self) -> Self {
        self.config.transactional = true;
        self
    }

    /// Installs the statistics hook.
    pub fn record_stats(mut self) -> Self {
        self.config.record_stats = true;
        self
    }

    /// Validates the config, brings up the worker services, registers
    /// the cache and runs its warmers.
    pub fn start(mut self) -> Result<Stash<K, V>, CacheError> {
        let app = overseer::app()?;
        // Fail before any service spawns; registration re-checks, so
        // a racing start still loses cleanly there.
        if app.contains(&self.config.name) {
            return Err(CacheError::InvalidName);
        }

        let mut registrations = std::mem::take(&mut self.hooks);
        let counters = if self.config.record_stats {
            let counters = Arc::new(StatsCounters::new());
            registrations.push(stats::registration(Arc::clone(&counters)));
            Some(counters)
        } else {
            None
        };
        if let Some(limit) = &self.config.limit {
            registrations.extend(policy::registrations_for(limit));
        }
        self.config.hooks = registrations.iter().map(|r| r.spec.clone()).collect();
        self.config.validate()?;

        let id = next_cache_id();
        let name = self.config.name.clone();
        let interval = self.config.expiration.interval;
        let warmers = self.config.warmers.clone();

        let informant = Informant::start(&name, registrations)?;
        let core = Arc::new(CacheCore::new(id, self.config, informant, counters));
        let _ = core.weak_self.set(Arc::downgrade(&core));

        match TransactionQueue::spawn(id, &name, Arc::downgrade(&core)) {
            Ok(queue) => {
                let _ = core.queue.set(queue);
            }
            Err(error) => {
                core.shutdown();
                return Err(error);
            }
        }

        if let Err(error) = app.register(Arc::clone(&core) as Arc<dyn CacheService>) {
            core.shutdown();
            return Err(error);
        }

        if let Some(interval) = interval {
            match Janitor::spawn(&name, interval, Arc::downgrade(&core)) {
                Ok(janitor) => *core.janitor.lock() = Some(janitor),
                Err(error) => {
                    app.deregister(&name);
                    core.shutdown();
                    return Err(error);
                }
            }
        }

        let stash = Stash { core };
        stash.provision_hooks(stash.core.current_config());
        stash.run_warmers(&warmers);
        log::debug!("cache '{}' started", name);
        Ok(stash)
    }
}

impl<K: CacheKey, V: CacheValue> Stash<K, V> {
    /// Starts building a cache under `name`.
    pub fn builder(name: impl Into<String>) -> StashBuilder<K, V> {
        StashBuilder::new(name)
    }

    /// Resolves a running cache from the process-wide directory.
    pub fn lookup(name: &str) -> Result<Self, CacheError> {
        let core = overseer::lookup_core::<K, V>(name)?;
        Ok(Self { core })
    }

    /// Returns the registered cache, or builds and starts one.
    pub fn ensure(
        name: &str,
        build: impl FnOnce(StashBuilder<K, V>) -> StashBuilder<K, V>,
    ) -> Result<Self, CacheError> {
        match Self::lookup(name) {
            Ok(stash) => Ok(stash),
            Err(CacheError::NoCache(_)) => build(Self::builder(name)).start(),
            Err(error) => Err(error),
        }
    }

    pub(crate) fn from_core(core: Arc<CacheCore<K, V>>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &CacheCore<K, V> {
        &self.core
    }

    fn cache_ref(&self) -> CacheRef<K, V> {
        CacheRef {
            inner: Arc::downgrade(&self.core),
        }
    }

    pub(crate) fn provision_hooks(&self, config: Arc<CacheConfig<K, V>>) {
        self.core.informant.provision_all(self.cache_ref(), config);
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The current configuration record.
    pub fn config(&self) -> Arc<CacheConfig<K, V>> {
        self.core.current_config()
    }

    // ------------------------------------------------------------------
    // Read actions
    // ------------------------------------------------------------------

    /// Reads `key`, consulting the configured fallback on a miss.
    pub fn get(&self, key: &K) -> Result<Fetched<V>, CacheError> {
        self.read_through(Action::Get, key, None)
    }

    /// Reads `key` like [`Stash::get`]; kept distinct so observers
    /// can tell read-through intent apart.
    pub fn fetch(&self, key: &K) -> Result<Fetched<V>, CacheError> {
        self.read_through(Action::Fetch, key, None)
    }

    /// Reads `key`, overriding the configured fallback.
    pub fn fetch_with(
        &self,
        key: &K,
        fallback: FallbackConfig<K, V>,
    ) -> Result<Fetched<V>, CacheError> {
        self.read_through(Action::Fetch, key, Some(fallback))
    }

    fn read_through(
        &self,
        action: Action,
        key: &K,
        fallback: Option<FallbackConfig<K, V>>,
    ) -> Result<Fetched<V>, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(action, EventArgs::Key(key.clone())));
        let outcome = self.core.act(event, OutcomeKind::Value, |core| {
            core.op_read_through(key, fallback.as_ref())
        });
        into_fetched(outcome)
    }

    pub fn exists(&self, key: &K) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Exists, EventArgs::Key(key.clone())));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_exists(key)))
    }

    /// Entries live right now.
    pub fn count(&self) -> Result<usize, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Count, EventArgs::None));
        into_count(self.core.act(event, OutcomeKind::Count, |core| core.op_count()))
    }

    /// Raw entry count, expired rows included.
    pub fn size(&self) -> Result<usize, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Size, EventArgs::None));
        into_count(self.core.act(event, OutcomeKind::Count, |core| core.op_size()))
    }

    pub fn keys(&self) -> Result<Vec<K>, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Keys, EventArgs::None));
        into_keys(self.core.act(event, OutcomeKind::Keys, |core| core.op_keys()))
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Empty, EventArgs::None));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_empty()))
    }

    /// Remaining TTL of `key`: `Ok(None)` for an entry without one.
    pub fn ttl(&self, key: &K) -> Result<Fetched<Option<Duration>>, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Ttl, EventArgs::Key(key.clone())));
        into_ttl(self.core.act(event, OutcomeKind::Duration, |core| core.op_ttl(key)))
    }

    // ------------------------------------------------------------------
    // Write actions
    // ------------------------------------------------------------------

    /// Writes `key`, inheriting the default TTL.
    pub fn set(&self, key: K, value: V) -> Result<bool, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Set, EventArgs::KeyValue(key.clone(), value.clone(), None))
        });
        into_bool(
            self.core
                .act(event, OutcomeKind::Bool, |core| core.op_set(key, value, None)),
        )
    }

    /// Writes `key` with an explicit TTL; `None` means no expiration
    /// regardless of the default.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(
                Action::Set,
                EventArgs::KeyValue(key.clone(), value.clone(), ttl),
            )
        });
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| {
            core.op_set(key, value, Some(ttl))
        }))
    }

    /// Removes `key`; true iff an entry was removed.
    pub fn del(&self, key: &K) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Del, EventArgs::Key(key.clone())));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_del(key)))
    }

    /// Atomic get-and-delete.
    pub fn take(&self, key: &K) -> Result<Option<V>, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Take, EventArgs::Key(key.clone())));
        into_value(self.core.act(event, OutcomeKind::Value, |core| core.op_take(key)))
    }

    /// Replaces the value of a live entry, leaving its write time and
    /// TTL untouched.
    pub fn update(&self, key: &K, value: V) -> Result<bool, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(
                Action::Update,
                EventArgs::KeyValue(key.clone(), value.clone(), None),
            )
        });
        into_bool(
            self.core
                .act(event, OutcomeKind::Bool, |core| core.op_update(key, value)),
        )
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Clear, EventArgs::None));
        into_count(self.core.act(event, OutcomeKind::Count, |core| core.op_clear()))
    }

    // ------------------------------------------------------------------
    // Expiration actions
    // ------------------------------------------------------------------

    /// Restarts the TTL window of a live entry at `ttl` from now.
    pub fn expire(&self, key: &K, ttl: Duration) -> Result<bool, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Expire, EventArgs::KeyTtl(key.clone(), Some(ttl)))
        });
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| {
            core.op_expire(key, Some(ttl))
        }))
    }

    /// Expires `key` at an absolute instant (milliseconds since
    /// epoch); instants in the past remove the entry immediately.
    pub fn expire_at(&self, key: &K, at_millis: u64) -> Result<bool, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::ExpireAt, EventArgs::KeyAt(key.clone(), at_millis))
        });
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| {
            core.op_expire_at(key, at_millis)
        }))
    }

    /// Removes the TTL of a live entry.
    pub fn persist(&self, key: &K) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Persist, EventArgs::Key(key.clone())));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_persist(key)))
    }

    /// Restarts the TTL countdown of a live entry.
    pub fn refresh(&self, key: &K) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Refresh, EventArgs::Key(key.clone())));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_refresh(key)))
    }

    /// Moves the write time of a live entry forward without moving
    /// its expiry point.
    pub fn touch(&self, key: &K) -> Result<bool, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Touch, EventArgs::Key(key.clone())));
        into_bool(self.core.act(event, OutcomeKind::Bool, |core| core.op_touch(key)))
    }

    /// Removes every expired entry now.
    pub fn purge(&self) -> Result<usize, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Purge, EventArgs::None));
        into_count(self.core.act(event, OutcomeKind::Count, |core| core.op_purge()))
    }

    // ------------------------------------------------------------------
    // Coordination actions
    // ------------------------------------------------------------------

    /// Runs `work` with `keys` locked, serialized on the cache's
    /// transaction queue. The first call promotes the cache to
    /// transactional. Faults inside `work` are caught and returned.
    pub fn transaction<R, F>(&self, keys: &[K], work: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Stash<K, V>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.core.transactional.store(true, Ordering::Release);
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Transaction, EventArgs::Keys(keys.to_vec())));
        let keys = keys.to_vec();
        let mut result: Option<Result<R, CacheError>> = None;
        let outcome = self.core.act(event, OutcomeKind::Opaque, |core| {
            let run = core.run_serialized(keys, work);
            let outcome = match &run {
                Ok(_) => EventOutcome::Ok(OutcomeValue::Unit),
                Err(error) => EventOutcome::Error(error.clone()),
            };
            result = Some(run);
            outcome
        });
        finish_opaque(result, outcome)
    }

    /// Runs `work` on the transaction queue without taking locks.
    pub fn execute<R, F>(&self, work: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Stash<K, V>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Execute, EventArgs::None));
        let mut result: Option<Result<R, CacheError>> = None;
        let outcome = self.core.act(event, OutcomeKind::Opaque, |core| {
            let run = core.run_exec(work);
            let outcome = match &run {
                Ok(_) => EventOutcome::Ok(OutcomeValue::Unit),
                Err(error) => EventOutcome::Error(error.clone()),
            };
            result = Some(run);
            outcome
        });
        finish_opaque(result, outcome)
    }

    /// Invokes a registered command against `key`.
    pub fn invoke(&self, command: &str, key: &K) -> Result<Option<V>, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(
                Action::Invoke,
                EventArgs::Command(command.to_string(), key.clone()),
            )
        });
        into_value(self.core.act(event, OutcomeKind::Value, |core| {
            core.op_invoke(command, key)
        }))
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Reinitializes entries and/or hooks. Emits no notifications.
    pub fn reset(&self, spec: ResetSpec) -> Result<bool, CacheError> {
        if spec.entries {
            self.core.table.clear();
        }
        match &spec.hooks {
            HookReset::None => {}
            HookReset::All => self.core.informant.reset(None),
            HookReset::Named(names) => self.core.informant.reset(Some(names)),
        }
        Ok(true)
    }

    /// Answers a diagnostic question about the cache.
    pub fn inspect(&self, target: Inspect<K>) -> Result<Inspection<K, V>, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Inspect, EventArgs::None));
        let mut result: Option<Result<Inspection<K, V>, CacheError>> = None;
        let outcome = self.core.act(event, OutcomeKind::Opaque, |core| {
            let run = core.op_inspect(target);
            let outcome = match &run {
                Ok(_) => EventOutcome::Ok(OutcomeValue::Unit),
                Err(error) => EventOutcome::Error(error.clone()),
            };
            result = Some(run);
            outcome
        });
        finish_opaque(result, outcome)
    }

    /// Snapshot of the statistics counters; fails with
    /// `StatsDisabled` unless the cache records stats.
    pub fn stats(&self) -> Result<StatsSnapshot, CacheError> {
        let event = self
            .core
            .event_if_active(|| CacheEvent::new(Action::Stats, EventArgs::None));
        let mut result: Option<Result<StatsSnapshot, CacheError>> = None;
        let outcome = self.core.act(event, OutcomeKind::Opaque, |core| {
            let run = core
                .stats
                .as_ref()
                .map(|counters| counters.snapshot())
                .ok_or(CacheError::StatsDisabled);
            let outcome = match &run {
                Ok(_) => EventOutcome::Ok(OutcomeValue::Unit),
                Err(error) => EventOutcome::Error(error.clone()),
            };
            result = Some(run);
            outcome
        });
        finish_opaque(result, outcome)
    }

    /// Writes a framed snapshot of the whole keyspace to `path`.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref();
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Dump, EventArgs::Path(path.display().to_string()))
        });
        into_count(self.core.act(event, OutcomeKind::Count, |core| core.op_dump(path)))
    }

    /// Loads a snapshot additively, skipping entries already dead.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        self.load_inner(path.as_ref(), false)
    }

    /// Loads a snapshot after clearing the keyspace.
    pub fn load_clear(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        self.load_inner(path.as_ref(), true)
    }

    fn load_inner(&self, path: &Path, clear_first: bool) -> Result<usize, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Load, EventArgs::Path(path.display().to_string()))
        });
        into_count(self.core.act(event, OutcomeKind::Count, |core| {
            core.op_load(path, clear_first)
        }))
    }

    /// Rewrites the configuration under the Overseer's per-name
    /// serializer. A fault inside `transform` leaves the prior config
    /// intact; on success every provisioned hook receives the new
    /// config.
    pub fn update_config<F>(&self, transform: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut CacheConfig<K, V>),
    {
        let app = overseer::app()?;
        let guard = app.update_guard(&self.core.name);
        let _serialized = guard.lock();

        let current = self.core.current_config();
        let mut next = (*current).clone();
        match catch_unwind(AssertUnwindSafe(move || {
            transform(&mut next);
            next
        })) {
            Ok(next) => {
                let next = Arc::new(next);
                *self.core.config.write() = Arc::clone(&next);
                self.provision_hooks(next);
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload);
                log::warn!(
                    "config update for '{}' faulted, prior config kept: {}",
                    self.core.name,
                    message
                );
                Err(CacheError::Faulted(message))
            }
        }
    }

    /// Deregisters the cache and stops its services.
    pub fn stop(self) -> Result<(), CacheError> {
        let app = overseer::app()?;
        app.deregister(&self.core.name);
        self.core.shutdown();
        Ok(())
    }

    /// The raw stored record for a key; diagnostics only.
    pub fn entry(&self, key: &K) -> Option<Entry<K, V>> {
        self.core.table.lookup(key)
    }

    fn run_warmers(&self, warmers: &[WarmerSpec<K, V>]) {
        for spec in warmers {
            if spec.blocking {
                self.apply_warmer(spec.warmer.as_ref());
            } else {
                let warmer = Arc::clone(&spec.warmer);
                let cache = self.clone();
                let thread_name = format!("stash-{}-warmer-{}", self.core.name, warmer.name());
                let spawned = std::thread::Builder::new()
                    .name(thread_name)
                    .spawn(move || cache.apply_warmer(warmer.as_ref()));
                if let Err(error) = spawned {
                    log::warn!(
                        "failed to spawn warmer '{}' for '{}': {}",
                        spec.warmer.name(),
                        self.core.name,
                        error
                    );
                }
            }
        }
    }

    fn apply_warmer(&self, warmer: &dyn Warmer<K, V>) {
        match warmer.warm() {
            Ok(seeds) => {
                let default_ttl = self.core.current_config().expiration.default;
                let count = seeds.len();
                for (key, value, ttl) in seeds {
                    let ttl = ttl.or(default_ttl);
                    self.core.table.insert(Entry::new(key, value, ttl));
                }
                log::debug!(
                    "warmer '{}' seeded {} entries into '{}'",
                    warmer.name(),
                    count,
                    self.core.name
                );
            }
            Err(error) => {
                log::warn!(
                    "warmer '{}' failed for '{}': {}",
                    warmer.name(),
                    self.core.name,
                    error
                );
            }
        }
    }
}

impl<K: CacheKey, V: CounterValue> Stash<K, V> {
    /// Adds `amount` to the counter at `key`, seeding missing (or
    /// expired) entries with `initial` first.
    pub fn incr(&self, key: K, amount: i64, initial: i64) -> Result<i64, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Incr, EventArgs::KeyCounter(key.clone(), amount, initial))
        });
        into_int(self.core.act(event, OutcomeKind::Int, |core| {
            core.op_incr(key, amount, initial)
        }))
    }

    /// Subtracts `amount` from the counter at `key`.
    pub fn decr(&self, key: K, amount: i64, initial: i64) -> Result<i64, CacheError> {
        let event = self.core.event_if_active(|| {
            CacheEvent::new(Action::Decr, EventArgs::KeyCounter(key.clone(), -amount, initial))
        });
        into_int(self.core.act(event, OutcomeKind::Int, |core| {
            core.op_incr(key, -amount, initial)
        }))
    }
}

/// Resolves an opaque-result action: the captured typed result wins;
/// a short-circuit can only surface as an error.
fn finish_opaque<R, K, V>(
    result: Option<Result<R, CacheError>>,
    outcome: EventOutcome<K, V>,
) -> Result<R, CacheError> {
    match result {
        Some(run) => run,
        None => match outcome {
            EventOutcome::Error(error) => Err(error),
            _ => Err(CacheError::Faulted(
                "action short-circuited without a result".to_string(),
            )),
        },
    }
}
