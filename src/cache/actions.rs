//! The action pipeline and the cache engine core.
//!
//! Every public operation follows one contract: resolve the config,
//! dispatch pre-hooks (which may short-circuit), execute the
//! operation against the keyspace — applying lazy expiration and the
//! write gate — then dispatch post-hooks with the tagged outcome.
//! [`CacheCore`] is the engine a facade handle points at; it owns the
//! keyspace, the lock table and the handles of every worker service.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::cache::command::Command;
use crate::cache::config::CacheConfig;
use crate::cache::entry::{now_millis, Entry};
use crate::cache::events::{CacheEvent, EventOutcome, Fetched, OutcomeKind, OutcomeValue};
use crate::cache::expiration::janitor::Janitor;
use crate::cache::expiration::{dead_at, JanitorRun};
use crate::cache::fallback::{
    panic_message, FallbackConfig, FallbackDecision, Flight, FlightOutcome, SingleFlight,
};
use crate::cache::informant::Informant;
use crate::cache::keyspace::KeyspaceTable;
use crate::cache::locksmith::queue::TransactionQueue;
use crate::cache::locksmith::{self, LockTable};
use crate::cache::overseer::CacheService;
use crate::cache::{CacheKey, CacheValue, CounterValue};
use crate::error::CacheError;
use crate::stash::Stash;
use crate::telemetry::inspect::{CacheState, Inspect, Inspection};
use crate::telemetry::stats::StatsCounters;

/// The engine behind a named cache.
pub(crate) struct CacheCore<K: CacheKey, V: CacheValue> {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) table: KeyspaceTable<K, V>,
    pub(crate) config: RwLock<Arc<CacheConfig<K, V>>>,
    pub(crate) informant: Informant<K, V>,
    pub(crate) locks: LockTable<K>,
    pub(crate) queue: OnceCell<TransactionQueue<K, V>>,
    pub(crate) janitor: Mutex<Option<Janitor>>,
    pub(crate) janitor_last: RwLock<Option<JanitorRun>>,
    pub(crate) single_flight: SingleFlight<K, V>,
    pub(crate) transactional: AtomicBool,
    pub(crate) stats: Option<Arc<StatsCounters>>,
    pub(crate) started_at: u64,
    pub(crate) weak_self: OnceCell<Weak<CacheCore<K, V>>>,
    stopped: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> CacheCore<K, V> {
    pub(crate) fn new(
        id: u64,
        config: CacheConfig<K, V>,
        informant: Informant<K, V>,
        stats: Option<Arc<StatsCounters>>,
    ) -> Self {
        let transactional = config.transactional;
        Self {
            id,
            name: config.name.clone(),
            table: KeyspaceTable::new(),
            config: RwLock::new(Arc::new(config)),
            informant,
            locks: LockTable::new(),
            queue: OnceCell::new(),
            janitor: Mutex::new(None),
            janitor_last: RwLock::new(None),
            single_flight: SingleFlight::new(),
            transactional: AtomicBool::new(transactional),
            stats,
            started_at: now_millis(),
            weak_self: OnceCell::new(),
            stopped: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    /// Builds the notification only when somebody is listening.
    pub(crate) fn event_if_active(
        &self,
        build: impl FnOnce() -> CacheEvent<K, V>,
    ) -> Option<Arc<CacheEvent<K, V>>> {
        if self.informant.is_active() {
            Some(Arc::new(build()))
        } else {
            None
        }
    }

    /// The uniform action contract: pre-hooks, operation, post-hooks.
    ///
    /// A pre-hook short-circuit whose shape matches `kind` replaces
    /// the operation entirely; a mismatched one is discarded.
    pub(crate) fn act(
        &self,
        event: Option<Arc<CacheEvent<K, V>>>,
        kind: OutcomeKind,
        op: impl FnOnce(&Self) -> EventOutcome<K, V>,
    ) -> EventOutcome<K, V> {
        if let Some(event) = &event {
            if let Some(short_circuit) = self.informant.broadcast_pre(event) {
                if short_circuit.matches(kind) {
                    self.informant.broadcast_post(event, &short_circuit);
                    return short_circuit;
                }
                log::warn!(
                    "discarding mismatched pre-hook short-circuit for {} on '{}'",
                    event.action.name(),
                    self.name
                );
            }
        }
        let outcome = op(self);
        if let Some(event) = &event {
            self.informant.broadcast_post(event, &outcome);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) fn current_config(&self) -> Arc<CacheConfig<K, V>> {
        Arc::clone(&self.config.read())
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.config.read().expiration.default
    }

    fn lazy(&self) -> bool {
        self.config.read().expiration.lazy
    }

    /// The write gate: consulted by every mutating action once the
    /// cache is transactional.
    fn gate(&self, key: &K) -> Result<(), CacheError> {
        if self.transactional.load(Ordering::Acquire) && !self.locks.write_allowed(self.id, key) {
            return Err(CacheError::Locked);
        }
        Ok(())
    }

    /// Looks up `key`, applying lazy expiration: a dead entry is
    /// removed, reported through the synthetic purge notification and
    /// treated as missing. With lazy disabled, dead entries remain
    /// visible until the Janitor claims them.
    pub(crate) fn live_lookup(&self, key: &K) -> Option<Entry<K, V>> {
        let entry = self.table.lookup(key)?;
        let now = now_millis();
        if entry.is_live_at(now) {
            return Some(entry);
        }
        if self.lazy() {
            if self.table.delete_dead(key, now) {
                self.notify_purge(1);
            }
            None
        } else {
            Some(entry)
        }
    }

    /// Emits the synthetic `purge` post-hook notification.
    pub(crate) fn notify_purge(&self, count: usize) {
        if count > 0 && self.informant.is_active() {
            let event = Arc::new(CacheEvent::purge());
            self.informant
                .broadcast_post(&event, &EventOutcome::Ok(OutcomeValue::Count(count)));
        }
    }

    /// Deletes every dead entry, notifying observers. Used by lazy
    /// callers that are not the purge action itself.
    pub(crate) fn purge_dead(&self) -> usize {
        let removed = self.table.match_delete(dead_at(now_millis()));
        self.notify_purge(removed);
        removed
    }

    /// One Janitor sweep: match-delete dead entries, record the run.
    pub(crate) fn sweep_expired(&self) -> JanitorRun {
        let started = now_millis();
        let clock = Instant::now();
        let count = self.table.match_delete(dead_at(started));
        let run = JanitorRun {
            count,
            duration: clock.elapsed(),
            started,
        };
        *self.janitor_last.write() = Some(run);
        self.notify_purge(count);
        run
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        if let Some(stats) = &self.stats {
            stats.record_evictions(count);
        }
    }

    fn queue(&self) -> Result<&TransactionQueue<K, V>, CacheError> {
        self.queue
            .get()
            .ok_or_else(|| CacheError::Faulted("transaction queue not initialized".to_string()))
    }

    fn self_arc(&self) -> Result<Arc<Self>, CacheError> {
        self.weak_self
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| CacheError::Faulted("cache stopped".to_string()))
    }

    /// Routes `work` through the transaction queue, or runs it inline
    /// when the current thread already is the queue (a nested call
    /// is serialized by construction).
    pub(crate) fn run_serialized<R: Send + 'static>(
        &self,
        keys: Vec<K>,
        work: impl FnOnce(&Stash<K, V>) -> R + Send + 'static,
    ) -> Result<R, CacheError> {
        if locksmith::on_queue(self.id) {
            let stash = Stash::from_core(self.self_arc()?);
            return catch_unwind(AssertUnwindSafe(|| work(&stash)))
                .map_err(|payload| CacheError::Faulted(panic_message(payload)));
        }
        self.queue()?.transaction(keys, work)
    }

    /// Like [`CacheCore::run_serialized`] but without key locks.
    pub(crate) fn run_exec<R: Send + 'static>(
        &self,
        work: impl FnOnce(&Stash<K, V>) -> R + Send + 'static,
    ) -> Result<R, CacheError> {
        if locksmith::on_queue(self.id) {
            let stash = Stash::from_core(self.self_arc()?);
            return catch_unwind(AssertUnwindSafe(|| work(&stash)))
                .map_err(|payload| CacheError::Faulted(panic_message(payload)));
        }
        self.queue()?.execute(work)
    }

    // ------------------------------------------------------------------
    // Operation bodies
    // ------------------------------------------------------------------

    /// Read with optional fallback population. Concurrent misses on
    /// one key collapse onto a single in-flight fallback.
    pub(crate) fn op_read_through(
        &self,
        key: &K,
        explicit: Option<&FallbackConfig<K, V>>,
    ) -> EventOutcome<K, V> {
        loop {
            if let Some(entry) = self.live_lookup(key) {
                return EventOutcome::Ok(OutcomeValue::Value(Some(entry.value)));
            }
            let fallback = match explicit {
                Some(fallback) => Some(fallback.clone()),
                None => self.config.read().fallback.clone(),
            };
            let Some(fallback) = fallback else {
                return EventOutcome::Missing;
            };
            match self.single_flight.lead_or_wait(key) {
                Flight::Leader => return self.lead_fallback(key, &fallback),
                Flight::Waiter(reply) => match reply.recv() {
                    Ok(FlightOutcome::Found(value)) => {
                        return EventOutcome::Ok(OutcomeValue::Value(Some(value)));
                    }
                    Ok(FlightOutcome::Committed(value)) => return EventOutcome::Commit(value),
                    Ok(FlightOutcome::Failed(error)) => return EventOutcome::Error(error),
                    // An ignore (or a vanished leader) sends each
                    // waiter back to run its own fallback.
                    Ok(FlightOutcome::Ignored) | Err(_) => continue,
                },
            }
        }
    }

    fn lead_fallback(&self, key: &K, fallback: &FallbackConfig<K, V>) -> EventOutcome<K, V> {
        // Another caller may have committed between the miss and the
        // slot claim.
        if let Some(entry) = self.live_lookup(key) {
            self.single_flight
                .complete(key, FlightOutcome::Found(entry.value.clone()));
            return EventOutcome::Ok(OutcomeValue::Value(Some(entry.value)));
        }
        match fallback.invoke(key) {
            FallbackDecision::Commit(value) => {
                if let Err(error) = self.gate(key) {
                    self.single_flight
                        .complete(key, FlightOutcome::Failed(error.clone()));
                    return EventOutcome::Error(error);
                }
                self.table
                    .insert(Entry::new(key.clone(), value.clone(), self.default_ttl()));
                self.single_flight
                    .complete(key, FlightOutcome::Committed(value.clone()));
                EventOutcome::Commit(value)
            }
            FallbackDecision::Ignore(value) => {
                self.single_flight.complete(key, FlightOutcome::Ignored);
                EventOutcome::Ignore(value)
            }
            FallbackDecision::Error(error) => {
                self.single_flight
                    .complete(key, FlightOutcome::Failed(error.clone()));
                EventOutcome::Error(error)
            }
        }
    }

    pub(crate) fn op_set(
        &self,
        key: K,
        value: V,
        ttl: Option<Option<Duration>>,
    ) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(&key) {
            return EventOutcome::Error(error);
        }
        // An unspecified TTL inherits the default; an explicit `None`
        // always means no expiration.
        let ttl = match ttl {
            None => self.default_ttl(),
            Some(explicit) => explicit,
        };
        self.table.insert(Entry::new(key, value, ttl));
        EventOutcome::Ok(OutcomeValue::Bool(true))
    }

    pub(crate) fn op_del(&self, key: &K) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        EventOutcome::Ok(OutcomeValue::Bool(self.table.delete(key)))
    }

    pub(crate) fn op_take(&self, key: &K) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        match self.table.take(key) {
            None => EventOutcome::Missing,
            Some(entry) if entry.is_live_at(now_millis()) => {
                EventOutcome::Ok(OutcomeValue::Value(Some(entry.value)))
            }
            Some(_) => {
                // The row was physically removed either way; observers
                // see it as an expiration, not a hit.
                self.notify_purge(1);
                EventOutcome::Missing
            }
        }
    }

    pub(crate) fn op_exists(&self, key: &K) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Bool(self.live_lookup(key).is_some()))
    }

    pub(crate) fn op_count(&self) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Count(self.table.count_live(now_millis())))
    }

    pub(crate) fn op_size(&self) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Count(self.table.len()))
    }

    pub(crate) fn op_keys(&self) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Keys(self.table.keys_live(now_millis())))
    }

    pub(crate) fn op_clear(&self) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Count(self.table.clear()))
    }

    pub(crate) fn op_empty(&self) -> EventOutcome<K, V> {
        EventOutcome::Ok(OutcomeValue::Bool(self.table.count_live(now_millis()) == 0))
    }

    pub(crate) fn op_incr(&self, key: K, amount: i64, initial: i64) -> EventOutcome<K, V>
    where
        V: CounterValue,
    {
        if let Err(error) = self.gate(&key) {
            return EventOutcome::Error(error);
        }
        // A dead row restarts the counter from `initial`.
        if self.lazy() && self.table.delete_dead(&key, now_millis()) {
            self.notify_purge(1);
        }
        let default_ttl = self.default_ttl();
        let seed_key = key.clone();
        let result = self.table.upsert(
            key,
            move || Entry::new(seed_key, V::from_int(initial), default_ttl),
            |entry| match entry.value.to_int() {
                None => Err(CacheError::NonNumericValue),
                Some(current) => {
                    let next = current + amount;
                    entry.value = V::from_int(next);
                    Ok(next)
                }
            },
        );
        match result {
            Ok(next) => EventOutcome::Ok(OutcomeValue::Int(next)),
            Err(error) => EventOutcome::Error(error),
        }
    }

    pub(crate) fn op_update(&self, key: &K, value: V) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        if self.live_lookup(key).is_none() {
            return EventOutcome::Ok(OutcomeValue::Bool(false));
        }
        // Replaces the value only; write time and TTL stand.
        let updated = self.table.update_fields(key, |entry| entry.value = value);
        EventOutcome::Ok(OutcomeValue::Bool(updated))
    }

    pub(crate) fn op_ttl(&self, key: &K) -> EventOutcome<K, V> {
        match self.live_lookup(key) {
            None => EventOutcome::Missing,
            Some(entry) => {
                EventOutcome::Ok(OutcomeValue::Duration(entry.remaining_at(now_millis())))
            }
        }
    }

    pub(crate) fn op_expire(&self, key: &K, ttl: Option<Duration>) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        if self.live_lookup(key).is_none() {
            return EventOutcome::Ok(OutcomeValue::Bool(false));
        }
        let now = now_millis();
        let updated = self.table.update_fields(key, |entry| {
            entry.touched = now;
            entry.ttl = ttl.map(|d| d.as_millis() as u64);
        });
        EventOutcome::Ok(OutcomeValue::Bool(updated))
    }

    pub(crate) fn op_expire_at(&self, key: &K, at: u64) -> EventOutcome<K, V> {
        let now = now_millis();
        if at <= now {
            // An instant in the past is an immediate removal.
            return self.op_del(key);
        }
        self.op_expire(key, Some(Duration::from_millis(at - now)))
    }

    pub(crate) fn op_persist(&self, key: &K) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        if self.live_lookup(key).is_none() {
            return EventOutcome::Ok(OutcomeValue::Bool(false));
        }
        let updated = self.table.update_fields(key, |entry| entry.ttl = None);
        EventOutcome::Ok(OutcomeValue::Bool(updated))
    }

    pub(crate) fn op_refresh(&self, key: &K) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        if self.live_lookup(key).is_none() {
            return EventOutcome::Ok(OutcomeValue::Bool(false));
        }
        // Restarts the TTL window from now.
        let now = now_millis();
        let updated = self.table.update_fields(key, |entry| entry.touched = now);
        EventOutcome::Ok(OutcomeValue::Bool(updated))
    }

    pub(crate) fn op_touch(&self, key: &K) -> EventOutcome<K, V> {
        if let Err(error) = self.gate(key) {
            return EventOutcome::Error(error);
        }
        if self.live_lookup(key).is_none() {
            return EventOutcome::Ok(OutcomeValue::Bool(false));
        }
        // Moves the write time forward while keeping the absolute
        // expiry point: the remaining TTL shrinks by the elapsed time.
        let now = now_millis();
        let updated = self.table.update_fields(key, |entry| {
            if let Some(ttl) = entry.ttl {
                let elapsed = now.saturating_sub(entry.touched);
                entry.ttl = Some(ttl.saturating_sub(elapsed));
            }
            entry.touched = now;
        });
        EventOutcome::Ok(OutcomeValue::Bool(updated))
    }

    pub(crate) fn op_purge(&self) -> EventOutcome<K, V> {
        // The purge action notifies through the pipeline itself, so
        // no synthetic notification here.
        let removed = self.table.match_delete(dead_at(now_millis()));
        EventOutcome::Ok(OutcomeValue::Count(removed))
    }

    pub(crate) fn op_dump(&self, path: &std::path::Path) -> EventOutcome<K, V> {
        let entries = self.table.select(|_, _| true);
        match crate::cache::persist::dump_entries(&entries, path) {
            Ok(written) => EventOutcome::Ok(OutcomeValue::Count(written)),
            Err(error) => EventOutcome::Error(error),
        }
    }

    pub(crate) fn op_load(&self, path: &std::path::Path, clear_first: bool) -> EventOutcome<K, V> {
        let entries: Vec<Entry<K, V>> = match crate::cache::persist::load_entries(path) {
            Ok(entries) => entries,
            Err(error) => return EventOutcome::Error(error),
        };
        if clear_first {
            self.table.clear();
        }
        let now = now_millis();
        let mut loaded = 0;
        for entry in entries {
            // Entries whose TTL elapsed since the dump stay dead.
            if entry.is_live_at(now) {
                self.table.insert(entry);
                loaded += 1;
            }
        }
        EventOutcome::Ok(OutcomeValue::Count(loaded))
    }

    pub(crate) fn op_invoke(&self, name: &str, key: &K) -> EventOutcome<K, V> {
        let command = match self.config.read().commands.get(name) {
            Some(command) => command.clone(),
            None => return EventOutcome::Error(CacheError::InvalidCommand),
        };
        match command {
            Command::Read(derive) => {
                let current = self.live_lookup(key).map(|entry| entry.value);
                EventOutcome::Ok(OutcomeValue::Value(derive(current.as_ref())))
            }
            Command::Write(apply) => {
                // Write commands run under the key's transaction slot.
                let target = key.clone();
                let result = self.run_serialized(vec![key.clone()], move |stash| {
                    stash.core().apply_write_command(&target, &apply)
                });
                match result {
                    Ok(outcome) => outcome,
                    Err(error) => EventOutcome::Error(error),
                }
            }
        }
    }

    fn apply_write_command(
        &self,
        key: &K,
        apply: &Arc<dyn Fn(Option<V>) -> (Option<V>, Option<V>) + Send + Sync>,
    ) -> EventOutcome<K, V> {
        let current = self.live_lookup(key).map(|entry| entry.value);
        let (result, replacement) = apply(current);
        match replacement {
            Some(value) => {
                self.table
                    .insert(Entry::new(key.clone(), value, self.default_ttl()));
            }
            None => {
                self.table.delete(key);
            }
        }
        EventOutcome::Ok(OutcomeValue::Value(result))
    }

    pub(crate) fn op_inspect(&self, target: Inspect<K>) -> Result<Inspection<K, V>, CacheError> {
        let now = now_millis();
        match target {
            Inspect::ExpiredCount => {
                Ok(Inspection::Count(self.table.select_keys(dead_at(now)).len()))
            }
            Inspect::ExpiredKeys => Ok(Inspection::Keys(self.table.select_keys(dead_at(now)))),
            Inspect::JanitorLast => {
                if self.config.read().expiration.interval.is_none() {
                    return Err(CacheError::JanitorDisabled);
                }
                Ok(Inspection::Janitor(*self.janitor_last.read()))
            }
            Inspect::MemoryBytes => Ok(Inspection::Bytes(self.table.size_bytes())),
            Inspect::MemoryBinary => Ok(Inspection::Bytes(self.table.payload_bytes())),
            Inspect::MemoryWords => Ok(Inspection::Words(
                self.table.size_bytes() / std::mem::size_of::<usize>(),
            )),
            // The raw record, dead or alive; diagnostics bypass lazy
            // expiration deliberately.
            Inspect::Record(key) => Ok(Inspection::Record(self.table.lookup(&key))),
            Inspect::State => {
                let config = self.current_config();
                Ok(Inspection::State(CacheState {
                    name: self.name.clone(),
                    entries: self.table.len(),
                    live: self.table.count_live(now),
                    transactional: self.transactional.load(Ordering::Acquire),
                    janitor_interval: config.expiration.interval,
                    hooks: config.hooks.iter().map(|h| h.name.clone()).collect(),
                    started: self.started_at,
                }))
            }
        }
    }

    /// Tears every worker down and joins them. Idempotent.
    pub(crate) fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(janitor) = self.janitor.lock().take() {
            janitor.stop();
        }
        if let Some(queue) = self.queue.get() {
            queue.shutdown();
        }
        self.informant.shutdown();
        log::debug!("cache '{}' stopped", self.name);
    }
}

impl<K: CacheKey, V: CacheValue> CacheService for CacheCore<K, V> {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn shutdown_service(&self) {
        self.shutdown();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheCore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCore")
            .field("name", &self.name)
            .field("entries", &self.table.len())
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------
// Outcome extraction
//
// The pipeline works in tagged-outcome space; these convert back to
// the typed action results. Shapes are guaranteed by the operation
// bodies and vetted for short-circuits, so a mismatch is a fault.
// ----------------------------------------------------------------------

fn shape_fault<T, K, V>(outcome: &EventOutcome<K, V>) -> Result<T, CacheError> {
    Err(CacheError::Faulted(format!(
        "unexpected outcome shape: {}",
        outcome.tag()
    )))
}

pub(crate) fn into_bool<K, V>(outcome: EventOutcome<K, V>) -> Result<bool, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Bool(value)) => Ok(value),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_count<K, V>(outcome: EventOutcome<K, V>) -> Result<usize, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Count(value)) => Ok(value),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_int<K, V>(outcome: EventOutcome<K, V>) -> Result<i64, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Int(value)) => Ok(value),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_keys<K, V>(outcome: EventOutcome<K, V>) -> Result<Vec<K>, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Keys(keys)) => Ok(keys),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_fetched<K, V>(outcome: EventOutcome<K, V>) -> Result<Fetched<V>, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Value(Some(value))) => Ok(Fetched::Ok(value)),
        EventOutcome::Ok(OutcomeValue::Value(None)) | EventOutcome::Missing => Ok(Fetched::Missing),
        EventOutcome::Commit(value) => Ok(Fetched::Commit(value)),
        EventOutcome::Ignore(value) => Ok(Fetched::Ignore(value)),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_value<K, V>(outcome: EventOutcome<K, V>) -> Result<Option<V>, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Value(value)) => Ok(value),
        EventOutcome::Missing => Ok(None),
        EventOutcome::Commit(value) | EventOutcome::Ignore(value) => Ok(Some(value)),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

pub(crate) fn into_ttl<K, V>(
    outcome: EventOutcome<K, V>,
) -> Result<Fetched<Option<Duration>>, CacheError> {
    match outcome {
        EventOutcome::Ok(OutcomeValue::Duration(remaining)) => Ok(Fetched::Ok(remaining)),
        EventOutcome::Missing => Ok(Fetched::Missing),
        EventOutcome::Error(error) => Err(error),
        other => shape_fault(&other),
    }
}

/// Next unique cache instance id; zero is reserved for "not a queue".
pub(crate) fn next_cache_id() -> u64 {
    use std::sync::atomic::AtomicU64;
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
