//! Read-through fallback runtime.
//!
//! On a miss under `get`/`fetch` the configured fallback produces a
//! value; a commit decision stores it under the default TTL, an
//! ignore decision hands it back without storing. Concurrent misses
//! on one key are collapsed to a single in-flight invocation.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

/// Opaque state handed to stateful fallbacks (`provide`).
pub type FallbackState = Arc<dyn Any + Send + Sync>;

/// What a fallback decided for a missing key.
///
/// By convention fallbacks that simply produce a value return
/// [`FallbackDecision::Commit`]; ignore is the opt-out for values
/// that should be handed back without being stored.
#[derive(Debug, Clone)]
pub enum FallbackDecision<V> {
    /// Store the value under the default TTL and report `commit`.
    Commit(V),
    /// Hand the value back without storing, reported as `ignore`.
    Ignore(V),
    /// Propagate a tagged failure.
    Error(CacheError),
}

enum FallbackAction<K, V> {
    Plain(Arc<dyn Fn(&K) -> FallbackDecision<V> + Send + Sync>),
    Stateful(Arc<dyn Fn(&K, &FallbackState) -> FallbackDecision<V> + Send + Sync>),
}

impl<K, V> Clone for FallbackAction<K, V> {
    fn clone(&self) -> Self {
        match self {
            FallbackAction::Plain(f) => FallbackAction::Plain(Arc::clone(f)),
            FallbackAction::Stateful(f) => FallbackAction::Stateful(Arc::clone(f)),
        }
    }
}

/// A configured fallback: the populate function plus its provided
/// state, if any.
pub struct FallbackConfig<K, V> {
    action: FallbackAction<K, V>,
    provide: FallbackState,
}

impl<K, V> Clone for FallbackConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            provide: Arc::clone(&self.provide),
        }
    }
}

impl<K, V> std::fmt::Debug for FallbackConfig<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arity = match self.action {
            FallbackAction::Plain(_) => "plain",
            FallbackAction::Stateful(_) => "stateful",
        };
        f.debug_struct("FallbackConfig").field("action", &arity).finish()
    }
}

impl<K: CacheKey, V: CacheValue> FallbackConfig<K, V> {
    /// A fallback taking only the missing key.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&K) -> FallbackDecision<V> + Send + Sync + 'static,
    {
        Self {
            action: FallbackAction::Plain(Arc::new(action)),
            provide: Arc::new(()),
        }
    }

    /// A fallback taking the missing key and the provided state.
    pub fn with_state<F, S>(action: F, provide: S) -> Self
    where
        F: Fn(&K, &FallbackState) -> FallbackDecision<V> + Send + Sync + 'static,
        S: Any + Send + Sync,
    {
        Self {
            action: FallbackAction::Stateful(Arc::new(action)),
            provide: Arc::new(provide),
        }
    }

    /// Runs the fallback for `key`. Panics inside user code are
    /// caught and normalized to a `Faulted` error.
    pub fn invoke(&self, key: &K) -> FallbackDecision<V> {
        let run = || match &self.action {
            FallbackAction::Plain(f) => f(key),
            FallbackAction::Stateful(f) => f(key, &self.provide),
        };
        match catch_unwind(AssertUnwindSafe(run)) {
            Ok(decision) => decision,
            Err(payload) => FallbackDecision::Error(CacheError::Faulted(panic_message(payload))),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unnamed panic".to_string()
    }
}

/// Result broadcast from the in-flight leader to its waiters.
#[derive(Debug, Clone)]
pub(crate) enum FlightOutcome<V> {
    /// The value was already present when the leader re-checked.
    Found(V),
    /// The leader's fallback committed this value.
    Committed(V),
    /// The leader's fallback ignored; waiters run their own.
    Ignored,
    /// The leader's fallback failed.
    Failed(CacheError),
}

/// Role assigned to a caller arriving at a missing key.
pub(crate) enum Flight<V> {
    Leader,
    Waiter(Receiver<FlightOutcome<V>>),
}

/// Per-key in-flight slots guaranteeing at most one running fallback
/// per key. The first miss leads; later misses wait on a reply
/// channel until the leader completes the slot.
#[derive(Debug)]
pub(crate) struct SingleFlight<K: CacheKey, V> {
    inflight: DashMap<K, Vec<Sender<FlightOutcome<V>>>>,
}

impl<K: CacheKey, V: CacheValue> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self { inflight: DashMap::new() }
    }

    /// Claims the slot for `key`, or enrolls as a waiter when it is
    /// already claimed.
    pub fn lead_or_wait(&self, key: &K) -> Flight<V> {
        match self.inflight.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let (tx, rx) = bounded(1);
                occupied.get_mut().push(tx);
                Flight::Waiter(rx)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Vec::new());
                Flight::Leader
            }
        }
    }

    /// Releases the slot for `key`, waking every waiter with the
    /// leader's outcome.
    pub fn complete(&self, key: &K, outcome: FlightOutcome<V>) {
        if let Some((_, waiters)) = self.inflight.remove(key) {
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}
