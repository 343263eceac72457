//! Hook runtime.
//!
//! The Informant owns a cache's registered observers. Each hook runs
//! on its own named thread with an unbounded mailbox; descriptors
//! stay in the cache config while the running observer is addressed
//! by id here, so neither side owns the other's storage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::cache::config::CacheConfig;
use crate::cache::events::{CacheEvent, EventOutcome};
use crate::cache::fallback::panic_message;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::stash::CacheRef;

/// Whether a hook observes actions before or after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Pre,
    Post,
}

/// How notifications are delivered to a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fire-and-forget; never blocks the action.
    Async,
    /// Send and await a reply for up to `timeout`.
    Sync { timeout: Duration },
}

/// A piece of live cache state a hook asks to be re-delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provision {
    /// A fresh cache handle and config after every committed update.
    Cache,
}

/// Descriptor of a registered hook. Lives in the cache config; the
/// running observer is tracked separately by the Informant.
#[derive(Debug, Clone)]
pub struct HookSpec {
    pub name: String,
    pub kind: HookKind,
    pub mode: DeliveryMode,
    /// Grace period reported against when a sync reply overruns its
    /// timeout; never aborts the action.
    pub max_timeout: Option<Duration>,
    pub provisions: Vec<Provision>,
}

impl HookSpec {
    pub fn pre(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HookKind::Pre,
            mode: DeliveryMode::Async,
            max_timeout: None,
            provisions: Vec::new(),
        }
    }

    pub fn post(name: impl Into<String>) -> Self {
        Self {
            kind: HookKind::Post,
            ..Self::pre(name)
        }
    }

    /// Switches the hook to synchronous delivery with `timeout`.
    pub fn synchronous(mut self, timeout: Duration) -> Self {
        self.mode = DeliveryMode::Sync { timeout };
        self
    }

    pub fn max_timeout(mut self, max: Duration) -> Self {
        self.max_timeout = Some(max);
        self
    }

    pub fn provide(mut self, provision: Provision) -> Self {
        self.provisions.push(provision);
        self
    }

    pub fn wants(&self, provision: Provision) -> bool {
        self.provisions.contains(&provision)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidHook);
        }
        if let DeliveryMode::Sync { timeout } = self.mode {
            if timeout.is_zero() {
                return Err(CacheError::InvalidHook);
            }
            if let Some(max) = self.max_timeout {
                if max < timeout {
                    return Err(CacheError::InvalidHook);
                }
            }
        }
        Ok(())
    }
}

/// A registered observer of cache actions.
///
/// Hooks own their state and run on a dedicated thread; all methods
/// are invoked from that thread only. Panics are caught per message
/// and never stop the observer.
pub trait Hook<K: CacheKey, V: CacheValue>: Send {
    /// Called for every non-silent action. Pre-hooks receive
    /// `outcome: None` and may return a replacement outcome to
    /// short-circuit the action; post-hooks receive the result and
    /// their return value is discarded.
    fn on_event(
        &mut self,
        event: &CacheEvent<K, V>,
        outcome: Option<&EventOutcome<K, V>>,
    ) -> Option<EventOutcome<K, V>>;

    /// Delivered at start and after every committed config update,
    /// for hooks provisioned with [`Provision::Cache`].
    fn on_provision(&mut self, cache: CacheRef<K, V>, config: Arc<CacheConfig<K, V>>) {
        let _ = (cache, config);
    }

    /// Reinitialize as if freshly started.
    fn on_reset(&mut self) {}
}

/// A hook descriptor paired with its observer instance, as handed to
/// the cache at start.
pub struct HookRegistration<K: CacheKey, V: CacheValue> {
    pub spec: HookSpec,
    pub hook: Box<dyn Hook<K, V>>,
}

impl<K: CacheKey, V: CacheValue> HookRegistration<K, V> {
    pub fn new(spec: HookSpec, hook: Box<dyn Hook<K, V>>) -> Self {
        Self { spec, hook }
    }
}

enum HookMessage<K: CacheKey, V: CacheValue> {
    Event {
        event: Arc<CacheEvent<K, V>>,
        outcome: Option<Arc<EventOutcome<K, V>>>,
        reply: Option<Sender<Option<EventOutcome<K, V>>>>,
    },
    Provision {
        cache: CacheRef<K, V>,
        config: Arc<CacheConfig<K, V>>,
    },
    Reset,
    Shutdown,
}

struct HookRuntime<K: CacheKey, V: CacheValue> {
    spec: HookSpec,
    sender: Sender<HookMessage<K, V>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Supervisor of a cache's hooks.
pub struct Informant<K: CacheKey, V: CacheValue> {
    hooks: Vec<HookRuntime<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Informant<K, V> {
    /// Spawns one observer thread per registration.
    pub fn start(
        cache_name: &str,
        registrations: Vec<HookRegistration<K, V>>,
    ) -> Result<Self, CacheError> {
        let mut hooks = Vec::with_capacity(registrations.len());
        for registration in registrations {
            registration.spec.validate()?;
            let (sender, receiver) = unbounded();
            let spec = registration.spec.clone();
            let thread_name = format!("stash-{}-hook-{}", cache_name, spec.name);
            let worker_spec = spec.clone();
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || observer_loop(worker_spec, registration.hook, receiver))
                .map_err(|e| CacheError::Faulted(format!("failed to spawn hook thread: {}", e)))?;
            hooks.push(HookRuntime {
                spec,
                sender,
                handle: Mutex::new(Some(handle)),
            });
        }
        Ok(Self { hooks })
    }

    /// True when at least one hook is registered; the pipeline skips
    /// event construction entirely otherwise.
    pub fn is_active(&self) -> bool {
        !self.hooks.is_empty()
    }

    /// Dispatches `event` to every pre-hook, returning the first
    /// short-circuit outcome any of them produced.
    pub fn broadcast_pre(&self, event: &Arc<CacheEvent<K, V>>) -> Option<EventOutcome<K, V>> {
        let mut short_circuit = None;
        for runtime in self.hooks.iter().filter(|r| r.spec.kind == HookKind::Pre) {
            let produced = self.deliver(runtime, event, None);
            if short_circuit.is_none() {
                short_circuit = produced;
            }
        }
        short_circuit
    }

    /// Dispatches `(event, outcome)` to every post-hook.
    pub fn broadcast_post(&self, event: &Arc<CacheEvent<K, V>>, outcome: &EventOutcome<K, V>) {
        if self.hooks.iter().all(|r| r.spec.kind != HookKind::Post) {
            return;
        }
        let outcome = Arc::new(outcome.clone());
        for runtime in self.hooks.iter().filter(|r| r.spec.kind == HookKind::Post) {
            self.deliver(runtime, event, Some(Arc::clone(&outcome)));
        }
    }

    fn deliver(
        &self,
        runtime: &HookRuntime<K, V>,
        event: &Arc<CacheEvent<K, V>>,
        outcome: Option<Arc<EventOutcome<K, V>>>,
    ) -> Option<EventOutcome<K, V>> {
        match runtime.spec.mode {
            DeliveryMode::Async => {
                let _ = runtime.sender.send(HookMessage::Event {
                    event: Arc::clone(event),
                    outcome,
                    reply: None,
                });
                None
            }
            DeliveryMode::Sync { timeout } => {
                let (reply_tx, reply_rx) = bounded(1);
                if runtime
                    .sender
                    .send(HookMessage::Event {
                        event: Arc::clone(event),
                        outcome,
                        reply: Some(reply_tx),
                    })
                    .is_err()
                {
                    return None;
                }
                self.await_reply(runtime, event, timeout, reply_rx)
            }
        }
    }

    fn await_reply(
        &self,
        runtime: &HookRuntime<K, V>,
        event: &Arc<CacheEvent<K, V>>,
        timeout: Duration,
        reply_rx: Receiver<Option<EventOutcome<K, V>>>,
    ) -> Option<EventOutcome<K, V>> {
        match reply_rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "hook '{}' exceeded its {:?} timeout on {}",
                    runtime.spec.name,
                    timeout,
                    event.action.name()
                );
                let grace = runtime
                    .spec
                    .max_timeout
                    .and_then(|max| max.checked_sub(timeout))
                    .filter(|d| !d.is_zero());
                match grace {
                    Some(grace) => match reply_rx.recv_timeout(grace) {
                        Ok(reply) => reply,
                        Err(_) => {
                            log::error!(
                                "hook '{}' violated its max timeout on {}",
                                runtime.spec.name,
                                event.action.name()
                            );
                            None
                        }
                    },
                    None => None,
                }
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Re-delivers the cache handle and config to every hook that
    /// provisioned for it.
    pub fn provision_all(&self, cache: CacheRef<K, V>, config: Arc<CacheConfig<K, V>>) {
        for runtime in &self.hooks {
            if runtime.spec.wants(Provision::Cache) {
                let _ = runtime.sender.send(HookMessage::Provision {
                    cache: cache.clone(),
                    config: Arc::clone(&config),
                });
            }
        }
    }

    /// Sends the reset signal to every hook, or to the named ones.
    /// Every instance whose name matches resets.
    pub fn reset(&self, names: Option<&[String]>) {
        for runtime in &self.hooks {
            let targeted = match names {
                None => true,
                Some(names) => names.iter().any(|n| *n == runtime.spec.name),
            };
            if targeted {
                let _ = runtime.sender.send(HookMessage::Reset);
            }
        }
    }

    /// Stops and joins every observer thread. Idempotent.
    pub fn shutdown(&self) {
        for runtime in &self.hooks {
            let _ = runtime.sender.send(HookMessage::Shutdown);
        }
        for runtime in &self.hooks {
            if let Some(handle) = runtime.handle.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

fn observer_loop<K: CacheKey, V: CacheValue>(
    spec: HookSpec,
    mut hook: Box<dyn Hook<K, V>>,
    receiver: Receiver<HookMessage<K, V>>,
) {
    log::debug!("hook '{}' observer started", spec.name);
    for message in receiver.iter() {
        match message {
            HookMessage::Event { event, outcome, reply } => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    hook.on_event(&event, outcome.as_deref())
                }));
                let short_circuit = match result {
                    Ok(sc) => sc,
                    Err(payload) => {
                        log::error!(
                            "hook '{}' faulted on {}: {}",
                            spec.name,
                            event.action.name(),
                            panic_message(payload)
                        );
                        None
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(short_circuit);
                }
            }
            HookMessage::Provision { cache, config } => {
                let result = catch_unwind(AssertUnwindSafe(|| hook.on_provision(cache, config)));
                if let Err(payload) = result {
                    log::error!(
                        "hook '{}' faulted on provision: {}",
                        spec.name,
                        panic_message(payload)
                    );
                }
            }
            HookMessage::Reset => {
                let result = catch_unwind(AssertUnwindSafe(|| hook.on_reset()));
                if let Err(payload) = result {
                    log::error!(
                        "hook '{}' faulted on reset: {}",
                        spec.name,
                        panic_message(payload)
                    );
                }
            }
            HookMessage::Shutdown => break,
        }
    }
    log::debug!("hook '{}' observer stopped", spec.name);
}
