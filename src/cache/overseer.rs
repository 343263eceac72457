//! Process-wide cache directory and application lifecycle.
//!
//! The Overseer owns the registry of named caches and the per-name
//! update serializers. Both are genuinely process-wide: they come up
//! with [`start`], every cache operation fails with `NotStarted`
//! before that, and [`stop`] tears every registered cache down.

use std::any::Any;
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::cache::actions::CacheCore;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

/// Type-erased view of a registered cache, enough for directory
/// bookkeeping and teardown.
pub(crate) trait CacheService: Send + Sync {
    fn service_name(&self) -> &str;
    fn shutdown_service(&self);
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct Application {
    registry: DashMap<String, Arc<dyn CacheService>>,
    update_guards: DashMap<String, Arc<Mutex<()>>>,
}

static APPLICATION: Lazy<RwLock<Option<Arc<Application>>>> = Lazy::new(|| RwLock::new(None));

/// Brings up the process-wide services. Idempotent.
pub fn start() {
    let mut slot = APPLICATION.write();
    if slot.is_none() {
        *slot = Some(Arc::new(Application {
            registry: DashMap::new(),
            update_guards: DashMap::new(),
        }));
        log::debug!("cache application services started");
    }
}

/// Tears down every registered cache and the directory itself.
pub fn stop() {
    let taken = APPLICATION.write().take();
    if let Some(app) = taken {
        let services: Vec<Arc<dyn CacheService>> =
            app.registry.iter().map(|entry| Arc::clone(entry.value())).collect();
        app.registry.clear();
        for service in services {
            log::debug!("stopping cache '{}'", service.service_name());
            service.shutdown_service();
        }
        log::debug!("cache application services stopped");
    }
}

/// Whether [`start`] has been called.
pub fn is_started() -> bool {
    APPLICATION.read().is_some()
}

pub(crate) fn app() -> Result<Arc<Application>, CacheError> {
    APPLICATION.read().as_ref().cloned().ok_or(CacheError::NotStarted)
}

impl Application {
    /// Registers a cache under its name; at most one per name.
    pub fn register(&self, service: Arc<dyn CacheService>) -> Result<(), CacheError> {
        match self.registry.entry(service.service_name().to_string()) {
            MapEntry::Occupied(_) => Err(CacheError::InvalidName),
            MapEntry::Vacant(vacant) => {
                vacant.insert(service);
                Ok(())
            }
        }
    }

    /// Drops the directory entry, returning the removed service.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn CacheService>> {
        self.registry.remove(name).map(|(_, service)| service)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CacheService>> {
        self.registry.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// The exclusive serializer used by config updates for `name`.
    pub fn update_guard(&self, name: &str) -> Arc<Mutex<()>> {
        self.update_guards
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Resolves the typed engine for a registered cache name.
pub(crate) fn lookup_core<K: CacheKey, V: CacheValue>(
    name: &str,
) -> Result<Arc<CacheCore<K, V>>, CacheError> {
    let app = app()?;
    let service = app.get(name).ok_or_else(|| CacheError::NoCache(name.to_string()))?;
    service
        .as_any()
        .downcast::<CacheCore<K, V>>()
        .map_err(|_| CacheError::NoCache(name.to_string()))
}
