//! Periodic TTL sweeper.
//!
//! An optional per-cache worker that wakes on a fixed interval,
//! removes every dead entry in a single match-delete and records the
//! sweep metadata for inspection. Entries purged lazily in between
//! are naturally not double-counted because the match-delete is
//! atomic per row.

use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::cache::actions::CacheCore;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

/// Handle to a cache's sweeper thread.
pub(crate) struct Janitor {
    shutdown: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Janitor {
    pub fn spawn<K: CacheKey, V: CacheValue>(
        cache_name: &str,
        interval: Duration,
        core: Weak<CacheCore<K, V>>,
    ) -> Result<Self, CacheError> {
        let (shutdown, shutdown_rx) = bounded(1);
        let name = cache_name.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("stash-{}-janitor", cache_name))
            .spawn(move || {
                log::debug!("janitor for '{}' started with interval {:?}", name, interval);
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    let Some(core) = core.upgrade() else { break };
                    let run = core.sweep_expired();
                    if run.count > 0 {
                        log::debug!(
                            "janitor for '{}' removed {} entries in {:?}",
                            name,
                            run.count,
                            run.duration
                        );
                    }
                }
                log::debug!("janitor for '{}' stopped", name);
            })
            .map_err(|e| CacheError::Faulted(format!("failed to spawn janitor: {}", e)))?;
        Ok(Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stops and joins the sweeper. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Janitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Janitor").finish_non_exhaustive()
    }
}
