//! Per-cache transaction queue.
//!
//! A single-threaded serializer: messages are processed in FIFO
//! order, so transactions against one cache are strictly serialized
//! relative to each other and to `execute` operations routed through
//! the queue. Runtime faults inside submitted work are caught and
//! returned as errors without killing the worker.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::cache::actions::CacheCore;
use crate::cache::fallback::panic_message;
use crate::cache::locksmith;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::stash::Stash;

type TxWork<K, V> = Box<dyn FnOnce(&Stash<K, V>) -> Box<dyn Any + Send> + Send + 'static>;
type TxReply = Result<Box<dyn Any + Send>, CacheError>;

enum QueueMessage<K: CacheKey, V: CacheValue> {
    /// Run work in a lock-free context and reply with its value.
    Execute {
        work: TxWork<K, V>,
        reply: Sender<TxReply>,
    },
    /// Lock keys, run work, unlock, reply.
    Transaction {
        keys: Vec<K>,
        work: TxWork<K, V>,
        reply: Sender<TxReply>,
    },
    Shutdown,
}

/// Handle to a cache's queue worker thread.
pub(crate) struct TransactionQueue<K: CacheKey, V: CacheValue> {
    sender: Sender<QueueMessage<K, V>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<K: CacheKey, V: CacheValue> TransactionQueue<K, V> {
    pub fn spawn(
        cache_id: u64,
        cache_name: &str,
        core: Weak<CacheCore<K, V>>,
    ) -> Result<Self, CacheError> {
        let (sender, receiver) = unbounded();
        let handle = std::thread::Builder::new()
            .name(format!("stash-{}-queue", cache_name))
            .spawn(move || worker_loop(cache_id, core, receiver))
            .map_err(|e| CacheError::Faulted(format!("failed to spawn queue worker: {}", e)))?;
        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Runs `work` on the queue with no key coordination.
    pub fn execute<R: Send + 'static>(
        &self,
        work: impl FnOnce(&Stash<K, V>) -> R + Send + 'static,
    ) -> Result<R, CacheError> {
        let (reply_tx, reply_rx) = bounded(1);
        let message = QueueMessage::Execute {
            work: erase(work),
            reply: reply_tx,
        };
        self.submit(message, reply_rx)
    }

    /// Locks `keys`, runs `work`, unlocks and replies.
    pub fn transaction<R: Send + 'static>(
        &self,
        keys: Vec<K>,
        work: impl FnOnce(&Stash<K, V>) -> R + Send + 'static,
    ) -> Result<R, CacheError> {
        let (reply_tx, reply_rx) = bounded(1);
        let message = QueueMessage::Transaction {
            keys,
            work: erase(work),
            reply: reply_tx,
        };
        self.submit(message, reply_rx)
    }

    fn submit<R: Send + 'static>(
        &self,
        message: QueueMessage<K, V>,
        reply_rx: Receiver<TxReply>,
    ) -> Result<R, CacheError> {
        self.sender
            .send(message)
            .map_err(|_| CacheError::Faulted("transaction queue is not running".to_string()))?;
        match reply_rx.recv() {
            Ok(Ok(boxed)) => boxed
                .downcast::<R>()
                .map(|boxed| *boxed)
                .map_err(|_| CacheError::Faulted("transaction reply type mismatch".to_string())),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(CacheError::Faulted(
                "transaction queue dropped the reply".to_string(),
            )),
        }
    }

    /// Stops and joins the worker. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.sender.send(QueueMessage::Shutdown);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for TransactionQueue<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionQueue").finish_non_exhaustive()
    }
}

fn erase<K: CacheKey, V: CacheValue, R: Send + 'static>(
    work: impl FnOnce(&Stash<K, V>) -> R + Send + 'static,
) -> TxWork<K, V> {
    Box::new(move |stash| Box::new(work(stash)) as Box<dyn Any + Send>)
}

fn worker_loop<K: CacheKey, V: CacheValue>(
    cache_id: u64,
    core: Weak<CacheCore<K, V>>,
    receiver: Receiver<QueueMessage<K, V>>,
) {
    log::debug!("transaction queue {} started", cache_id);
    for message in receiver.iter() {
        match message {
            QueueMessage::Shutdown => break,
            QueueMessage::Execute { work, reply } => {
                let _ = reply.send(run_work(cache_id, &core, work));
            }
            QueueMessage::Transaction { mut keys, work, reply } => {
                keys.sort();
                keys.dedup();
                let result = match core.upgrade() {
                    None => Err(CacheError::Faulted("cache stopped".to_string())),
                    Some(core_arc) => {
                        if !core_arc.locks.lock_all(cache_id, &keys) {
                            // Cannot happen while this worker is the only
                            // acquirer; fail closed if it ever does.
                            Err(CacheError::Locked)
                        } else {
                            let outcome = run_work(cache_id, &core, work);
                            core_arc.locks.unlock_all(cache_id, &keys);
                            outcome
                        }
                    }
                };
                let _ = reply.send(result);
            }
        }
    }
    log::debug!("transaction queue {} stopped", cache_id);
}

fn run_work<K: CacheKey, V: CacheValue>(
    cache_id: u64,
    core: &Weak<CacheCore<K, V>>,
    work: TxWork<K, V>,
) -> TxReply {
    let core = match core.upgrade() {
        Some(core) => core,
        None => return Err(CacheError::Faulted("cache stopped".to_string())),
    };
    let stash = Stash::from_core(Arc::clone(&core));
    let _guard = locksmith::enter_queue(cache_id);
    catch_unwind(AssertUnwindSafe(|| work(&stash)))
        .map_err(|payload| CacheError::Faulted(panic_message(payload)))
}
