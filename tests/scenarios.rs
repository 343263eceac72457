//! End-to-end scenarios across the action surface: expiration with
//! observer notifications, fallback population, transaction
//! serialization, eviction reactions and config updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stash::{
    CacheError, CacheEvent, CacheRef, CacheConfig, Command, CounterValue, EventOutcome, FallbackConfig,
    FallbackDecision, Fetched, Hook, HookSpec, Inspect, Inspection, LimitConfig, OutcomeValue,
    ResetSpec, Stash,
};

fn unique_name(prefix: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", prefix, NEXT.fetch_add(1, Ordering::Relaxed))
}

/// (action, outcome tag, count payload if any) per observed event.
type Seen = Arc<Mutex<Vec<(String, String, Option<usize>)>>>;

struct Recorder<K, V> {
    seen: Seen,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V> Recorder<K, V> {
    fn new(seen: Seen) -> Self {
        Self {
            seen,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K: stash::CacheKey, V: stash::CacheValue> Hook<K, V> for Recorder<K, V> {
    fn on_event(
        &mut self,
        event: &CacheEvent<K, V>,
        outcome: Option<&EventOutcome<K, V>>,
    ) -> Option<EventOutcome<K, V>> {
        if let Some(outcome) = outcome {
            let count = match outcome {
                EventOutcome::Ok(OutcomeValue::Count(count)) => Some(*count),
                _ => None,
            };
            self.seen.lock().unwrap().push((
                event.action.name().to_string(),
                outcome.tag().to_string(),
                count,
            ));
        }
        None
    }
}

fn recording_hook<K: stash::CacheKey, V: stash::CacheValue>() -> (HookSpec, Recorder<K, V>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let spec = HookSpec::post("recorder").synchronous(Duration::from_secs(1));
    (spec, Recorder::new(Arc::clone(&seen)), seen)
}

#[test]
fn test_lazy_expiry_notifies_get_and_purge() {
    stash::start();
    let (spec, hook, seen) = recording_hook();
    let cache: Stash<String, u64> = Stash::builder(unique_name("lazy"))
        .no_janitor()
        .hook(spec, hook)
        .start()
        .unwrap();

    cache
        .set_with_ttl("k".to_string(), 1, Some(Duration::from_millis(5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(cache.get(&"k".to_string()).unwrap(), Fetched::Missing);

    let seen = seen.lock().unwrap();
    let purge_at = seen
        .iter()
        .position(|(action, tag, count)| action == "purge" && tag == "ok" && *count == Some(1))
        .expect("purge notification observed");
    let get_at = seen
        .iter()
        .position(|(action, tag, _)| action == "get" && tag == "missing")
        .expect("missing get observed");
    // The synthetic purge fires inside the get, before its post-hook.
    assert!(purge_at < get_at);
}

#[test]
fn test_fallback_commit_round_trip() {
    stash::start();
    let fallback = FallbackConfig::with_state(
        |key: &String, state: &stash::FallbackState| {
            let suffix = state.downcast_ref::<String>().cloned().unwrap_or_default();
            let combined: String = format!("{}_{}", key, suffix).chars().rev().collect();
            FallbackDecision::Commit(combined)
        },
        "val".to_string(),
    );
    let cache: Stash<String, String> = Stash::builder(unique_name("fallback-commit"))
        .fallback(fallback)
        .start()
        .unwrap();

    assert_eq!(
        cache.get(&"key1".to_string()).unwrap(),
        Fetched::Commit("lav_1yek".to_string())
    );
    assert_eq!(
        cache.get(&"key1".to_string()).unwrap(),
        Fetched::Ok("lav_1yek".to_string())
    );
}

#[test]
fn test_fallback_ignore_stores_nothing() {
    stash::start();
    let cache: Stash<String, String> = Stash::builder(unique_name("fallback-ignore"))
        .fallback(FallbackConfig::new(|key: &String| {
            FallbackDecision::Ignore(key.clone())
        }))
        .start()
        .unwrap();

    assert_eq!(
        cache.get(&"key2".to_string()).unwrap(),
        Fetched::Ignore("key2".to_string())
    );
    assert!(!cache.exists(&"key2".to_string()).unwrap());
}

#[test]
fn test_fallback_single_flight_commits_once() {
    stash::start();
    let calls = Arc::new(AtomicU64::new(0));
    let counted = Arc::clone(&calls);
    let cache: Stash<String, u64> = Stash::builder(unique_name("single-flight"))
        .fallback(FallbackConfig::new(move |_key: &String| {
            counted.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(40));
            FallbackDecision::Commit(7)
        }))
        .start()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            cache.get(&"hot".to_string()).unwrap()
        }));
    }
    for handle in handles {
        let fetched = handle.join().unwrap();
        assert_eq!(fetched.value(), Some(7));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transaction_swap_serializes_against_writer() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("txn-swap")).start().unwrap();
    cache.set("a".to_string(), 1).unwrap();
    cache.set("b".to_string(), 2).unwrap();

    let keys = vec!["a".to_string(), "b".to_string()];
    let swapper = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            cache
                .transaction(&keys, |txn| {
                    let a = txn.get(&"a".to_string()).unwrap().value().unwrap();
                    let b = txn.get(&"b".to_string()).unwrap().value().unwrap();
                    std::thread::sleep(Duration::from_millis(40));
                    txn.set("a".to_string(), b).unwrap();
                    txn.set("b".to_string(), a).unwrap();
                })
                .unwrap();
        })
    };

    // Give the transaction a head start, then retry the conflicting
    // write until the locks release.
    std::thread::sleep(Duration::from_millis(10));
    let writer = {
        let cache = cache.clone();
        std::thread::spawn(move || loop {
            match cache.set("a".to_string(), 99) {
                Ok(_) => break,
                Err(CacheError::Locked) => std::thread::sleep(Duration::from_millis(2)),
                Err(other) => panic!("unexpected error: {}", other),
            }
        })
    };

    swapper.join().unwrap();
    writer.join().unwrap();

    let a = cache.get(&"a".to_string()).unwrap().value().unwrap();
    let b = cache.get(&"b".to_string()).unwrap().value().unwrap();
    // The write landed entirely before or entirely after the swap.
    assert!(
        (a == 99 && b == 1) || (a == 2 && b == 99),
        "unexpected final state: a={}, b={}",
        a,
        b
    );
}

#[test]
fn test_locked_key_fails_fast_for_direct_writers() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("locked"))
        .transactional()
        .start()
        .unwrap();
    cache.set("k".to_string(), 1).unwrap();

    let holder = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            cache
                .transaction(&["k".to_string()], |_txn| {
                    std::thread::sleep(Duration::from_millis(80));
                })
                .unwrap();
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(cache.set("k".to_string(), 2), Err(CacheError::Locked));
    holder.join().unwrap();

    // Lock released: the write goes through.
    assert!(cache.set("k".to_string(), 3).unwrap());
}

#[test]
fn test_transaction_fault_is_caught_and_queue_survives() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("txn-fault")).start().unwrap();

    let result: Result<(), CacheError> =
        cache.transaction(&["k".to_string()], |_txn| panic!("boom inside transaction"));
    match result {
        Err(CacheError::Faulted(message)) => assert!(message.contains("boom")),
        other => panic!("expected a caught fault, got {:?}", other),
    }

    // The queue keeps serving afterwards.
    let doubled = cache.execute(|txn| {
        txn.set("k".to_string(), 21).unwrap();
        42u64
    });
    assert_eq!(doubled.unwrap(), 42);
    assert_eq!(cache.get(&"k".to_string()).unwrap().value(), Some(21));
}

#[test]
fn test_lrw_overflow_evicts_oldest_writes() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("lrw"))
        .no_janitor()
        .limit(LimitConfig::new(50))
        .start()
        .unwrap();

    for i in 0..51u64 {
        cache.set(format!("k{:03}", i), i).unwrap();
        // Keep write times monotone at millisecond resolution.
        std::thread::sleep(Duration::from_millis(2));
    }

    // The policy hook reacts asynchronously.
    std::thread::sleep(Duration::from_millis(200));

    // 51 entries over a bound of 50 at 10% reclaim: one overshoot
    // plus five headroom leaves 45.
    let size = cache.size().unwrap();
    assert_eq!(size, 45);

    let mut keys = cache.keys().unwrap();
    keys.sort();
    let expected: Vec<String> = (6..51).map(|i| format!("k{:03}", i)).collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_overseer_update_is_serialized_and_reprovisions() {
    stash::start();

    struct ConfigWatcher {
        defaults: Arc<Mutex<Vec<Option<Duration>>>>,
    }
    impl Hook<String, u64> for ConfigWatcher {
        fn on_event(
            &mut self,
            _event: &CacheEvent<String, u64>,
            _outcome: Option<&EventOutcome<String, u64>>,
        ) -> Option<EventOutcome<String, u64>> {
            None
        }
        fn on_provision(
            &mut self,
            _cache: CacheRef<String, u64>,
            config: Arc<CacheConfig<String, u64>>,
        ) {
            self.defaults.lock().unwrap().push(config.expiration.default);
        }
    }

    let defaults = Arc::new(Mutex::new(Vec::new()));
    let cache: Stash<String, u64> = Stash::builder(unique_name("update"))
        .hook(
            HookSpec::post("config-watcher")
                .synchronous(Duration::from_secs(1))
                .provide(stash::Provision::Cache),
            ConfigWatcher {
                defaults: Arc::clone(&defaults),
            },
        )
        .start()
        .unwrap();

    let slow = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            cache
                .update_config(|config| {
                    std::thread::sleep(Duration::from_millis(25));
                    config.expiration.default = Some(Duration::from_secs(5));
                })
                .unwrap();
        })
    };
    std::thread::sleep(Duration::from_millis(5));
    let fast = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            cache
                .update_config(|config| {
                    config.expiration.default = Some(Duration::from_secs(3));
                })
                .unwrap();
        })
    };

    slow.join().unwrap();
    fast.join().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(
        cache.config().expiration.default,
        Some(Duration::from_secs(3))
    );
    let defaults = defaults.lock().unwrap();
    assert_eq!(defaults.last(), Some(&Some(Duration::from_secs(3))));
}

#[test]
fn test_faulty_update_keeps_prior_config() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("update-fault"))
        .default_ttl(Duration::from_secs(9))
        .start()
        .unwrap();

    let result = cache.update_config(|config| {
        config.expiration.default = Some(Duration::from_secs(1));
        panic!("transform fault");
    });
    assert!(matches!(result, Err(CacheError::Faulted(_))));
    assert_eq!(
        cache.config().expiration.default,
        Some(Duration::from_secs(9))
    );
}

#[test]
fn test_del_is_idempotent() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("del")).start().unwrap();

    cache.set("k".to_string(), 1).unwrap();
    assert!(cache.del(&"k".to_string()).unwrap());
    assert!(!cache.del(&"k".to_string()).unwrap());
    assert_eq!(cache.count().unwrap(), 0);
}

#[test]
fn test_take_removes_atomically() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("take")).start().unwrap();

    cache.set("k".to_string(), 5).unwrap();
    assert_eq!(cache.take(&"k".to_string()).unwrap(), Some(5));
    assert!(!cache.exists(&"k".to_string()).unwrap());
    assert_eq!(cache.take(&"k".to_string()).unwrap(), None);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Mixed {
    Num(i64),
    Text(String),
}

impl CounterValue for Mixed {
    fn to_int(&self) -> Option<i64> {
        match self {
            Mixed::Num(n) => Some(*n),
            Mixed::Text(_) => None,
        }
    }
    fn from_int(n: i64) -> Self {
        Mixed::Num(n)
    }
}

#[test]
fn test_incr_decr_and_non_numeric_values() {
    stash::start();
    let cache: Stash<String, Mixed> = Stash::builder(unique_name("counter")).start().unwrap();

    // Missing keys seed from the initial value.
    assert_eq!(cache.incr("n".to_string(), 2, 10).unwrap(), 12);
    assert_eq!(cache.incr("n".to_string(), 3, 10).unwrap(), 15);
    assert_eq!(cache.decr("n".to_string(), 5, 0).unwrap(), 10);

    cache
        .set("s".to_string(), Mixed::Text("words".to_string()))
        .unwrap();
    assert_eq!(
        cache.incr("s".to_string(), 1, 0),
        Err(CacheError::NonNumericValue)
    );
}

#[test]
fn test_ttl_expire_persist_refresh_touch() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("ttl"))
        .no_janitor()
        .start()
        .unwrap();
    let key = "k".to_string();

    cache.set(key.clone(), 1).unwrap();
    assert_eq!(cache.ttl(&key).unwrap(), Fetched::Ok(None));

    assert!(cache.expire(&key, Duration::from_millis(400)).unwrap());
    let remaining = cache.ttl(&key).unwrap().value().unwrap().unwrap();
    assert!(remaining <= Duration::from_millis(400));
    assert!(remaining > Duration::from_millis(200));

    // Touch moves the write time but not the expiry point.
    std::thread::sleep(Duration::from_millis(100));
    let before_touch = cache.entry(&key).unwrap();
    assert!(cache.touch(&key).unwrap());
    let after_touch = cache.entry(&key).unwrap();
    assert!(after_touch.touched >= before_touch.touched + 90);
    let expiry_before = before_touch.touched + before_touch.ttl.unwrap();
    let expiry_after = after_touch.touched + after_touch.ttl.unwrap();
    assert!(expiry_after.abs_diff(expiry_before) <= 5);

    // Refresh restarts the window.
    assert!(cache.refresh(&key).unwrap());
    let refreshed = cache.ttl(&key).unwrap().value().unwrap().unwrap();
    assert!(refreshed > remaining - Duration::from_millis(120));

    // Persist drops the TTL entirely.
    assert!(cache.persist(&key).unwrap());
    assert_eq!(cache.ttl(&key).unwrap(), Fetched::Ok(None));

    // Expiring an absent key reports false.
    assert!(!cache.expire(&"ghost".to_string(), Duration::from_secs(1)).unwrap());
    assert_eq!(cache.ttl(&"ghost".to_string()).unwrap(), Fetched::Missing);
}

#[test]
fn test_expire_at_past_instant_deletes() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("expire-at")).start().unwrap();
    cache.set("k".to_string(), 1).unwrap();

    assert!(cache.expire_at(&"k".to_string(), 1).unwrap());
    assert!(!cache.exists(&"k".to_string()).unwrap());
}

#[test]
fn test_invoke_read_and_write_commands() {
    stash::start();
    let cache: Stash<String, Vec<u64>> = Stash::builder(unique_name("commands"))
        .command(
            "last",
            Command::read(|value: Option<&Vec<u64>>| {
                value.and_then(|items| items.last().copied()).map(|n| vec![n])
            }),
        )
        .command(
            "pop",
            Command::write(|value: Option<Vec<u64>>| {
                let mut items = value.unwrap_or_default();
                let popped = items.pop().map(|n| vec![n]);
                (popped, Some(items))
            }),
        )
        .start()
        .unwrap();

    cache.set("list".to_string(), vec![1, 2, 3]).unwrap();

    assert_eq!(
        cache.invoke("last", &"list".to_string()).unwrap(),
        Some(vec![3])
    );
    assert_eq!(
        cache.invoke("pop", &"list".to_string()).unwrap(),
        Some(vec![3])
    );
    assert_eq!(
        cache.get(&"list".to_string()).unwrap().value(),
        Some(vec![1, 2])
    );
    assert_eq!(
        cache.invoke("nope", &"list".to_string()),
        Err(CacheError::InvalidCommand)
    );
}

#[test]
fn test_janitor_sweeps_expired_entries() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("janitor"))
        .janitor_interval(Duration::from_millis(20))
        .start()
        .unwrap();

    for i in 0..5u64 {
        cache
            .set_with_ttl(format!("k{}", i), i, Some(Duration::from_millis(10)))
            .unwrap();
    }
    cache.set("keep".to_string(), 9).unwrap();

    std::thread::sleep(Duration::from_millis(120));

    // No reads happened, so only the Janitor can have removed rows.
    assert_eq!(cache.size().unwrap(), 1);
    match cache.inspect(Inspect::JanitorLast).unwrap() {
        Inspection::Janitor(Some(run)) => assert!(run.count >= 1),
        other => panic!("expected a recorded sweep, got {:?}", other),
    }
}

#[test]
fn test_inspection_targets() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("inspect"))
        .no_janitor()
        .lazy(false)
        .start()
        .unwrap();

    cache.set("live".to_string(), 1).unwrap();
    cache
        .set_with_ttl("dead".to_string(), 2, Some(Duration::from_millis(5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(
        cache.inspect(Inspect::ExpiredCount).unwrap(),
        Inspection::Count(1)
    );
    assert_eq!(
        cache.inspect(Inspect::ExpiredKeys).unwrap(),
        Inspection::Keys(vec!["dead".to_string()])
    );
    assert_eq!(
        cache.inspect(Inspect::JanitorLast),
        Err(CacheError::JanitorDisabled)
    );
    match cache.inspect(Inspect::MemoryBytes).unwrap() {
        Inspection::Bytes(bytes) => assert!(bytes > 0),
        other => panic!("expected bytes, got {:?}", other),
    }
    match cache.inspect(Inspect::Record("dead".to_string())).unwrap() {
        Inspection::Record(Some(entry)) => assert_eq!(entry.value, 2),
        other => panic!("expected the raw record, got {:?}", other),
    }
    match cache.inspect(Inspect::State).unwrap() {
        Inspection::State(state) => {
            assert_eq!(state.entries, 2);
            assert_eq!(state.live, 1);
            assert!(!state.transactional);
        }
        other => panic!("expected state, got {:?}", other),
    }
}

#[test]
fn test_stats_counters_and_disabled_error() {
    stash::start();
    let plain: Stash<String, u64> = Stash::builder(unique_name("no-stats")).start().unwrap();
    assert_eq!(plain.stats(), Err(CacheError::StatsDisabled));

    let cache: Stash<String, u64> = Stash::builder(unique_name("stats"))
        .record_stats()
        .start()
        .unwrap();

    cache.set("k".to_string(), 1).unwrap();
    assert!(cache.get(&"k".to_string()).unwrap().value().is_some());
    assert!(cache.get(&"miss".to_string()).unwrap().is_missing());

    // The stats hook is asynchronous; give it a beat.
    std::thread::sleep(Duration::from_millis(100));

    let snapshot = cache.stats().unwrap();
    assert_eq!(snapshot.hits, 1);
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.writes, 1);
    assert!((snapshot.hit_rate() - 0.5).abs() < 1e-9);
    assert_eq!(snapshot.operations.get("set"), Some(&1));

    // Reset clears entries and reinitializes hooks.
    cache.reset(ResetSpec::all()).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(cache.size().unwrap(), 0);
    let snapshot = cache.stats().unwrap();
    assert_eq!(snapshot.hits, 0);
    assert_eq!(snapshot.writes, 0);
}

#[test]
fn test_pre_hook_short_circuit_replaces_outcome() {
    stash::start();

    struct Preloaded;
    impl Hook<String, u64> for Preloaded {
        fn on_event(
            &mut self,
            event: &CacheEvent<String, u64>,
            outcome: Option<&EventOutcome<String, u64>>,
        ) -> Option<EventOutcome<String, u64>> {
            if outcome.is_none() && event.action == stash::Action::Get {
                return Some(EventOutcome::Commit(42));
            }
            None
        }
    }

    let cache: Stash<String, u64> = Stash::builder(unique_name("short-circuit"))
        .hook(
            HookSpec::pre("preloaded").synchronous(Duration::from_secs(1)),
            Preloaded,
        )
        .start()
        .unwrap();

    // The operation never ran: the value comes from the pre-hook and
    // nothing was stored.
    assert_eq!(cache.get(&"k".to_string()).unwrap(), Fetched::Commit(42));
    assert_eq!(cache.size().unwrap(), 0);
}

#[test]
fn test_duplicate_names_and_ensure() {
    stash::start();
    let name = unique_name("dup");
    let first: Stash<String, u64> = Stash::builder(name.clone()).start().unwrap();
    first.set("k".to_string(), 1).unwrap();

    assert!(matches!(
        Stash::<String, u64>::builder(name.clone()).start(),
        Err(CacheError::InvalidName)
    ));

    let again = Stash::<String, u64>::ensure(&name, |builder| builder).unwrap();
    assert_eq!(again.get(&"k".to_string()).unwrap().value(), Some(1));

    assert!(matches!(
        Stash::<String, u64>::lookup("never-started"),
        Err(CacheError::NoCache(_))
    ));
}

#[test]
fn test_counts_distinguish_live_and_raw() {
    stash::start();
    let cache: Stash<String, u64> = Stash::builder(unique_name("counts"))
        .no_janitor()
        .lazy(false)
        .start()
        .unwrap();

    cache.set("live".to_string(), 1).unwrap();
    cache
        .set_with_ttl("dead".to_string(), 2, Some(Duration::from_millis(5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(cache.size().unwrap(), 2);
    assert_eq!(cache.count().unwrap(), 1);
    assert_eq!(cache.keys().unwrap(), vec!["live".to_string()]);
    assert!(!cache.is_empty().unwrap());

    assert_eq!(cache.purge().unwrap(), 1);
    assert_eq!(cache.size().unwrap(), 1);
}
