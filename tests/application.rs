//! Application lifecycle: the registry and lock table are
//! process-wide and refuse work before start and after stop.
//!
//! Runs as its own binary so the start/stop transitions cannot race
//! the other suites.

use stash::{CacheError, Stash};

#[test]
fn test_lifecycle_gates_cache_operations() {
    assert!(!stash::is_started());

    // No services yet: nothing can start or resolve.
    assert!(matches!(
        Stash::<String, u64>::builder("early").start(),
        Err(CacheError::NotStarted)
    ));
    assert!(matches!(
        Stash::<String, u64>::lookup("early"),
        Err(CacheError::NotStarted)
    ));

    stash::start();
    assert!(stash::is_started());
    // Idempotent.
    stash::start();

    let cache: Stash<String, u64> = Stash::builder("lifecycle").start().unwrap();
    cache.set("k".to_string(), 1).unwrap();
    assert_eq!(
        Stash::<String, u64>::lookup("lifecycle")
            .unwrap()
            .get(&"k".to_string())
            .unwrap()
            .value(),
        Some(1)
    );

    stash::stop();
    assert!(!stash::is_started());
    assert!(matches!(
        Stash::<String, u64>::lookup("lifecycle"),
        Err(CacheError::NotStarted)
    ));
}
