//! Tests for the per-group lock
//!
//! These tests verify:
//! - Mutual exclusion per group, independence across groups
//! - Release and session cleanup on guard drop
//! - Reclaim of a crashed holder's lock by session TTL
//! - Renewal keeping a long-held lock alive

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use promsd::coord::{GroupLocker, KvBackend, LockOptions, MemoryKv};
use promsd::SdError;

// =============================================================================
// Helper Functions
// =============================================================================

fn locker(kv: &Arc<MemoryKv>, ttl: Duration, wait: Option<Duration>) -> GroupLocker {
    GroupLocker::new(
        kv.clone(),
        "prom-http-sd-server",
        LockOptions {
            session_ttl: ttl,
            wait_timeout: wait,
            retry_interval: Duration::from_millis(5),
        },
    )
}

// =============================================================================
// Exclusion Tests
// =============================================================================

#[test]
fn test_lock_key_layout() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), None);

    assert_eq!(
        locker.lock_key("web"),
        "prom-http-sd-server-lock/targetGroup/web"
    );
}

#[test]
fn test_second_acquire_waits_out_timeout() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), Some(Duration::from_millis(50)));

    let guard = locker.acquire("web").unwrap();
    assert_eq!(kv.lock_holder(guard.key()), Some(guard.session().to_string()));

    let err = locker.acquire("web").err().unwrap();
    assert!(matches!(err, SdError::LockAcquisition { ref group, .. } if group == "web"));

    // Other groups are unaffected
    let other = locker.acquire("db").unwrap();
    assert_ne!(other.session(), guard.session());
}

#[test]
fn test_drop_releases_and_destroys_session() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), Some(Duration::from_millis(50)));

    let key = {
        let guard = locker.acquire("web").unwrap();
        assert_eq!(kv.session_count(), 1);
        guard.key().to_string()
    };

    assert_eq!(kv.lock_holder(&key), None);
    assert_eq!(kv.session_count(), 0);
    locker.acquire("web").unwrap();
}

#[test]
fn test_critical_sections_never_overlap() {
    let kv = Arc::new(MemoryKv::new());
    let locker = Arc::new(locker(&kv, Duration::from_secs(10), None));
    let inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let locker = Arc::clone(&locker);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                for _ in 0..10 {
                    let _guard = locker.acquire("web").unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(1));
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

// =============================================================================
// Session Lifetime Tests
// =============================================================================

#[test]
fn test_crashed_holder_reclaimed_by_ttl() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), Some(Duration::from_secs(5)));

    let guard = locker.acquire("web").unwrap();
    // The holder dies: its session stops being renewed and lapses.
    kv.expire_session(guard.session());
    let key = guard.key().to_string();
    std::mem::forget(guard);

    let next = locker.acquire("web").unwrap();
    assert_eq!(kv.lock_holder(&key), Some(next.session().to_string()));
}

#[test]
fn test_renewal_keeps_lock_past_ttl() {
    let kv = Arc::new(MemoryKv::new());
    let ttl = Duration::from_millis(300);
    let holder = locker(&kv, ttl, None);
    let contender = locker(&kv, ttl, Some(Duration::from_millis(50)));

    let guard = holder.acquire("web").unwrap();
    thread::sleep(ttl * 3);

    assert_eq!(kv.lock_holder(guard.key()), Some(guard.session().to_string()));
    assert!(contender.acquire("web").is_err());
}

#[test]
fn test_failed_acquire_leaves_no_session() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), Some(Duration::from_millis(20)));
    let _held = locker.acquire("web").unwrap();

    for _ in 0..3 {
        assert!(locker.acquire("web").is_err());
    }

    assert_eq!(kv.session_count(), 1);
}

#[test]
fn test_unavailable_service_fails_acquire() {
    let kv = Arc::new(MemoryKv::new());
    let locker = locker(&kv, Duration::from_secs(10), None);
    kv.set_unavailable(true);

    assert!(matches!(
        locker.acquire("web"),
        Err(SdError::LockAcquisition { .. })
    ));

    kv.set_unavailable(false);
    assert_eq!(kv.session_count(), 0);
    assert!(kv.get(&locker.lock_key("web")).unwrap().is_none());
}
