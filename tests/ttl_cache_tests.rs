//! Integration tests for the per-key TTL cache.

use monix::engine::TtlCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_value_served_until_ttl_expires() {
    let cache = TtlCache::new();
    let calls = AtomicUsize::new(0);
    let ttl = Duration::from_secs(5);
    let t0 = Instant::now();

    let compute = |value: &'static str| {
        calls.fetch_add(1, Ordering::SeqCst);
        value
    };

    assert_eq!(cache.get_or_compute_at("cpu", ttl, t0, || compute("X")), "X");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let later = t0 + Duration::from_secs(3);
    assert_eq!(cache.get_or_compute_at("cpu", ttl, later, || compute("Y")), "X");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let expired = t0 + Duration::from_secs(6);
    assert_eq!(cache.get_or_compute_at("cpu", ttl, expired, || compute("Z")), "Z");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_keys_expire_independently() {
    let cache = TtlCache::new();
    let ttl = Duration::from_secs(1);
    let t0 = Instant::now();

    cache.get_or_compute_at("memory", ttl, t0, || 1);
    cache.get_or_compute_at("disk", ttl, t0 + Duration::from_millis(800), || 2);

    let t1 = t0 + Duration::from_millis(1500);
    assert_eq!(cache.get_or_compute_at("memory", ttl, t1, || 10), 10);
    assert_eq!(cache.get_or_compute_at("disk", ttl, t1, || 20), 2);
    assert_eq!(cache.fresh_count(ttl, t1), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_errors_are_not_cached() {
    let cache: TtlCache<u32> = TtlCache::new();
    let ttl = Duration::from_secs(60);

    let failed: Result<_, String> = cache.try_get_or_compute("network", ttl, || Err("boom".into()));
    assert!(failed.is_err());
    assert_eq!(cache.fresh_count(ttl, Instant::now()), 0);

    let fetched = cache
        .try_get_or_compute::<String>("network", ttl, || Ok(7))
        .unwrap();
    assert!(!fetched.is_hit());
    assert_eq!(fetched.into_value(), 7);
}

#[test]
fn test_concurrent_misses_compute_once() {
    let cache = Arc::new(TtlCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compute("processes", Duration::from_secs(60), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    42u64
                })
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
