// ==============================================
// BOUNDED CACHE TESTS (integration)
// ==============================================
//
// Capacity, eviction accounting and load coalescing of the in-memory cache,
// checked for every replacement policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use cellcache::cache::LoaderRemoverCache;
use cellcache::error::CellCacheError;
use cellcache::policy::EvictionPolicy;
use cellcache::traits::{CacheLoader, CacheRemover};

const POLICIES: [EvictionPolicy; 3] = [
    EvictionPolicy::Lru,
    EvictionPolicy::Fifo,
    EvictionPolicy::Clock,
];

#[derive(Default)]
struct SlowLoader {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CacheLoader<u64, Arc<Vec<u64>>> for SlowLoader {
    fn get(&self, key: &u64) -> Result<Arc<Vec<u64>>, CellCacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(Arc::new(vec![*key; 16]))
    }
}

#[derive(Default)]
struct TallyRemover {
    removals: Mutex<HashMap<u64, usize>>,
}

impl TallyRemover {
    fn total(&self) -> usize {
        self.removals.lock().unwrap().values().sum()
    }

    fn max_per_key(&self) -> usize {
        self.removals.lock().unwrap().values().copied().max().unwrap_or(0)
    }
}

impl CacheRemover<u64, Arc<Vec<u64>>> for TallyRemover {
    fn on_removal(&self, key: u64, value: Arc<Vec<u64>>) -> Result<(), CellCacheError> {
        assert!(value.iter().all(|&v| v == key), "removed value does not belong to {key}");
        *self.removals.lock().unwrap().entry(key).or_default() += 1;
        Ok(())
    }
}

type TestCache = LoaderRemoverCache<u64, Arc<Vec<u64>>, SlowLoader, TallyRemover>;

fn cache(capacity: usize, policy: EvictionPolicy) -> TestCache {
    LoaderRemoverCache::new(capacity, policy, SlowLoader::default(), TallyRemover::default()).unwrap()
}

#[test]
fn one_hundred_fifty_keys_into_one_hundred_slots() {
    for policy in POLICIES {
        let cache = cache(100, policy);
        for key in 0..150 {
            assert_eq!(cache.get(key).unwrap()[0], key);
            assert!(cache.len() <= 100, "{policy:?} exceeded capacity");
        }
        assert_eq!(cache.len(), 100, "{policy:?}");
        assert_eq!(cache.remover().total(), 50, "{policy:?}");
        assert_eq!(cache.remover().max_per_key(), 1, "{policy:?} evicted a key twice");
        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 150);

        let metrics = cellcache::metrics::MetricsSnapshotProvider::snapshot(&cache);
        assert_eq!(metrics.evictions, 50);
        assert_eq!(metrics.misses, 150);
        assert_eq!(metrics.resident, 100);
        cache.check_invariants().unwrap();
    }
}

#[test]
fn evicted_keys_reload_and_are_evicted_again_once() {
    for policy in POLICIES {
        let cache = cache(10, policy);
        for round in 0..3 {
            for key in 0..20 {
                cache.get(key).unwrap();
            }
            cache.check_invariants().unwrap_or_else(|e| panic!("{policy:?} round {round}: {e}"));
        }
        // Each insert beyond the first ten evicts exactly one value.
        assert_eq!(cache.remover().total(), 60 - 10, "{policy:?}");
        assert_eq!(cache.len(), 10);
    }
}

#[test]
fn lru_keeps_the_recently_used_working_set() {
    let cache = cache(4, EvictionPolicy::Lru);
    for key in 0..4 {
        cache.get(key).unwrap();
    }
    cache.get(0).unwrap();
    cache.get(1).unwrap();
    cache.get(4).unwrap();
    cache.get(5).unwrap();
    assert!(cache.contains(&0));
    assert!(cache.contains(&1));
    assert!(!cache.contains(&2));
    assert!(!cache.contains(&3));
}

#[test]
fn concurrent_requests_for_one_key_load_once() {
    let loader = SlowLoader {
        calls: AtomicUsize::new(0),
        delay: Some(Duration::from_millis(50)),
    };
    let cache = Arc::new(
        LoaderRemoverCache::new(8, EvictionPolicy::Lru, loader, TallyRemover::default()).unwrap(),
    );
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get(42).unwrap()
            })
        })
        .collect();
    let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 1);
    assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn concurrent_mixed_workload_respects_capacity() {
    for policy in POLICIES {
        let cache = Arc::new(cache(16, policy));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let key = (i * 7 + t * 13) % 64;
                        assert_eq!(cache.get(key).unwrap()[0], key);
                        assert!(cache.len() <= 16);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        cache.check_invariants().unwrap();
        let loads = cache.loader().calls.load(Ordering::SeqCst);
        // Every load beyond the resident set was matched by one eviction.
        assert_eq!(loads - cache.len(), cache.remover().total(), "{policy:?}");
    }
}
