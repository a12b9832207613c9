//! Bounded, coalescing loader/remover cache.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │ LoaderRemoverCache<K, V, L, R>                                    │
//!   │                                                                   │
//!   │  Mutex<State>                                                     │
//!   │   ├─ slots: FxHashMap<K, Slot<V>>                                 │
//!   │   │     Loading(latch) ─► Present(V) ─► Evicting(latch) ─► gone   │
//!   │   ├─ policy: Box<dyn ReplacementPolicy<K>>  (Present keys only)   │
//!   │   └─ resident: usize                                              │
//!   │                                                                   │
//!   │  loader: L   (runs outside the lock)                              │
//!   │  remover: R  (runs outside the lock)                              │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Slot lifecycle
//!
//! | From      | Event                          | To        |
//! |-----------|--------------------------------|-----------|
//! | absent    | `get` miss                     | Loading   |
//! | Loading   | load ok                        | Present   |
//! | Loading   | load err                       | absent    |
//! | Present   | chosen as victim               | Evicting  |
//! | Evicting  | remover returned               | absent    |
//! | Present   | `invalidate`                   | absent    |
//!
//! A `get` that finds `Loading` waits on the latch and receives the same
//! result as the loading thread, errors included, so N concurrent misses on
//! one key cost one load. A `get` that finds `Evicting` waits until the
//! remover is done and then loads again, so a reload always observes the
//! completed write-back.
//!
//! Remover failures are logged and counted; they never fail the `get` that
//! triggered the eviction.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::error::{CellCacheError, ConfigError, InvariantError};
use crate::metrics::{
    CacheMetrics, CacheMetricsRecorder, CacheMetricsSnapshot, MetricsSnapshotProvider,
};
use crate::policy::EvictionPolicy;
use crate::traits::{CacheLoader, CacheRemover, ReplacementPolicy};

/// One-shot value that any number of threads can wait for.
#[derive(Debug)]
struct Latch<R> {
    value: Mutex<Option<R>>,
    ready: Condvar,
}

impl<R: Clone> Latch<R> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn set(&self, value: R) {
        *self.value.lock() = Some(value);
        self.ready.notify_all();
    }

    fn wait(&self) -> R {
        let mut value = self.value.lock();
        loop {
            if let Some(v) = value.as_ref() {
                return v.clone();
            }
            self.ready.wait(&mut value);
        }
    }
}

type LoadLatch<V> = Latch<Result<V, CellCacheError>>;

#[derive(Debug)]
enum Slot<V> {
    Loading(Arc<LoadLatch<V>>),
    Present(V),
    Evicting(Arc<Latch<()>>),
}

struct State<K, V> {
    slots: FxHashMap<K, Slot<V>>,
    policy: Option<Box<dyn ReplacementPolicy<K>>>,
    resident: usize,
}

/// A cache that loads absent keys through `L` and hands evicted values to
/// `R`.
pub struct LoaderRemoverCache<K, V, L, R> {
    state: Mutex<State<K, V>>,
    capacity: Option<usize>,
    loader: L,
    remover: R,
    metrics: CacheMetrics,
}

/// Removes a `Loading` slot if the loader unwinds.
struct LoadingGuard<'a, K, V, L, R>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send,
{
    cache: &'a LoaderRemoverCache<K, V, L, R>,
    key: K,
    latch: &'a Arc<LoadLatch<V>>,
    armed: bool,
}

impl<K, V, L, R> Drop for LoadingGuard<'_, K, V, L, R>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send,
{
    fn drop(&mut self) {
        if self.armed {
            self.cache.state.lock().slots.remove(&self.key);
            self.latch.set(Err(CellCacheError::Panicked(format!(
                "load of {:?} unwound",
                self.key
            ))));
        }
    }
}

impl<K, V, L, R> LoaderRemoverCache<K, V, L, R>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    V: Clone + Send,
    L: CacheLoader<K, V>,
    R: CacheRemover<K, V>,
{
    /// Creates a cache holding at most `capacity` values.
    pub fn new(
        capacity: usize,
        policy: EvictionPolicy,
        loader: L,
        remover: R,
    ) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("cache capacity must be greater than zero"));
        }
        Ok(Self {
            state: Mutex::new(State {
                slots: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                policy: Some(policy.build(capacity)),
                resident: 0,
            }),
            capacity: Some(capacity),
            loader,
            remover,
            metrics: CacheMetrics::default(),
        })
    }

    /// Creates a cache that never evicts.
    pub fn unbounded(loader: L, remover: R) -> Self {
        Self {
            state: Mutex::new(State {
                slots: FxHashMap::default(),
                policy: None,
                resident: 0,
            }),
            capacity: None,
            loader,
            remover,
            metrics: CacheMetrics::default(),
        }
    }

    /// `None` for unbounded caches.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of resident (present) values.
    pub fn len(&self) -> usize {
        self.state.lock().resident
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        matches!(self.state.lock().slots.get(key), Some(Slot::Present(_)))
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn remover(&self) -> &R {
        &self.remover
    }

    pub fn policy_name(&self) -> &'static str {
        self.state
            .lock()
            .policy
            .as_ref()
            .map_or("unbounded", |p| p.name())
    }

    /// Returns the value for `key`, loading it if absent.
    pub fn get(&self, key: K) -> Result<V, CellCacheError> {
        loop {
            let mut state = self.state.lock();
            match state.slots.get(&key) {
                Some(Slot::Present(value)) => {
                    let value = value.clone();
                    if let Some(policy) = state.policy.as_mut() {
                        policy.record_access(&key);
                    }
                    self.metrics.record_hit();
                    return Ok(value);
                }
                Some(Slot::Loading(latch)) => {
                    let latch = Arc::clone(latch);
                    drop(state);
                    self.metrics.record_coalesced_wait();
                    trace!("waiting for in-flight load of {key:?}");
                    return latch.wait();
                }
                Some(Slot::Evicting(latch)) => {
                    let latch = Arc::clone(latch);
                    drop(state);
                    trace!("waiting for eviction of {key:?} before reloading");
                    latch.wait();
                }
                None => {
                    let latch = Arc::new(Latch::new());
                    state.slots.insert(key, Slot::Loading(Arc::clone(&latch)));
                    drop(state);
                    self.metrics.record_miss();
                    return self.load(key, &latch);
                }
            }
        }
    }

    /// Returns the value for `key` only if it is resident.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let value = match state.slots.get(key) {
            Some(Slot::Present(value)) => value.clone(),
            _ => {
                self.metrics.record_miss();
                return None;
            }
        };
        if let Some(policy) = state.policy.as_mut() {
            policy.record_access(key);
        }
        self.metrics.record_hit();
        Some(value)
    }

    fn load(&self, key: K, latch: &Arc<LoadLatch<V>>) -> Result<V, CellCacheError> {
        let mut guard = LoadingGuard {
            cache: self,
            key,
            latch,
            armed: true,
        };
        let result = self.loader.get(&key);
        guard.armed = false;

        let victims = {
            let mut state = self.state.lock();
            match &result {
                Ok(value) => {
                    state.slots.insert(key, Slot::Present(value.clone()));
                    state.resident += 1;
                    if let Some(policy) = state.policy.as_mut() {
                        policy.record_insert(key);
                    }
                    self.metrics.record_load();
                    self.select_victims(&mut state, key)
                }
                Err(e) => {
                    state.slots.remove(&key);
                    self.metrics.record_load_failure();
                    debug!("load of {key:?} failed: {e}");
                    Vec::new()
                }
            }
        };

        latch.set(result.clone());

        for (victim, value, done) in victims {
            self.evict(victim, value, &done);
        }
        result
    }

    /// Marks victims `Evicting` until the cache is back within capacity.
    ///
    /// `loaded` is the key whose load triggered the sweep; it is handed to
    /// the caller right after, so it is never chosen.
    fn select_victims(
        &self,
        state: &mut State<K, V>,
        loaded: K,
    ) -> Vec<(K, V, Arc<Latch<()>>)> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };
        let mut victims = Vec::new();
        let mut spared = false;
        while state.resident > capacity {
            let Some(victim) = state.policy.as_mut().and_then(|p| p.pop_victim()) else {
                break;
            };
            if victim == loaded {
                spared = true;
                continue;
            }
            let done = Arc::new(Latch::new());
            match state
                .slots
                .insert(victim, Slot::Evicting(Arc::clone(&done)))
            {
                Some(Slot::Present(value)) => {
                    state.resident -= 1;
                    victims.push((victim, value, done));
                }
                Some(other) => {
                    // Policies only track present keys.
                    state.slots.insert(victim, other);
                }
                None => {
                    state.slots.remove(&victim);
                }
            }
        }
        if spared && let Some(policy) = state.policy.as_mut() {
            policy.record_insert(loaded);
        }
        victims
    }

    fn evict(&self, key: K, value: V, done: &Latch<()>) {
        trace!("evicting {key:?}");
        if let Err(e) = self.remover.on_removal(key, value) {
            self.metrics.record_removal_failure();
            warn!("remover failed for evicted {key:?}: {e}");
        }
        self.metrics.record_eviction();
        {
            let mut state = self.state.lock();
            if matches!(state.slots.get(&key), Some(Slot::Evicting(_))) {
                state.slots.remove(&key);
            }
        }
        done.set(());
    }

    /// Hands every resident value to the remover's `persist` without
    /// evicting it. Returns the first failure after trying all values.
    pub fn persist_all(&self) -> Result<(), CellCacheError> {
        let resident: Vec<(K, V)> = {
            let state = self.state.lock();
            state
                .slots
                .iter()
                .filter_map(|(k, slot)| match slot {
                    Slot::Present(v) => Some((*k, v.clone())),
                    _ => None,
                })
                .collect()
        };

        let mut first_error = None;
        for (key, value) in &resident {
            self.metrics.record_persist();
            if let Err(e) = self.remover.persist(*key, value) {
                warn!("persisting {key:?} failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        debug!("persisted {} resident values", resident.len());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops `key` without write-back. In-flight loads are not affected.
    ///
    /// The remover forgets any write-back it still holds for `key` either
    /// way. Returns `false` if `key` was not resident.
    pub fn invalidate(&self, key: &K) -> bool {
        let resident = {
            let mut state = self.state.lock();
            let resident = matches!(state.slots.get(key), Some(Slot::Present(_)));
            if resident {
                state.slots.remove(key);
                state.resident -= 1;
                if let Some(policy) = state.policy.as_mut() {
                    policy.remove(key);
                }
            }
            resident
        };
        self.remover.invalidate(key);
        if resident {
            self.metrics.record_invalidation();
        }
        resident
    }

    /// Drops every resident value without write-back.
    pub fn invalidate_all(&self) {
        let keys: Vec<K> = {
            let mut state = self.state.lock();
            let keys: Vec<K> = state
                .slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Present(_)))
                .map(|(k, _)| *k)
                .collect();
            for key in &keys {
                state.slots.remove(key);
            }
            state.resident = 0;
            if let Some(policy) = state.policy.as_mut() {
                policy.clear();
            }
            keys
        };
        for key in &keys {
            self.remover.invalidate(key);
            self.metrics.record_invalidation();
        }
        debug!("invalidated {} values", keys.len());
    }

    /// Checks that the resident count, the slot map and the policy agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let state = self.state.lock();
        let present = state
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Present(_)))
            .count();
        if present != state.resident {
            return Err(InvariantError::new(format!(
                "resident counter {} != present slots {}",
                state.resident, present
            )));
        }
        if let Some(capacity) = self.capacity
            && state.resident > capacity
        {
            return Err(InvariantError::new(format!(
                "{} resident values exceed capacity {}",
                state.resident, capacity
            )));
        }
        if let Some(policy) = state.policy.as_ref()
            && policy.len() != state.resident
        {
            return Err(InvariantError::new(format!(
                "policy tracks {} keys, {} resident",
                policy.len(),
                state.resident
            )));
        }
        Ok(())
    }
}

impl<K, V, L, R> MetricsSnapshotProvider<CacheMetricsSnapshot> for LoaderRemoverCache<K, V, L, R> {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        let resident = self.state.lock().resident;
        self.metrics
            .snapshot_with(resident, self.capacity.unwrap_or(usize::MAX))
    }
}

impl<K, V, L, R> Debug for LoaderRemoverCache<K, V, L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoaderRemoverCache")
            .field("capacity", &self.capacity)
            .field("resident", &state.resident)
            .field("slots", &state.slots.len())
            .finish_non_exhaustive()
    }
}
