//! Non-blocking access to a bounded cell cache.
//!
//! ```text
//!   get(key, hints)
//!     │
//!     ├─ resident ─────────────────────────────────► real cell
//!     │
//!     ├─ Blocking  ── recorded failure? ─yes─► Err (consumed)
//!     │                      └─no──► cancel queued fetch, cache.get(key)
//!     │
//!     ├─ Volatile  ── recorded failure? ─yes─► Err (kept)
//!     │                      └─no──► enqueue fetch, placeholder
//!     │
//!     └─ DontLoad  ────────────────────────────────► placeholder
//! ```
//!
//! Background fetches run on a [`SharedQueue`]. A fetch that fails records
//! its error against the key, so the failure is observed by the next
//! blocking `get` instead of a caller polling placeholders forever.

use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::cache::LoaderRemoverCache;
use crate::cell::{Cell, Primitive};
use crate::error::CellCacheError;
use crate::grid::CellGrid;
use crate::queue::SharedQueue;
use crate::traits::{CacheLoader, CacheRemover, EmptyPlaceholder, PlaceholderFactory};

/// How a `get` behaves when the cell is not resident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadingStrategy {
    /// Return a placeholder and load in the background.
    #[default]
    Volatile,
    /// Load on the calling thread and wait.
    Blocking,
    /// Return a placeholder and do not load.
    DontLoad,
}

/// Per-request loading hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHints {
    pub strategy: LoadingStrategy,
    /// 0 is the most urgent level.
    pub priority: u8,
    pub enqueue_to_front: bool,
}

impl CacheHints {
    pub fn new(strategy: LoadingStrategy, priority: u8, enqueue_to_front: bool) -> Self {
        Self {
            strategy,
            priority,
            enqueue_to_front,
        }
    }

    pub fn blocking() -> Self {
        Self::new(LoadingStrategy::Blocking, 0, false)
    }

    pub fn volatile(priority: u8) -> Self {
        Self::new(LoadingStrategy::Volatile, priority, true)
    }

    pub fn dont_load() -> Self {
        Self::new(LoadingStrategy::DontLoad, 0, false)
    }
}

impl Default for CacheHints {
    fn default() -> Self {
        Self::volatile(0)
    }
}

type CellCache<T, L, R> = LoaderRemoverCache<u64, Arc<Cell<T>>, L, R>;

/// Volatile view over a bounded cell cache.
pub struct VolatileCellCache<T, L, R> {
    cache: Arc<CellCache<T, L, R>>,
    grid: Arc<CellGrid>,
    queue: Arc<SharedQueue>,
    cache_id: u64,
    placeholders: Arc<dyn PlaceholderFactory<T>>,
    failures: Arc<Mutex<FxHashMap<u64, CellCacheError>>>,
}

impl<T, L, R> VolatileCellCache<T, L, R>
where
    T: Primitive,
    L: CacheLoader<u64, Arc<Cell<T>>> + 'static,
    R: CacheRemover<u64, Arc<Cell<T>>> + 'static,
{
    pub fn new(cache: Arc<CellCache<T, L, R>>, grid: Arc<CellGrid>, queue: Arc<SharedQueue>) -> Self {
        Self::with_placeholders(cache, grid, queue, Arc::new(EmptyPlaceholder))
    }

    pub fn with_placeholders(
        cache: Arc<CellCache<T, L, R>>,
        grid: Arc<CellGrid>,
        queue: Arc<SharedQueue>,
        placeholders: Arc<dyn PlaceholderFactory<T>>,
    ) -> Self {
        let cache_id = queue.register();
        debug!("volatile cache {cache_id} attached to fetch queue");
        Self {
            cache,
            grid,
            queue,
            cache_id,
            placeholders,
            failures: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    pub fn cache(&self) -> &Arc<CellCache<T, L, R>> {
        &self.cache
    }

    pub fn grid(&self) -> &Arc<CellGrid> {
        &self.grid
    }

    pub fn queue(&self) -> &Arc<SharedQueue> {
        &self.queue
    }

    /// Returns the cell for `key` or a placeholder, following `hints`.
    pub fn get(&self, key: u64, hints: CacheHints) -> Result<Arc<Cell<T>>, CellCacheError> {
        if key >= self.grid.num_cells() {
            return Err(CellCacheError::out_of_bounds(format!("cell key {key}")));
        }
        if let Some(cell) = self.cache.get_if_present(&key) {
            return Ok(cell);
        }

        match hints.strategy {
            LoadingStrategy::Blocking => {
                if let Some(e) = self.failures.lock().remove(&key) {
                    return Err(e);
                }
                self.queue.cancel(&(self.cache_id, key));
                self.cache.get(key)
            }
            LoadingStrategy::Volatile => {
                if let Some(e) = self.failures.lock().get(&key) {
                    return Err(e.clone());
                }
                self.enqueue(key, hints)?;
                self.placeholders.create(&self.grid, key)
            }
            LoadingStrategy::DontLoad => self.placeholders.create(&self.grid, key),
        }
    }

    fn enqueue(&self, key: u64, hints: CacheHints) -> Result<(), CellCacheError> {
        let cache = Arc::clone(&self.cache);
        let failures = Arc::clone(&self.failures);
        self.queue.enqueue(
            (self.cache_id, key),
            hints.priority,
            hints.enqueue_to_front,
            move || match cache.get(key) {
                Ok(_) => {
                    failures.lock().remove(&key);
                    Ok(())
                }
                Err(e) => {
                    failures.lock().insert(key, e.clone());
                    Err(e)
                }
            },
        )?;
        trace!("queued fetch of cell {key} at level {}", hints.priority);
        Ok(())
    }

    /// Cancels a queued fetch of `key`. Returns `false` if it was not queued.
    pub fn cancel(&self, key: u64) -> bool {
        self.queue.cancel(&(self.cache_id, key))
    }

    /// Cancels every queued fetch issued by this cache.
    pub fn clear_queue(&self) -> usize {
        self.queue.cancel_cache(self.cache_id)
    }

    /// The error recorded by a failed background fetch of `key`, if any.
    pub fn failure(&self, key: u64) -> Option<CellCacheError> {
        self.failures.lock().get(&key).cloned()
    }
}

impl<T, L, R> std::fmt::Debug for VolatileCellCache<T, L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileCellCache")
            .field("cache_id", &self.cache_id)
            .field("failures", &self.failures.lock().len())
            .finish_non_exhaustive()
    }
}
