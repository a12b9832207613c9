//! Per-key serialisation of loads and write-backs, with optional
//! write-behind.
//!
//! `IoSync` sits between the bounded cache and the disk store. Every disk
//! operation for a key runs under that key's entry in a [`KeyLockTable`], so
//! a write-back of an evicted cell can never interleave with a fresh load of
//! the same key. Keys are independent of each other.
//!
//! ## Write-behind
//!
//! ```text
//!   on_removal(k, cell)
//!        │  pending[k] = { cell, gen }
//!        ▼
//!   crossbeam bounded(max_io_queue_size) ──► writer threads (threadpool)
//!                                               │ lock(k)
//!                                               │ write pending[k]
//!                                               │ ok:  drop pending[k] if gen unchanged
//!                                               │ err: keep, mark failed
//!                                               ▼
//!   get(k) ── lock(k) ── pending[k]? ──yes──► return pending cell
//!                              └─no──► disk.get(k)
//! ```
//!
//! With zero writer threads every write runs synchronously on the caller.
//! A value whose write failed stays in the pending table: it remains
//! readable, and [`IoSync::flush`] retries it.
//!
//! ## Evicted cells still in use
//!
//! A consumer may hold an `Arc<Cell<T>>` past the cell's eviction. Such a
//! cell is written like any other, and also parked in a `held` table:
//!
//! - `get` hands the parked instance back before looking anywhere else, so a
//!   key never has two live instances.
//! - Once nothing outside the table references a parked cell, the next
//!   `put` or `flush` releases it and queues it again if it was modified
//!   after the eviction.
//! - `flush` also writes parked cells that are modified but still in use.
//!
//! Lock order is key lock, then `held`, then `pending`.

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use threadpool::ThreadPool;

use crate::cell::{Cell, Primitive};
use crate::ds::KeyLockTable;
use crate::error::CellCacheError;
use crate::metrics::{
    IoSyncMetrics, IoSyncMetricsRecorder, IoSyncMetricsSnapshot, MetricsSnapshotProvider,
};
use crate::traits::{CacheLoader, CacheRemover};

#[derive(Debug)]
struct PendingWrite<T> {
    cell: Arc<Cell<T>>,
    generation: u64,
    failed: Option<CellCacheError>,
}

#[derive(Debug)]
struct PendingTable<T> {
    entries: FxHashMap<u64, PendingWrite<T>>,
    next_generation: u64,
    /// Keys sent to writers and not yet processed.
    in_flight: usize,
}

#[derive(Debug)]
struct Shared<T, A> {
    store: A,
    locks: KeyLockTable<u64>,
    pending: Mutex<PendingTable<T>>,
    /// Evicted cells that a consumer still referenced at eviction.
    held: Mutex<FxHashMap<u64, Arc<Cell<T>>>>,
    drained: Condvar,
    metrics: IoSyncMetrics,
}

impl<T, A> Shared<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>> + CacheRemover<u64, Arc<Cell<T>>>,
{
    fn insert_pending(&self, key: u64, cell: Arc<Cell<T>>) {
        let mut table = self.pending.lock();
        let generation = table.next_generation;
        table.next_generation += 1;
        let replaced = table.entries.insert(
            key,
            PendingWrite {
                cell,
                generation,
                failed: None,
            },
        );
        if replaced.is_some() {
            self.metrics.record_write_superseded();
        }
    }

    /// Writes the pending value for `key`, if any. Caller holds the key lock.
    fn write_pending(&self, key: u64) -> Result<(), CellCacheError> {
        let (cell, generation) = {
            let table = self.pending.lock();
            match table.entries.get(&key) {
                Some(entry) => (Arc::clone(&entry.cell), entry.generation),
                None => return Ok(()),
            }
        };

        let result = self.store.on_removal(key, cell);

        let mut table = self.pending.lock();
        match &result {
            Ok(()) => {
                self.metrics.record_write_completed();
                if table
                    .entries
                    .get(&key)
                    .is_some_and(|e| e.generation == generation)
                {
                    table.entries.remove(&key);
                }
                trace!("write-behind of cell {key} done");
            }
            Err(e) => {
                self.metrics.record_write_failed();
                error!("write-back of cell {key} failed: {e}");
                if let Some(entry) = table.entries.get_mut(&key)
                    && entry.generation == generation
                {
                    entry.failed = Some(e.clone());
                }
            }
        }
        result
    }

    fn writer_loop(&self, keys: Receiver<u64>) {
        for key in keys.iter() {
            {
                let _guard = self.locks.lock(key);
                // Failures stay in the pending table for flush().
                let _ = self.write_pending(key);
            }
            let mut table = self.pending.lock();
            table.in_flight -= 1;
            if table.in_flight == 0 {
                self.drained.notify_all();
            }
        }
    }
}

/// Serialises per-key access to a disk store and optionally writes evicted
/// cells in the background.
pub struct IoSync<T, A> {
    shared: Arc<Shared<T, A>>,
    sender: Mutex<Option<Sender<u64>>>,
    pool: Mutex<Option<ThreadPool>>,
    num_threads: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, A> IoSync<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>> + CacheRemover<u64, Arc<Cell<T>>> + 'static,
{
    /// Synchronous mode: every write-back runs on the evicting thread.
    pub fn new(store: A) -> Self {
        Self::with_writers(store, 0, 1)
    }

    /// Write-behind mode with `num_threads` writers fed through a queue of
    /// at most `max_queue_size` keys. `num_threads == 0` is synchronous.
    pub fn with_writers(store: A, num_threads: usize, max_queue_size: usize) -> Self {
        let shared = Arc::new(Shared {
            store,
            locks: KeyLockTable::new(),
            pending: Mutex::new(PendingTable {
                entries: FxHashMap::default(),
                next_generation: 0,
                in_flight: 0,
            }),
            held: Mutex::new(FxHashMap::default()),
            drained: Condvar::new(),
            metrics: IoSyncMetrics::default(),
        });

        let (sender, pool) = if num_threads == 0 {
            (None, None)
        } else {
            let (tx, rx) = channel::bounded::<u64>(max_queue_size.max(1));
            let pool = ThreadPool::with_name("cellcache-io".to_string(), num_threads);
            for _ in 0..num_threads {
                let shared = Arc::clone(&shared);
                let rx = rx.clone();
                pool.execute(move || shared.writer_loop(rx));
            }
            debug!("started {num_threads} write-behind threads (queue {max_queue_size})");
            (Some(tx), Some(pool))
        };

        Self {
            shared,
            sender: Mutex::new(sender),
            pool: Mutex::new(pool),
            num_threads,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &A {
        &self.shared.store
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Number of values waiting to be written or whose write failed.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().entries.len()
    }

    pub fn has_pending(&self, key: u64) -> bool {
        self.shared.pending.lock().entries.contains_key(&key)
    }

    /// Number of evicted cells parked because a consumer still holds them.
    pub fn held_len(&self) -> usize {
        self.shared.held.lock().len()
    }

    pub fn is_held(&self, key: u64) -> bool {
        self.shared.held.lock().contains_key(&key)
    }

    /// Loads `key`, preferring a parked instance, then a pending (not yet
    /// written) value.
    pub fn get(&self, key: u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        let _guard = self.shared.locks.lock(key);
        if let Some(cell) = self.shared.held.lock().remove(&key) {
            self.shared.metrics.record_held_hit();
            trace!("cell {key} handed back while still in use");
            return Ok(cell);
        }
        if let Some(entry) = self.shared.pending.lock().entries.get(&key) {
            self.shared.metrics.record_pending_hit();
            trace!("cell {key} served from pending writes");
            return Ok(Arc::clone(&entry.cell));
        }
        self.shared.store.get(&key)
    }

    /// Hands an evicted cell to the writers (or writes it directly).
    pub fn put(&self, key: u64, cell: Arc<Cell<T>>) -> Result<(), CellCacheError> {
        // Failures stay in the pending table for flush().
        let _ = self.release_held();

        if Arc::strong_count(&cell) > 1 {
            trace!("cell {key} evicted while still referenced");
            self.shared.held.lock().insert(key, Arc::clone(&cell));
        }
        self.shared.insert_pending(key, cell);
        self.dispatch(key)
    }

    /// Sends `key` to a writer, or writes it on the caller when there are
    /// no writers.
    fn dispatch(&self, key: u64) -> Result<(), CellCacheError> {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            self.shared.pending.lock().in_flight += 1;
            self.shared.metrics.record_write_queued();
            if sender.send(key).is_ok() {
                return Ok(());
            }
            let mut table = self.shared.pending.lock();
            table.in_flight -= 1;
            if table.in_flight == 0 {
                self.shared.drained.notify_all();
            }
        }

        let _guard = self.shared.locks.lock(key);
        self.shared.write_pending(key)
    }

    /// Drops parked cells nobody references any more, queueing the ones
    /// modified since their eviction. Returns the first write failure.
    fn release_held(&self) -> Result<(), CellCacheError> {
        let released: Vec<u64> = self
            .shared
            .held
            .lock()
            .iter()
            .filter(|(_, cell)| Arc::strong_count(cell) == 1)
            .map(|(key, _)| *key)
            .collect();

        let mut first_error = None;
        for key in released {
            let requeued = {
                let _guard = self.shared.locks.lock(key);
                let cell = {
                    let mut held = self.shared.held.lock();
                    let unused = held.get(&key).is_some_and(|cell| Arc::strong_count(cell) == 1);
                    if unused { held.remove(&key) } else { None }
                };
                match cell {
                    Some(cell) if cell.is_dirty() => {
                        // Still under the key lock, so a get() sees it pending.
                        self.shared.insert_pending(key, cell);
                        true
                    }
                    _ => false,
                }
            };
            if requeued {
                debug!("cell {key} modified after eviction, writing again");
                if let Err(e) = self.dispatch(key) {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Blocks until every queued write has been attempted, then retries
    /// failed writes on the calling thread. Parked cells that were modified
    /// after their eviction are written as well.
    ///
    /// Returns the first persistence failure that remains.
    pub fn flush(&self) -> Result<(), CellCacheError> {
        let mut first_error = self.release_held().err();
        {
            let mut table = self.shared.pending.lock();
            while table.in_flight > 0 {
                self.shared.drained.wait(&mut table);
            }
        }

        let keys: Vec<u64> = self.shared.pending.lock().entries.keys().copied().collect();
        for key in keys {
            let _guard = self.shared.locks.lock(key);
            if let Err(e) = self.shared.write_pending(key) {
                first_error.get_or_insert(e);
            }
        }

        let modified: Vec<(u64, Arc<Cell<T>>)> = self
            .shared
            .held
            .lock()
            .iter()
            .filter(|(_, cell)| cell.is_dirty())
            .map(|(key, cell)| (*key, Arc::clone(cell)))
            .collect();
        for (key, cell) in modified {
            let _guard = self.shared.locks.lock(key);
            if let Err(e) = self.shared.store.persist(key, &cell) {
                error!("write-back of held cell {key} failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flushes, then stops and joins the writer threads. Later write-backs
    /// run synchronously.
    pub fn shutdown(&self) -> Result<(), CellCacheError> {
        let result = self.flush();
        self.sender.lock().take();
        if let Some(pool) = self.pool.lock().take() {
            pool.join();
            debug!("write-behind threads stopped");
        }
        result
    }
}

impl<T, A> CacheLoader<u64, Arc<Cell<T>>> for IoSync<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>> + CacheRemover<u64, Arc<Cell<T>>> + 'static,
{
    fn get(&self, key: &u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        IoSync::get(self, *key)
    }
}

impl<T, A> CacheRemover<u64, Arc<Cell<T>>> for IoSync<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>> + CacheRemover<u64, Arc<Cell<T>>> + 'static,
{
    fn on_removal(&self, key: u64, value: Arc<Cell<T>>) -> Result<(), CellCacheError> {
        self.put(key, value)
    }

    /// Writes synchronously; persisting is an explicit durability request.
    fn persist(&self, key: u64, value: &Arc<Cell<T>>) -> Result<(), CellCacheError> {
        let _guard = self.shared.locks.lock(key);
        self.shared.store.persist(key, value)
    }

    fn invalidate(&self, key: &u64) {
        let _guard = self.shared.locks.lock(*key);
        self.shared.held.lock().remove(key);
        if self.shared.pending.lock().entries.remove(key).is_some() {
            trace!("dropped pending write of cell {key}");
        }
        self.shared.store.invalidate(key);
    }
}

impl<T, A> MetricsSnapshotProvider<IoSyncMetricsSnapshot> for IoSync<T, A> {
    fn snapshot(&self) -> IoSyncMetricsSnapshot {
        let held = self.shared.held.lock().len();
        let pending = self.shared.pending.lock().entries.len();
        self.shared.metrics.snapshot_with(pending, held)
    }
}

impl<T, A> std::fmt::Debug for IoSync<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoSync")
            .field("num_threads", &self.num_threads)
            .field("pending", &self.shared.pending.lock().entries.len())
            .field("held", &self.shared.held.lock().len())
            .finish_non_exhaustive()
    }
}

impl<T, A> Drop for IoSync<T, A> {
    fn drop(&mut self) {
        // Disconnect so writers drain the queue and exit.
        self.sender.get_mut().take();
        if let Some(pool) = self.pool.get_mut().take() {
            pool.join();
        }
        let table = self.shared.pending.lock();
        if !table.entries.is_empty() {
            let failed = table.entries.values().filter(|e| e.failed.is_some()).count();
            error!(
                "dropping IoSync with {} unwritten cells ({failed} failed); call flush() first",
                table.entries.len()
            );
        }
        let held = self.shared.held.lock().len();
        if held > 0 {
            debug!("dropping IoSync while {held} evicted cells are still referenced");
        }
    }
}
