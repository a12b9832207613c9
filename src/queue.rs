//! Shared, prioritised fetch queue serviced by a fixed worker pool.
//!
//! ## Architecture
//!
//! ```text
//!   VolatileCellCache A ─┐ enqueue((A, key), level, front)
//!   VolatileCellCache B ─┤
//!                        ▼
//!   ┌────────────────────────────────────────────────────────────────┐
//!   │ Mutex<QueueState>                                              │
//!   │   tasks: PriorityQueue<TaskId, TaskPriority>                   │
//!   │   jobs:  FxHashMap<TaskId, Job>                                │
//!   └──────────────────────────┬─────────────────────────────────────┘
//!                              │ Condvar: work available
//!                              ▼
//!   threadpool "cellcache-fetch" × num_workers ── pop max ── run job
//! ```
//!
//! ## Ordering
//!
//! Level 0 is the most urgent. Within a level, tasks enqueued to the front
//! run newest-first and run before any task enqueued to the back; tasks
//! enqueued to the back run oldest-first. Re-enqueuing a queued task only
//! ever raises its priority.
//!
//! Cancellation removes a task that has not started. A task that a worker
//! already picked up runs to completion.

use std::cmp::Reverse;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;
use threadpool::ThreadPool;

use crate::error::{CellCacheError, ConfigError};
use crate::metrics::{
    MetricsSnapshotProvider, QueueMetrics, QueueMetricsRecorder, QueueMetricsSnapshot,
};

/// Identifies a task: the registering cache and the cell key.
pub type TaskId = (u64, u64);

type Job = Box<dyn FnOnce() -> Result<(), CellCacheError> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TaskPriority {
    level: Reverse<u8>,
    order: i64,
}

struct QueueState {
    tasks: PriorityQueue<TaskId, TaskPriority>,
    jobs: FxHashMap<TaskId, Job>,
    front_seq: i64,
    back_seq: i64,
    running: usize,
    shutdown: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    work_available: Condvar,
    idle: Condvar,
    metrics: QueueMetrics,
}

impl QueueInner {
    fn notify_if_idle(&self, state: &QueueState) {
        if state.running == 0 && state.tasks.is_empty() {
            self.idle.notify_all();
        }
    }

    fn worker_loop(&self) {
        loop {
            let job = {
                let mut state = self.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some((id, _)) = state.tasks.pop() {
                        if let Some(job) = state.jobs.remove(&id) {
                            state.running += 1;
                            trace!("fetching cell {} for cache {}", id.1, id.0);
                            break job;
                        }
                        continue;
                    }
                    self.work_available.wait(&mut state);
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.metrics.record_task_failure();
                    error!("background load failed: {e}");
                }
                Err(_) => {
                    self.metrics.record_task_failure();
                    error!("background load panicked");
                }
            }
            self.metrics.record_executed();

            let mut state = self.state.lock();
            state.running -= 1;
            self.notify_if_idle(&state);
        }
    }
}

/// Prioritised task queue with its own worker threads, shared by every
/// volatile cache that holds an `Arc` to it.
pub struct SharedQueue {
    inner: Arc<QueueInner>,
    pool: Mutex<Option<ThreadPool>>,
    num_workers: usize,
    num_priorities: u8,
    next_cache_id: AtomicU64,
}

impl SharedQueue {
    /// Starts `num_workers` fetcher threads; tasks may use priority levels
    /// `0..num_priorities`.
    pub fn new(num_workers: usize, num_priorities: u8) -> Result<Self, ConfigError> {
        if num_workers == 0 {
            return Err(ConfigError::new("fetch queue needs at least one worker"));
        }
        if num_priorities == 0 {
            return Err(ConfigError::new("fetch queue needs at least one priority level"));
        }

        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                tasks: PriorityQueue::new(),
                jobs: FxHashMap::default(),
                front_seq: 0,
                back_seq: 0,
                running: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
            metrics: QueueMetrics::default(),
        });

        let pool = ThreadPool::with_name("cellcache-fetch".to_string(), num_workers);
        for _ in 0..num_workers {
            let inner = Arc::clone(&inner);
            pool.execute(move || inner.worker_loop());
        }
        debug!("started {num_workers} fetcher threads with {num_priorities} priority levels");

        Ok(Self {
            inner,
            pool: Mutex::new(Some(pool)),
            num_workers,
            num_priorities,
            next_cache_id: AtomicU64::new(0),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn num_priorities(&self) -> u8 {
        self.num_priorities
    }

    /// Hands out a fresh id for a cache that will enqueue tasks.
    pub fn register(&self) -> u64 {
        self.next_cache_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of queued (not yet started) tasks.
    pub fn len(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_queued(&self, id: &TaskId) -> bool {
        self.inner.state.lock().tasks.get(id).is_some()
    }

    /// Queues `job` under `id`. If `id` is already queued the existing job
    /// is kept and its priority raised when the new request is more urgent.
    ///
    /// Levels beyond the configured range are clamped to the least urgent.
    pub fn enqueue<F>(
        &self,
        id: TaskId,
        level: u8,
        to_front: bool,
        job: F,
    ) -> Result<(), CellCacheError>
    where
        F: FnOnce() -> Result<(), CellCacheError> + Send + 'static,
    {
        let level = level.min(self.num_priorities - 1);
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err(CellCacheError::Shutdown("fetch queue"));
        }

        // Front tasks count up (newest pops first), back tasks count down
        // (oldest pops first); every front task outranks every back task.
        let order = if to_front {
            state.front_seq += 1;
            state.front_seq
        } else {
            state.back_seq += 1;
            -state.back_seq
        };
        let priority = TaskPriority {
            level: Reverse(level),
            order,
        };

        if state.jobs.contains_key(&id) {
            let current = state.tasks.get_priority(&id).copied();
            if current.is_some_and(|c| priority > c) {
                state.tasks.change_priority(&id, priority);
                self.inner.metrics.record_priority_raised();
            }
            return Ok(());
        }

        state.tasks.push(id, priority);
        state.jobs.insert(id, Box::new(job));
        self.inner.metrics.record_enqueued();
        drop(state);
        self.inner.work_available.notify_one();
        Ok(())
    }

    /// Removes a queued task. Returns `false` if it was not queued.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.tasks.remove(id).is_some();
        state.jobs.remove(id);
        if removed {
            self.inner.metrics.record_cancelled(1);
        }
        self.inner.notify_if_idle(&state);
        removed
    }

    /// Cancels every queued task enqueued by cache `cache_id`.
    pub fn cancel_cache(&self, cache_id: u64) -> usize {
        let mut state = self.inner.state.lock();
        let ids: Vec<TaskId> = state
            .tasks
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| id.0 == cache_id)
            .collect();
        for id in &ids {
            state.tasks.remove(id);
            state.jobs.remove(id);
        }
        self.inner.metrics.record_cancelled(ids.len());
        self.inner.notify_if_idle(&state);
        ids.len()
    }

    /// Cancels every queued task.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        let count = state.tasks.len();
        state.tasks.clear();
        state.jobs.clear();
        self.inner.metrics.record_cancelled(count);
        if count > 0 {
            trace!("cleared {count} queued fetches");
        }
        self.inner.notify_if_idle(&state);
        count
    }

    /// Blocks until no task is queued or running.
    pub fn wait_idle(&self) {
        let mut state = self.inner.state.lock();
        while !state.shutdown && (state.running > 0 || !state.tasks.is_empty()) {
            self.inner.idle.wait(&mut state);
        }
    }

    /// Cancels queued tasks, lets running tasks finish and joins the
    /// workers. Later `enqueue` calls fail with [`CellCacheError::Shutdown`].
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let count = state.tasks.len();
            state.tasks.clear();
            state.jobs.clear();
            self.inner.metrics.record_cancelled(count);
        }
        self.inner.work_available.notify_all();
        self.inner.idle.notify_all();
        if let Some(pool) = self.pool.lock().take() {
            pool.join();
        }
        debug!("fetch queue shut down");
    }
}

impl MetricsSnapshotProvider<QueueMetricsSnapshot> for SharedQueue {
    fn snapshot(&self) -> QueueMetricsSnapshot {
        let queued = self.inner.state.lock().tasks.len();
        self.inner.metrics.snapshot_with(queued, self.num_workers)
    }
}

impl std::fmt::Debug for SharedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedQueue")
            .field("num_workers", &self.num_workers)
            .field("num_priorities", &self.num_priorities)
            .field("queued", &self.len())
            .finish()
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
