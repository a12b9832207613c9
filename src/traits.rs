//! # Cache Trait Hierarchy
//!
//! The seams between the layers of the cell cache. Each layer only sees the
//! trait of the layer below it, which is how the same bounded cache can sit on
//! top of a bare loader in tests and on top of the full disk stack in
//! production.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────┐   get(key)    ┌──────────────────────────┐
//!   │   LoaderRemoverCache     │ ────────────► │    CacheLoader<K, V>     │
//!   │   (bounded, policy)      │               │  get(&K) → Result<V>     │
//!   │                          │  on_removal   ├──────────────────────────┤
//!   │                          │ ────────────► │    CacheRemover<K, V>    │
//!   └────────────┬─────────────┘               │  on_removal(K, V)        │
//!                │ victim order                │  persist(K, &V)          │
//!                ▼                             │  invalidate(&K)          │
//!   ┌──────────────────────────┐               └────────────┬─────────────┘
//!   │  ReplacementPolicy<K>    │                            │ implemented by
//!   │  record_insert / access  │                            ▼
//!   │  remove / pop_victim     │               ┌──────────────────────────┐
//!   └──────────────────────────┘               │ IoSync ─► DiskCellCache  │
//!                                              │      ─► CellCacheLoader  │
//!                                              └────────────┬─────────────┘
//!                                                           │ fill
//!                                                           ▼
//!                                              ┌──────────────────────────┐
//!                                              │     CellLoader<T>        │
//!                                              │  load(&mut CellView<T>)  │
//!                                              └──────────────────────────┘
//! ```
//!
//! ## Trait Summary
//!
//! | Trait                  | Purpose                                            |
//! |------------------------|----------------------------------------------------|
//! | `CacheLoader`          | Produce the value for an absent key                |
//! | `CacheRemover`         | Receive evicted values (write-back)                |
//! | `CellLoader`           | Application callback that fills one cell           |
//! | `ReplacementPolicy`    | Victim ordering for the bounded cache              |
//! | `PlaceholderFactory`   | Stand-in cells for volatile reads                  |
//!
//! ## Thread Safety
//!
//! Loaders, removers and cell loaders are shared across fetcher and writer
//! threads, so they require `Send + Sync`. Replacement policies are always
//! driven under the cache's map lock and need neither.

use std::error::Error;
use std::sync::Arc;

use crate::cell::{Cell, CellView, Primitive};
use crate::error::CellCacheError;
use crate::grid::CellGrid;

/// Produces the value for a key that is not cached.
///
/// Implementations must be idempotent: loading the same key twice with no
/// intervening mutation yields equivalent values, because an evicted key may
/// be loaded again.
///
/// # Example
///
/// ```
/// use cellcache::error::CellCacheError;
/// use cellcache::traits::CacheLoader;
///
/// struct Squares;
///
/// impl CacheLoader<u64, u64> for Squares {
///     fn get(&self, key: &u64) -> Result<u64, CellCacheError> {
///         Ok(key * key)
///     }
/// }
///
/// assert_eq!(Squares.get(&12).unwrap(), 144);
/// ```
pub trait CacheLoader<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<V, CellCacheError>;
}

/// Receives values that leave the cache.
pub trait CacheRemover<K, V>: Send + Sync {
    /// Called once for every evicted entry, after it left the cache map and
    /// before a new load of the same key may observe storage.
    fn on_removal(&self, key: K, value: V) -> Result<(), CellCacheError>;

    /// Writes a still-resident value without evicting it.
    ///
    /// The default treats persisting like a removal of a clone.
    fn persist(&self, key: K, value: &V) -> Result<(), CellCacheError>
    where
        V: Clone,
    {
        self.on_removal(key, value.clone())
    }

    /// Forgets any write-back still pending for `key`.
    fn invalidate(&self, _key: &K) {}
}

impl<K, V, L> CacheLoader<K, V> for Arc<L>
where
    L: CacheLoader<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<V, CellCacheError> {
        (**self).get(key)
    }
}

impl<K, V, R> CacheRemover<K, V> for Arc<R>
where
    R: CacheRemover<K, V> + ?Sized,
{
    fn on_removal(&self, key: K, value: V) -> Result<(), CellCacheError> {
        (**self).on_removal(key, value)
    }

    fn persist(&self, key: K, value: &V) -> Result<(), CellCacheError>
    where
        V: Clone,
    {
        (**self).persist(key, value)
    }

    fn invalidate(&self, key: &K) {
        (**self).invalidate(key)
    }
}

/// Remover that drops values without writing them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardRemover;

impl<K, V> CacheRemover<K, V> for DiscardRemover {
    fn on_removal(&self, _key: K, _value: V) -> Result<(), CellCacheError> {
        Ok(())
    }
}

/// Application callback that fills one cell.
///
/// The view exposes the cell's bounds, its (possibly truncated) size and a
/// zeroed element buffer. Any error returned becomes a
/// [`CellCacheError::Load`] for the requesting caller.
///
/// # Example
///
/// ```
/// use cellcache::cell::CellView;
/// use cellcache::error::LoadFailure;
/// use cellcache::traits::CellLoader;
///
/// struct Ramp;
///
/// impl CellLoader<u32> for Ramp {
///     type Error = LoadFailure;
///
///     fn load(&self, cell: &mut CellView<'_, u32>) -> Result<(), LoadFailure> {
///         cell.for_each_mut(|pos, v| *v = pos[0] as u32);
///         Ok(())
///     }
/// }
/// ```
pub trait CellLoader<T: Primitive>: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn load(&self, cell: &mut CellView<'_, T>) -> Result<(), Self::Error>;
}

/// Victim ordering for a bounded cache.
///
/// The cache calls `record_insert` when a key becomes resident,
/// `record_access` on every hit, `remove` when a key leaves for any reason
/// other than eviction, and `pop_victim` when it needs room.
pub trait ReplacementPolicy<K>: Send {
    fn record_insert(&mut self, key: K);

    fn record_access(&mut self, key: &K);

    /// Stops tracking `key`; returns `false` if it was not tracked.
    fn remove(&mut self, key: &K) -> bool;

    /// Chooses and stops tracking the next victim.
    fn pop_victim(&mut self) -> Option<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Short policy name used in logs and metrics labels.
    fn name(&self) -> &'static str;
}

/// Produces stand-in cells for volatile reads of absent keys.
pub trait PlaceholderFactory<T: Primitive>: Send + Sync {
    fn create(&self, grid: &CellGrid, key: u64) -> Result<Arc<Cell<T>>, CellCacheError>;
}

/// Zero-filled, invalid placeholders of the correct truncated size.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyPlaceholder;

impl<T: Primitive> PlaceholderFactory<T> for EmptyPlaceholder {
    fn create(&self, grid: &CellGrid, key: u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        let min = grid.cell_min(key)?;
        let size = grid.cell_size(key)?;
        let len = size.iter().product();
        Ok(Arc::new(Cell::placeholder(key, min, size, vec![T::default(); len])))
    }
}
