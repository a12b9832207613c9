//! Disk-cached cell image: element access over the whole virtual array.
//!
//! ## Architecture
//!
//! ```text
//!   CachedCellImg<T>
//!     get(pos) / set(pos, v) / cell(key)
//!        │
//!        ▼
//!   LoaderRemoverCache ─── bounded / unbounded, policy
//!        │ loader + remover
//!        ▼
//!   IoSync ─────────────── per-key locks, write-behind
//!        │
//!        ▼
//!   DiskCellCache ──────── <dir>/<key> block files
//!        │ miss
//!        ▼
//!   CellCacheLoader<T, L> ─ application CellLoader
//! ```
//!
//! Built by [`DiskCachedCellImgFactory`](crate::builder::DiskCachedCellImgFactory).

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::cache::LoaderRemoverCache;
use crate::cell::{Cell, Primitive};
use crate::disk::DiskCellCache;
use crate::error::CellCacheError;
use crate::grid::CellGrid;
use crate::iosync::IoSync;
use crate::loader::FeatureSource;
use crate::metrics::{
    CacheMetricsSnapshot, DiskMetricsSnapshot, IoSyncMetricsSnapshot, MetricsSnapshotProvider,
};
use crate::queue::SharedQueue;
use crate::traits::{CacheLoader, PlaceholderFactory};
use crate::volatile::VolatileCellCache;

/// Type-erased producer of freshly loaded cells.
pub type DynCellLoader<T> = Arc<dyn CacheLoader<u64, Arc<Cell<T>>>>;

/// Block-file store backed by a type-erased loader.
pub type DiskStore<T> = DiskCellCache<T, DynCellLoader<T>>;

/// Key-serialised access to a [`DiskStore`].
pub type SyncedStore<T> = IoSync<T, DiskStore<T>>;

/// The in-memory cache of a [`CachedCellImg`].
pub type ImgCache<T> = LoaderRemoverCache<u64, Arc<Cell<T>>, Arc<SyncedStore<T>>, Arc<SyncedStore<T>>>;

/// Volatile view of a [`CachedCellImg`].
pub type VolatileImg<T> = VolatileCellCache<T, Arc<SyncedStore<T>>, Arc<SyncedStore<T>>>;

/// An N-dimensional image whose cells are loaded lazily, cached in memory
/// and spilled to disk on eviction.
pub struct CachedCellImg<T: Primitive> {
    grid: Arc<CellGrid>,
    cache: Arc<ImgCache<T>>,
    store: Arc<SyncedStore<T>>,
}

impl<T: Primitive> CachedCellImg<T> {
    pub(crate) fn new(grid: Arc<CellGrid>, cache: Arc<ImgCache<T>>, store: Arc<SyncedStore<T>>) -> Self {
        Self { grid, cache, store }
    }

    pub fn grid(&self) -> &Arc<CellGrid> {
        &self.grid
    }

    pub fn dimensions(&self) -> &[u64] {
        self.grid.dimensions()
    }

    pub fn num_dimensions(&self) -> usize {
        self.grid.num_dimensions()
    }

    pub fn cache(&self) -> &Arc<ImgCache<T>> {
        &self.cache
    }

    pub fn directory(&self) -> &Path {
        self.store.store().directory()
    }

    /// Returns (loading if needed) the cell with the given key.
    pub fn cell(&self, key: u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        self.cache.get(key)
    }

    /// Returns the cell containing element `pos`.
    pub fn cell_at(&self, pos: &[u64]) -> Result<Arc<Cell<T>>, CellCacheError> {
        let key = self.grid.key_for_element(pos)?;
        self.cache.get(key)
    }

    pub fn get(&self, pos: &[u64]) -> Result<T, CellCacheError> {
        let cell = self.cell_at(pos)?;
        cell.get(pos)
            .ok_or_else(|| CellCacheError::out_of_bounds(format!("position {pos:?}")))
    }

    /// Writes one element, marking its cell dirty.
    pub fn set(&self, pos: &[u64], value: T) -> Result<(), CellCacheError> {
        let cell = self.cell_at(pos)?;
        if cell.set(pos, value) {
            Ok(())
        } else {
            Err(CellCacheError::out_of_bounds(format!("position {pos:?}")))
        }
    }

    /// Number of cells currently resident in memory.
    pub fn resident_cells(&self) -> usize {
        self.cache.len()
    }

    /// Writes every resident cell (respecting dirty tracking) and waits for
    /// pending write-backs to land.
    pub fn persist_all(&self) -> Result<(), CellCacheError> {
        let resident = self.cache.persist_all();
        let pending = self.store.flush();
        debug!("persisted image with {} resident cells", self.cache.len());
        resident.and(pending)
    }

    /// Forgets cell `key` without writing it back.
    pub fn invalidate(&self, key: u64) {
        self.cache.invalidate(&key);
    }

    /// Forgets every resident cell without writing it back.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Waits for queued write-backs; retries failed ones.
    pub fn flush(&self) -> Result<(), CellCacheError> {
        self.store.flush()
    }

    /// Stops the write-behind threads after flushing.
    pub fn shutdown(&self) -> Result<(), CellCacheError> {
        self.store.shutdown()
    }

    /// Volatile view of this image fetching on `queue`.
    pub fn volatile(&self, queue: Arc<SharedQueue>) -> VolatileImg<T> {
        VolatileCellCache::new(Arc::clone(&self.cache), Arc::clone(&self.grid), queue)
    }

    /// Volatile view with custom placeholders.
    pub fn volatile_with(
        &self,
        queue: Arc<SharedQueue>,
        placeholders: Arc<dyn PlaceholderFactory<T>>,
    ) -> VolatileImg<T> {
        VolatileCellCache::with_placeholders(
            Arc::clone(&self.cache),
            Arc::clone(&self.grid),
            queue,
            placeholders,
        )
    }

    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.cache.snapshot()
    }

    pub fn disk_metrics(&self) -> DiskMetricsSnapshot {
        self.store.store().snapshot()
    }

    pub fn io_metrics(&self) -> IoSyncMetricsSnapshot {
        self.store.snapshot()
    }
}

impl<T: Primitive> FeatureSource for CachedCellImg<T> {
    fn dimensions(&self) -> &[u64] {
        self.grid.dimensions()
    }

    fn feature_at(&self, pos: &[u64]) -> Result<f64, CellCacheError> {
        self.get(pos).map(Primitive::to_f64)
    }
}

impl<T: Primitive> std::fmt::Debug for CachedCellImg<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCellImg")
            .field("type", &T::NAME)
            .field("dimensions", &self.grid.dimensions())
            .field("cell_dimensions", &self.grid.cell_dimensions())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DiskCachedCellImgFactory, DiskCachedCellImgOptions};
    use crate::loader::{CheckerboardLoader, ConstantLoader};

    fn small_options() -> DiskCachedCellImgOptions {
        DiskCachedCellImgOptions::new()
            .cell_dimensions(&[4])
            .max_cache_size(2)
            .num_io_threads(0)
    }

    #[test]
    fn element_access_spans_cells() {
        let img = DiskCachedCellImgFactory::<u16>::new(small_options())
            .create(&[10, 10], CheckerboardLoader::black_white())
            .unwrap();
        assert_eq!(img.get(&[0, 0]).unwrap(), 0);
        assert_eq!(img.get(&[4, 0]).unwrap(), 0xffff);
        assert_eq!(img.get(&[9, 9]).unwrap(), 0);
        assert!(img.get(&[10, 0]).is_err());
    }

    #[test]
    fn modified_cells_survive_eviction() {
        let img = DiskCachedCellImgFactory::<i32>::new(small_options())
            .create(&[12], ConstantLoader(1))
            .unwrap();
        img.set(&[5], -7).unwrap();
        img.cell(0).unwrap();
        img.cell(2).unwrap();
        assert!(!img.cache().contains(&1));
        assert_eq!(img.get(&[5]).unwrap(), -7);
        assert_eq!(img.get(&[6]).unwrap(), 1);
        assert_eq!(img.disk_metrics().block_writes, 1);
    }

    #[test]
    fn invalidate_discards_unwritten_changes() {
        let img = DiskCachedCellImgFactory::<u8>::new(small_options())
            .create(&[8], ConstantLoader(2))
            .unwrap();
        img.set(&[0], 9).unwrap();
        img.invalidate(0);
        assert_eq!(img.get(&[0]).unwrap(), 2);
    }

    #[test]
    fn persist_all_writes_dirty_cells_in_place() {
        let img = DiskCachedCellImgFactory::<u8>::new(small_options().num_io_threads(1))
            .create(&[8], ConstantLoader(2))
            .unwrap();
        img.set(&[1], 4).unwrap();
        img.cell(1).unwrap();
        img.persist_all().unwrap();
        assert!(img.store.store().contains_block(0));
        assert!(!img.store.store().contains_block(1));
        assert_eq!(img.resident_cells(), 2);

        img.invalidate_all();
        assert_eq!(img.get(&[1]).unwrap(), 4);
    }

    #[test]
    fn image_is_a_feature_source() {
        let img = DiskCachedCellImgFactory::<u16>::new(small_options())
            .create(&[8, 8], ConstantLoader(3))
            .unwrap();
        assert_eq!(FeatureSource::dimensions(&img), &[8, 8]);
        assert_eq!(img.feature_at(&[7, 7]).unwrap(), 3.0);
    }
}
