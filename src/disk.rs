//! Block-file persistence for cells.
//!
//! One file per cell key, named by the decimal key, under a cache directory.
//! A file holds the cell's elements in linear order, little-endian, with no
//! header. Writes go to `<key>.tmp` and are renamed over `<key>` so a reader
//! never sees a partial block.
//!
//! ```text
//!   get(key)
//!     ├─ <dir>/<key> exists, length ok ──► decode ──► Arc<Cell>   (clean)
//!     ├─ missing ───────────────────────► backing loader
//!     └─ corrupt ──► warn!, remove file ─► backing loader
//!
//!   put(key, cell)
//!     ├─ placeholder, or clean with write_only_dirty ──► skip
//!     └─ mark_clean, encode ──► <key>.tmp ──► rename ──► <key>
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace, warn};
use tempfile::TempDir;

use crate::cell::{codec, Cell, Primitive};
use crate::error::{CellCacheError, ConfigError};
use crate::grid::CellGrid;
use crate::metrics::{DiskMetrics, DiskMetricsRecorder, DiskMetricsSnapshot, MetricsSnapshotProvider};
use crate::traits::{CacheLoader, CacheRemover};

/// The directory that holds block files.
#[derive(Debug)]
pub enum BlockDirectory {
    /// Freshly created temporary directory, removed on drop.
    Temp(TempDir),
    /// Caller-provided (or kept temporary) directory.
    Path {
        path: PathBuf,
        delete_on_drop: bool,
    },
}

impl BlockDirectory {
    /// Creates a new temporary directory whose name starts with `prefix`.
    pub fn temp(prefix: &str, delete_on_drop: bool) -> Result<Self, ConfigError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| ConfigError::new(format!("cannot create temporary cache directory: {e}")))?;
        if delete_on_drop {
            Ok(Self::Temp(dir))
        } else {
            Ok(Self::Path {
                path: dir.keep(),
                delete_on_drop: false,
            })
        }
    }

    /// Uses `path`, creating it if needed.
    pub fn at(path: impl Into<PathBuf>, delete_on_drop: bool) -> Result<Self, ConfigError> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| {
            ConfigError::new(format!("cannot create cache directory {}: {e}", path.display()))
        })?;
        Ok(Self::Path {
            path,
            delete_on_drop,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Path { path, .. } => path,
        }
    }
}

impl Drop for BlockDirectory {
    fn drop(&mut self) {
        if let Self::Path {
            path,
            delete_on_drop: true,
        } = self
            && let Err(e) = fs::remove_dir_all(&*path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("failed to remove cache directory {}: {e}", path.display());
        }
    }
}

/// Disk-backed cell store that falls back to `backing` on a miss.
#[derive(Debug)]
pub struct DiskCellCache<T, A> {
    dir: BlockDirectory,
    grid: Arc<CellGrid>,
    backing: A,
    write_only_dirty: bool,
    persist_on_load: bool,
    metrics: DiskMetrics,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, A> DiskCellCache<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>>,
{
    pub fn new(dir: BlockDirectory, grid: Arc<CellGrid>, backing: A) -> Self {
        Self {
            dir,
            grid,
            backing,
            write_only_dirty: true,
            persist_on_load: false,
            metrics: DiskMetrics::default(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Skips write-back of cells whose dirty flag is clear (default `true`).
    pub fn with_write_only_dirty(mut self, enabled: bool) -> Self {
        self.write_only_dirty = enabled;
        self
    }

    /// Writes every freshly loaded cell straight to disk (default `false`).
    pub fn with_persist_on_load(mut self, enabled: bool) -> Self {
        self.persist_on_load = enabled;
        self
    }

    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    pub fn grid(&self) -> &Arc<CellGrid> {
        &self.grid
    }

    pub fn writes_only_dirty(&self) -> bool {
        self.write_only_dirty
    }

    pub fn block_path(&self, key: u64) -> PathBuf {
        self.dir.path().join(key.to_string())
    }

    pub fn contains_block(&self, key: u64) -> bool {
        self.block_path(key).is_file()
    }

    /// Reads the block for `key`, falling back to the backing loader when
    /// the file is missing or corrupt.
    pub fn get(&self, key: u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        match self.read_block(key)? {
            Some(cell) => Ok(Arc::new(cell)),
            None => {
                let cell = self.backing.get(&key)?;
                if self.persist_on_load {
                    self.write_block(key, &cell)?;
                }
                Ok(cell)
            }
        }
    }

    /// Writes `cell` to its block file unless it may be skipped.
    pub fn put(&self, key: u64, cell: &Cell<T>) -> Result<(), CellCacheError> {
        if !cell.is_valid() {
            trace!("not persisting placeholder for cell {key}");
            return Ok(());
        }
        if self.write_only_dirty && !cell.is_dirty() {
            self.metrics.record_clean_skip();
            trace!("cell {key} is clean, skipping write-back");
            return Ok(());
        }
        self.write_block(key, cell)
    }

    /// Returns `Ok(None)` when the block is missing or was corrupt.
    fn read_block(&self, key: u64) -> Result<Option<Cell<T>>, CellCacheError> {
        let path = self.block_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.metrics.record_block_missing();
                return Ok(None);
            }
            Err(e) => {
                warn!("cannot read block {}: {e}; reloading", path.display());
                self.metrics.record_block_corrupt();
                return Ok(None);
            }
        };

        let bounds = self.grid.bounds(key)?;
        match codec::decode::<T>(&bytes, bounds.element_count()) {
            Ok(data) => {
                self.metrics.record_block_read(bytes.len());
                debug!("read cell {key} from {}", path.display());
                Ok(Some(Cell::new(key, bounds.min.clone(), bounds.size(), data)))
            }
            Err(reason) => {
                let err = CellCacheError::Corrupt { key, reason };
                warn!("{err} ({}); reloading", path.display());
                self.metrics.record_block_corrupt();
                if let Err(e) = fs::remove_file(&path) {
                    warn!("failed to remove corrupt block {}: {e}", path.display());
                }
                Ok(None)
            }
        }
    }

    fn write_block(&self, key: u64, cell: &Cell<T>) -> Result<(), CellCacheError> {
        let path = self.block_path(key);
        let encoded = {
            let data = cell.read();
            // Writers are excluded while the read guard is held.
            cell.mark_clean();
            codec::encode(&data)
        };

        let tmp = path.with_extension("tmp");
        let result = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(&encoded)?;
                file.flush()
            })
            .and_then(|()| fs::rename(&tmp, &path));

        match result {
            Ok(()) => {
                self.metrics.record_block_write(encoded.len());
                debug!("wrote cell {key} to {}", path.display());
                Ok(())
            }
            Err(e) => {
                cell.mark_dirty();
                self.metrics.record_write_failure();
                let _ = fs::remove_file(&tmp);
                Err(CellCacheError::persistence(key, path, e))
            }
        }
    }
}

impl<T, A> CacheLoader<u64, Arc<Cell<T>>> for DiskCellCache<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>>,
{
    fn get(&self, key: &u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        DiskCellCache::get(self, *key)
    }
}

impl<T, A> CacheRemover<u64, Arc<Cell<T>>> for DiskCellCache<T, A>
where
    T: Primitive,
    A: CacheLoader<u64, Arc<Cell<T>>>,
{
    fn on_removal(&self, key: u64, value: Arc<Cell<T>>) -> Result<(), CellCacheError> {
        self.put(key, &value)
    }

    fn persist(&self, key: u64, value: &Arc<Cell<T>>) -> Result<(), CellCacheError> {
        self.put(key, value)
    }
}

impl<T, A> MetricsSnapshotProvider<DiskMetricsSnapshot> for DiskCellCache<T, A> {
    fn snapshot(&self) -> DiskMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::loader::{CellCacheLoader, ConstantLoader};

    fn grid() -> Arc<CellGrid> {
        Arc::new(CellGrid::try_new(&[6, 6], &[4, 4]).unwrap())
    }

    fn disk(dir: BlockDirectory) -> DiskCellCache<u16, CellCacheLoader<u16, ConstantLoader<u16>>> {
        let grid = grid();
        let loader = CellCacheLoader::new(Arc::clone(&grid), ConstantLoader(5));
        DiskCellCache::new(dir, grid, loader)
    }

    #[test]
    fn dirty_cell_round_trips_through_disk() {
        let disk = disk(BlockDirectory::temp("cellcache-test", true).unwrap());
        let cell = disk.get(3).unwrap();
        assert_eq!(cell.size(), &[2, 2]);
        cell.write()[0] = 99;
        disk.put(3, &cell).unwrap();
        assert!(!cell.is_dirty());
        assert!(disk.contains_block(3));

        let reread = disk.get(3).unwrap();
        assert_eq!(reread.to_vec(), vec![99, 5, 5, 5]);
        assert_eq!(disk.snapshot().block_reads, 1);
    }

    #[test]
    fn clean_cells_are_not_written() {
        let disk = disk(BlockDirectory::temp("cellcache-test", true).unwrap());
        let cell = disk.get(0).unwrap();
        disk.put(0, &cell).unwrap();
        assert!(!disk.contains_block(0));
        assert_eq!(disk.snapshot().clean_skips, 1);

        let always = self::disk(BlockDirectory::temp("cellcache-test", true).unwrap())
            .with_write_only_dirty(false);
        let cell = always.get(0).unwrap();
        always.put(0, &cell).unwrap();
        assert!(always.contains_block(0));
    }

    #[test]
    fn corrupt_block_is_removed_and_reloaded() {
        let disk = disk(BlockDirectory::temp("cellcache-test", true).unwrap());
        fs::write(disk.block_path(1), [1u8, 2, 3]).unwrap();
        let cell = disk.get(1).unwrap();
        assert_eq!(cell.to_vec(), vec![5; 8]);
        assert!(!disk.contains_block(1));
        assert_eq!(disk.snapshot().corrupt_blocks, 1);
    }

    #[test]
    fn placeholders_are_never_persisted() {
        let disk = disk(BlockDirectory::temp("cellcache-test", true).unwrap());
        let placeholder = Cell::placeholder(0, vec![0, 0], vec![4, 4], vec![0u16; 16]);
        placeholder.mark_dirty();
        disk.put(0, &placeholder).unwrap();
        assert!(!disk.contains_block(0));
    }

    #[test]
    fn persist_on_load_writes_fresh_cells() {
        let disk = disk(BlockDirectory::temp("cellcache-test", true).unwrap()).with_persist_on_load(true);
        disk.get(2).unwrap();
        assert!(disk.contains_block(2));
    }

    #[test]
    fn explicit_directory_is_deleted_on_drop_when_asked() {
        let parent = tempfile::tempdir().unwrap();
        let kept = parent.path().join("kept");
        let dropped = parent.path().join("dropped");
        {
            let _a = disk(BlockDirectory::at(&kept, false).unwrap());
            let _b = disk(BlockDirectory::at(&dropped, true).unwrap());
        }
        assert!(kept.is_dir());
        assert!(!dropped.exists());
    }

    #[test]
    fn kept_temporary_directory_outlives_the_store() {
        let path = {
            let disk = disk(BlockDirectory::temp("cellcache-test", false).unwrap());
            disk.directory().to_path_buf()
        };
        assert!(path.is_dir());
        fs::remove_dir_all(&path).unwrap();
    }

    struct Counting(AtomicUsize);

    impl CacheLoader<u64, Arc<Cell<u16>>> for Counting {
        fn get(&self, key: &u64) -> Result<Arc<Cell<u16>>, CellCacheError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Cell::zeroed(&grid(), *key)?))
        }
    }

    #[test]
    fn existing_blocks_bypass_the_loader() {
        let disk = DiskCellCache::new(
            BlockDirectory::temp("cellcache-test", true).unwrap(),
            grid(),
            Counting(AtomicUsize::new(0)),
        );
        let cell = disk.get(0).unwrap();
        cell.mark_dirty();
        disk.put(0, &cell).unwrap();
        disk.get(0).unwrap();
        assert_eq!(disk.backing.0.load(Ordering::SeqCst), 1);
    }
}
