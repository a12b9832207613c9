//! Options and factory for disk-cached cell images.
//!
//! Wires the whole stack from one options value: grid, application loader,
//! block-file store, IoSync, and the bounded (or unbounded) in-memory cache.
//!
//! ## Example
//!
//! ```rust
//! use cellcache::builder::{DiskCachedCellImgFactory, DiskCachedCellImgOptions};
//! use cellcache::loader::CheckerboardLoader;
//! use cellcache::policy::EvictionPolicy;
//!
//! let options = DiskCachedCellImgOptions::new()
//!     .cell_dimensions(&[16])
//!     .max_cache_size(8)
//!     .eviction_policy(EvictionPolicy::Clock);
//!
//! let img = DiskCachedCellImgFactory::<u16>::new(options)
//!     .create(&[64, 64], CheckerboardLoader::black_white())
//!     .unwrap();
//! assert_eq!(img.get(&[16, 0]).unwrap(), 0xffff);
//! ```
//!
//! ## Defaults
//!
//! | Option                   | Default        |
//! |--------------------------|----------------|
//! | `cell_dimensions`        | 10 per axis    |
//! | `cache_type`             | `Bounded`      |
//! | `max_cache_size`         | 1000           |
//! | `eviction_policy`        | `Lru`          |
//! | `dirty_accesses`         | `true`         |
//! | `num_io_threads`         | 1              |
//! | `max_io_queue_size`      | 10             |
//! | `cache_dir`              | temporary      |
//! | `temp_dir_prefix`        | `"cellcache"`  |
//! | `delete_cache_dir_on_drop` | `true`       |
//! | `persist_on_load`        | `false`        |
//! | `num_fetcher_threads`    | 1              |
//! | `num_priorities`         | 3              |

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::cache::LoaderRemoverCache;
use crate::cell::{CellView, Primitive};
use crate::disk::{BlockDirectory, DiskCellCache};
use crate::error::{CellCacheError, ConfigError, LoadFailure};
use crate::grid::CellGrid;
use crate::img::{CachedCellImg, DynCellLoader, ImgCache};
use crate::iosync::IoSync;
use crate::loader::CellCacheLoader;
use crate::policy::EvictionPolicy;
use crate::queue::SharedQueue;
use crate::traits::CellLoader;

/// Whether the in-memory cache is bounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheType {
    #[default]
    Bounded,
    Unbounded,
}

/// Configuration for [`DiskCachedCellImgFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiskCachedCellImgOptions {
    cell_dimensions: Vec<u32>,
    cache_type: CacheType,
    max_cache_size: usize,
    eviction_policy: EvictionPolicy,
    dirty_accesses: bool,
    num_io_threads: usize,
    max_io_queue_size: usize,
    cache_dir: Option<PathBuf>,
    temp_dir_prefix: String,
    delete_cache_dir_on_drop: bool,
    persist_on_load: bool,
    num_fetcher_threads: usize,
    num_priorities: u8,
}

impl Default for DiskCachedCellImgOptions {
    fn default() -> Self {
        Self {
            cell_dimensions: vec![10],
            cache_type: CacheType::Bounded,
            max_cache_size: 1000,
            eviction_policy: EvictionPolicy::Lru,
            dirty_accesses: true,
            num_io_threads: 1,
            max_io_queue_size: 10,
            cache_dir: None,
            temp_dir_prefix: "cellcache".to_string(),
            delete_cache_dir_on_drop: true,
            persist_on_load: false,
            num_fetcher_threads: 1,
            num_priorities: 3,
        }
    }
}

impl DiskCachedCellImgOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-axis cell size. A shorter list is padded with its last value, so
    /// a single value applies to every axis.
    pub fn cell_dimensions(mut self, dims: &[u32]) -> Self {
        self.cell_dimensions = dims.to_vec();
        self
    }

    pub fn cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Track dirty cells and skip write-back of clean ones.
    pub fn dirty_accesses(mut self, enabled: bool) -> Self {
        self.dirty_accesses = enabled;
        self
    }

    /// Write-behind threads; 0 writes synchronously on the evicting thread.
    pub fn num_io_threads(mut self, threads: usize) -> Self {
        self.num_io_threads = threads;
        self
    }

    pub fn max_io_queue_size(mut self, size: usize) -> Self {
        self.max_io_queue_size = size;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn temp_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_dir_prefix = prefix.into();
        self
    }

    pub fn delete_cache_dir_on_drop(mut self, enabled: bool) -> Self {
        self.delete_cache_dir_on_drop = enabled;
        self
    }

    pub fn persist_on_load(mut self, enabled: bool) -> Self {
        self.persist_on_load = enabled;
        self
    }

    pub fn num_fetcher_threads(mut self, threads: usize) -> Self {
        self.num_fetcher_threads = threads;
        self
    }

    pub fn num_priorities(mut self, levels: u8) -> Self {
        self.num_priorities = levels;
        self
    }

    pub fn get_cache_type(&self) -> CacheType {
        self.cache_type
    }

    pub fn get_max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    pub fn get_eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    pub fn get_dirty_accesses(&self) -> bool {
        self.dirty_accesses
    }

    pub fn get_num_io_threads(&self) -> usize {
        self.num_io_threads
    }

    pub fn get_cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Cell dimensions expanded to `n` axes.
    ///
    /// A single value applies to every axis and a shorter list is padded
    /// with its last value. A list with more axes than `n` is an error.
    pub fn cell_dimensions_for(&self, n: usize) -> Result<Vec<u32>, ConfigError> {
        if self.cell_dimensions.len() > n && self.cell_dimensions.len() != 1 {
            return Err(ConfigError::new(format!(
                "{} cell_dimensions given for a {n}-dimensional image",
                self.cell_dimensions.len()
            )));
        }
        let last = self.cell_dimensions.last().copied().unwrap_or(10);
        Ok((0..n)
            .map(|d| self.cell_dimensions.get(d).copied().unwrap_or(last))
            .collect())
    }

    /// Rejects settings no cache can be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_dimensions.is_empty() {
            return Err(ConfigError::new("cell_dimensions must not be empty"));
        }
        if self.cell_dimensions.contains(&0) {
            return Err(ConfigError::new("cell_dimensions must all be greater than zero"));
        }
        if self.cache_type == CacheType::Bounded && self.max_cache_size == 0 {
            return Err(ConfigError::new(
                "max_cache_size must be greater than zero for a bounded cache",
            ));
        }
        if self.num_io_threads > 0 && self.max_io_queue_size == 0 {
            return Err(ConfigError::new(
                "max_io_queue_size must be greater than zero when num_io_threads > 0",
            ));
        }
        if self.num_fetcher_threads == 0 {
            return Err(ConfigError::new("num_fetcher_threads must be greater than zero"));
        }
        if self.num_priorities == 0 {
            return Err(ConfigError::new("num_priorities must be greater than zero"));
        }
        if self.temp_dir_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(ConfigError::new(
                "temp_dir_prefix must not contain a path separator",
            ));
        }
        Ok(())
    }

    /// A fetch queue sized by `num_fetcher_threads` and `num_priorities`.
    pub fn shared_queue(&self) -> Result<SharedQueue, ConfigError> {
        SharedQueue::new(self.num_fetcher_threads, self.num_priorities)
    }
}

/// Fill callback that leaves cells zeroed.
#[derive(Debug, Default, Clone, Copy)]
struct ZeroLoader;

impl<T: Primitive> CellLoader<T> for ZeroLoader {
    type Error = LoadFailure;

    fn load(&self, _cell: &mut CellView<'_, T>) -> Result<(), LoadFailure> {
        Ok(())
    }
}

/// Builds [`CachedCellImg`]s of element type `T`.
#[derive(Debug, Clone)]
pub struct DiskCachedCellImgFactory<T> {
    options: DiskCachedCellImgOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Primitive> DiskCachedCellImgFactory<T> {
    pub fn new(options: DiskCachedCellImgOptions) -> Self {
        Self {
            options,
            _marker: PhantomData,
        }
    }

    pub fn options(&self) -> &DiskCachedCellImgOptions {
        &self.options
    }

    /// An image whose cells start zeroed.
    pub fn create_zeroed(&self, dimensions: &[u64]) -> Result<CachedCellImg<T>, CellCacheError> {
        self.create(dimensions, ZeroLoader)
    }

    /// An image whose cells are filled by `loader` on first access.
    pub fn create<L>(&self, dimensions: &[u64], loader: L) -> Result<CachedCellImg<T>, CellCacheError>
    where
        L: CellLoader<T> + 'static,
    {
        let options = &self.options;
        options.validate()?;

        let cell_dims = options.cell_dimensions_for(dimensions.len())?;
        let grid = Arc::new(CellGrid::try_new(dimensions, &cell_dims)?);

        let directory = match &options.cache_dir {
            Some(dir) => BlockDirectory::at(dir, options.delete_cache_dir_on_drop)?,
            None => BlockDirectory::temp(&options.temp_dir_prefix, options.delete_cache_dir_on_drop)?,
        };

        let backing: DynCellLoader<T> = Arc::new(CellCacheLoader::new(Arc::clone(&grid), loader));
        let disk = DiskCellCache::new(directory, Arc::clone(&grid), backing)
            .with_write_only_dirty(options.dirty_accesses)
            .with_persist_on_load(options.persist_on_load);
        debug!(
            "cell image {:?} ({}) cells {:?} in {}",
            dimensions,
            T::NAME,
            cell_dims,
            disk.directory().display()
        );

        let store = Arc::new(IoSync::with_writers(
            disk,
            options.num_io_threads,
            options.max_io_queue_size,
        ));

        let cache: ImgCache<T> = match options.cache_type {
            CacheType::Bounded => LoaderRemoverCache::new(
                options.max_cache_size,
                options.eviction_policy,
                Arc::clone(&store),
                Arc::clone(&store),
            )?,
            CacheType::Unbounded => {
                LoaderRemoverCache::unbounded(Arc::clone(&store), Arc::clone(&store))
            }
        };

        Ok(CachedCellImg::new(grid, Arc::new(cache), store))
    }
}
