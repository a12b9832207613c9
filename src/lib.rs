//! cellcache: lazily-loaded, disk-backed, bounded caching of the cells of a
//! large N-dimensional array.
//!
//! An image is split into a regular grid of cells ([`grid`]). Cells are
//! produced on first access by an application [`traits::CellLoader`], kept
//! in a bounded in-memory cache ([`cache`]) under a replacement policy
//! ([`policy`]), and written to per-cell block files ([`disk`]) through a
//! write-behind layer ([`iosync`]) when they are evicted. A volatile front
//! end ([`volatile`]) answers with placeholders while a shared priority
//! queue ([`queue`]) fetches the real cells in the background.
//!
//! Most users start at [`builder::DiskCachedCellImgFactory`].

pub mod builder;
pub mod cache;
pub mod cell;
pub mod disk;
pub mod ds;
pub mod error;
pub mod grid;
pub mod img;
pub mod iosync;
pub mod loader;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod queue;
pub mod traits;
pub mod volatile;

pub use crate::builder::{CacheType, DiskCachedCellImgFactory, DiskCachedCellImgOptions};
pub use crate::error::{CellCacheError, ConfigError};
pub use crate::img::CachedCellImg;
