//! Error types for the cellcache library.
//!
//! ## Key Components
//!
//! - [`CellCacheError`]: Returned by every fallible cache operation. Splits
//!   loader failures from persistence failures so callers can tell "the
//!   application callback failed" apart from "the disk failed".
//! - [`ConfigError`]: Returned when grid or cache configuration parameters are
//!   invalid (e.g. zero capacity, mismatched axis counts).
//! - [`InvariantError`]: Returned by debug-only `check_invariants` methods.
//!
//! ## Failure Taxonomy
//!
//! ```text
//!   ┌────────────────────┬──────────────────────────────┬──────────────────────────┐
//!   │ Variant            │ Origin                       │ Effect                   │
//!   ├────────────────────┼──────────────────────────────┼──────────────────────────┤
//!   │ Load               │ CellLoader callback          │ surfaced to get() caller │
//!   │ Persistence        │ block file write             │ logged, value kept alive │
//!   │ Corrupt            │ block file read              │ treated as a miss        │
//!   │ OutOfBounds        │ key / position outside grid  │ surfaced to caller       │
//!   │ Config             │ options / grid construction  │ surfaced to caller       │
//!   │ Shutdown           │ pool or queue already closed │ surfaced to caller       │
//!   └────────────────────┴──────────────────────────────┴──────────────────────────┘
//! ```
//!
//! `CellCacheError` is `Clone` so one load failure can be handed to every
//! caller that was waiting on the same in-flight load.
//!
//! ## Example Usage
//!
//! ```
//! use cellcache::error::ConfigError;
//! use cellcache::grid::CellGrid;
//!
//! let grid: Result<CellGrid, ConfigError> = CellGrid::try_new(&[640, 640], &[64, 64]);
//! assert!(grid.is_ok());
//!
//! // Mismatched axis counts are caught without panicking
//! let bad = CellGrid::try_new(&[640, 640], &[64]);
//! assert!(bad.is_err());
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Boxed, shareable error produced by an application cell loader.
pub type LoadSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// CellCacheError
// ---------------------------------------------------------------------------

/// Errors produced while loading, caching, or persisting cells.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CellCacheError {
    /// The application loader failed to produce the cell.
    #[error("failed to load cell {key}: {source}")]
    Load { key: u64, source: LoadSource },

    /// Writing a cell's block file failed.
    #[error("failed to persist cell {key} to {}: {source}", path.display())]
    Persistence {
        key: u64,
        path: PathBuf,
        source: Arc<io::Error>,
    },

    /// A block file exists but cannot be decoded into the expected cell.
    #[error("block file for cell {key} is corrupt: {reason}")]
    Corrupt { key: u64, reason: String },

    /// A cell key or element position lies outside the grid.
    #[error("{what} is outside the grid")]
    OutOfBounds { what: String },

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker pool or queue servicing this request was shut down.
    #[error("{0} has been shut down")]
    Shutdown(&'static str),

    /// A loader panicked; waiters on the same load receive this instead.
    #[error("loader panicked: {0}")]
    Panicked(String),
}

impl CellCacheError {
    /// Wraps an application error as a load failure for `key`.
    pub fn load<E>(key: u64, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Load {
            key,
            source: Arc::new(source),
        }
    }

    /// Wraps an I/O error as a persistence failure for `key`.
    pub fn persistence(key: u64, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            key,
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Builds an out-of-bounds error describing `what`.
    pub fn out_of_bounds(what: impl Into<String>) -> Self {
        Self::OutOfBounds { what: what.into() }
    }

    /// Returns `true` for failures raised by the application loader.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::Load { .. })
    }

    /// Returns `true` for failures raised while writing block files.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

// ---------------------------------------------------------------------------
// LoadFailure
// ---------------------------------------------------------------------------

/// Plain message error for cell loaders that have nothing richer to report.
///
/// Loaders may return any `std::error::Error`; this is the convenient default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure(String);

impl LoadFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LoadFailure {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by debug-only `check_invariants` methods such as
/// [`LoaderRemoverCache::check_invariants`](crate::cache::LoaderRemoverCache::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when grid or cache configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`CellGrid::try_new`](crate::grid::CellGrid::try_new) and
/// [`DiskCachedCellImgOptions::validate`](crate::builder::DiskCachedCellImgOptions::validate).
///
/// # Example
///
/// ```
/// use cellcache::builder::DiskCachedCellImgOptions;
///
/// let err = DiskCachedCellImgOptions::new().max_cache_size(0).validate().unwrap_err();
/// assert!(err.to_string().contains("max_cache_size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
