//! Cell loaders: the key-level [`CellCacheLoader`] and the built-in fill
//! callbacks.
//!
//! ```text
//!   CacheLoader::get(key)
//!        │
//!        ▼
//!   CellCacheLoader ── allocate zeroed cell (truncated size)
//!        │
//!        ▼
//!   CellLoader::load(&mut CellView) ── Checkerboard / Constant / Fn / Classifying
//!        │
//!        ▼
//!   Arc<Cell<T>>  (clean)
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;

use crate::cell::{Cell, CellView, Primitive};
use crate::error::{CellCacheError, LoadFailure};
use crate::grid::CellGrid;
use crate::traits::{CacheLoader, CellLoader};

/// Produces cells for keys of one grid by delegating the fill to a
/// [`CellLoader`].
#[derive(Debug)]
pub struct CellCacheLoader<T, L> {
    grid: Arc<CellGrid>,
    loader: L,
    _marker: PhantomData<fn() -> T>,
}

impl<T, L> CellCacheLoader<T, L>
where
    T: Primitive,
    L: CellLoader<T>,
{
    pub fn new(grid: Arc<CellGrid>, loader: L) -> Self {
        Self {
            grid,
            loader,
            _marker: PhantomData,
        }
    }

    pub fn grid(&self) -> &Arc<CellGrid> {
        &self.grid
    }

    pub fn cell_loader(&self) -> &L {
        &self.loader
    }
}

impl<T, L> CacheLoader<u64, Arc<Cell<T>>> for CellCacheLoader<T, L>
where
    T: Primitive,
    L: CellLoader<T>,
{
    fn get(&self, key: &u64) -> Result<Arc<Cell<T>>, CellCacheError> {
        let key = *key;
        let bounds = self.grid.bounds(key)?;
        let size = bounds.size();
        let mut data = vec![T::default(); bounds.element_count()];

        let mut view = CellView::new(key, &bounds, &size, &self.grid, &mut data);
        self.loader
            .load(&mut view)
            .map_err(|e| CellCacheError::load(key, e))?;

        trace!("loaded cell {key} ({} elements)", data.len());
        Ok(Arc::new(Cell::new(key, bounds.min, size, data)))
    }
}

/// Fills every cell with a single colour chosen by the parity of the sum of
/// its grid coordinates.
#[derive(Debug, Clone, Copy)]
pub struct CheckerboardLoader<T> {
    even: T,
    odd: T,
}

impl<T: Primitive> CheckerboardLoader<T> {
    pub fn new(even: T, odd: T) -> Self {
        Self { even, odd }
    }
}

impl CheckerboardLoader<u16> {
    /// Black (`0x0000`) and white (`0xffff`) 16-bit cells.
    pub fn black_white() -> Self {
        Self::new(0x0000, 0xffff)
    }
}

impl<T: Primitive> CellLoader<T> for CheckerboardLoader<T> {
    type Error = LoadFailure;

    fn load(&self, cell: &mut CellView<'_, T>) -> Result<(), LoadFailure> {
        let grid = cell.grid();
        let sum: u64 = (0..grid.num_dimensions())
            .map(|d| cell.min(d) / u64::from(grid.cell_dimensions()[d]))
            .sum();
        let colour = if sum & 1 == 0 { self.even } else { self.odd };
        cell.fill(colour);
        Ok(())
    }
}

/// Fills every cell with the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLoader<T>(pub T);

impl<T: Primitive> CellLoader<T> for ConstantLoader<T> {
    type Error = LoadFailure;

    fn load(&self, cell: &mut CellView<'_, T>) -> Result<(), LoadFailure> {
        cell.fill(self.0);
        Ok(())
    }
}

/// Adapts a closure into a [`CellLoader`].
///
/// ```
/// use cellcache::cell::CellView;
/// use cellcache::error::LoadFailure;
/// use cellcache::loader::FnLoader;
///
/// let ramp = FnLoader::new(|cell: &mut CellView<'_, u32>| {
///     cell.for_each_mut(|pos, v| *v = pos[0] as u32);
///     Ok::<_, LoadFailure>(())
/// });
/// # let _ = ramp;
/// ```
pub struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnLoader<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

impl<T, E, F> CellLoader<T> for FnLoader<F>
where
    T: Primitive,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&mut CellView<'_, T>) -> Result<(), E> + Send + Sync,
{
    type Error = E;

    fn load(&self, cell: &mut CellView<'_, T>) -> Result<(), E> {
        (self.f)(cell)
    }
}

/// Assigns a class index to a feature vector.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &[f64]) -> Result<usize, LoadFailure>;

    fn num_classes(&self) -> usize;
}

/// Two-class classifier: class 1 when the first feature exceeds the
/// threshold, class 0 otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdingClassifier {
    threshold: f64,
}

impl ThresholdingClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Classifier for ThresholdingClassifier {
    fn classify(&self, features: &[f64]) -> Result<usize, LoadFailure> {
        let first = features
            .first()
            .ok_or_else(|| LoadFailure::new("thresholding classifier needs at least one feature"))?;
        Ok(usize::from(*first > self.threshold))
    }

    fn num_classes(&self) -> usize {
        2
    }
}

/// A per-element scalar source that a [`ClassifyingLoader`] reads features
/// from. Implemented by cached cell images so one image can feed another.
pub trait FeatureSource: Send + Sync {
    fn dimensions(&self) -> &[u64];

    fn feature_at(&self, pos: &[u64]) -> Result<f64, CellCacheError>;
}

impl<S: FeatureSource + ?Sized> FeatureSource for Arc<S> {
    fn dimensions(&self) -> &[u64] {
        (**self).dimensions()
    }

    fn feature_at(&self, pos: &[u64]) -> Result<f64, CellCacheError> {
        (**self).feature_at(pos)
    }
}

/// Fills each element with `1 - class` of the feature vector gathered from
/// the sources at the same position.
pub struct ClassifyingLoader<C> {
    features: Vec<Arc<dyn FeatureSource>>,
    classifier: C,
}

impl<C: Classifier> ClassifyingLoader<C> {
    pub fn new(features: Vec<Arc<dyn FeatureSource>>, classifier: C) -> Self {
        Self {
            features,
            classifier,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }
}

impl<C> std::fmt::Debug for ClassifyingLoader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifyingLoader")
            .field("features", &self.features.len())
            .finish_non_exhaustive()
    }
}

impl<T, C> CellLoader<T> for ClassifyingLoader<C>
where
    T: Primitive,
    C: Classifier,
{
    type Error = LoadFailure;

    fn load(&self, cell: &mut CellView<'_, T>) -> Result<(), LoadFailure> {
        let mut buffer = Vec::with_capacity(self.features.len());
        let mut failure = None;
        cell.for_each_mut(|pos, value| {
            if failure.is_some() {
                return;
            }
            buffer.clear();
            for source in &self.features {
                match source.feature_at(pos) {
                    Ok(f) => buffer.push(f),
                    Err(e) => {
                        failure = Some(LoadFailure::new(format!("feature read failed: {e}")));
                        return;
                    }
                }
            }
            match self.classifier.classify(&buffer) {
                Ok(class) => *value = T::from_f64(1.0 - class as f64),
                Err(e) => failure = Some(e),
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
