pub use crate::builder::{CacheType, DiskCachedCellImgFactory, DiskCachedCellImgOptions};
pub use crate::cache::LoaderRemoverCache;
pub use crate::cell::{Cell, CellView, Primitive};
pub use crate::disk::{BlockDirectory, DiskCellCache};
pub use crate::error::{CellCacheError, ConfigError, LoadFailure};
pub use crate::grid::{CellBounds, CellGrid};
pub use crate::img::CachedCellImg;
pub use crate::iosync::IoSync;
pub use crate::loader::{
    CellCacheLoader, CheckerboardLoader, Classifier, ClassifyingLoader, ConstantLoader,
    FeatureSource, FnLoader, ThresholdingClassifier,
};
pub use crate::metrics::{MetricsExporter, MetricsSnapshotProvider, PrometheusTextExporter};
pub use crate::policy::EvictionPolicy;
pub use crate::queue::SharedQueue;
pub use crate::traits::{CacheLoader, CacheRemover, CellLoader, PlaceholderFactory};
pub use crate::volatile::{CacheHints, LoadingStrategy, VolatileCellCache};
