//! A prediction image computed cell by cell from a cached checkerboard.
//!
//! Run with: cargo run --release --example classify
//!
//! The checkerboard tracks dirty cells; the prediction writes every evicted
//! cell back. Prediction cells are fetched in the background through a
//! shared queue with seven workers, the way a viewer would request them.

use std::sync::Arc;
use std::time::Instant;

use cellcache::builder::{CacheType, DiskCachedCellImgFactory, DiskCachedCellImgOptions};
use cellcache::error::CellCacheError;
use cellcache::loader::{CheckerboardLoader, ClassifyingLoader, FeatureSource, ThresholdingClassifier};
use cellcache::metrics::MetricsSnapshotProvider;
use cellcache::queue::SharedQueue;
use cellcache::volatile::CacheHints;

fn main() -> Result<(), CellCacheError> {
    env_logger::init();

    let dimensions = [640, 640, 640];
    let write_only_dirty = DiskCachedCellImgOptions::new()
        .cell_dimensions(&[64, 64, 64])
        .cache_type(CacheType::Bounded)
        .max_cache_size(100);
    let write_fast = write_only_dirty.clone().dirty_accesses(false);

    let img = Arc::new(
        DiskCachedCellImgFactory::<u16>::new(write_only_dirty)
            .create(&dimensions, CheckerboardLoader::black_white())?,
    );
    let features: Vec<Arc<dyn FeatureSource>> = vec![img.clone() as Arc<dyn FeatureSource>];
    let prediction = DiskCachedCellImgFactory::<u16>::new(write_fast).create(
        &dimensions,
        ClassifyingLoader::new(features, ThresholdingClassifier::new(0.5)),
    )?;

    let queue = Arc::new(SharedQueue::new(7, 3)?);
    let volatile = prediction.volatile(Arc::clone(&queue));
    println!("=== Classifier ===\n");

    // 1. Request the first slab of cells the way a viewer would: placeholders
    //    come back immediately while the queue fills them in.
    let grid = prediction.grid();
    let slab: Vec<u64> = (0..grid.grid_dimensions()[0] * grid.grid_dimensions()[1]).collect();
    let start = Instant::now();
    let placeholders = slab
        .iter()
        .map(|&key| volatile.get(key, CacheHints::volatile(0)))
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .filter(|cell| !cell.is_valid())
        .count();
    println!("1. Requested {} cells, {placeholders} placeholders", slab.len());

    queue.wait_idle();
    println!("   slab classified in {:?}", start.elapsed());
    println!();

    // 2. Blocking reads now hit the cache.
    println!("2. Predictions (1 = black input, 0 = white input)");
    for pos in [[0u64, 0, 0], [64, 0, 0], [64, 64, 0], [639, 0, 0]] {
        let cell = volatile.get(grid.key_for_element(&pos)?, CacheHints::blocking())?;
        let value = cell.get(&pos).unwrap_or_default();
        println!("   {pos:?}: input {:#06x} -> class {value}", img.get(&pos)?);
    }
    println!();

    let cache = prediction.cache_metrics();
    let fetches = queue.snapshot();
    println!("3. Prediction cache: {} loads, {} resident", cache.loads, cache.resident);
    println!("   fetch queue: {} executed, {} failed", fetches.executed, fetches.task_failures);
    println!("   checkerboard: {} loads, {} evictions", img.cache_metrics().loads, img.cache_metrics().evictions);

    queue.shutdown();
    prediction.shutdown()?;
    img.shutdown()
}
