//! A 640³ checkerboard image in 64³ cells, 100 of them resident at a time.
//!
//! Run with: cargo run --release --example checkerboard
//!
//! Set `RUST_LOG=cellcache=debug` to watch cells being loaded and written.

use std::time::Instant;

use cellcache::builder::{CacheType, DiskCachedCellImgFactory, DiskCachedCellImgOptions};
use cellcache::error::CellCacheError;
use cellcache::loader::CheckerboardLoader;
use cellcache::metrics::{MetricsExporter, PrometheusTextExporter};

fn main() -> Result<(), CellCacheError> {
    env_logger::init();

    let dimensions = [640, 640, 640];
    let options = DiskCachedCellImgOptions::new()
        .cell_dimensions(&[64, 64, 64])
        .cache_type(CacheType::Bounded)
        .max_cache_size(100);

    let img = DiskCachedCellImgFactory::<u16>::new(options)
        .create(&dimensions, CheckerboardLoader::black_white())?;
    println!("=== Checkerboard ===\n");
    println!("   {} cells, block files in {}", img.grid().num_cells(), img.directory().display());

    // 1. Touch one element of every cell: 1000 loads, 900 evictions, all
    //    clean so nothing is written.
    let start = Instant::now();
    let mut white = 0;
    for z in (0..640).step_by(64) {
        for y in (0..640).step_by(64) {
            for x in (0..640).step_by(64) {
                if img.get(&[x, y, z])? == 0xffff {
                    white += 1;
                }
            }
        }
    }
    println!("1. Scanned every cell in {:?}", start.elapsed());
    println!("   white cells: {white}, resident: {}", img.resident_cells());
    println!("   block writes: {}", img.disk_metrics().block_writes);
    println!();

    // 2. Paint a diagonal, then scan again so the painted cells are evicted
    //    and written.
    for i in 0..640 {
        img.set(&[i, i, i], 0x7fff)?;
    }
    for key in 0..img.grid().num_cells() {
        img.cell(key)?;
    }
    img.flush()?;
    println!("2. Painted the diagonal and forced it out of memory");
    println!("   block writes: {}", img.disk_metrics().block_writes);
    println!("   value at (320, 320, 320): {:#06x}", img.get(&[320, 320, 320])?);
    println!("   value at (320, 0, 0):     {:#06x}", img.get(&[320, 0, 0])?);
    println!();

    let exporter = PrometheusTextExporter::new("cellcache", Vec::new());
    exporter.export(&img.cache_metrics());
    exporter.export(&img.disk_metrics());
    exporter.export(&img.io_metrics());
    println!("3. Metrics\n");
    println!("{}", String::from_utf8_lossy(&exporter.into_inner()));

    img.shutdown()
}
