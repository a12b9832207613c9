// ==============================================
// DISK ROUND-TRIP TESTS (integration)
// ==============================================
//
// Cells evicted from memory come back from their block files with the
// values they had, clean cells are not rewritten, and damaged block files
// are replaced by a fresh load.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cellcache::builder::{DiskCachedCellImgFactory, DiskCachedCellImgOptions};
use cellcache::cell::CellView;
use cellcache::error::LoadFailure;
use cellcache::loader::{ConstantLoader, FnLoader};
use cellcache::policy::EvictionPolicy;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 16 elements in four cells of four, two resident at a time.
fn options() -> DiskCachedCellImgOptions {
    DiskCachedCellImgOptions::new()
        .cell_dimensions(&[4])
        .max_cache_size(2)
}

#[test]
fn dirty_cells_round_trip_through_block_files() {
    init_logger();
    let img = DiskCachedCellImgFactory::<f32>::new(options())
        .create(&[16], ConstantLoader(0.5))
        .unwrap();

    img.set(&[1], 1.25).unwrap();
    img.set(&[3], -8.0).unwrap();
    img.cell(1).unwrap();
    img.cell(2).unwrap();
    img.flush().unwrap();
    assert!(!img.cache().contains(&0));
    assert!(img.directory().join("0").is_file());

    assert_eq!(img.get(&[1]).unwrap(), 1.25);
    assert_eq!(img.get(&[3]).unwrap(), -8.0);
    assert_eq!(img.get(&[0]).unwrap(), 0.5);
    assert_eq!(img.disk_metrics().block_reads, 1);
}

#[test]
fn clean_cells_are_not_written() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(options().num_io_threads(0))
        .create(&[16], ConstantLoader(7))
        .unwrap();

    for key in 0..4 {
        img.cell(key).unwrap();
    }
    let metrics = img.disk_metrics();
    assert_eq!(metrics.block_writes, 0);
    assert_eq!(metrics.clean_skips, 2);
    assert_eq!(fs::read_dir(img.directory()).unwrap().count(), 0);
}

#[test]
fn without_dirty_tracking_every_eviction_is_written() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(options().num_io_threads(0).dirty_accesses(false))
        .create(&[16], ConstantLoader(7))
        .unwrap();

    for key in 0..4 {
        img.cell(key).unwrap();
    }
    assert_eq!(img.disk_metrics().block_writes, 2);
    assert!(img.directory().join("0").is_file());
    assert!(img.directory().join("1").is_file());
}

#[test]
fn corrupt_block_is_discarded_and_reloaded() {
    init_logger();
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader = FnLoader::new(move |cell: &mut CellView<'_, i64>| {
        counter.fetch_add(1, Ordering::SeqCst);
        cell.fill(3);
        Ok::<_, LoadFailure>(())
    });
    let img = DiskCachedCellImgFactory::<i64>::new(options().num_io_threads(0))
        .create(&[16], loader)
        .unwrap();

    img.set(&[0], 99).unwrap();
    img.cell(1).unwrap();
    img.cell(2).unwrap();
    let block = img.directory().join("0");
    assert!(block.is_file());
    fs::write(&block, b"not a block").unwrap();

    assert_eq!(img.get(&[0]).unwrap(), 3);
    assert_eq!(loads.load(Ordering::SeqCst), 4);
    assert_eq!(img.disk_metrics().corrupt_blocks, 1);
    assert!(!block.exists());
}

#[test]
fn truncated_edge_cells_round_trip() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u8>::new(options().num_io_threads(0))
        .create(&[10, 3], ConstantLoader(1))
        .unwrap();

    // The last cell along axis 0 is 2 x 3.
    img.set(&[9, 2], 200).unwrap();
    let last = img.grid().key_for_element(&[9, 2]).unwrap();
    for key in 0..img.grid().num_cells() {
        if key != last {
            img.cell(key).unwrap();
        }
    }
    assert!(!img.cache().contains(&last));
    let bytes = fs::read(img.directory().join(last.to_string())).unwrap();
    assert_eq!(bytes.len(), 2 * 3);
    assert_eq!(img.get(&[9, 2]).unwrap(), 200);
    assert_eq!(img.get(&[8, 0]).unwrap(), 1);
}

#[test]
fn write_behind_preserves_every_modification() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u32>::new(
        DiskCachedCellImgOptions::new()
            .cell_dimensions(&[2])
            .max_cache_size(3)
            .num_io_threads(2)
            .max_io_queue_size(2),
    )
    .create_zeroed(&[128])
    .unwrap();

    for x in 0..128u64 {
        img.set(&[x], (x * 3) as u32).unwrap();
    }
    for x in (0..128u64).rev() {
        assert_eq!(img.get(&[x]).unwrap(), (x * 3) as u32, "element {x}");
    }
    img.flush().unwrap();
    assert_eq!(img.io_metrics().pending, 0);
    img.shutdown().unwrap();
}

#[test]
fn persist_on_load_writes_fresh_cells_immediately() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u8>::new(options().num_io_threads(0).persist_on_load(true))
        .create(&[16], ConstantLoader(5))
        .unwrap();

    img.cell(3).unwrap();
    assert!(img.directory().join("3").is_file());
    assert_eq!(img.disk_metrics().block_writes, 1);
}

#[test]
fn cache_directory_lifetime_follows_options() {
    init_logger();
    let parent = tempfile::tempdir().unwrap();
    let removed = parent.path().join("removed");
    let kept = parent.path().join("kept");

    for (dir, delete) in [(&removed, true), (&kept, false)] {
        let img = DiskCachedCellImgFactory::<u8>::new(
            options()
                .num_io_threads(0)
                .cache_dir(dir)
                .delete_cache_dir_on_drop(delete),
        )
        .create(&[16], ConstantLoader(1))
        .unwrap();
        img.set(&[0], 2).unwrap();
        img.persist_all().unwrap();
        assert!(dir.join("0").is_file());
    }

    assert!(!removed.exists());
    assert!(kept.join("0").is_file());
}

#[test]
fn set_under_clock_lands_in_a_resident_cell() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(
        options()
            .num_io_threads(0)
            .eviction_policy(EvictionPolicy::Clock),
    )
    .create(&[12], ConstantLoader(1))
    .unwrap();

    for _ in 0..2 {
        img.cell(0).unwrap();
        img.cell(1).unwrap();
    }
    img.set(&[8], 42).unwrap();
    assert!(img.cache().contains(&2));
    assert_eq!(img.get(&[8]).unwrap(), 42);

    img.persist_all().unwrap();
    img.invalidate_all();
    assert_eq!(img.get(&[8]).unwrap(), 42);
}

#[test]
fn writes_through_a_handle_held_past_eviction_are_kept() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(options().num_io_threads(0))
        .create(&[12], ConstantLoader(1))
        .unwrap();

    let held = img.cell(0).unwrap();
    img.cell(1).unwrap();
    img.cell(2).unwrap();
    assert!(!img.cache().contains(&0));

    held.write()[0] = 42;
    let again = img.cell(0).unwrap();
    assert!(Arc::ptr_eq(&held, &again));
    assert_eq!(img.get(&[0]).unwrap(), 42);
    assert_eq!(img.io_metrics().held_hits, 1);
}

#[test]
fn handle_released_after_eviction_is_written_on_flush() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(options().num_io_threads(0))
        .create(&[12], ConstantLoader(1))
        .unwrap();

    let held = img.cell(0).unwrap();
    img.cell(1).unwrap();
    img.cell(2).unwrap();
    held.write()[3] = 9;
    drop(held);
    assert!(!img.directory().join("0").exists());

    img.flush().unwrap();
    assert!(img.directory().join("0").is_file());
    assert_eq!(img.io_metrics().held, 0);
    assert_eq!(img.get(&[3]).unwrap(), 9);
    assert_eq!(img.io_metrics().held_hits, 0);
}
