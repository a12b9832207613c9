// ==============================================
// VOLATILE ACCESS TESTS (integration)
// ==============================================
//
// Placeholders while fetches are in flight, background failures surfacing
// through blocking reads, and cancellation across several images sharing
// one fetch queue.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use cellcache::builder::{DiskCachedCellImgFactory, DiskCachedCellImgOptions};
use cellcache::cell::CellView;
use cellcache::error::LoadFailure;
use cellcache::loader::{CheckerboardLoader, ConstantLoader, FnLoader};
use cellcache::queue::SharedQueue;
use cellcache::volatile::CacheHints;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn options() -> DiskCachedCellImgOptions {
    DiskCachedCellImgOptions::new()
        .cell_dimensions(&[8])
        .max_cache_size(16)
        .num_fetcher_threads(2)
}

#[test]
fn placeholder_is_replaced_by_the_loaded_cell() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u16>::new(options())
        .create(&[32, 32], CheckerboardLoader::black_white())
        .unwrap();
    let queue = Arc::new(options().shared_queue().unwrap());
    let volatile = img.volatile(Arc::clone(&queue));

    let key = img.grid().key_for_element(&[8, 0]).unwrap();
    let placeholder = volatile.get(key, CacheHints::volatile(0)).unwrap();
    assert!(!placeholder.is_valid());
    assert_eq!(placeholder.size(), &[8, 8]);

    queue.wait_idle();
    let cell = volatile.get(key, CacheHints::volatile(0)).unwrap();
    assert!(cell.is_valid());
    assert!(cell.read().iter().all(|&v| v == 0xffff));
}

#[test]
fn blocking_get_loads_on_the_calling_thread() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u8>::new(options())
        .create(&[32], ConstantLoader(4))
        .unwrap();
    let volatile = img.volatile(Arc::new(SharedQueue::new(1, 3).unwrap()));

    let cell = volatile.get(2, CacheHints::blocking()).unwrap();
    assert!(cell.is_valid());
    assert_eq!(cell.to_vec(), vec![4; 8]);
    assert!(img.cache().contains(&2));
}

#[test]
fn background_failure_reaches_the_next_blocking_get() {
    init_logger();
    let loader = FnLoader::new(|cell: &mut CellView<'_, u8>| {
        if cell.key() == 1 {
            return Err(LoadFailure::new("tile server returned 503"));
        }
        cell.fill(9);
        Ok(())
    });
    let img = DiskCachedCellImgFactory::<u8>::new(options())
        .create(&[32], loader)
        .unwrap();
    let queue = Arc::new(SharedQueue::new(1, 3).unwrap());
    let volatile = img.volatile(Arc::clone(&queue));

    assert!(!volatile.get(1, CacheHints::volatile(0)).unwrap().is_valid());
    queue.wait_idle();

    let err = volatile.get(1, CacheHints::blocking()).unwrap_err();
    assert!(err.is_load_failure());
    assert!(err.to_string().contains("503"));
    // The failure was consumed; another blocking read retries the load.
    assert!(volatile.get(1, CacheHints::blocking()).is_err());
    assert!(!img.cache().contains(&1));
    assert_eq!(volatile.get(0, CacheHints::blocking()).unwrap().to_vec(), vec![9; 8]);
}

#[test]
fn placeholders_are_never_written_to_disk() {
    init_logger();
    let img = DiskCachedCellImgFactory::<u8>::new(options().dirty_accesses(false))
        .create(&[32], ConstantLoader(1))
        .unwrap();
    let volatile = img.volatile(Arc::new(SharedQueue::new(1, 3).unwrap()));

    for key in 0..4 {
        let placeholder = volatile.get(key, CacheHints::dont_load()).unwrap();
        assert!(!placeholder.is_valid());
    }
    img.persist_all().unwrap();
    assert_eq!(img.disk_metrics().block_writes, 0);
    assert!(img.cache().is_empty());
}

#[test]
fn images_sharing_a_queue_cancel_independently() {
    init_logger();
    let queue = Arc::new(SharedQueue::new(1, 3).unwrap());
    let first = DiskCachedCellImgFactory::<u8>::new(options())
        .create(&[64], ConstantLoader(1))
        .unwrap();
    let second = DiskCachedCellImgFactory::<u8>::new(options())
        .create(&[64], ConstantLoader(2))
        .unwrap();
    let first_view = first.volatile(Arc::clone(&queue));
    let second_view = second.volatile(Arc::clone(&queue));

    // Park the only worker so fetches stay queued.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    queue
        .enqueue((u64::MAX, 0), 0, true, move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for key in 0..4 {
        first_view.get(key, CacheHints::volatile(1)).unwrap();
        second_view.get(key, CacheHints::volatile(2)).unwrap();
    }
    assert_eq!(queue.len(), 8);
    assert_eq!(first_view.clear_queue(), 4);
    assert_eq!(queue.len(), 4);

    release_tx.send(()).unwrap();
    queue.wait_idle();
    assert!(first.cache().is_empty());
    assert_eq!(second.resident_cells(), 4);
    assert_eq!(second.get(&[0]).unwrap(), 2);
}
