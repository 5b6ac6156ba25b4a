//! End-to-end tests: queue, compositor, ledger, reconciler and watcher

mod common;

use cli_lib::ProcessingQueue;
use common::{outputs_in, record_status, wait_for, write_png, write_series};
use gridstitch_core::{Compositor, ImageGroup, StatusBus, StatusKind, OUTPUT_DIR_NAME};
use gridstitch_journal::Ledger;
use gridstitch_watcher::{GroupSink, StartupReconciler, WatchConfig, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_queue_stitches_once_and_records_ledger() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("vacation");
    let files = write_series(&dir, "vacation", 3);

    let ledger = Arc::new(Ledger::open(temp.path()));
    let status = StatusBus::new();
    let events = record_status(&status);
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status);

    let group = ImageGroup::new(files.clone()).unwrap();
    assert!(handle.enqueue(group.clone()));
    assert!(handle.enqueue(group));
    drop(handle);

    let stats = queue.shutdown().await;
    assert_eq!(stats.stitched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);

    let outputs = outputs_in(&dir.join(OUTPUT_DIR_NAME));
    assert_eq!(outputs.len(), 1);
    let name = outputs[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("vacation_3images_"), "{name}");

    // 3 images: 2x2 grid of 40x30 cells
    let composite = image::open(&outputs[0]).unwrap();
    assert_eq!((composite.width(), composite.height()), (80, 60));

    let mut reordered = files.clone();
    reordered.reverse();
    assert!(ledger.is_processed(&reordered));
    let record = ledger.record(&files).unwrap();
    assert_eq!(record.image_count, 3);
    assert!(record.output_path.starts_with("vacation/Processed/"));

    let reopened = Ledger::open(temp.path());
    assert!(reopened.is_processed(&files));

    let events = events.lock();
    assert!(events.iter().any(|e| matches!(e, StatusKind::Stitched { count: 3, .. })));
    assert!(events.iter().any(|e| matches!(e, StatusKind::Skipped { count: 3, .. })));
}

#[tokio::test]
async fn test_ledger_is_on_disk_when_stitched_is_reported() {
    let temp = TempDir::new().unwrap();
    let files = write_series(&temp.path().join("set"), "set", 2);
    let root = temp.path().to_path_buf();

    let status = StatusBus::new();
    let persisted = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&persisted);
    let check_files = files.clone();
    status.on_status_event(move |event| {
        if let StatusKind::Stitched { .. } = event.kind {
            *seen.lock() = Some(Ledger::open(&root).is_processed(&check_files));
        }
    });

    let ledger = Arc::new(Ledger::open(temp.path()));
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status);
    handle.enqueue(ImageGroup::new(files).unwrap());
    drop(handle);

    assert_eq!(queue.shutdown().await.stitched, 1);
    assert_eq!(*persisted.lock(), Some(true));
}

#[tokio::test]
async fn test_failed_group_does_not_block_the_next() {
    let temp = TempDir::new().unwrap();
    let broken_dir = temp.path().join("broken");
    std::fs::create_dir_all(&broken_dir).unwrap();
    let bad = broken_dir.join("a.png");
    std::fs::write(&bad, b"definitely not a png").unwrap();
    let good_partner = write_png(&broken_dir.join("b.png"), 10, 10, 10);

    let good = write_series(&temp.path().join("ok"), "ok", 2);

    let ledger = Arc::new(Ledger::open(temp.path()));
    let status = StatusBus::new();
    let events = record_status(&status);
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status);

    handle.enqueue(ImageGroup::new(vec![bad.clone(), good_partner.clone()]).unwrap());
    handle.enqueue(ImageGroup::new(good.clone()).unwrap());
    drop(handle);

    let stats = queue.shutdown().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.stitched, 1);

    assert!(!ledger.is_processed(&[bad, good_partner]));
    assert!(ledger.is_processed(&good));
    assert!(outputs_in(&broken_dir.join(OUTPUT_DIR_NAME)).is_empty());
    assert!(events.lock().iter().any(|e| matches!(e, StatusKind::Failed { .. })));
}

#[tokio::test]
async fn test_configured_output_folder_is_used() {
    let temp = TempDir::new().unwrap();
    let files = write_series(&temp.path().join("in"), "pair", 2);
    let out = temp.path().join("composites");

    let ledger = Arc::new(Ledger::open(temp.path()));
    let (queue, handle) = ProcessingQueue::spawn(Compositor::new(Some(out.clone())), ledger, StatusBus::new());
    handle.enqueue(ImageGroup::new(files).unwrap());
    drop(handle);
    queue.shutdown().await;

    let outputs = outputs_in(&out);
    assert_eq!(outputs.len(), 1);
    let composite = image::open(&outputs[0]).unwrap();
    assert_eq!((composite.width(), composite.height()), (80, 30));
}

#[tokio::test]
async fn test_startup_scan_processes_each_directory_once() {
    let temp = TempDir::new().unwrap();
    write_series(&temp.path().join("trip"), "trip", 3);
    write_series(&temp.path().join("too_many"), "many", 7);
    write_series(&temp.path().join("lonely"), "solo", 1);

    let config = WatchConfig::default();
    let ledger = Arc::new(Ledger::open(temp.path()));
    let status = StatusBus::new();

    // First run stitches the trip folder only
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status.clone());
    let reconciler = StartupReconciler::from_config(temp.path(), &config).unwrap();
    let report = reconciler.run(&ledger, &handle, &status).unwrap();
    drop(handle);
    let stats = queue.shutdown().await;

    assert_eq!(report.enqueued, 1);
    assert_eq!(report.skipped_oversized, 1);
    assert_eq!(stats.stitched, 1);
    assert_eq!(outputs_in(&temp.path().join("trip").join(OUTPUT_DIR_NAME)).len(), 1);

    // The composite inside Processed/ is not picked up as new input
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status.clone());
    let report = reconciler.run(&ledger, &handle, &status).unwrap();
    drop(handle);
    let stats = queue.shutdown().await;

    assert_eq!(report.enqueued, 0);
    assert_eq!(report.already_processed, 1);
    assert_eq!(stats.stitched, 0);
}

#[tokio::test]
async fn test_cleanup_after_sources_removed() {
    let temp = TempDir::new().unwrap();
    let files = write_series(&temp.path().join("gone"), "gone", 2);

    let ledger = Arc::new(Ledger::open(temp.path()));
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), StatusBus::new());
    handle.enqueue(ImageGroup::new(files.clone()).unwrap());
    drop(handle);
    queue.shutdown().await;
    assert_eq!(ledger.count(), 1);

    std::fs::remove_file(&files[0]).unwrap();
    assert_eq!(ledger.cleanup(), 1);
    assert_eq!(Ledger::open(temp.path()).count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_stitches_dropped_images() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();

    let config = WatchConfig {
        debounce: Duration::from_millis(300),
        single_hold: Duration::from_millis(600),
        stability: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
        ..WatchConfig::default()
    };

    let ledger = Arc::new(Ledger::open(&root));
    let status = StatusBus::new();
    let events = record_status(&status);
    let (queue, handle) = ProcessingQueue::spawn(Compositor::default(), Arc::clone(&ledger), status.clone());

    let sink: Arc<dyn GroupSink> = Arc::new(handle.clone());
    let mut watcher = Watcher::new(&root, config, sink, status);
    watcher.start().await.unwrap();

    let album = root.join("album");
    std::fs::create_dir_all(&album).unwrap();
    // Give the recursive watch time to cover the new directory
    tokio::time::sleep(Duration::from_millis(300)).await;
    write_series(&album, "beach", 4);

    let processed = album.join(OUTPUT_DIR_NAME);
    let stitched = wait_for(Duration::from_secs(10), || outputs_in(&processed).len() == 1).await;

    watcher.stop().await;
    drop(watcher);
    drop(handle);
    queue.shutdown().await;

    assert!(stitched, "no composite appeared in {}", processed.display());
    let composite = image::open(&outputs_in(&processed)[0]).unwrap();
    // 4 images: 2x2 grid of 40x30 cells
    assert_eq!((composite.width(), composite.height()), (80, 60));
    assert_eq!(ledger.count(), 1);

    let events = events.lock();
    assert!(events.iter().any(|e| matches!(e, StatusKind::GroupReady { count: 4, .. })));
    assert!(events.iter().any(|e| matches!(e, StatusKind::WatchStopped { .. })));
}
