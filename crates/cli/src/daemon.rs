//! Daemon lifecycle management
//!
//! Runs in the foreground until Ctrl-C: lock, ledger, queue, watcher, a
//! delayed startup scan and periodic ledger cleanup.

use crate::locks::DaemonLock;
use crate::queue::{ProcessingQueue, QueueHandle};
use crate::system_config::SystemConfig;
use anyhow::{Context, Result};
use gridstitch_core::{Compositor, StatusBus, StatusEvent, StatusKind};
use gridstitch_journal::Ledger;
use gridstitch_watcher::{GroupSink, StartupReconciler, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before the startup scan, so the watcher settles first
pub const RECONCILE_DELAY: Duration = Duration::from_secs(2);

/// Check whether a daemon holds the lock for `watch_root`
pub fn is_running(watch_root: &Path) -> bool {
    DaemonLock::holder(watch_root).is_some()
}

/// Log listener registered on every status bus the CLI creates
pub fn log_status_event(event: &StatusEvent) {
    match &event.kind {
        StatusKind::Failed { directory, error } => {
            debug!(at = %event.at, "status: failed in {}: {}", directory.display(), error)
        }
        kind => debug!(at = %event.at, "status: {:?}", kind),
    }
}

/// Start watching and block until Ctrl-C
pub async fn start(config: &SystemConfig) -> Result<()> {
    if config.settings.is_paused {
        anyhow::bail!("Watching is paused. Run 'gridstitch resume' first.");
    }

    let root = config.watch_root()?;

    let lock = DaemonLock::acquire(&root)?;
    info!("Starting Gridstitch on {}", root.display());

    let ledger = Arc::new(Ledger::open(&root));
    info!("Loaded {} processed groups from ledger", ledger.count());

    let status = StatusBus::new();
    status.on_status_event(log_status_event);

    let compositor = Compositor::new(config.settings.output_folder.clone());
    let (queue, handle) = ProcessingQueue::spawn(compositor, Arc::clone(&ledger), status.clone());

    let watch_config = config.watch_config();
    let sink: Arc<dyn GroupSink> = Arc::new(handle.clone());
    let mut watcher = Watcher::new(&root, watch_config.clone(), sink, status.clone());
    watcher.start().await.context("Failed to start folder watcher")?;

    let reconciler = StartupReconciler::from_config(&root, &watch_config)?;
    let scan_task = spawn_startup_scan(reconciler, Arc::clone(&ledger), handle.clone(), status.clone());
    let cleanup_task = config
        .cleanup_interval()
        .map(|period| spawn_cleanup(Arc::clone(&ledger), period));

    println!("Watching {} (Ctrl-C to stop)", root.display());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    watcher.stop().await;
    drop(watcher);
    scan_task.abort();
    if let Some(task) = cleanup_task {
        task.abort();
    }
    let _ = scan_task.await;

    let outstanding = handle.pending();
    if outstanding > 0 {
        info!("Finishing {} queued groups", outstanding);
    }
    drop(handle);
    let stats = queue.shutdown().await;
    info!(
        "Stopped: {} stitched, {} skipped, {} failed",
        stats.stitched, stats.skipped, stats.failed
    );

    if let Err(e) = ledger.save() {
        error!("Failed to save ledger on shutdown: {}", e);
    }
    lock.release()?;
    Ok(())
}

fn spawn_startup_scan(
    reconciler: StartupReconciler,
    ledger: Arc<Ledger>,
    handle: QueueHandle,
    status: StatusBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(RECONCILE_DELAY).await;
        let result = tokio::task::spawn_blocking(move || reconciler.run(&ledger, &handle, &status)).await;
        match result {
            Ok(Ok(report)) => debug!("Startup scan: {:?}", report),
            Ok(Err(e)) => warn!("Startup scan failed: {}", e),
            Err(e) => warn!("Startup scan task failed: {}", e),
        }
    })
}

fn spawn_cleanup(ledger: Arc<Ledger>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        // First tick completes immediately
        timer.tick().await;
        loop {
            timer.tick().await;
            let ledger = Arc::clone(&ledger);
            match tokio::task::spawn_blocking(move || ledger.cleanup()).await {
                Ok(0) => debug!("Ledger cleanup: nothing to remove"),
                Ok(removed) => info!("Ledger cleanup removed {} stale records", removed),
                Err(e) => warn!("Ledger cleanup failed: {}", e),
            }
        }
    })
}
