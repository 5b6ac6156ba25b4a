//! Sequential processing queue
//!
//! A single consumer drains a FIFO of image groups. For each group it checks
//! the ledger, composites on a blocking thread, and records the result before
//! taking the next item. Failures are logged and the group is dropped.

use gridstitch_core::{Compositor, ImageGroup, StatusBus, StatusKind};
use gridstitch_journal::Ledger;
use gridstitch_watcher::GroupSink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Counters for a finished drain
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub stitched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Clonable producer side of the queue
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<ImageGroup>,
    pending: Arc<AtomicUsize>,
}

impl QueueHandle {
    /// Append a group; never blocks
    ///
    /// Returns false if the queue has shut down.
    pub fn enqueue(&self, group: ImageGroup) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(group) {
            Ok(()) => true,
            Err(mpsc::error::SendError(group)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                error!("Queue closed, dropping group from {}", group.directory().display());
                false
            }
        }
    }

    /// Groups enqueued but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl GroupSink for QueueHandle {
    fn submit(&self, group: ImageGroup) {
        self.enqueue(group);
    }
}

/// The consumer task
pub struct ProcessingQueue {
    task: JoinHandle<QueueStats>,
}

impl ProcessingQueue {
    /// Start draining on the current runtime
    pub fn spawn(compositor: Compositor, ledger: Arc<Ledger>, status: StatusBus) -> (Self, QueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(drain(rx, Arc::new(compositor), ledger, status, Arc::clone(&pending)));
        (Self { task }, QueueHandle { tx, pending })
    }

    /// Wait for every queued item to finish
    ///
    /// All handles must be dropped first, otherwise this waits forever.
    pub async fn shutdown(self) -> QueueStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Processing queue task failed: {}", e);
                QueueStats::default()
            }
        }
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<ImageGroup>,
    compositor: Arc<Compositor>,
    ledger: Arc<Ledger>,
    status: StatusBus,
    pending: Arc<AtomicUsize>,
) -> QueueStats {
    let mut stats = QueueStats::default();

    while let Some(group) = rx.recv().await {
        let directory = group.directory().to_path_buf();
        let count = group.len();

        if ledger.is_processed(group.paths()) {
            debug!("Group already processed, skipping: {}", directory.display());
            status.emit(StatusKind::Skipped { directory, count });
            stats.skipped += 1;
            pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        info!("Stitching {} images from {}", count, directory.display());
        let job_compositor = Arc::clone(&compositor);
        let job_ledger = Arc::clone(&ledger);
        let paths = group.into_paths();
        // The ledger write fsyncs, so it shares the blocking thread with compose
        let result = tokio::task::spawn_blocking(move || {
            job_compositor.compose(&paths).map(|output| {
                job_ledger.mark_processed(&paths, &output.output_path);
                output
            })
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                info!("Successfully created: {}", output.output_path.display());
                status.emit(StatusKind::Stitched {
                    output: output.output_path,
                    count,
                });
                stats.stitched += 1;
            }
            Ok(Err(e)) => {
                error!("Failed to stitch images from {}: {}", directory.display(), e);
                status.emit(StatusKind::Failed {
                    directory,
                    error: e.to_string(),
                });
                stats.failed += 1;
            }
            Err(e) => {
                error!("Stitch task for {} panicked: {}", directory.display(), e);
                status.emit(StatusKind::Failed {
                    directory,
                    error: e.to_string(),
                });
                stats.failed += 1;
            }
        }

        pending.fetch_sub(1, Ordering::SeqCst);
    }

    debug!("Processing queue drained");
    stats
}
