//! Status observer bus
//!
//! Core components report progress here; front-ends register listeners
//! with [`StatusBus::on_status_event`] instead of being called directly.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

type Listener = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

/// A timestamped status notification
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub at: DateTime<Utc>,
    pub kind: StatusKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusKind {
    /// Watching began for a root
    WatchStarted { root: PathBuf },
    /// Watching stopped; unflushed buffers were discarded
    WatchStopped { root: PathBuf, discarded: usize },
    /// A new image was buffered
    Buffering { path: PathBuf, buffered: usize },
    /// The accumulator handed a group to the queue
    GroupReady { directory: PathBuf, count: usize },
    /// Buffered images were dropped without stitching
    GroupAbandoned { directory: PathBuf, count: usize },
    /// A composite was written
    Stitched { output: PathBuf, count: usize },
    /// A queued group was already in the ledger
    Skipped { directory: PathBuf, count: usize },
    /// A queued group failed and was discarded
    Failed { directory: PathBuf, error: String },
    /// The startup scan found an unprocessed group
    ScanFound { directory: PathBuf, count: usize },
    /// The startup scan skipped a directory with too many images
    ScanSkipped { directory: PathBuf, count: usize },
    /// The startup scan finished
    ScanCompleted { enqueued: usize },
}

impl StatusEvent {
    pub fn now(kind: StatusKind) -> Self {
        Self { at: Utc::now(), kind }
    }
}

/// Fan-out of status events to registered listeners
#[derive(Clone, Default)]
pub struct StatusBus {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every subsequent event
    pub fn on_status_event<F>(&self, handler: F)
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(handler));
    }

    /// Deliver an event to all listeners
    pub fn emit(&self, kind: StatusKind) {
        let event = StatusEvent::now(kind);
        // Snapshot so a listener may register another without deadlocking.
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_listeners_receive_events_in_order() {
        let bus = StatusBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.on_status_event(move |event| sink.lock().unwrap().push(event.kind.clone()));

        bus.emit(StatusKind::ScanCompleted { enqueued: 1 });
        bus.emit(StatusKind::ScanCompleted { enqueued: 2 });

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                StatusKind::ScanCompleted { enqueued: 1 },
                StatusKind::ScanCompleted { enqueued: 2 },
            ]
        );
    }

    #[test]
    fn test_clones_share_listeners() {
        let bus = StatusBus::new();
        let clone = bus.clone();
        clone.on_status_event(|_| {});
        assert_eq!(bus.listener_count(), 1);
    }
}
