//! File system watching for Gridstitch
//!
//! This crate provides:
//! - Recursive watching of a root with write-finish detection
//! - Per-directory debouncing of arrivals into image groups
//! - Startup reconciliation of images that arrived while offline

pub mod debounce;
pub mod filter;
pub mod reconcile;
pub mod stability;

use debounce::{DebounceConfig, FlushReport, GroupAccumulator};
use filter::PathFilter;
use gridstitch_core::{ImageGroup, StatusBus, StatusKind};
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use serde::{Deserialize, Serialize};
use stability::StabilityGate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

pub use debounce::PendingGroup;
pub use reconcile::{ReconcilePlan, ReconcileReport, StartupReconciler};

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error("watch root does not exist or is not a directory: {0}")]
    RootMissing(PathBuf),
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("invalid ignore pattern: {0}")]
    Ignore(#[from] ignore::Error),
    #[error("directory scan failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Group(#[from] gridstitch_core::StitchError),
    #[error("watcher must be started inside a tokio runtime")]
    NoRuntime,
}

/// A file arrival, created per add notification and consumed by the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub directory: PathBuf,
    pub observed_at: Instant,
}

impl WatchEvent {
    pub fn new(path: PathBuf, observed_at: Instant) -> Self {
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            path,
            directory,
            observed_at,
        }
    }
}

/// Receives groups that are ready to be stitched
pub trait GroupSink: Send + Sync {
    fn submit(&self, group: ImageGroup);
}

impl<F> GroupSink for F
where
    F: Fn(ImageGroup) + Send + Sync,
{
    fn submit(&self, group: ImageGroup) {
        self(group)
    }
}

/// Watcher tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet time after the last arrival before a directory flushes
    pub debounce: Duration,
    /// How long a lone image waits for a partner
    pub single_hold: Duration,
    /// Size must stay unchanged this long before a new file is reported
    pub stability: Duration,
    /// How often unsettled files are re-checked
    pub poll_interval: Duration,
    /// Maximum directory nesting below the root
    pub max_depth: usize,
    /// Explicit output folder, excluded from watching
    pub output_folder: Option<PathBuf>,
    /// Extra gitignore-style patterns
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            single_hold: Duration::from_secs(10),
            stability: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            max_depth: 99,
            output_folder: None,
            ignore_patterns: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn debounce_config(&self) -> DebounceConfig {
        DebounceConfig {
            delay: self.debounce,
            single_hold: self.single_hold,
        }
    }
}

/// Raw change forwarded from the notify callback
#[derive(Debug)]
enum Change {
    /// File or directory appeared (create or rename-into)
    Added(PathBuf),
    /// Data written to an existing path
    Written(PathBuf),
    /// Path removed or renamed away
    Removed(PathBuf),
}

enum Message {
    Change(Change),
    Stop(oneshot::Sender<usize>),
}

/// Handle to a running accumulator task
pub struct AccumulatorHandle {
    tx: mpsc::UnboundedSender<Message>,
    task: JoinHandle<usize>,
}

impl AccumulatorHandle {
    /// Report a new file (it still goes through the stability gate)
    pub fn file_added(&self, path: PathBuf) {
        let _ = self.tx.send(Message::Change(Change::Added(path)));
    }

    /// Report a write to a file
    pub fn file_written(&self, path: PathBuf) {
        let _ = self.tx.send(Message::Change(Change::Written(path)));
    }

    /// Report a removed file
    pub fn file_removed(&self, path: PathBuf) {
        let _ = self.tx.send(Message::Change(Change::Removed(path)));
    }

    fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.tx.clone()
    }

    /// Stop the task, discarding unflushed buffers
    ///
    /// Returns the number of images that were discarded.
    pub async fn stop(self) -> usize {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Stop(done_tx)).is_err() {
            return self.task.await.unwrap_or(0);
        }
        let discarded = done_rx.await.unwrap_or(0);
        if let Err(e) = self.task.await {
            warn!("Accumulator task ended abnormally: {}", e);
        }
        discarded
    }
}

/// Spawn the accumulator loop on the current tokio runtime
pub fn spawn_accumulator(
    config: &WatchConfig,
    filter: PathFilter,
    sink: Arc<dyn GroupSink>,
    status: StatusBus,
) -> AccumulatorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let acc = GroupAccumulator::new(config.debounce_config(), filter);
    let gate = StabilityGate::new(config.stability);
    let task = tokio::spawn(run_accumulator(
        rx,
        tx.downgrade(),
        acc,
        gate,
        config.poll_interval,
        sink,
        status,
    ));
    AccumulatorHandle { tx, task }
}

async fn run_accumulator(
    mut rx: mpsc::UnboundedReceiver<Message>,
    loopback: WeakUnboundedSender<Message>,
    mut acc: GroupAccumulator,
    mut gate: StabilityGate,
    poll_interval: Duration,
    sink: Arc<dyn GroupSink>,
    status: StatusBus,
) -> usize {
    // Ticks on a fixed schedule; incoming messages must not push it back
    let mut poll = interval(poll_interval.max(Duration::from_millis(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = acc.next_deadline();
        let settling = !gate.is_empty();

        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Change(change)) => {
                    handle_change(change, &mut acc, &mut gate, &loopback);
                }
                Some(Message::Stop(done)) => {
                    let discarded = acc.clear() + gate.clear();
                    let _ = done.send(discarded);
                    return discarded;
                }
                None => return acc.clear() + gate.clear(),
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let report = acc.flush_due(Instant::now());
                dispatch(report, sink.as_ref(), &status);
            }
            _ = poll.tick(), if settling => {
                for path in gate.poll(Instant::now()) {
                    let event = WatchEvent::new(path.clone(), Instant::now());
                    let before = acc.buffered();
                    let report = acc.on_file_added(event);
                    if acc.buffered() > before {
                        status.emit(StatusKind::Buffering {
                            path,
                            buffered: acc.buffered(),
                        });
                    }
                    dispatch(report, sink.as_ref(), &status);
                }
            }
        }
    }
}

fn handle_change(
    change: Change,
    acc: &mut GroupAccumulator,
    gate: &mut StabilityGate,
    loopback: &WeakUnboundedSender<Message>,
) {
    let now = Instant::now();
    match change {
        Change::Added(path) if path.is_dir() => {
            // A directory moved in brings its files with it; inotify only
            // reports the directory itself.
            if acc.filter().prunes_dir(&path) {
                return;
            }
            let filter = acc.filter().clone();
            let loopback = loopback.clone();
            tokio::task::spawn_blocking(move || {
                for file in walk_moved_dir(&path, &filter) {
                    let Some(tx) = loopback.upgrade() else {
                        return;
                    };
                    let _ = tx.send(Message::Change(Change::Added(file)));
                }
            });
        }
        Change::Added(path) => {
            if acc.filter().accepts(&path) {
                trace!("Tracking new file {}", path.display());
                gate.track(path, now);
            }
        }
        Change::Written(path) => gate.touch(&path, now),
        Change::Removed(path) => gate.forget(&path),
    }
}

/// Eligible files below a directory that appeared in one piece
fn walk_moved_dir(dir: &Path, filter: &PathFilter) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(filter.max_depth() + 1)
        .into_iter()
        .filter_entry(|e| !e.file_type().is_dir() || !filter.prunes_dir(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && filter.accepts(e.path()))
        .map(|e| e.into_path())
        .collect()
}

fn dispatch(report: FlushReport, sink: &dyn GroupSink, status: &StatusBus) {
    for (directory, count) in report.abandoned {
        status.emit(StatusKind::GroupAbandoned { directory, count });
    }
    for group in report.groups {
        status.emit(StatusKind::GroupReady {
            directory: group.directory().to_path_buf(),
            count: group.len(),
        });
        sink.submit(group);
    }
}

/// Translate a notify event into accumulator messages
fn forward_event(event: Event, tx: &mpsc::UnboundedSender<Message>) {
    let changes: Vec<Change> = match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any) => {
            event.paths.into_iter().map(Change::Added).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(Change::Added).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(Change::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let from = paths.next();
            let to = paths.next();
            from.map(Change::Removed)
                .into_iter()
                .chain(to.map(Change::Added))
                .collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .into_iter()
            .map(|p| if p.exists() { Change::Added(p) } else { Change::Removed(p) })
            .collect(),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            event.paths.into_iter().map(Change::Written).collect()
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
            event.paths.into_iter().map(Change::Removed).collect()
        }
        _ => {
            trace!("Ignoring event: {:?}", event.kind);
            Vec::new()
        }
    };

    for change in changes {
        let _ = tx.send(Message::Change(change));
    }
}

struct Running {
    /// Dropping the notify watcher ends observation
    _fs: RecommendedWatcher,
    accumulator: AccumulatorHandle,
}

/// Watches a root for image arrivals and hands ready groups to a sink
pub struct Watcher {
    root: PathBuf,
    config: WatchConfig,
    sink: Arc<dyn GroupSink>,
    status: StatusBus,
    running: Option<Running>,
}

impl Watcher {
    /// Create a watcher for `root`; nothing is observed until [`start`](Self::start)
    pub fn new(root: &Path, config: WatchConfig, sink: Arc<dyn GroupSink>, status: StatusBus) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            sink,
            status,
            running: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin recursive observation
    ///
    /// A running watcher is stopped first, discarding its buffers.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            self.stop().await;
        }
        if !self.root.is_dir() {
            return Err(WatchError::RootMissing(self.root.clone()));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(WatchError::NoRuntime);
        }

        let filter = PathFilter::new(&self.root, &self.config)?;
        let accumulator = spawn_accumulator(&self.config, filter, Arc::clone(&self.sink), self.status.clone());

        let tx = accumulator.sender();
        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward_event(event, &tx),
            Err(e) => error!("Watcher error: {}", e),
        })?;

        if let Err(e) = fs_watcher.watch(&self.root, RecursiveMode::Recursive) {
            accumulator.stop().await;
            return Err(e.into());
        }

        info!("Watching folder: {}", self.root.display());
        self.status.emit(StatusKind::WatchStarted {
            root: self.root.clone(),
        });

        self.running = Some(Running {
            _fs: fs_watcher,
            accumulator,
        });
        Ok(())
    }

    /// Stop observation and discard unflushed buffers
    ///
    /// Groups already handed to the sink are unaffected.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let Running { _fs, accumulator } = running;
        drop(_fs);
        let discarded = accumulator.stop().await;

        if discarded > 0 {
            debug!("Discarded {} unflushed images", discarded);
        }
        info!("Folder watching stopped");
        self.status.emit(StatusKind::WatchStopped {
            root: self.root.clone(),
            discarded,
        });
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.accumulator.task.abort();
        }
    }
}
