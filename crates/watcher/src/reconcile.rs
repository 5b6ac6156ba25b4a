//! Startup reconciliation
//!
//! Images that arrived while nothing was watching are found by walking the
//! root once at launch. Files are grouped by their parent directory and
//! every unprocessed directory of 2-6 images is submitted like a debounced
//! group would be. Larger directories are skipped rather than split.

use crate::filter::PathFilter;
use crate::{GroupSink, Result, WatchConfig, WatchError};
use gridstitch_core::{ImageGroup, StatusBus, StatusKind, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use gridstitch_journal::Ledger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What a scan found, before anything is submitted
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Unprocessed groups, in directory order
    pub groups: Vec<ImageGroup>,
    /// Directories whose group is already in the ledger
    pub already_processed: usize,
    /// Directories with more eligible images than fit one group
    pub oversized: Vec<(PathBuf, usize)>,
    /// Entries that could not be read
    pub scan_errors: usize,
}

/// Outcome of [`StartupReconciler::run`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub enqueued: usize,
    pub already_processed: usize,
    pub skipped_oversized: usize,
    pub scan_errors: usize,
}

/// One-shot scanner for images already present under the watch root
pub struct StartupReconciler {
    filter: PathFilter,
}

impl StartupReconciler {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    /// Build a reconciler with the same ignore rules as the watcher
    pub fn from_config(root: &Path, config: &WatchConfig) -> Result<Self> {
        Ok(Self::new(PathFilter::new(root, config)?))
    }

    pub fn root(&self) -> &Path {
        self.filter.root()
    }

    /// Walk the root and work out which groups still need stitching
    pub fn plan(&self, ledger: &Ledger) -> Result<ReconcilePlan> {
        let root = self.filter.root();
        if !root.is_dir() {
            return Err(WatchError::RootMissing(root.to_path_buf()));
        }

        let mut plan = ReconcilePlan::default();
        let mut by_directory: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(self.filter.max_depth() + 1)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && self.filter.prunes_dir(e.path())));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // The unreadable subtree is left out; the rest of the walk goes on
                    warn!("Scan error under {}: {}", root.display(), e);
                    plan.scan_errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.filter.accepts(entry.path()) {
                continue;
            }

            if let Some(parent) = entry.path().parent() {
                by_directory
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(entry.into_path());
            }
        }

        for (directory, files) in by_directory {
            let count = files.len();
            if count < MIN_GROUP_SIZE {
                continue;
            }
            if count > MAX_GROUP_SIZE {
                warn!(
                    "Skipping {}: {} images is more than one group of {}",
                    directory.display(),
                    count,
                    MAX_GROUP_SIZE
                );
                plan.oversized.push((directory, count));
                continue;
            }

            let group = ImageGroup::new(files)?;
            if ledger.is_processed(group.paths()) {
                debug!("Already stitched: {}", directory.display());
                plan.already_processed += 1;
            } else {
                plan.groups.push(group);
            }
        }

        Ok(plan)
    }

    /// Scan and submit every unprocessed group to `sink`
    pub fn run(&self, ledger: &Ledger, sink: &dyn GroupSink, status: &StatusBus) -> Result<ReconcileReport> {
        info!("Scanning {} for unprocessed images", self.root().display());
        let plan = self.plan(ledger)?;

        let mut report = ReconcileReport {
            enqueued: 0,
            already_processed: plan.already_processed,
            skipped_oversized: plan.oversized.len(),
            scan_errors: plan.scan_errors,
        };

        for (directory, count) in plan.oversized {
            status.emit(StatusKind::ScanSkipped { directory, count });
        }

        for group in plan.groups {
            info!(
                "Found {} unprocessed images in {}",
                group.len(),
                group.directory().display()
            );
            status.emit(StatusKind::ScanFound {
                directory: group.directory().to_path_buf(),
                count: group.len(),
            });
            sink.submit(group);
            report.enqueued += 1;
        }

        info!("Scan complete: {} groups queued", report.enqueued);
        status.emit(StatusKind::ScanCompleted {
            enqueued: report.enqueued,
        });
        Ok(report)
    }
}
