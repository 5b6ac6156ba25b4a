//! Per-directory debouncing of image arrivals into groups
//!
//! Each directory buffers arrivals with its own deadline. An arrival pushes
//! the deadline out by the debounce delay, unless it brings the directory to
//! the group limit, in which case that directory flushes at once.
//!
//! At a directory's deadline:
//! - 2 or more buffered: the earliest (by arrival) up to 6 are checked for
//!   existence and emitted as one group; leftovers get a fresh deadline
//! - exactly 1 buffered: it is held for the longer single-image timeout,
//!   then abandoned if still alone

use crate::filter::PathFilter;
use crate::WatchEvent;
use gridstitch_core::{ImageGroup, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Debounce timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiet time after the last arrival before a directory flushes
    pub delay: Duration,
    /// How long a lone image waits for a partner
    pub single_hold: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            single_hold: Duration::from_secs(10),
        }
    }
}

/// Buffered arrivals for one directory
#[derive(Debug)]
pub struct PendingGroup {
    pub directory: PathBuf,
    pub arrivals: Vec<WatchEvent>,
    pub deadline: Instant,
    /// Waiting out the single-image timeout
    pub holding: bool,
}

/// What a flush produced
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Groups ready for the processing queue
    pub groups: Vec<ImageGroup>,
    /// Directories whose buffered images were dropped, with the count
    pub abandoned: Vec<(PathBuf, usize)>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.abandoned.is_empty()
    }

    fn extend(&mut self, other: FlushReport) {
        self.groups.extend(other.groups);
        self.abandoned.extend(other.abandoned);
    }
}

/// Turns single file arrivals into bounded image groups
#[derive(Debug)]
pub struct GroupAccumulator {
    config: DebounceConfig,
    filter: PathFilter,
    pending: HashMap<PathBuf, PendingGroup>,
}

impl GroupAccumulator {
    pub fn new(config: DebounceConfig, filter: PathFilter) -> Self {
        Self {
            config,
            filter,
            pending: HashMap::new(),
        }
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Buffer an arrival
    ///
    /// Returns whatever an immediate size-limit flush produced. Ineligible
    /// paths and duplicates of already-buffered paths are ignored.
    pub fn on_file_added(&mut self, event: WatchEvent) -> FlushReport {
        if !self.filter.accepts(&event.path) {
            debug!("Ignoring {}", event.path.display());
            return FlushReport::default();
        }

        let now = event.observed_at;
        let directory = event.directory.clone();
        let delay = self.config.delay;

        let pending = self
            .pending
            .entry(directory.clone())
            .or_insert_with(|| PendingGroup {
                directory: directory.clone(),
                arrivals: Vec::new(),
                deadline: now + delay,
                holding: false,
            });

        if pending.arrivals.iter().any(|a| a.path == event.path) {
            debug!("Already buffered: {}", event.path.display());
            return FlushReport::default();
        }

        info!(
            "New image detected: {} in {}",
            event.path.file_name().unwrap_or_default().to_string_lossy(),
            directory.display()
        );
        pending.arrivals.push(event);
        pending.holding = false;

        if pending.arrivals.len() >= MAX_GROUP_SIZE {
            debug!("{} reached {} images, flushing now", directory.display(), MAX_GROUP_SIZE);
            return self.flush_directory(&directory, now);
        }

        pending.deadline = now + delay;
        FlushReport::default()
    }

    /// Earliest pending deadline, if anything is buffered
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Flush every directory whose deadline has passed
    pub fn flush_due(&mut self, now: Instant) -> FlushReport {
        let mut due: Vec<PathBuf> = self
            .pending
            .values()
            .filter(|p| p.deadline <= now)
            .map(|p| p.directory.clone())
            .collect();
        due.sort();

        let mut report = FlushReport::default();
        for directory in due {
            report.extend(self.flush_directory(&directory, now));
        }
        report
    }

    fn flush_directory(&mut self, directory: &Path, now: Instant) -> FlushReport {
        let mut report = FlushReport::default();
        let Some(pending) = self.pending.get_mut(directory) else {
            return report;
        };

        match pending.arrivals.len() {
            0 => {}
            1 if pending.holding => {
                info!("No partner arrived for the single image in {}", directory.display());
                pending.arrivals.clear();
                report.abandoned.push((directory.to_path_buf(), 1));
            }
            1 => {}
            _ => {
                pending.arrivals.sort_by_key(|a| a.observed_at);
                let take = pending.arrivals.len().min(MAX_GROUP_SIZE);
                let batch: Vec<WatchEvent> = pending.arrivals.drain(..take).collect();

                let mut verified = Vec::with_capacity(batch.len());
                for arrival in batch {
                    if arrival.path.exists() {
                        verified.push(arrival.path);
                    } else {
                        warn!("File no longer accessible: {}", arrival.path.display());
                    }
                }

                if verified.len() >= MIN_GROUP_SIZE {
                    info!("Processing {} images from {}", verified.len(), directory.display());
                    match ImageGroup::new(verified) {
                        Ok(group) => report.groups.push(group),
                        Err(e) => warn!("Dropping group from {}: {}", directory.display(), e),
                    }
                } else if !verified.is_empty() {
                    report.abandoned.push((directory.to_path_buf(), verified.len()));
                }
            }
        }

        match pending.arrivals.len() {
            0 => {
                self.pending.remove(directory);
            }
            1 => {
                if !pending.holding {
                    pending.holding = true;
                    pending.deadline = now + self.config.single_hold;
                }
            }
            _ => {
                pending.holding = false;
                pending.deadline = now + self.config.delay;
            }
        }

        report
    }

    /// Total buffered images across all directories
    pub fn buffered(&self) -> usize {
        self.pending.values().map(|p| p.arrivals.len()).sum()
    }

    pub fn pending_directories(&self) -> usize {
        self.pending.len()
    }

    /// Discard every buffer without emitting, returning the image count
    pub fn clear(&mut self) -> usize {
        let count = self.buffered();
        self.pending.clear();
        count
    }
}
