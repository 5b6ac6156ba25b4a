//! Write-finish detection
//!
//! A newly created file is only reported once its size has stayed the same
//! for a quiet period, so half-copied images never reach the accumulator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct Candidate {
    last_size: Option<u64>,
    quiet_since: Instant,
}

/// Tracks files that were created but may still be being written
#[derive(Debug)]
pub struct StabilityGate {
    quiet_period: Duration,
    candidates: HashMap<PathBuf, Candidate>,
}

impl StabilityGate {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            candidates: HashMap::new(),
        }
    }

    /// Start (or restart) tracking a created file
    pub fn track(&mut self, path: PathBuf, now: Instant) {
        self.candidates
            .entry(path)
            .and_modify(|c| c.quiet_since = now)
            .or_insert(Candidate {
                last_size: None,
                quiet_since: now,
            });
    }

    /// Note a write to a tracked file; untracked paths are ignored
    pub fn touch(&mut self, path: &Path, now: Instant) {
        if let Some(candidate) = self.candidates.get_mut(path) {
            candidate.quiet_since = now;
        }
    }

    /// Forget a path (deleted or moved away)
    pub fn forget(&mut self, path: &Path) {
        self.candidates.remove(path);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check sizes and return files that have been quiet long enough
    ///
    /// Files that vanished are dropped silently.
    pub fn poll(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        let quiet_period = self.quiet_period;

        self.candidates.retain(|path, candidate| {
            let size = match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => {
                    trace!("Candidate vanished before settling: {}", path.display());
                    return false;
                }
            };

            if candidate.last_size != Some(size) {
                candidate.last_size = Some(size);
                candidate.quiet_since = now;
            }

            if now.duration_since(candidate.quiet_since) >= quiet_period {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });

        ready.sort();
        ready
    }

    /// Drop all tracked files, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.candidates.len();
        self.candidates.clear();
        count
    }
}
