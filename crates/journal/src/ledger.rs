//! Persisted ledger of stitched groups
//!
//! One JSON document per watch root:
//!
//! ```text
//! {
//!   "version": "1.0",
//!   "lastUpdated": "2024-01-03T14:30:05Z",
//!   "processedGroups": [["trip/a.jpg|trip/b.jpg", { ...record... }], ...]
//! }
//! ```
//!
//! The whole document is rewritten on every update (temp file + rename).
//! A missing, unreadable or corrupt file loads as an empty ledger.

use crate::Result;
use chrono::{DateTime, Utc};
use gridstitch_core::group::relative_key_path;
use gridstitch_core::GroupKey;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ledger file name inside the watch root (a dotfile, so never watched)
pub const LEDGER_FILE_NAME: &str = ".gridstitch-processed.json";

/// Schema version written to the ledger file
pub const LEDGER_VERSION: &str = "1.0";

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("ledger i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What was produced for one stitched group
///
/// Paths are relative to the watch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    #[serde(default)]
    pub group_key: GroupKey,
    pub image_paths: Vec<String>,
    pub output_path: String,
    pub processed_at: DateTime<Utc>,
    pub image_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerFile {
    version: String,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    processed_groups: Vec<(GroupKey, ProcessingRecord)>,
}

/// Durable record of processed groups for one watch root
pub struct Ledger {
    /// Watch root all keys are relative to
    root: PathBuf,
    /// Ledger file location
    path: PathBuf,
    groups: RwLock<BTreeMap<GroupKey, ProcessingRecord>>,
    /// Serializes file replacement between concurrent savers
    save_lock: Mutex<()>,
}

impl Ledger {
    /// Open the ledger stored in `root`
    pub fn open(root: &Path) -> Self {
        Self::open_at(root, root.join(LEDGER_FILE_NAME))
    }

    /// Open a ledger for `root` stored at an explicit file path
    pub fn open_at(root: &Path, path: PathBuf) -> Self {
        let groups = load_groups(&path);
        debug!("Loaded {} ledger entries from {}", groups.len(), path.display());

        Self {
            root: root.to_path_buf(),
            path,
            groups: RwLock::new(groups),
            save_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key for a set of paths under this ledger's root
    pub fn key_for<P: AsRef<Path>>(&self, paths: &[P]) -> GroupKey {
        GroupKey::derive(&self.root, paths)
    }

    /// True iff this exact file set has been stitched
    pub fn is_processed<P: AsRef<Path>>(&self, paths: &[P]) -> bool {
        let key = self.key_for(paths);
        self.groups.read().contains_key(&key)
    }

    /// Stored record for this file set, if any
    pub fn record<P: AsRef<Path>>(&self, paths: &[P]) -> Option<ProcessingRecord> {
        let key = self.key_for(paths);
        self.groups.read().get(&key).cloned()
    }

    /// Record a stitched group and persist the ledger
    ///
    /// A failed save is logged; the in-memory entry is kept and goes out
    /// with the next successful save.
    pub fn mark_processed<P: AsRef<Path>>(&self, paths: &[P], output: &Path) -> ProcessingRecord {
        let key = self.key_for(paths);
        let mut image_paths: Vec<String> = paths
            .iter()
            .map(|p| relative_key_path(&self.root, p.as_ref()))
            .collect();
        image_paths.sort();

        let record = ProcessingRecord {
            group_key: key.clone(),
            image_count: image_paths.len(),
            image_paths,
            output_path: relative_key_path(&self.root, output),
            processed_at: Utc::now(),
        };

        self.groups.write().insert(key, record.clone());

        if let Err(e) = self.save() {
            warn!("Failed to save ledger {}: {}", self.path.display(), e);
        }
        record
    }

    /// Drop records whose source files no longer all exist
    ///
    /// Returns the number of records removed.
    pub fn cleanup(&self) -> usize {
        let stale: Vec<GroupKey> = self
            .groups
            .read()
            .iter()
            .filter(|(_, record)| {
                !record
                    .image_paths
                    .iter()
                    .all(|rel| self.root.join(rel).exists())
            })
            .map(|(key, _)| key.clone())
            .collect();

        if stale.is_empty() {
            return 0;
        }

        {
            let mut groups = self.groups.write();
            for key in &stale {
                groups.remove(key);
            }
        }

        info!("Ledger cleanup removed {} stale records", stale.len());
        if let Err(e) = self.save() {
            warn!("Failed to save ledger {}: {}", self.path.display(), e);
        }
        stale.len()
    }

    /// Number of recorded groups
    pub fn count(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }

    /// All records, ordered by key
    pub fn records(&self) -> Vec<ProcessingRecord> {
        self.groups.read().values().cloned().collect()
    }

    /// Write the full ledger, replacing the previous file
    pub fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock();

        let document = LedgerFile {
            version: LEDGER_VERSION.to_string(),
            last_updated: Utc::now(),
            processed_groups: self
                .groups
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        atomic_write(&self.path, &json)
    }
}

fn load_groups(path: &Path) -> BTreeMap<GroupKey, ProcessingRecord> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Unreadable ledger {}, starting fresh: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice::<LedgerFile>(&data) {
        Ok(file) => file
            .processed_groups
            .into_iter()
            .map(|(key, mut record)| {
                record.group_key = key.clone();
                (key, record)
            })
            .collect(),
        Err(e) => {
            warn!("Corrupt ledger {}, starting fresh: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// Write to a sibling temp file, fsync it, then rename over the target
fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| crate::LedgerError::Io {
        path: target.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(parent).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(target).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"img").unwrap();
        path
    }

    #[test]
    fn test_mark_then_check_any_order() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "trip/a.jpg");
        let b = touch(temp.path(), "trip/b.jpg");
        let c = touch(temp.path(), "trip/c.jpg");

        let ledger = Ledger::open(temp.path());
        assert!(!ledger.is_processed(&[&a, &b, &c]));

        let out = temp.path().join("trip/Processed/trip_3images.jpg");
        let record = ledger.mark_processed(&[&c, &a, &b], &out);

        assert!(ledger.is_processed(&[&a, &b, &c]));
        assert!(ledger.is_processed(&[&b, &c, &a]));
        assert!(!ledger.is_processed(&[&a, &b]));
        assert_eq!(record.image_count, 3);
        assert_eq!(record.image_paths, vec!["trip/a.jpg", "trip/b.jpg", "trip/c.jpg"]);
        assert_eq!(record.output_path, "trip/Processed/trip_3images.jpg");
        assert_eq!(record.group_key.as_str(), "trip/a.jpg|trip/b.jpg|trip/c.jpg");
    }

    #[test]
    fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.png");
        let b = touch(temp.path(), "b.png");

        {
            let ledger = Ledger::open(temp.path());
            ledger.mark_processed(&[&a, &b], &temp.path().join("Processed/out.jpg"));
        }

        let reopened = Ledger::open(temp.path());
        assert_eq!(reopened.count(), 1);
        assert!(reopened.is_processed(&[&b, &a]));
        assert_eq!(
            reopened.record(&[&a, &b]).unwrap().output_path,
            "Processed/out.jpg"
        );
    }

    #[test]
    fn test_file_format() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.png");
        let b = touch(temp.path(), "b.png");

        let ledger = Ledger::open(temp.path());
        ledger.mark_processed(&[&a, &b], &temp.path().join("out.jpg"));

        let raw = fs::read_to_string(temp.path().join(LEDGER_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["version"], "1.0");
        assert!(value["lastUpdated"].is_string());
        let entry = &value["processedGroups"][0];
        assert_eq!(entry[0], "a.png|b.png");
        assert_eq!(entry[1]["imageCount"], 2);
        assert_eq!(entry[1]["outputPath"], "out.jpg");
        assert!(entry[1]["processedAt"].is_string());
    }

    #[test]
    fn test_corrupt_ledger_loads_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(LEDGER_FILE_NAME), b"{ not json").unwrap();

        let ledger = Ledger::open(temp.path());
        assert!(ledger.is_empty());

        // Next save replaces the corrupt file
        let a = touch(temp.path(), "a.png");
        let b = touch(temp.path(), "b.png");
        ledger.mark_processed(&[&a, &b], &temp.path().join("out.jpg"));
        assert_eq!(Ledger::open(temp.path()).count(), 1);
    }

    #[test]
    fn test_loads_records_without_group_key_field() {
        let temp = TempDir::new().unwrap();
        let legacy = r#"{
            "version": "1.0",
            "lastUpdated": "2024-01-03T14:30:05.000Z",
            "processedGroups": [
                ["x/1.jpg|x/2.jpg", {
                    "imagePaths": ["x/1.jpg", "x/2.jpg"],
                    "outputPath": "x/Processed/x_2images.jpg",
                    "processedAt": "2024-01-03T14:30:05.000Z",
                    "imageCount": 2
                }]
            ]
        }"#;
        fs::write(temp.path().join(LEDGER_FILE_NAME), legacy).unwrap();

        let ledger = Ledger::open(temp.path());
        let root = temp.path();
        assert!(ledger.is_processed(&[root.join("x/2.jpg"), root.join("x/1.jpg")]));
        assert_eq!(ledger.records()[0].group_key.as_str(), "x/1.jpg|x/2.jpg");
    }

    #[test]
    fn test_cleanup_drops_records_with_missing_sources() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "keep/a.jpg");
        let b = touch(temp.path(), "keep/b.jpg");
        let c = touch(temp.path(), "gone/c.jpg");
        let d = touch(temp.path(), "gone/d.jpg");

        let ledger = Ledger::open(temp.path());
        ledger.mark_processed(&[&a, &b], &temp.path().join("o1.jpg"));
        ledger.mark_processed(&[&c, &d], &temp.path().join("o2.jpg"));

        fs::remove_file(&d).unwrap();

        assert_eq!(ledger.cleanup(), 1);
        assert!(ledger.is_processed(&[&a, &b]));
        assert!(!ledger.is_processed(&[&c, &d]));
        assert_eq!(Ledger::open(temp.path()).count(), 1);

        assert_eq!(ledger.cleanup(), 0);
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"file, not dir").unwrap();

        // Parent of the ledger path is a regular file, so saving fails.
        let ledger = Ledger::open_at(temp.path(), blocker.join("ledger.json"));
        let a = touch(temp.path(), "a.jpg");
        let b = touch(temp.path(), "b.jpg");
        ledger.mark_processed(&[&a, &b], &temp.path().join("out.jpg"));

        assert!(ledger.is_processed(&[&a, &b]));
        assert!(ledger.save().is_err());
    }
}
