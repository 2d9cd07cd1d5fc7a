//! Crash-safe resume checkpoint
//!
//! The checkpoint records the partition being processed and the offset of the
//! next record to process in it. Saves go through a temp file in the same
//! directory followed by a rename, so a reader observes either the previous
//! checkpoint or the new one, never a partial write.

use chrono::{DateTime, Utc};
use kvseed_common::{KvseedError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Default checkpoint location, relative to the working directory
pub const DEFAULT_CHECKPOINT_FILE: &str = ".upload_kv.checkpoint";

/// Resume position: `offset` is the next record to process in `partition`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub partition: String,
    pub offset: u64,
}

impl Checkpoint {
    pub fn new(partition: impl Into<String>, offset: u64) -> Self {
        Self {
            partition: partition.into(),
            offset,
        }
    }

    /// Whether saving `self` would move the resume position forward from
    /// `previous`
    pub fn advances(&self, previous: Option<&Checkpoint>) -> bool {
        match previous {
            None => true,
            Some(prev) if prev.partition == self.partition => self.offset > prev.offset,
            Some(prev) => self.partition > prev.partition,
        }
    }
}

/// On-disk form
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    partition: String,
    offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Loads and saves the checkpoint at a fixed path
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. A missing, unreadable or corrupt file means
    /// "no checkpoint".
    pub fn load(&self) -> Option<Checkpoint> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint file");
                return None;
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Checkpoint unreadable, starting from scratch");
                return None;
            },
        };

        match serde_json::from_str::<CheckpointFile>(&contents) {
            Ok(file) => Some(Checkpoint::new(file.partition, file.offset)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Checkpoint corrupt, starting from scratch");
                None
            },
        }
    }

    /// Atomically replace the checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let file = CheckpointFile {
            partition: checkpoint.partition.clone(),
            offset: checkpoint.offset,
            updated_at: Some(Utc::now()),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &bytes).map_err(|e| {
            KvseedError::checkpoint(format!("failed to save {}: {}", self.path.display(), e))
        })
    }
}

/// Write `bytes` to `path` via a synced temp file in the same directory and
/// a rename over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        let cp = Checkpoint::new("/data/a.csv", 42);

        store.save(&cp).unwrap();
        assert_eq!(store.load(), Some(cp));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["partition"], "/data/a.csv");
        assert_eq!(raw["offset"], 42);
        assert!(raw["updated_at"].is_string());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        store.save(&Checkpoint::new("a", 1)).unwrap();
        store.save(&Checkpoint::new("b", 2)).unwrap();

        assert_eq!(store.load(), Some(Checkpoint::new("b", 2)));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_corrupt_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "{\"partition\": \"a\", \"off").unwrap();
        assert_eq!(CheckpointStore::new(path).load(), None);
    }

    #[test]
    fn test_file_without_timestamp_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, r#"{"partition":"a","offset":3}"#).unwrap();
        assert_eq!(CheckpointStore::new(path).load(), Some(Checkpoint::new("a", 3)));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("state").join("cp.json"));
        store.save(&Checkpoint::new("a", 0)).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_advances() {
        let prev = Checkpoint::new("b", 10);
        assert!(Checkpoint::new("b", 11).advances(Some(&prev)));
        assert!(!Checkpoint::new("b", 10).advances(Some(&prev)));
        assert!(!Checkpoint::new("b", 9).advances(Some(&prev)));
        assert!(Checkpoint::new("c", 0).advances(Some(&prev)));
        assert!(!Checkpoint::new("a", 99).advances(Some(&prev)));
        assert!(Checkpoint::new("a", 0).advances(None));
    }
}
