//! Local JSON artifact transport (emit-only runs)
//!
//! Each key becomes `{outdir}/{safe_name}.json`, where `safe_name` is the key
//! without its namespace prefix and with every character outside
//! `[0-9A-Za-z._-]` replaced by `_`.

use super::{Existence, Transport, WriteOutcome};
use crate::checkpoint::write_atomic;
use async_trait::async_trait;
use kvseed_common::{KvseedError, Result};
use std::path::{Path, PathBuf};

/// Default artifact directory
pub const DEFAULT_OUTDIR: &str = "out_json";

#[derive(Debug, Clone)]
pub struct ArtifactTransport {
    outdir: PathBuf,
    key_prefix: String,
}

impl ArtifactTransport {
    /// Create the transport, creating `outdir` if needed
    pub fn new(outdir: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Result<Self> {
        let outdir = outdir.into();
        std::fs::create_dir_all(&outdir).map_err(|e| {
            KvseedError::config(format!(
                "cannot create output directory {}: {}",
                outdir.display(),
                e
            ))
        })?;
        Ok(Self {
            outdir,
            key_prefix: key_prefix.into(),
        })
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// File that holds the payload for `key`
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        let bare = key.strip_prefix(&self.key_prefix).unwrap_or(key);
        self.outdir.join(format!("{}.json", safe_file_name(bare)))
    }
}

/// Replace every character outside `[0-9A-Za-z._-]` with `_`
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl Transport for ArtifactTransport {
    fn name(&self) -> &'static str {
        "artifact"
    }

    async fn exists(&self, key: &str) -> Existence {
        let path = self.artifact_path(key);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Existence::Exists,
            Ok(false) => Existence::Absent,
            Err(e) => Existence::Unknown(format!("cannot stat {}: {}", path.display(), e)),
        }
    }

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome {
        let path = self.artifact_path(key);
        let bytes = payload.to_vec();
        let target = path.clone();
        // fsync + rename block; keep them off the runtime workers
        match tokio::task::spawn_blocking(move || write_atomic(&target, &bytes)).await {
            Ok(Ok(())) => WriteOutcome::Success,
            Ok(Err(e)) => WriteOutcome::Failure(format!("write {} failed: {}", path.display(), e)),
            Err(e) => WriteOutcome::Failure(format!("write {} aborted: {}", path.display(), e)),
        }
    }
}
