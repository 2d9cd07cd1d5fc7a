//! Partitioned record sources
//!
//! A partition is an ordered, finite sequence of raw records with a stable
//! identity. Partitions are processed in ascending identity order, which is
//! what makes a checkpoint `{partition, offset}` meaningful across runs.

use crate::record::RawRecord;
use kvseed_common::{KvseedError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

/// A stable, ordered unit of input
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partition {
    id: String,
    path: PathBuf,
}

impl Partition {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Identity recorded in checkpoints
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short display name (file name)
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A row that could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {offset}: {message}")]
pub struct SourceError {
    pub offset: u64,
    pub message: String,
}

pub type RecordIter = Box<dyn Iterator<Item = std::result::Result<RawRecord, SourceError>> + Send>;

/// An opened partition: its header row and a record iterator
pub struct PartitionReader {
    pub headers: Vec<String>,
    pub records: RecordIter,
}

impl std::fmt::Debug for PartitionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionReader")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Enumerates partitions and opens them for reading
pub trait RecordSource: Send + Sync {
    /// All partitions, sorted ascending by identity
    fn partitions(&self) -> Result<Vec<Partition>>;

    /// Open one partition. Errors here skip the partition, not the run.
    fn open(&self, partition: &Partition) -> Result<PartitionReader>;
}

/// Every regular, non-hidden file directly under a root directory is one
/// headered UTF-8 CSV partition. Identity is the absolute file path.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordSource for CsvDirectorySource {
    fn partitions(&self) -> Result<Vec<Partition>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            KvseedError::input(format!(
                "cannot read input directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut partitions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_file() {
                debug!(path = %path.display(), "Skipping non-partition entry");
                continue;
            }
            let absolute = std::path::absolute(&path)?;
            let id = absolute.to_string_lossy().into_owned();
            partitions.push(Partition::new(id, absolute));
        }

        partitions.sort();
        Ok(partitions)
    }

    fn open(&self, partition: &Partition) -> Result<PartitionReader> {
        let file = File::open(partition.path())?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| {
                KvseedError::input(format!("cannot read header of {}: {}", partition.name(), e))
            })?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(KvseedError::input(format!(
                "partition {} has no header row",
                partition.name()
            )));
        }

        let names = headers.clone();
        let records = reader
            .into_records()
            .enumerate()
            .map(move |(index, row)| {
                let offset = index as u64;
                let row = row.map_err(|e| SourceError {
                    offset,
                    message: e.to_string(),
                })?;
                let mut record = RawRecord::new(offset);
                for (i, name) in names.iter().enumerate() {
                    record
                        .fields
                        .insert(name.clone(), row.get(i).map(str::to_string));
                }
                Ok(record)
            });

        Ok(PartitionReader {
            headers,
            records: Box::new(records),
        })
    }
}
