//! Run controller
//!
//! Walks partitions in identity order, resumes from the checkpoint, turns
//! rows into upload items and hands them to the [`Scheduler`]. In dry-run
//! mode items are only logged: no transport is built, nothing is written and
//! the checkpoint is left untouched.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{RunConfig, DRY_RUN_PREVIEW_CHARS, SIZE_WARNING_BYTES};
use crate::outcome::{ItemOutcome, OutcomeCounter};
use crate::record::{RawRecord, UploadItem};
use crate::scheduler::Scheduler;
use crate::source::{CsvDirectorySource, Partition, RecordSource};
use crate::transform::{PartitionSchema, RecordTransformer};
use kvseed_common::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a partition starts, given the loaded checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStart {
    /// Fully processed in an earlier run
    Done,
    /// Resume at this offset
    At(u64),
}

impl PartitionStart {
    pub fn plan(checkpoint: Option<&Checkpoint>, partition: &Partition) -> Self {
        match checkpoint {
            None => Self::At(0),
            Some(cp) if partition.id() < cp.partition.as_str() => Self::Done,
            Some(cp) if partition.id() == cp.partition => Self::At(cp.offset),
            Some(_) => Self::At(0),
        }
    }
}

/// Drives one run over a record source
pub struct RunController {
    transformer: RecordTransformer,
    key_prefix: String,
    checkpoints: CheckpointStore,
    /// `None` in dry-run mode
    scheduler: Option<Scheduler>,
    resume_from: Option<Checkpoint>,
    outcomes: OutcomeCounter,
    size_warning_bytes: usize,
}

impl RunController {
    /// Build a controller for `config`. Outside dry-run mode this connects
    /// the transport, so configuration problems surface here.
    pub fn new(config: &RunConfig) -> Result<Self> {
        let checkpoints = config.checkpoint_store();
        let resume_from = checkpoints.load();

        let scheduler = if config.dry_run {
            None
        } else {
            let transport = config
                .backend
                .connect(config.backoff_policy(), &config.key_prefix)?;
            info!(backend = transport.name(), "Transport ready");
            Some(Scheduler::new(
                transport,
                checkpoints.clone(),
                config.scheduler.clone(),
                resume_from.clone(),
            ))
        };

        Ok(Self {
            transformer: RecordTransformer::new(config.transform.clone()),
            key_prefix: config.key_prefix.clone(),
            checkpoints,
            scheduler,
            resume_from,
            outcomes: OutcomeCounter::with_progress_every(config.progress_every),
            size_warning_bytes: SIZE_WARNING_BYTES,
        })
    }

    /// Controller around an existing scheduler
    pub fn with_scheduler(
        transformer: RecordTransformer,
        key_prefix: impl Into<String>,
        checkpoints: CheckpointStore,
        scheduler: Option<Scheduler>,
        progress_every: u64,
    ) -> Self {
        let resume_from = checkpoints.load();
        Self {
            transformer,
            key_prefix: key_prefix.into(),
            checkpoints,
            scheduler,
            resume_from,
            outcomes: OutcomeCounter::with_progress_every(progress_every),
            size_warning_bytes: SIZE_WARNING_BYTES,
        }
    }

    /// Warn about payloads larger than `bytes`
    pub fn with_size_warning(mut self, bytes: usize) -> Self {
        self.size_warning_bytes = bytes;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.scheduler.is_none()
    }

    /// Process every partition and return the outcome totals. Only an
    /// unreadable input root fails the run.
    pub async fn execute(mut self, source: &dyn RecordSource) -> Result<OutcomeCounter> {
        let started = Instant::now();
        let partitions = source.partitions()?;

        match &self.resume_from {
            Some(cp) => info!(
                checkpoint = %self.checkpoints.path().display(),
                partition = %cp.partition,
                offset = cp.offset,
                "Resuming from checkpoint"
            ),
            None => debug!("No checkpoint, starting from the first partition"),
        }
        info!(
            partitions = partitions.len(),
            dry_run = self.is_dry_run(),
            "Starting upload"
        );

        for partition in &partitions {
            let start = match PartitionStart::plan(self.resume_from.as_ref(), partition) {
                PartitionStart::Done => {
                    debug!(partition = %partition.name(), "Already processed, skipping");
                    continue;
                },
                PartitionStart::At(offset) => offset,
            };
            self.process_partition(source, partition, start).await;
        }

        self.outcomes.log_summary();
        info!(elapsed_secs = started.elapsed().as_secs_f64(), "Upload finished");
        Ok(self.outcomes)
    }

    async fn process_partition(
        &mut self,
        source: &dyn RecordSource,
        partition: &Partition,
        start: u64,
    ) {
        let reader = match source.open(partition) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(
                    partition = %partition.name(),
                    error = %e,
                    "Cannot read partition, skipping"
                );
                return;
            },
        };

        let schema = self.transformer.bind(&reader.headers);
        info!(
            partition = %partition.name(),
            start_offset = start,
            key_column = schema.key_header().unwrap_or_default(),
            "Processing partition"
        );

        let mut next_offset = start;
        for row in reader.records.skip(usize::try_from(start).unwrap_or(usize::MAX)) {
            match row {
                Ok(raw) => {
                    next_offset = raw.offset + 1;
                    self.process_record(partition, &schema, raw).await;
                },
                Err(e) => {
                    next_offset = e.offset + 1;
                    let label = row_label(partition, e.offset);
                    let reason = format!("unreadable row: {}", e.message);
                    self.outcomes.record(&label, &ItemOutcome::Failed(reason));
                },
            }
        }

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler
                .finish_partition(partition, next_offset, &mut self.outcomes)
                .await;
        }
    }

    async fn process_record(
        &mut self,
        partition: &Partition,
        schema: &PartitionSchema,
        raw: RawRecord,
    ) {
        let (key, record) = match self.transformer.transform(schema, &raw) {
            Ok(transformed) => transformed,
            Err(e) => {
                let label = row_label(partition, raw.offset);
                self.outcomes.record(&label, &ItemOutcome::Failed(e.to_string()));
                return;
            },
        };

        let item = match UploadItem::build(&self.key_prefix, &key, &record, raw.offset) {
            Ok(item) => item,
            Err(e) => {
                let label = format!("{}{}", self.key_prefix, key);
                let reason = format!("serialization failed: {}", e);
                self.outcomes.record(&label, &ItemOutcome::Failed(reason));
                return;
            },
        };

        if item.payload_len() > self.size_warning_bytes {
            warn!(
                key = %item.key,
                bytes = item.payload_len(),
                limit = self.size_warning_bytes,
                "Value exceeds size warning threshold and may be rejected"
            );
        }

        match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.submit(partition, item, &mut self.outcomes).await,
            None => {
                info!(
                    key = %item.key,
                    bytes = item.payload_len(),
                    preview = %item.preview(DRY_RUN_PREVIEW_CHARS),
                    "[dry run] would write"
                );
                self.outcomes.record(&item.key, &ItemOutcome::Success);
            },
        }
    }
}

/// Label for rows that never produced a key
fn row_label(partition: &Partition, offset: u64) -> String {
    format!("{}@{}", partition.name(), offset)
}

/// Run the pipeline described by `config` over its input directory
pub async fn run(config: &RunConfig) -> Result<OutcomeCounter> {
    let source = CsvDirectorySource::new(&config.input_dir);
    RunController::new(config)?.execute(&source).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // ========================================================================
    // Log capture
    // ========================================================================

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Dry-run over one small row, returning everything logged at WARN
    async fn dry_run_logs(size_warning_bytes: usize) -> String {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("a.csv"), "KEY_CODE,NAME\n01101,Chuo\n").unwrap();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let controller = RunController::with_scheduler(
            RecordTransformer::default(),
            "p:",
            CheckpointStore::new(dir.path().join("checkpoint.json")),
            None,
            0,
        )
        .with_size_warning(size_warning_bytes);
        let outcomes = controller
            .execute(&CsvDirectorySource::new(&input))
            .await
            .unwrap();
        assert_eq!(outcomes.success, 1);

        logs.contents()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_oversized_payload_is_warned_but_still_processed() {
        let logs = dry_run_logs(10).await;
        assert!(logs.contains("Value exceeds size warning threshold"), "{logs}");
        assert!(logs.contains("p:01101"), "{logs}");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_payload_under_threshold_is_not_warned() {
        let logs = dry_run_logs(SIZE_WARNING_BYTES).await;
        assert!(!logs.contains("Value exceeds size warning threshold"), "{logs}");
    }

    // ========================================================================
    // Planning
    // ========================================================================

    #[test]
    fn test_plan_without_checkpoint() {
        let p = Partition::new("/data/a.csv", "/data/a.csv");
        assert_eq!(PartitionStart::plan(None, &p), PartitionStart::At(0));
    }

    #[test]
    fn test_plan_with_checkpoint() {
        let cp = Checkpoint::new("/data/b.csv", 40);
        let a = Partition::new("/data/a.csv", "/data/a.csv");
        let b = Partition::new("/data/b.csv", "/data/b.csv");
        let c = Partition::new("/data/c.csv", "/data/c.csv");

        assert_eq!(PartitionStart::plan(Some(&cp), &a), PartitionStart::Done);
        assert_eq!(PartitionStart::plan(Some(&cp), &b), PartitionStart::At(40));
        assert_eq!(PartitionStart::plan(Some(&cp), &c), PartitionStart::At(0));
    }

    #[test]
    fn test_row_label() {
        let p = Partition::new("/data/a.csv", "/data/a.csv");
        assert_eq!(row_label(&p, 12), "a.csv@12");
    }
}
