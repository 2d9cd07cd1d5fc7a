//! Upload scheduling
//!
//! Two modes, chosen by the worker count:
//!
//! - **Sequential** (`workers <= 1`): items resolve one at a time in source
//!   order. A checkpoint is saved every `checkpoint_every` resolved items and
//!   the run pauses for `batch_delay` every `batch_size` items.
//! - **Parallel** (`workers > 1`): items are grouped into batches of
//!   `batch_size` that never span partitions. A batch runs with at most
//!   `workers` items in flight; once every item has resolved, the checkpoint
//!   moves to one past the largest offset in the batch and the run pauses for
//!   `batch_delay`. Batches do not overlap.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::outcome::{ItemOutcome, OutcomeCounter};
use crate::record::UploadItem;
use crate::source::Partition;
use crate::transport::{Existence, Transport, WriteOutcome};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Items per batch (parallel) or between pauses (sequential)
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Sequential mode: resolved items between checkpoint saves
pub const DEFAULT_CHECKPOINT_EVERY: usize = 100;

/// Pause between batches, in seconds
pub const DEFAULT_BATCH_DELAY_SECS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub checkpoint_every: usize,
    pub batch_delay: Duration,
    pub skip_existing: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            batch_delay: Duration::from_secs_f64(DEFAULT_BATCH_DELAY_SECS),
            skip_existing: false,
        }
    }
}

impl SchedulerConfig {
    pub fn is_parallel(&self) -> bool {
        self.workers > 1
    }
}

/// Resolve one item: optional existence probe, then the write.
///
/// An existence probe that cannot answer fails the item without writing.
pub async fn resolve_item(
    transport: &dyn Transport,
    item: &UploadItem,
    skip_existing: bool,
) -> ItemOutcome {
    if skip_existing {
        match transport.exists(&item.key).await {
            Existence::Exists => {
                debug!(key = %item.key, "Key exists, skipping");
                return ItemOutcome::Skipped;
            },
            Existence::Absent => {},
            Existence::Unknown(reason) => {
                return ItemOutcome::Failed(format!("existence check failed: {}", reason));
            },
        }
    }

    match transport.write(&item.key, &item.payload).await {
        WriteOutcome::Success => ItemOutcome::Success,
        WriteOutcome::Failure(reason) => ItemOutcome::Failed(reason),
    }
}

/// Drives items through a transport and owns checkpoint cadence
pub struct Scheduler {
    transport: Arc<dyn Transport>,
    checkpoints: CheckpointStore,
    config: SchedulerConfig,
    last_checkpoint: Option<Checkpoint>,
    pending: Vec<UploadItem>,
    since_checkpoint: usize,
    since_pause: usize,
}

impl Scheduler {
    /// `resumed_from` is the checkpoint the run started from; saves never
    /// move backwards past it.
    pub fn new(
        transport: Arc<dyn Transport>,
        checkpoints: CheckpointStore,
        config: SchedulerConfig,
        resumed_from: Option<Checkpoint>,
    ) -> Self {
        Self {
            transport,
            checkpoints,
            config,
            last_checkpoint: resumed_from,
            pending: Vec::new(),
            since_checkpoint: 0,
            since_pause: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Last checkpoint saved (or resumed from)
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Accept the next item of `partition`, in source order
    pub async fn submit(
        &mut self,
        partition: &Partition,
        item: UploadItem,
        outcomes: &mut OutcomeCounter,
    ) {
        if self.config.is_parallel() {
            self.pending.push(item);
            if self.pending.len() >= self.config.batch_size.max(1) {
                self.run_batch(partition, outcomes).await;
                self.pause().await;
            }
            return;
        }

        let outcome =
            resolve_item(self.transport.as_ref(), &item, self.config.skip_existing).await;
        outcomes.record(&item.key, &outcome);

        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.config.checkpoint_every.max(1) {
            self.save(Checkpoint::new(partition.id(), item.offset + 1));
        }

        self.since_pause += 1;
        if self.since_pause >= self.config.batch_size.max(1) {
            info!(items = self.since_pause, "Completed upload batch");
            self.since_pause = 0;
            self.pause().await;
        }
    }

    /// Resolve anything still pending for `partition` and checkpoint at
    /// `next_offset`, the offset after the last record read from it.
    pub async fn finish_partition(
        &mut self,
        partition: &Partition,
        next_offset: u64,
        outcomes: &mut OutcomeCounter,
    ) {
        if !self.pending.is_empty() {
            self.run_batch(partition, outcomes).await;
        }
        self.save(Checkpoint::new(partition.id(), next_offset));
    }

    async fn run_batch(&mut self, partition: &Partition, outcomes: &mut OutcomeCounter) {
        let batch = std::mem::take(&mut self.pending);
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return;
        };
        let (first_offset, last_offset, size) = (first.offset, last.offset, batch.len());
        debug!(
            partition = %partition.name(),
            first_offset,
            last_offset,
            size,
            workers = self.config.workers,
            "Starting upload batch"
        );

        let skip_existing = self.config.skip_existing;
        let results: Vec<(String, u64, ItemOutcome)> = stream::iter(batch)
            .map(|item| {
                let transport = Arc::clone(&self.transport);
                async move {
                    let outcome = resolve_item(transport.as_ref(), &item, skip_existing).await;
                    (item.key, item.offset, outcome)
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let mut max_offset = first_offset;
        for (key, offset, outcome) in &results {
            outcomes.record(key, outcome);
            max_offset = max_offset.max(*offset);
        }

        self.save(Checkpoint::new(partition.id(), max_offset + 1));
        info!(
            partition = %partition.name(),
            first_offset,
            last_offset,
            size,
            "Completed upload batch"
        );
    }

    async fn pause(&self) {
        if !self.config.batch_delay.is_zero() {
            tokio::time::sleep(self.config.batch_delay).await;
        }
    }

    /// Save `checkpoint` if it moves forward. Failures are logged and the
    /// run continues.
    fn save(&mut self, checkpoint: Checkpoint) {
        self.since_checkpoint = 0;
        if !checkpoint.advances(self.last_checkpoint.as_ref()) {
            return;
        }
        match self.checkpoints.save(&checkpoint) {
            Ok(()) => {
                debug!(
                    partition = %checkpoint.partition,
                    offset = checkpoint.offset,
                    "Checkpoint saved"
                );
                self.last_checkpoint = Some(checkpoint);
            },
            Err(e) => warn!(error = %e, "Failed to save checkpoint, continuing"),
        }
    }
}
