//! Shared helpers for kvseed-ingest integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use kvseed_ingest::checkpoint::CheckpointStore;
use kvseed_ingest::controller::RunController;
use kvseed_ingest::scheduler::{Scheduler, SchedulerConfig};
use kvseed_ingest::transform::RecordTransformer;
use kvseed_ingest::transport::{Existence, Transport, WriteOutcome};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const PREFIX: &str = "census_mesh_2020:";

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryTransport {
    values: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, key: &str, payload: &[u8]) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.to_vec());
    }

    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
    }

    /// Keys written, in write order, duplicates included
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn stored_keys(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &str) -> Existence {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.values.lock().unwrap().contains_key(key) {
            Existence::Exists
        } else {
            Existence::Absent
        }
    }

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome {
        self.writes.lock().unwrap().push(key.to_string());
        self.put(key, payload);
        WriteOutcome::Success
    }
}

/// Accepts `allow` writes, then hangs every later write after signalling
/// `interrupted`. Dropping the run future at that point models a killed
/// process.
#[derive(Debug)]
pub struct HangingTransport {
    pub inner: Arc<MemoryTransport>,
    allow: usize,
    started: AtomicUsize,
    pub interrupted: Arc<Notify>,
}

impl HangingTransport {
    pub fn new(inner: Arc<MemoryTransport>, allow: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            allow,
            started: AtomicUsize::new(0),
            interrupted: Arc::new(Notify::new()),
        })
    }
}

#[async_trait]
impl Transport for HangingTransport {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn exists(&self, key: &str) -> Existence {
        self.inner.exists(key).await
    }

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome {
        if self.started.fetch_add(1, Ordering::SeqCst) >= self.allow {
            self.interrupted.notify_one();
            return std::future::pending::<WriteOutcome>().await;
        }
        self.inner.write(key, payload).await
    }
}

/// Write `name` under `dir` with a KEY_CODE/VALUE header and `rows` rows
pub fn write_csv(dir: &Path, name: &str, rows: usize) {
    let mut contents = String::from("KEY_CODE,VALUE,HTKSAKI\n");
    for i in 0..rows {
        contents.push_str(&format!("{:05},\"{},000\",a;b\n", i, i));
    }
    std::fs::write(dir.join(name), contents).unwrap();
}

pub fn scheduler_config(
    workers: usize,
    batch_size: usize,
    checkpoint_every: usize,
) -> SchedulerConfig {
    SchedulerConfig {
        workers,
        batch_size,
        checkpoint_every,
        batch_delay: Duration::ZERO,
        skip_existing: false,
    }
}

/// Controller that uploads through `transport` and checkpoints to `store`
pub fn controller(
    transport: Arc<dyn Transport>,
    store: &CheckpointStore,
    config: SchedulerConfig,
) -> RunController {
    let scheduler = Scheduler::new(transport, store.clone(), config, store.load());
    RunController::with_scheduler(
        RecordTransformer::default(),
        PREFIX,
        store.clone(),
        Some(scheduler),
        0,
    )
}

/// Dry-run controller
pub fn dry_run_controller(store: &CheckpointStore) -> RunController {
    RunController::with_scheduler(RecordTransformer::default(), PREFIX, store.clone(), None, 0)
}
