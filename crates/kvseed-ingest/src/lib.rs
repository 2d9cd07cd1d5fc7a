//! kvseed Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Resumable bulk upload of tabular records into a remote key-value store.
//!
//! # Pipeline
//!
//! - **source**: partitions of raw records (one CSV file per partition)
//! - **transform**: header normalization, value cleaning, key extraction
//! - **transport**: existence check and write against the store (HTTP API,
//!   `wrangler` CLI, or local JSON artifacts), wrapped in one backoff policy
//! - **scheduler**: sequential or bounded-parallel batch execution
//! - **checkpoint**: crash-safe {partition, offset} record for resume
//! - **controller**: drives a run and reports the outcome summary
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use kvseed_ingest::{cli::Cli, config::RunConfig, controller};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse_from(["kvseed", "--indir", "data", "--dry-run"]);
//!     let config = RunConfig::from_cli(&cli)?;
//!     let outcomes = controller::run(&config).await?;
//!     println!("{} items, {} failed", outcomes.total, outcomes.failed);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod controller;
pub mod outcome;
pub mod record;
pub mod scheduler;
pub mod source;
pub mod transform;
pub mod transport;

pub use kvseed_common::{KvseedError, Result};
