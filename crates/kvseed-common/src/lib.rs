//! kvseed Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging bootstrap for the kvseed workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the run-level error type and result alias
//! - **Logging**: `tracing` subscriber setup for console and log-file output
//!
//! # Example
//!
//! ```no_run
//! use kvseed_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("kvseed started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{KvseedError, Result};
