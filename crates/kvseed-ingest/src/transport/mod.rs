//! Key-value store transports
//!
//! A [`Transport`] answers two questions for a namespaced key: does it
//! exist, and can this payload be written under it. Both operations
//! absorb transient failures through a shared [`BackoffPolicy`] and report
//! a terminal result; they never return an error to the caller.
//!
//! Backends:
//! - [`HttpTransport`]: Cloudflare-compatible KV REST API
//! - [`WranglerTransport`]: the `wrangler` command-line tool
//! - [`ArtifactTransport`]: local JSON files, one per key (emit-only runs)

pub mod artifact;
pub mod http;
pub mod retry;
pub mod wrangler;

pub use artifact::ArtifactTransport;
pub use http::{HttpTransport, KvApiCredentials};
pub use retry::{BackoffPolicy, RetryError, TransportError};
pub use wrangler::WranglerTransport;

use async_trait::async_trait;
use std::fmt;

/// Result of an existence probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Absent,
    /// The store could not answer; the string is the last failure reason
    Unknown(String),
}

/// Result of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    Failure(String),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A remote (or local) key-value store
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    async fn exists(&self, key: &str) -> Existence;

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome;
}
