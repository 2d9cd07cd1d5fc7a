//! `wrangler` command-line transport
//!
//! Existence: `wrangler kv:key get <key> --namespace-id <ns>`, exit 0 means
//! the key exists. Write: `wrangler kv:key put <key> - --namespace-id <ns>`
//! with the payload on stdin.

use super::retry::{BackoffPolicy, TransportError};
use super::{Existence, Transport, WriteOutcome};
use async_trait::async_trait;
use kvseed_common::{KvseedError, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Executable looked up on `PATH` when none is configured
pub const DEFAULT_WRANGLER_BIN: &str = "wrangler";

/// Timeout for one `get` invocation
pub const GET_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for one `put` invocation
pub const PUT_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters of stderr kept in failure reasons
const STDERR_TAIL_CHARS: usize = 200;

/// Transport driving the `wrangler` CLI
#[derive(Debug, Clone)]
pub struct WranglerTransport {
    program: PathBuf,
    namespace_id: String,
    policy: BackoffPolicy,
}

impl WranglerTransport {
    /// Resolve `bin` (a name on `PATH` or a path) to an executable
    pub fn locate(bin: &str) -> Result<PathBuf> {
        which::which(bin).map_err(|e| {
            KvseedError::config(format!("wrangler executable '{}' not found: {}", bin, e))
        })
    }

    pub fn new(
        program: impl Into<PathBuf>,
        namespace_id: impl Into<String>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            program: program.into(),
            namespace_id: namespace_id.into(),
            policy,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn get_args<'a>(&'a self, key: &'a str) -> [&'a str; 5] {
        ["kv:key", "get", key, "--namespace-id", self.namespace_id.as_str()]
    }

    fn put_args<'a>(&'a self, key: &'a str) -> [&'a str; 6] {
        ["kv:key", "put", key, "-", "--namespace-id", self.namespace_id.as_str()]
    }

    /// Run the tool once under `limit`. A missing executable is fatal;
    /// spawn failures and timeouts are retryable.
    async fn invoke(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
        limit: Duration,
    ) -> std::result::Result<Output, TransportError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransportError::Fatal(format!(
                    "wrangler executable {} not found",
                    self.program.display()
                )),
                _ => TransportError::Retryable(format!("failed to spawn wrangler: {}", e)),
            })?;

        let run = async move {
            if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(bytes).await?;
                pipe.flush().await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(limit, run).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TransportError::Retryable(format!("wrangler I/O error: {}", e))),
            Err(_) => Err(TransportError::Retryable(format!(
                "wrangler timed out after {}s",
                limit.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Transport for WranglerTransport {
    fn name(&self) -> &'static str {
        "wrangler"
    }

    async fn exists(&self, key: &str) -> Existence {
        let args = self.get_args(key);
        let result = self
            .policy
            .run("wrangler get", |attempt| {
                debug!(key = %key, attempt, "wrangler get");
                let invocation = self.invoke(&args, None, GET_TIMEOUT);
                async move { invocation.await.map(|output| output.status.success()) }
            })
            .await;

        match result {
            Ok(true) => Existence::Exists,
            Ok(false) => Existence::Absent,
            Err(e) => Existence::Unknown(e.to_string()),
        }
    }

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome {
        let args = self.put_args(key);
        let result = self
            .policy
            .run("wrangler put", |attempt| {
                debug!(key = %key, attempt, "wrangler put");
                let invocation = self.invoke(&args, Some(payload), PUT_TIMEOUT);
                async move {
                    let output = invocation.await?;
                    if output.status.success() {
                        Ok(())
                    } else {
                        Err(TransportError::Retryable(format!(
                            "wrangler put exited with {}: {}",
                            output.status,
                            stderr_tail(&output.stderr)
                        )))
                    }
                }
            })
            .await;

        match result {
            Ok(()) => WriteOutcome::Success,
            Err(e) => WriteOutcome::Failure(e.to_string()),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}
