//! Run configuration
//!
//! [`RunConfig`] is built from the parsed [`Cli`] (which already folds in the
//! `CF_*` environment variables and `.env`). Everything that can make a run
//! impossible is checked here, before any record is read.

use crate::checkpoint::CheckpointStore;
use crate::cli::{BackendKind, Cli};
use crate::scheduler::SchedulerConfig;
use crate::transform::TransformConfig;
use crate::transport::{
    ArtifactTransport, BackoffPolicy, HttpTransport, KvApiCredentials, Transport,
    WranglerTransport,
};
use kvseed_common::{KvseedError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Run Configuration Constants
// ============================================================================

/// Payloads above this size are logged as likely to be rejected by the store
pub const SIZE_WARNING_BYTES: usize = 25 * 1024 * 1024;

/// Characters of the payload shown per item in dry-run mode
pub const DRY_RUN_PREVIEW_CHARS: usize = 1000;

/// Where validated items go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Http {
        api_base: String,
        credentials: KvApiCredentials,
    },
    Wrangler {
        program: PathBuf,
        namespace_id: String,
    },
    Artifact {
        outdir: PathBuf,
    },
}

impl Backend {
    /// Pick the backend for a run.
    ///
    /// `--only-json` always writes artifacts. The wrangler backend falls back
    /// to HTTP when the executable is missing but full API credentials are
    /// present.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        if cli.only_json {
            return Ok(Self::Artifact {
                outdir: cli.outdir.clone(),
            });
        }

        match cli.backend_kind() {
            BackendKind::Http => Ok(Self::Http {
                api_base: cli.api_base.clone(),
                credentials: credentials(cli)?,
            }),
            BackendKind::Wrangler => {
                let namespace_id = non_empty(&cli.wrangler_namespace)
                    .or_else(|| non_empty(&cli.namespace_id))
                    .ok_or_else(|| {
                        KvseedError::config(
                            "wrangler backend requires --wrangler-namespace or CF_NAMESPACE_ID",
                        )
                    })?;

                match WranglerTransport::locate(&cli.wrangler_bin) {
                    Ok(program) => Ok(Self::Wrangler {
                        program,
                        namespace_id,
                    }),
                    Err(locate_err) => match credentials(cli) {
                        Ok(credentials) => {
                            warn!(
                                bin = %cli.wrangler_bin,
                                "wrangler not found, falling back to the HTTP API"
                            );
                            Ok(Self::Http {
                                api_base: cli.api_base.clone(),
                                credentials,
                            })
                        },
                        Err(_) => Err(locate_err),
                    },
                }
            },
        }
    }

    /// Build the transport for this backend
    pub fn connect(&self, policy: BackoffPolicy, key_prefix: &str) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match self {
            Self::Http {
                api_base,
                credentials,
            } => Arc::new(HttpTransport::new(api_base, credentials, policy)?),
            Self::Wrangler {
                program,
                namespace_id,
            } => Arc::new(WranglerTransport::new(program, namespace_id, policy)),
            Self::Artifact { outdir } => Arc::new(ArtifactTransport::new(outdir, key_prefix)?),
        };
        Ok(transport)
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub backend: Backend,
    pub dry_run: bool,
    pub key_prefix: String,
    pub transform: TransformConfig,
    pub scheduler: SchedulerConfig,
    pub max_attempts: u32,
    pub checkpoint_file: PathBuf,
    pub progress_every: u64,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        validate_cli(cli)?;

        let config = Self {
            input_dir: cli.indir.clone(),
            backend: Backend::resolve(cli)?,
            // Emit-only writes local artifacts even when --dry-run is also set
            dry_run: cli.dry_run && !cli.only_json,
            key_prefix: cli.key_prefix.clone(),
            transform: TransformConfig {
                key_field: cli.key_field.clone(),
                list_fields: cli.list_fields.clone(),
                split_lists: cli.split_list_fields,
            },
            scheduler: SchedulerConfig {
                workers: cli.parallel,
                batch_size: cli.batch_size,
                checkpoint_every: cli.checkpoint_every,
                batch_delay: Duration::from_secs_f64(cli.sleep),
                skip_existing: cli.skip_existing,
            },
            max_attempts: cli.retries,
            checkpoint_file: cli.checkpoint_file.clone(),
            progress_every: cli.progress_every,
        };

        Ok(config)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.max_attempts)
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.checkpoint_file)
    }
}

fn validate_cli(cli: &Cli) -> Result<()> {
    if cli.batch_size == 0 {
        return Err(KvseedError::config("--batch-size must be greater than 0"));
    }

    if cli.checkpoint_every == 0 {
        return Err(KvseedError::config("--checkpoint-every must be greater than 0"));
    }

    if cli.retries == 0 {
        return Err(KvseedError::config("--retries must be at least 1"));
    }

    if !cli.sleep.is_finite() || cli.sleep < 0.0 {
        return Err(KvseedError::config(format!(
            "--sleep must be a non-negative number of seconds, got {}",
            cli.sleep
        )));
    }

    if cli.key_field.trim().is_empty() {
        return Err(KvseedError::config("--key-field cannot be empty"));
    }

    Ok(())
}

fn credentials(cli: &Cli) -> Result<KvApiCredentials> {
    let account_id = non_empty(&cli.account_id);
    let namespace_id = non_empty(&cli.namespace_id);
    let api_token = non_empty(&cli.api_token);

    match (account_id, namespace_id, api_token) {
        (Some(account_id), Some(namespace_id), Some(api_token)) => Ok(KvApiCredentials {
            account_id,
            namespace_id,
            api_token,
        }),
        (account_id, namespace_id, api_token) => {
            let missing: Vec<&str> = [
                ("CF_ACCOUNT_ID", account_id.is_none()),
                ("CF_NAMESPACE_ID", namespace_id.is_none()),
                ("CF_API_TOKEN", api_token.is_none()),
            ]
            .into_iter()
            .filter(|(_, is_missing)| *is_missing)
            .map(|(name, _)| name)
            .collect();
            Err(KvseedError::config(format!(
                "missing credentials: {} must be set (environment or .env)",
                missing.join(", ")
            )))
        },
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
