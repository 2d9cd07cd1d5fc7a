//! Command-line interface

use crate::checkpoint::DEFAULT_CHECKPOINT_FILE;
use crate::scheduler::{DEFAULT_BATCH_DELAY_SECS, DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_EVERY};
use crate::transform::{DEFAULT_KEY_FIELD, DEFAULT_LIST_FIELD};
use crate::transport::artifact::DEFAULT_OUTDIR;
use crate::transport::http::DEFAULT_API_BASE;
use crate::transport::retry::DEFAULT_MAX_ATTEMPTS;
use crate::transport::wrangler::DEFAULT_WRANGLER_BIN;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default input directory
pub const DEFAULT_INDIR: &str = "census_mesh_2020_data";

/// Default namespace prefix prepended to every key
pub const DEFAULT_KEY_PREFIX: &str = "census_mesh_2020:";

/// Default progress interval, in resolved items
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Remote backend
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// KV REST API over HTTPS
    #[default]
    Http,
    /// The `wrangler` command-line tool
    Wrangler,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "kvseed")]
#[command(author, version, about = "Upload CSV rows to a key-value store as JSON values")]
pub struct Cli {
    /// Directory of CSV files; each file is one partition
    #[arg(long, default_value = DEFAULT_INDIR)]
    pub indir: PathBuf,

    /// Skip keys that already exist in the store
    #[arg(long)]
    pub skip_existing: bool,

    /// Log what would be written without contacting the store
    #[arg(long)]
    pub dry_run: bool,

    /// Items per batch (parallel) or between pauses (sequential)
    #[arg(long, visible_alias = "upload-batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seconds to pause between batches
    #[arg(long, default_value_t = DEFAULT_BATCH_DELAY_SECS)]
    pub sleep: f64,

    /// Attempts per store operation, first try included
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub retries: u32,

    /// Concurrent uploads per batch; 0 or 1 runs sequentially
    #[arg(long, default_value_t = 0)]
    pub parallel: usize,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Checkpoint file used to resume interrupted runs
    #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
    pub checkpoint_file: PathBuf,

    /// Sequential mode: save the checkpoint every N items
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_EVERY)]
    pub checkpoint_every: usize,

    /// Log progress every N items (0 disables)
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
    pub progress_every: u64,

    /// Write one JSON file per key to --outdir instead of uploading
    #[arg(long)]
    pub only_json: bool,

    /// Output directory for --only-json
    #[arg(long, default_value = DEFAULT_OUTDIR)]
    pub outdir: PathBuf,

    /// Store backend
    #[arg(long, value_enum, default_value_t = BackendKind::Http)]
    pub backend: BackendKind,

    /// Shorthand for --backend wrangler
    #[arg(long)]
    pub use_wrangler: bool,

    /// Namespace id for the wrangler backend (defaults to CF_NAMESPACE_ID)
    #[arg(long)]
    pub wrangler_namespace: Option<String>,

    /// wrangler executable name or path
    #[arg(long, default_value = DEFAULT_WRANGLER_BIN)]
    pub wrangler_bin: String,

    #[arg(long, env = "CF_ACCOUNT_ID", hide_env_values = true)]
    pub account_id: Option<String>,

    #[arg(long, env = "CF_NAMESPACE_ID", hide_env_values = true)]
    pub namespace_id: Option<String>,

    #[arg(long, env = "CF_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// KV API root
    #[arg(long, env = "KVSEED_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Namespace prefix prepended to every key
    #[arg(long, default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    /// Header holding the key (case-insensitive; falls back to the first column)
    #[arg(long, default_value = DEFAULT_KEY_FIELD)]
    pub key_field: String,

    /// Field treated as a delimited list (repeatable)
    #[arg(long = "list-field", default_value = DEFAULT_LIST_FIELD)]
    pub list_fields: Vec<String>,

    /// Split list fields on `;`, `，` or `、` into JSON arrays
    #[arg(long, visible_alias = "to-array-htksaki")]
    pub split_list_fields: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn backend_kind(&self) -> BackendKind {
        if self.use_wrangler {
            BackendKind::Wrangler
        } else {
            self.backend
        }
    }
}
