//! kvseed - bulk key-value upload tool

use anyhow::Result;
use clap::Parser;
use kvseed_common::logging::{init_logging, LogConfig, LogLevel};
use kvseed_ingest::{cli::Cli, config::RunConfig, controller};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env values become defaults for the CF_* credential flags
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let mut builder = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("kvseed");
    if let Some(path) = &cli.log_file {
        builder = builder.log_file(path);
    }

    // Environment variables take precedence over flags
    let log_config = builder.build().merge_env()?;
    let _guard = init_logging(&log_config)?;

    let result = match RunConfig::from_cli(&cli) {
        Ok(config) => controller::run(&config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcomes) => {
            if outcomes.has_failures() {
                error!(failed = outcomes.failed, "Some items failed, see the summary above");
            } else {
                info!("Upload complete");
            }
            Ok(ExitCode::SUCCESS)
        },
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        },
    }
}
