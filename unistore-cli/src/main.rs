//! # unistore
//!
//! Runs one storage operation against the configured backend and prints the
//! result as JSON on stdout. Log lines go to stderr.
//!
//! ## Usage
//! ```bash
//! unistore --config /etc/unistore/unistore.yaml get-volume vol1
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use unistore_backend::MemoryBackend;

use unistore_cli::cli::Args;
use unistore_cli::commands;
use unistore_cli::config::{BackendKind, Config, ConfigError, DEFAULT_CONFIG_PATH};
use unistore_cli::inventory;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let (config, source) = match &args.config {
        Some(config_path) => (Config::load(config_path)?, Some(config_path.as_str())),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg, Some(DEFAULT_CONFIG_PATH)),
            Err(_) => (Config::default(), None),
        },
    };
    let config = config.with_cli_overrides(&args);
    config.validate()?;

    // Initialize logging
    unistore_common::init_logging_with_format(&config.log_level, config.log_format)?;

    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    if config.backend != BackendKind::Memory {
        let err = ConfigError::UnsupportedBackend(format!("{:?}", config.backend).to_lowercase());
        error!(error = %err, "Cannot build backend");
        return Err(err.into());
    }

    let inventory_path = &config.memory.inventory_path;
    let backend = MemoryBackend::from_inventory(inventory::load(inventory_path)?)
        .with_filer_address(config.memory.filer_address.clone());

    let output = match commands::run(&backend, &args.command).await {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, "Command failed");
            return Err(e);
        }
    };

    if args.command.is_mutating() {
        inventory::save(inventory_path, &backend.inventory()?)?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
