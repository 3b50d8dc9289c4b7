//! revstore
//!
//! A versioned, event-sourced resource store on a local RocksDB database.
//!
//! # Usage
//!
//! ```bash
//! revstore create apps deployments web --file web.json
//! revstore get apps deployments web [--rv RV]
//! revstore list apps deployments [--limit N] [--token TOKEN]
//! revstore history apps deployments web [--match not-older-than --rv RV]
//! revstore watch
//! revstore run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (<config dir>/revstore/config.toml, or --config)
//! 3. Environment variables (REVSTORE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use revstore_daemon::{execute, init_logging, load_settings, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;
    execute(settings, cli.command).await
}
