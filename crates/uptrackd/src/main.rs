//! uptrackd: the uptrack daemon.
//!
//! Single binary that wires the uptrack crates together:
//! - Configuration (uptrack.toml)
//! - State store (redb)
//! - Uptime monitor (probes, aggregate updates, events)
//! - Endpoint management commands
//!
//! # Usage
//!
//! ```text
//! uptrackd --config /etc/uptrack.toml run
//! uptrackd --data-dir ./data add --owner team-a --url example.com --name Example
//! uptrackd --data-dir ./data list
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use uptrack_core::UptrackConfig;

mod commands;

#[derive(Parser)]
#[command(name = "uptrackd", about = "uptrack endpoint uptime monitor", version)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state; overrides `[storage] data_dir`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every endpoint on the configured interval until Ctrl-C.
    Run,
    /// Probe every endpoint once and print the summary.
    Sweep,
    /// Register a new endpoint.
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        name: String,
    },
    /// List endpoints with their current state and availability.
    List,
    /// Print an endpoint's stored document as JSON.
    Show { id: String },
    /// Recent health checks of an endpoint, newest first.
    History {
        id: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete an endpoint and its health-check log.
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => UptrackConfig::from_file(path)?,
        None => UptrackConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    // RUST_LOG wins over the config file.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.filter)?,
    };
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run => commands::run(&config).await,
        Command::Sweep => commands::sweep(&config).await,
        Command::Add { owner, url, name } => commands::add(&config, &owner, &url, &name),
        Command::List => commands::list(&config),
        Command::Show { id } => commands::show(&config, &id),
        Command::History { id, limit } => commands::history(&config, &id, limit),
        Command::Remove { id } => commands::remove(&config, &id),
    }
}
