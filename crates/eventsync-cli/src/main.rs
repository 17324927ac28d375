//! EventSync CLI
//!
//! Command-line interface for eventsync - optimistic event interest and
//! view tracking with background sync.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventsync_core::{Config, EventId, SyncEngine};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "eventsync")]
#[command(about = "EventSync - Optimistic event interest and view tracking")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Toggle interest in an event
    Interest {
        /// Event ID
        id: EventId,
        /// Only apply locally; sync later
        #[arg(long)]
        local: bool,
    },
    /// Record a view of an event
    View {
        /// Event ID
        id: EventId,
        /// Only apply locally; sync later
        #[arg(long)]
        local: bool,
    },
    /// Show the local state of an event
    Show {
        /// Event ID
        id: EventId,
    },
    /// Fetch server state for an event
    Refresh {
        /// Event ID
        id: EventId,
    },
    /// Push all pending changes now
    Sync,
    /// Show pending work and cache size
    Status,
    /// Evict stale cache entries and long-failing changes
    Cleanup,
    /// Keep syncing in the foreground until interrupted
    Watch,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, auth_token, sync_interval_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the engine
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let engine = SyncEngine::from_config(&config)?;

    let result = match cli.command {
        Commands::Interest { id, local } => {
            commands::event::interest(&engine, id, local, &output).await
        }
        Commands::View { id, local } => commands::event::view(&engine, id, local, &output).await,
        Commands::Show { id } => commands::event::show(&engine, id, &output),
        Commands::Refresh { id } => commands::event::refresh(&engine, id, &output).await,
        Commands::Sync => commands::sync::sync(&engine, &output).await,
        Commands::Status => commands::status::show(&engine, &config, &output),
        Commands::Cleanup => commands::sync::cleanup(&engine, &config, &output),
        Commands::Watch => commands::sync::watch(engine.clone(), &config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    engine.dispose();
    result
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only initializes if EVENTSYNC_LOG is set. Logs go to `log_file` when
/// configured, otherwise to stderr.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("EVENTSYNC_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "eventsync_core={},eventsync_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
