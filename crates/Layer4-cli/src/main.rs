//! Scriptdeck CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use scriptdeck_foundation::{JsonStore, ScriptdeckConfig};
use scriptdeck_task::{ExportFormat, FilePersistence};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scriptdeck - inspect and clean up background script tasks
#[derive(Parser, Debug)]
#[command(name = "scriptdeck")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Project root (uses <dir>/.scriptdeck instead of the global store)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List persisted background tasks
    Tasks {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the log snapshot stored with a background task
    Logs {
        /// Task instance id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: ExportFormat,
    },
    /// Run the startup recovery and discard stale background tasks
    Purge,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let config = match &args.project {
        Some(root) => ScriptdeckConfig::load_for_project(root),
        None => ScriptdeckConfig::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        ScriptdeckConfig::new()
    });

    let store = match &args.project {
        Some(root) => JsonStore::project(root),
        None => JsonStore::global()?,
    };
    tracing::debug!(store = %store.base_dir().display(), "Using task store");
    let persistence = FilePersistence::from_settings(store, &config.tasks);

    match args.command {
        Command::Tasks { json } => commands::list_tasks(&persistence, json),
        Command::Logs { id, format } => commands::show_logs(&persistence, &id, format),
        Command::Purge => commands::purge(&config, persistence).await,
        Command::Config => commands::show_config(&config),
    }
}
