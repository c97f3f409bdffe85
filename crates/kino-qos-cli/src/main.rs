//! Kino QoS CLI - Offline playback session analysis
//!
//! Features:
//! - Replay recorded player event logs through the QoS tracker
//! - Classify raw player errors
//! - Inspect effective configuration and rule order

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Kino QoS - Playback quality toolkit
#[derive(Parser)]
#[command(name = "kino-qos")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Playback session QoS analysis toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Configuration overrides (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log
    Replay {
        /// Path to the event log
        events: PathBuf,

        /// Persist the device store to this file
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Pretend an alternate resource is available
        #[arg(long)]
        fallback: bool,
    },

    /// Classify a raw player error
    Classify {
        /// Error details string (e.g. fragLoadError)
        details: String,

        /// Error kind (network, media, key_system, mux, setup, other)
        #[arg(short, long, default_value = "other")]
        kind: String,

        /// HTML media error code
        #[arg(long)]
        native_code: Option<u16>,

        /// Error name (e.g. NotSupportedError)
        #[arg(long)]
        name: Option<String>,

        /// Mark the error fatal
        #[arg(long)]
        fatal: bool,
    },

    /// Show the effective configuration
    Config,

    /// Show recovery and attribution rules in evaluation order
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    kino_qos::init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { events, store, fallback } => {
            commands::replay(&events, config, store.as_deref(), fallback, &cli.format).await?;
        }
        Commands::Classify { details, kind, native_code, name, fatal } => {
            commands::classify(&details, &kind, native_code, name, fatal, &cli.format)?;
        }
        Commands::Config => {
            commands::show_config(&config, &cli.format)?;
        }
        Commands::Rules => {
            commands::rules(&cli.format)?;
        }
    }

    Ok(())
}
