//! capgate CLI - inspect capability activation under a configuration.
//!
//! Loads the layered configuration, builds the activation manager from it
//! and reports what would be active for a given set of contexts.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod theme;

use commands::{check, exec, inspect};

/// capgate - bounded capability activation
#[derive(Parser)]
#[command(name = "capgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and summarize it
    Check,

    /// Show the active set for a combination of contexts
    Inspect {
        /// Context to activate (repeatable)
        #[arg(short = 'x', long = "context")]
        contexts: Vec<String>,

        /// Preset to apply before adding contexts
        #[arg(short, long)]
        preset: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Execute a capability through the dispatcher
    Exec {
        /// Capability name
        name: String,

        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Context to activate for the call (repeatable)
        #[arg(short = 'x', long = "context")]
        contexts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = capgate_config::Config::load(cli.config.as_deref());

    // Set up logging from config, with --verbose override.
    let mut log_config = match &loaded {
        Ok(loaded) => config_bridge::to_log_config(&loaded.config),
        Err(_) => capgate_telemetry::LogConfig::new("warn"),
    };
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = capgate_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let loaded = loaded?;

    match cli.command {
        Commands::Check => check::run_check(&loaded)?,
        Commands::Inspect {
            contexts,
            preset,
            json,
        } => inspect::run_inspect(&loaded.config, preset.as_deref(), &contexts, json)?,
        Commands::Exec {
            name,
            params,
            contexts,
        } => exec::run_exec(&loaded.config, &name, &params, &contexts).await?,
    }

    Ok(())
}
