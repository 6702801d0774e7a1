//! Warden - refresh-token session service
//!
//! Main entry point for the Warden CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{check_config, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Warden - refresh-token session service
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a config file (default: discovered)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use the in-process backend instead of Redis
    #[arg(long, global = true)]
    pub memory: bool,

    /// Emit console logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the session API and health probe (default)
    Serve,

    /// Load and validate the configuration, then print it
    CheckConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context {
        config_path: cli.config,
        verbose: cli.verbose,
        memory: cli.memory,
        json_logs: cli.json_logs,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run(&ctx).await,
        Commands::CheckConfig => check_config::run(&ctx),
    }
}
