// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Steward CLI
//!
//! The `steward` binary runs the orchestrator in the foreground and inspects
//! its configuration and learning state.
//!
//! ## Commands
//!
//! - `steward run [--sources FILE] [--metrics-port N]` - Run until Ctrl+C
//! - `steward config show|validate|generate` - Configuration management
//! - `steward learning stats|models|patterns` - Inspect persisted learning state

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use steward_cli::commands::{self, ConfigCommand, LearningCommand, RunArgs};

/// Steward - Autonomous task orchestration with human approval gates
#[derive(Parser)]
#[command(name = "steward")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "STEWARD_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "STEWARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator in the foreground
    #[command(name = "run")]
    Run(RunArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Inspect persisted learning state
    #[command(name = "learning")]
    Learning {
        /// Learning state file (default: statePath from configuration)
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,

        #[command(subcommand)]
        command: LearningCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Learning { state, command }) => {
            commands::learning::handle_command(command, cli.config, state).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
