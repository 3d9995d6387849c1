// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use steward_core::domain::OrchestratorConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file + environment overrides)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print as YAML instead of a summary
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./steward.yaml")]
        output: PathBuf,

        /// Include comments explaining every key
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = OrchestratorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. STEWARD_CONFIG_PATH: {}",
            std::env::var("STEWARD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./steward.yaml");
        println!("  4. ~/.steward/config.yaml");
        println!("  5. /etc/steward/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Orchestrator:".bold());
    println!("  Enabled: {}", config.enabled);
    println!("  Analysis interval: {} ms", config.analysis_interval_ms);
    println!("  Max concurrent tasks: {}", config.max_concurrent_tasks);
    println!("  Task timeout: {} ms", config.task_timeout_ms);
    println!("  Analysis timeout: {} ms", config.analysis_timeout_ms);
    println!("  Shutdown timeout: {} ms", config.shutdown_timeout_ms);
    println!();

    println!("{}", "Approval:".bold());
    println!("  Global clearance: {}", config.global_clearance);
    let flags = config.auto_approve;
    println!("  Auto-approve READ_ONLY: {}", flags.read_only);
    println!("  Auto-approve SUGGEST: {}", flags.suggestions_only);
    println!("  Auto-approve MODIFY_SAFE: {}", flags.modify_safe);
    println!("  Auto-approve MODIFY_PRODUCTION: {}", flags.modify_production);
    println!();

    println!("{}", "Learning:".bold());
    println!("  State path: {}", config.state_path.display());
    println!("  Persistence interval: {} ms", config.persistence_interval_ms);
    println!("  Learning rate: {}", config.learning.learning_rate);
    println!("  Confidence threshold: {}", config.learning.confidence_threshold);
    println!("  Retention: {} days", config.learning.retention_days);
    println!("  Auto-adapt: {}", config.learning.auto_adapt);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let mut config = match config_path {
        Some(path) => OrchestratorConfig::from_yaml_file(&path)?,
        None => match OrchestratorConfig::discover_config() {
            Some(path) => {
                println!("  Using {}", path.display());
                OrchestratorConfig::from_yaml_file(&path)?
            }
            None => {
                println!("{}", "No configuration file found, defaults apply".yellow());
                return Ok(());
            }
        },
    };

    let corrections = config.sanitize();
    if !corrections.is_empty() {
        for correction in &corrections {
            println!("  {} {}", "✗".red(), correction);
        }
        bail!("Configuration has {} invalid value(s)", corrections.len());
    }

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml").to_string()
    } else {
        OrchestratorConfig::default().to_yaml_string()?
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
