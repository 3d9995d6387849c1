// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Inspect the persisted learning state
//!
//! Commands: stats, models, patterns

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use steward_core::domain::OrchestratorConfig;
use steward_cortex::{JsonFileStateStore, LearningPattern, LearningSnapshot, LearningStateStore};

#[derive(Subcommand)]
pub enum LearningCommand {
    /// Decision and feedback counters
    Stats,

    /// Per-domain model accuracy
    Models,

    /// Highest-confidence patterns
    Patterns {
        /// Only show patterns for this domain
        #[arg(long)]
        domain: Option<String>,

        /// Maximum number of patterns to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub async fn handle_command(
    command: LearningCommand,
    config_override: Option<PathBuf>,
    state_override: Option<PathBuf>,
) -> Result<()> {
    let path = match state_override {
        Some(path) => path,
        None => {
            OrchestratorConfig::load_or_default(config_override)
                .context("Failed to load configuration")?
                .state_path
        }
    };

    let store = JsonFileStateStore::new(path.clone());
    let Some(snapshot) = store
        .load()
        .await
        .with_context(|| format!("Failed to read learning state at {:?}", path))?
    else {
        println!("{}", format!("No learning state at {}", path.display()).yellow());
        return Ok(());
    };

    match command {
        LearningCommand::Stats => stats(&snapshot),
        LearningCommand::Models => models(&snapshot),
        LearningCommand::Patterns { domain, limit } => patterns(&snapshot, domain.as_deref(), limit),
    }
    Ok(())
}

fn stats(snapshot: &LearningSnapshot) {
    let stats = &snapshot.state.stats;
    println!("{}", "Learning state:".bold());
    println!("  Saved at: {}", snapshot.saved_at.to_rfc3339());
    println!("  Models: {}", snapshot.models.len());
    println!("  Patterns: {}", snapshot.patterns.len());
    println!("  Decisions retained: {}", snapshot.decisions.len());
    println!();
    println!("{}", "Feedback:".bold());
    println!("  Decisions made: {}", stats.decisions_made);
    println!("  Feedback received: {}", stats.feedback_received);
    println!("  Positive: {}", stats.positive_feedback.to_string().green());
    println!("  Negative: {}", stats.negative_feedback.to_string().red());
    println!("  Observed accuracy: {:.2}", stats.observed_accuracy());
}

fn models(snapshot: &LearningSnapshot) {
    if snapshot.models.is_empty() {
        println!("{}", "No models trained yet".dimmed());
        return;
    }
    let mut models: Vec<_> = snapshot.models.iter().collect();
    models.sort_by(|a, b| a.domain.cmp(&b.domain));

    println!("{}", "Models:".bold());
    for model in models {
        println!(
            "  {} v{}  accuracy {:.2}  points {}  trained {}",
            model.domain.bold(),
            model.version,
            model.accuracy,
            model.training_data_count,
            model.last_trained.to_rfc3339()
        );
    }
}

fn patterns(snapshot: &LearningSnapshot, domain: Option<&str>, limit: usize) {
    let selected = select_patterns(snapshot, domain, limit);
    if selected.is_empty() {
        println!("{}", "No patterns recorded".dimmed());
        return;
    }

    println!("{}", "Patterns:".bold());
    for pattern in selected {
        let id = pattern.id.as_str();
        println!(
            "  {} [{}] confidence {:.2}  seen {}x  +{} / -{} / ~{}",
            &id[..id.len().min(12)],
            pattern.domain,
            pattern.confidence,
            pattern.frequency,
            pattern.outcomes.positive,
            pattern.outcomes.negative,
            pattern.outcomes.neutral
        );
    }
}

fn select_patterns<'a>(snapshot: &'a LearningSnapshot, domain: Option<&str>, limit: usize) -> Vec<&'a LearningPattern> {
    let mut selected: Vec<&LearningPattern> = snapshot
        .patterns
        .iter()
        .filter(|p| domain.is_none_or(|d| p.domain == d))
        .collect();
    selected.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.frequency.cmp(&a.frequency))
    });
    selected.truncate(limit);
    selected
}
