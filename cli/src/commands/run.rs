// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `steward run` - run the orchestrator in the foreground
//!
//! Registers the manifest-declared sources, starts the orchestrator and
//! prints every domain event until Ctrl+C or SIGTERM, then stops gracefully.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use steward_core::application::Orchestrator;
use steward_core::domain::OrchestratorConfig;
use steward_core::infrastructure::{DomainEvent, EventBus, EventBusError};
use steward_cortex::JsonFileStateStore;

use crate::manifest_source::SourceManifest;

#[derive(Args)]
pub struct RunArgs {
    /// YAML manifest declaring static work sources
    #[arg(long, env = "STEWARD_SOURCES", value_name = "FILE")]
    pub sources: Option<PathBuf>,

    /// Expose Prometheus metrics on this port
    #[arg(long, env = "STEWARD_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfig::load_or_default(config_override).context("Failed to load configuration")?;

    if let Some(port) = args.metrics_port {
        install_metrics_exporter(port)?;
    }

    let event_bus = EventBus::with_default_capacity();
    let store = Arc::new(JsonFileStateStore::new(config.state_path.clone()));
    let orchestrator = Arc::new(Orchestrator::new(config, event_bus.clone(), store));

    match &args.sources {
        Some(path) => {
            let manifest = SourceManifest::from_yaml_file(path)?;
            for source in manifest.into_sources() {
                orchestrator
                    .register_source(Arc::new(source))
                    .await
                    .context("Failed to register work source")?;
            }
        }
        None => warn!("No --sources manifest given, running without work sources"),
    }

    let mut receiver = event_bus.subscribe();
    let as_json = args.json;
    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => print_event(&event, as_json),
                Err(EventBusError::Lagged(n)) => eprintln!("{}", format!("... {} events dropped", n).yellow()),
                Err(_) => break,
            }
        }
    });

    orchestrator.start().await.context("Failed to start orchestrator")?;
    println!("{}", "Steward running. Press Ctrl+C to stop.".green());

    shutdown_signal().await;

    orchestrator.stop().await.context("Failed to stop orchestrator")?;
    printer.abort();

    let status = orchestrator.get_status().await;
    println!(
        "{}",
        format!(
            "Stopped: {} completed, {} failed, {} awaiting approval",
            status.counts.completed,
            status.counts.failed,
            status.pending_approvals.len()
        )
        .bold()
    );
    Ok(())
}

fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics exporter on {}", addr))?;
    info!("Prometheus metrics available on http://{}/metrics", addr);
    Ok(())
}

fn print_event(event: &DomainEvent, as_json: bool) {
    if as_json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    let name = event.name();
    let label = if name.starts_with("approval:") {
        name.yellow().bold()
    } else if name == "task:failed" || name == "task:cancelled" {
        name.red()
    } else if name == "task:completed" {
        name.green()
    } else {
        name.cyan()
    };
    let body = match event {
        DomainEvent::Task(e) => serde_json::to_string(e),
        DomainEvent::Approval(e) => serde_json::to_string(e),
        DomainEvent::Learning(e) => serde_json::to_string(e),
        DomainEvent::Orchestrator(e) => serde_json::to_string(e),
    }
    .unwrap_or_default();
    println!("{} {}", label, body.dimmed());
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
