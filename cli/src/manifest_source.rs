// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Static work sources declared in a YAML manifest
//!
//! Lets `steward run` exercise the full analysis/approval/execution loop
//! without any real domain agent. Each declared proposal is offered on the
//! first analysis tick (every tick when `repeat: true`) and executing it
//! simply acknowledges the task.
//!
//! ```yaml
//! sources:
//!   - domain: docs
//!     tasks:
//!       - title: Refresh README badges
//!         priority: LOW
//!         clearance: SUGGEST
//!       - title: Rotate API keys
//!         priority: HIGH
//!         clearance: MODIFY_PRODUCTION
//!         metadata:
//!           estimatedCost: 2.5
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use steward_core::domain::{ClearanceLevel, Task, TaskPriority, TaskResult, WorkSource, WorkSourceError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceManifest {
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub domain: String,
    #[serde(default)]
    pub tasks: Vec<ProposalSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSpec {
    pub title: String,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    pub clearance: ClearanceLevel,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Offer the proposal on every tick instead of only the first.
    #[serde(default)]
    pub repeat: bool,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

impl SourceManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source manifest at {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Failed to parse source manifest at {:?}", path))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        for source in &manifest.sources {
            if source.domain.trim().is_empty() {
                bail!("source domain must not be empty");
            }
            if source.tasks.iter().any(|t| t.title.trim().is_empty()) {
                bail!("source '{}' declares a task without a title", source.domain);
            }
        }
        Ok(manifest)
    }

    pub fn into_sources(self) -> Vec<ManifestSource> {
        self.sources.into_iter().map(ManifestSource::new).collect()
    }
}

pub struct ManifestSource {
    domain: String,
    proposals: Vec<ProposalSpec>,
    offered: AtomicBool,
}

impl ManifestSource {
    pub fn new(spec: SourceSpec) -> Self {
        Self {
            domain: spec.domain,
            proposals: spec.tasks,
            offered: AtomicBool::new(false),
        }
    }

    fn build(&self, proposal: &ProposalSpec) -> Task {
        proposal.metadata.iter().fold(
            Task::new(&self.domain, &proposal.title, proposal.priority, proposal.clearance),
            |task, (key, value)| task.with_metadata(key.clone(), value.clone()),
        )
    }
}

#[async_trait]
impl WorkSource for ManifestSource {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self) -> Result<Vec<Task>, WorkSourceError> {
        let first = !self.offered.swap(true, Ordering::SeqCst);
        Ok(self
            .proposals
            .iter()
            .filter(|p| first || p.repeat)
            .map(|p| self.build(p))
            .collect())
    }

    fn can_execute(&self, task: &Task) -> bool {
        task.domain() == self.domain
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, WorkSourceError> {
        info!(domain = %self.domain, task_id = %task.id(), title = %task.title(), "Acknowledging manifest task");
        Ok(TaskResult::success(json!({
            "acknowledged": true,
            "title": task.title(),
        })))
    }
}
