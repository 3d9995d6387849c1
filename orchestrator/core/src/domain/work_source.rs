// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Contract every domain agent implements to propose and perform work.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::task::{Task, TaskResult};

#[derive(Debug, Error)]
pub enum WorkSourceError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Source declined to execute: {0}")]
    Declined(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// A domain agent. Sources hold no task state between calls; the orchestrator
/// owns every task once `analyze` has returned it.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Domain name. Tasks returned by `analyze` must carry the same domain.
    fn domain(&self) -> &str;

    /// Called once while the orchestrator is starting. A failure marks the
    /// source unhealthy and excludes it from analysis.
    async fn initialize(&self) -> Result<(), WorkSourceError> {
        Ok(())
    }

    /// Proposes work. An empty list is a normal answer.
    async fn analyze(&self) -> Result<Vec<Task>, WorkSourceError>;

    /// Pre-flight check performed right before dispatch.
    fn can_execute(&self, task: &Task) -> bool;

    async fn execute(&self, task: &Task) -> Result<TaskResult, WorkSourceError>;
}
