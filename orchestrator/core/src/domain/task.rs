// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task aggregate and its lifecycle state machine.
//!
//! ```text
//! Pending ──► PendingApproval ──► Queued ──► InProgress ──► Completed
//!    │              │                                  ├──► Failed
//!    │              └──────────► Cancelled ◄───────────┘
//!    ├──► Queued
//!    └──► Cancelled
//! ```
//!
//! Priority and clearance are fixed when a task is built. After that only the
//! status, the result and the lifecycle timestamps change, and status changes
//! go through [`Task::transition`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// `Background < Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Background,
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Background => "BACKGROUND",
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        }
    }
}

/// Permission tier gating unattended execution, ordered from least to most
/// privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearanceLevel {
    ReadOnly,
    Suggest,
    ModifySafe,
    ModifyProduction,
    FullAutonomy,
}

impl ClearanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearanceLevel::ReadOnly => "READ_ONLY",
            ClearanceLevel::Suggest => "SUGGEST",
            ClearanceLevel::ModifySafe => "MODIFY_SAFE",
            ClearanceLevel::ModifyProduction => "MODIFY_PRODUCTION",
            ClearanceLevel::FullAutonomy => "FULL_AUTONOMY",
        }
    }
}

impl fmt::Display for ClearanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `READ_ONLY`, `read-only` and `readOnly` spellings.
impl FromStr for ClearanceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "readonly" => Ok(ClearanceLevel::ReadOnly),
            "suggest" => Ok(ClearanceLevel::Suggest),
            "modifysafe" => Ok(ClearanceLevel::ModifySafe),
            "modifyproduction" => Ok(ClearanceLevel::ModifyProduction),
            "fullautonomy" => Ok(ClearanceLevel::FullAutonomy),
            _ => Err(format!("unknown clearance level '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    PendingApproval,
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, PendingApproval)
                | (Pending, Queued)
                | (Pending, Cancelled)
                | (PendingApproval, Queued)
                | (PendingApproval, Cancelled)
                | (Queued, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::PendingApproval => "pending_approval",
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Task {0} is already registered")]
    AlreadyExists(TaskId),

    #[error("Task {task_id} is {status}, not awaiting approval")]
    NotPendingApproval { task_id: TaskId, status: TaskStatus },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub duration_ms: u64,
    /// Source-specific measurements.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: TaskMetrics,
}

impl TaskResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metrics: TaskMetrics::default(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            metrics: TaskMetrics::default(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metrics.extra.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: TaskId,
    domain: String,
    title: String,
    priority: TaskPriority,
    clearance: ClearanceLevel,
    status: TaskStatus,
    /// Open hints from the proposing source, e.g. `estimatedCost`, `filesModified`.
    metadata: Map<String, Value>,
    dependencies: Vec<TaskId>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<TaskResult>,
}

impl Task {
    pub const ESTIMATED_COST_KEY: &'static str = "estimatedCost";
    pub const FILES_MODIFIED_KEY: &'static str = "filesModified";

    pub fn new(
        domain: impl Into<String>,
        title: impl Into<String>,
        priority: TaskPriority,
        clearance: ClearanceLevel,
    ) -> Self {
        Self {
            id: TaskId::new(),
            domain: domain.into(),
            title: title.into(),
            priority,
            clearance,
            status: TaskStatus::Pending,
            metadata: Map::new(),
            dependencies: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, task_id: TaskId) -> Self {
        self.dependencies.push(task_id);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn clearance(&self) -> ClearanceLevel {
        self.clearance
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn estimated_cost(&self) -> Option<f64> {
        self.metadata.get(Self::ESTIMATED_COST_KEY).and_then(Value::as_f64)
    }

    pub fn files_modified(&self) -> bool {
        self.metadata
            .get(Self::FILES_MODIFIED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Input the learner fingerprints this task by. Excludes the id so that
    /// recurring proposals map onto the same pattern.
    pub fn learning_context(&self) -> Value {
        json!({
            "title": self.title,
            "clearance": self.clearance,
            "priority": self.priority,
        })
    }

    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == TaskStatus::InProgress {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Records the outcome of an in-progress task, landing on `Completed` or
    /// `Failed` according to `result.success`.
    pub fn finish(&mut self, result: TaskResult) -> Result<(), TaskError> {
        let next = if result.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.transition(next)?;
        self.result = Some(result);
        Ok(())
    }
}
