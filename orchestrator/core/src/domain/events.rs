// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_cortex::{DecisionId, Risk};

use crate::domain::task::{ClearanceLevel, TaskId, TaskPriority};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskCreated {
        task_id: TaskId,
        domain: String,
        title: String,
        priority: TaskPriority,
        clearance: ClearanceLevel,
        created_at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        domain: String,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        domain: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        domain: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: TaskId,
        domain: String,
        reason: String,
        cancelled_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApprovalEvent {
    ApprovalRequired {
        task_id: TaskId,
        decision_id: DecisionId,
        domain: String,
        title: String,
        clearance: ClearanceLevel,
        reasoning: String,
        risks: Vec<Risk>,
        requested_at: DateTime<Utc>,
    },
    ApprovalGranted {
        task_id: TaskId,
        approver: String,
        granted_at: DateTime<Utc>,
    },
    ApprovalRejected {
        task_id: TaskId,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    OrchestratorStarted {
        sources: Vec<String>,
        started_at: DateTime<Utc>,
    },
    AnalysisCompleted {
        proposed: usize,
        queued: usize,
        escalated: usize,
        completed_at: DateTime<Utc>,
    },
    OrchestratorStopped {
        /// Tasks still running when the shutdown wait gave up.
        abandoned_tasks: usize,
        stopped_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::TaskCreated { task_id, .. }
            | TaskEvent::TaskStarted { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. }
            | TaskEvent::TaskCancelled { task_id, .. } => *task_id,
        }
    }
}
