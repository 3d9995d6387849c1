// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: tasks, the work source contract, risk and approval rules,
//! configuration and the events raised by the orchestrator.

pub mod approval;
pub mod config;
pub mod events;
pub mod risk;
pub mod task;
pub mod work_source;

pub use approval::{ApprovalPolicy, AutoApproveFlags};
pub use config::{OrchestratorConfig, OrchestratorConfigPatch};
pub use events::{ApprovalEvent, OrchestratorEvent, TaskEvent};
pub use risk::RiskAssessor;
pub use task::{
    ClearanceLevel, Task, TaskError, TaskId, TaskMetrics, TaskPriority, TaskResult, TaskStatus,
};
pub use work_source::{WorkSource, WorkSourceError};
