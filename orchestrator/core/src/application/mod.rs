// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod orchestrator;
pub mod registry;
pub mod scheduler;

pub use orchestrator::{
    AgentStatus, LifecycleState, Orchestrator, OrchestratorError, OrchestratorStatus, TickSummary,
};
pub use registry::{DependencyState, StatusCounts, TaskRegistry};
pub use scheduler::ConcurrencyScheduler;
