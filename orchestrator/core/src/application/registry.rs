// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory task registry.
//!
//! Every status change goes through [`TaskRegistry::transition`] or
//! [`TaskRegistry::finish`], which delegate to the task's own state machine.
//! Terminal tasks are retained up to `max_finished`, oldest evicted first.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use steward_cortex::DecisionId;

use crate::domain::task::{Task, TaskError, TaskId, TaskResult, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Ready,
    /// At least one dependency is still running or waiting.
    Waiting,
    /// A dependency ended without completing.
    Blocked(TaskId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub pending_approval: usize,
    pub queued: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

pub struct TaskRegistry {
    tasks: HashMap<TaskId, Task>,
    finished: VecDeque<TaskId>,
    decisions: HashMap<TaskId, DecisionId>,
    max_finished: usize,
}

impl TaskRegistry {
    pub fn new(max_finished: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            finished: VecDeque::new(),
            decisions: HashMap::new(),
            max_finished,
        }
    }

    /// Registers a new task. An id that is already known, finished or not,
    /// is refused so a terminal task can never be revived.
    pub fn insert(&mut self, task: Task) -> Result<(), TaskError> {
        let task_id = task.id();
        if self.tasks.contains_key(&task_id) {
            return Err(TaskError::AlreadyExists(task_id));
        }
        self.tasks.insert(task_id, task);
        Ok(())
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    /// Forgets a task that never progressed (deferred proposals).
    pub fn remove(&mut self, task_id: TaskId) -> Option<Task> {
        self.decisions.remove(&task_id);
        self.tasks.remove(&task_id)
    }

    pub fn get(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn link_decision(&mut self, task_id: TaskId, decision_id: DecisionId) {
        self.decisions.insert(task_id, decision_id);
    }

    pub fn decision_for(&self, task_id: TaskId) -> Option<DecisionId> {
        self.decisions.get(&task_id).copied()
    }

    /// Moves a task to `next` and returns a copy of the updated task.
    pub fn transition(&mut self, task_id: TaskId, next: TaskStatus) -> Result<Task, TaskError> {
        let task = self.tasks.get_mut(&task_id).ok_or(TaskError::NotFound(task_id))?;
        task.transition(next)?;
        let snapshot = task.clone();
        if next.is_terminal() {
            self.retire(task_id);
        }
        Ok(snapshot)
    }

    /// Records the result of an in-progress task.
    pub fn finish(&mut self, task_id: TaskId, result: TaskResult) -> Result<Task, TaskError> {
        let task = self.tasks.get_mut(&task_id).ok_or(TaskError::NotFound(task_id))?;
        task.finish(result)?;
        let snapshot = task.clone();
        self.retire(task_id);
        Ok(snapshot)
    }

    fn retire(&mut self, task_id: TaskId) {
        self.finished.push_back(task_id);
        while self.finished.len() > self.max_finished {
            if let Some(evicted) = self.finished.pop_front() {
                self.tasks.remove(&evicted);
                self.decisions.remove(&evicted);
            }
        }
    }

    pub fn set_max_finished(&mut self, max_finished: usize) {
        self.max_finished = max_finished;
        while self.finished.len() > self.max_finished {
            if let Some(evicted) = self.finished.pop_front() {
                self.tasks.remove(&evicted);
                self.decisions.remove(&evicted);
            }
        }
    }

    /// True when a non-terminal task with the same domain and title exists.
    pub fn has_active_duplicate(&self, domain: &str, title: &str) -> bool {
        self.tasks
            .values()
            .any(|t| !t.status().is_terminal() && t.domain() == domain && t.title() == title)
    }

    /// Dependencies unknown to the registry count as satisfied.
    pub fn dependency_state(&self, task_id: TaskId) -> DependencyState {
        let Some(task) = self.tasks.get(&task_id) else {
            return DependencyState::Ready;
        };
        let mut waiting = false;
        for dep in task.dependencies() {
            match self.tasks.get(dep).map(Task::status) {
                None | Some(TaskStatus::Completed) => {}
                Some(TaskStatus::Failed) | Some(TaskStatus::Cancelled) => {
                    return DependencyState::Blocked(*dep);
                }
                Some(_) => waiting = true,
            }
        }
        if waiting {
            DependencyState::Waiting
        } else {
            DependencyState::Ready
        }
    }

    pub fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.status() == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at());
        tasks
    }

    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at());
        tasks
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            let slot = match task.status() {
                TaskStatus::Pending => &mut counts.pending,
                TaskStatus::PendingApproval => &mut counts.pending_approval,
                TaskStatus::Queued => &mut counts.queued,
                TaskStatus::InProgress => &mut counts.in_progress,
                TaskStatus::Completed => &mut counts.completed,
                TaskStatus::Failed => &mut counts.failed,
                TaskStatus::Cancelled => &mut counts.cancelled,
            };
            *slot += 1;
        }
        counts
    }
}
