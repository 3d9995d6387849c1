// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded-concurrency admission queue.
//!
//! The queue is kept sorted by priority (highest first) with ties broken by
//! insertion order. The scheduler only decides *which* task may start; the
//! orchestrator runs it and reports back through [`ConcurrencyScheduler::complete`].

use std::collections::{HashSet, VecDeque};

use crate::domain::task::{TaskId, TaskPriority};

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    task_id: TaskId,
    priority: TaskPriority,
    seq: u64,
}

pub struct ConcurrencyScheduler {
    queue: VecDeque<QueueEntry>,
    active: HashSet<TaskId>,
    max_concurrent: usize,
    next_seq: u64,
}

impl ConcurrencyScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            active: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
            next_seq: 0,
        }
    }

    pub fn enqueue(&mut self, task_id: TaskId, priority: TaskPriority) {
        let entry = QueueEntry {
            task_id,
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        // First slot whose entry ranks strictly below the new one.
        let at = self.queue.partition_point(|e| e.priority >= priority);
        self.queue.insert(at, entry);
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.max_concurrent
    }

    /// Takes the first queued task, in priority/FIFO order, that `admissible`
    /// accepts. Does nothing when all slots are taken.
    pub fn admit_next(&mut self, mut admissible: impl FnMut(TaskId) -> bool) -> Option<TaskId> {
        if !self.has_capacity() {
            return None;
        }
        let index = self.queue.iter().position(|e| admissible(e.task_id))?;
        let entry = self.queue.remove(index)?;
        self.active.insert(entry.task_id);
        Some(entry.task_id)
    }

    /// Frees the slot held by `task_id`. Returns false if it was not active.
    pub fn complete(&mut self, task_id: TaskId) -> bool {
        self.active.remove(&task_id)
    }

    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.active.contains(&task_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> Vec<TaskId> {
        self.queue.iter().map(|e| e.task_id).collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Shrinking below the current active count only stops new admissions.
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
        self.max_concurrent = max_concurrent.max(1);
    }

    #[cfg(test)]
    fn sequence(&self) -> Vec<u64> {
        self.queue.iter().map(|e| e.seq).collect()
    }
}
