// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. Publishing never
// blocks and never fails; receivers that fall behind get `Lagged(n)` and
// continue from the oldest retained event.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use steward_cortex::{LearningEvent, LearningEventPublisher};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{ApprovalEvent, OrchestratorEvent, TaskEvent};
use crate::domain::task::TaskId;

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Task(TaskEvent),
    Approval(ApprovalEvent),
    Learning(LearningEvent),
    Orchestrator(OrchestratorEvent),
}

impl DomainEvent {
    /// Colon-separated event name, e.g. `task:created`.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Task(event) => match event {
                TaskEvent::TaskCreated { .. } => "task:created",
                TaskEvent::TaskStarted { .. } => "task:started",
                TaskEvent::TaskCompleted { .. } => "task:completed",
                TaskEvent::TaskFailed { .. } => "task:failed",
                TaskEvent::TaskCancelled { .. } => "task:cancelled",
            },
            DomainEvent::Approval(event) => match event {
                ApprovalEvent::ApprovalRequired { .. } => "approval:required",
                ApprovalEvent::ApprovalGranted { .. } => "approval:granted",
                ApprovalEvent::ApprovalRejected { .. } => "approval:rejected",
            },
            DomainEvent::Learning(event) => event.event_type(),
            DomainEvent::Orchestrator(event) => match event {
                OrchestratorEvent::OrchestratorStarted { .. } => "orchestrator:started",
                OrchestratorEvent::AnalysisCompleted { .. } => "analysis:completed",
                OrchestratorEvent::OrchestratorStopped { .. } => "orchestrator:stopped",
            },
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of events buffered per receiver before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_task_event(&self, event: TaskEvent) {
        self.broadcast(DomainEvent::Task(event));
    }

    pub fn publish_approval_event(&self, event: ApprovalEvent) {
        self.broadcast(DomainEvent::Approval(event));
    }

    pub fn publish_learning_event(&self, event: LearningEvent) {
        self.broadcast(DomainEvent::Learning(event));
    }

    pub fn publish_orchestrator_event(&self, event: OrchestratorEvent) {
        self.broadcast(DomainEvent::Orchestrator(event));
    }

    fn broadcast(&self, event: DomainEvent) {
        debug!(event = event.name(), "Publishing event");

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the lifecycle events of a single task
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        TaskEventReceiver {
            receiver: self.sender.subscribe(),
            task_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl LearningEventPublisher for EventBus {
    fn publish(&self, event: LearningEvent) {
        self.publish_learning_event(event);
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one task's lifecycle events (filtered)
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Task(task_event) = event {
                if task_event.task_id() == self.task_id {
                    return Ok(task_event);
                }
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started(task_id: TaskId) -> TaskEvent {
        TaskEvent::TaskStarted {
            task_id,
            domain: "ops".to_string(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let task_id = TaskId::new();

        event_bus.publish_task_event(started(task_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.name(), "task:started");
        match received {
            DomainEvent::Task(TaskEvent::TaskStarted { task_id: id, .. }) => assert_eq!(id, task_id),
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_task_event_filtering() {
        let event_bus = EventBus::new(10);
        let task_id = TaskId::new();
        let mut receiver = event_bus.subscribe_task(task_id);

        event_bus.publish_task_event(started(TaskId::new()));
        event_bus.publish_orchestrator_event(OrchestratorEvent::AnalysisCompleted {
            proposed: 0,
            queued: 0,
            escalated: 0,
            completed_at: Utc::now(),
        });
        event_bus.publish_task_event(started(task_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id(), task_id);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_task_event(started(TaskId::new()));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let event_bus = EventBus::new(4);
        event_bus.publish_task_event(started(TaskId::new()));
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_receiver_sees_lag() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();
        for _ in 0..5 {
            event_bus.publish_task_event(started(TaskId::new()));
        }

        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(3))));
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_learning_events_flow_through_publisher_trait() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        let publisher: &dyn LearningEventPublisher = &event_bus;

        publisher.publish(LearningEvent::PatternsPruned {
            count: 2,
            retention_days: 90,
            timestamp: Utc::now(),
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.name(), "patterns:pruned");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "learning");
        assert_eq!(json["event"]["type"], "patterns_pruned");
    }
}
