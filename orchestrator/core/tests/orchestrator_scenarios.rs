// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end orchestrator scenarios
//!
//! Each test wires one or more scripted work sources into a real
//! `Orchestrator`, starts it and follows progress through the event bus.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steward_core::application::{LifecycleState, Orchestrator, OrchestratorError};
use steward_core::domain::{
    ApprovalEvent, ClearanceLevel, OrchestratorConfig, OrchestratorConfigPatch, OrchestratorEvent, Task,
    TaskError, TaskPriority, TaskResult, TaskStatus, WorkSource, WorkSourceError,
};
use steward_core::infrastructure::{DomainEvent, EventBus, EventBusError, EventReceiver};
use steward_cortex::{
    DecisionOutcome, Feedback, InMemoryStateStore, JsonFileStateStore, LearningEvent, LearningStateStore,
    LoadOutcome,
};

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Hands out its queued proposals on the first `analyze()` and a fresh copy of
/// each `repeat` task on every call.
struct ScriptedSource {
    domain: String,
    once: tokio::sync::Mutex<Vec<Task>>,
    repeat: Vec<(String, ClearanceLevel)>,
    behaviour: Behaviour,
    work: Duration,
    executable: bool,
    fail_analysis: bool,
    resubmit: Option<Task>,
    stall_from: Option<usize>,
    analyses: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    executed: tokio::sync::Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            once: tokio::sync::Mutex::new(Vec::new()),
            repeat: Vec::new(),
            behaviour: Behaviour::Succeed,
            work: Duration::from_millis(0),
            executable: true,
            fail_analysis: false,
            resubmit: None,
            stall_from: None,
            analyses: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            executed: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    fn proposing(self, tasks: Vec<Task>) -> Self {
        Self {
            once: tokio::sync::Mutex::new(tasks),
            ..self
        }
    }

    fn repeating(mut self, title: &str, clearance: ClearanceLevel) -> Self {
        self.repeat.push((title.to_string(), clearance));
        self
    }

    fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    fn taking(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    fn declining(mut self) -> Self {
        self.executable = false;
        self
    }

    fn broken(mut self) -> Self {
        self.fail_analysis = true;
        self
    }

    /// Returns this exact task, same id included, from every `analyze()`.
    fn resubmitting(mut self, task: Task) -> Self {
        self.resubmit = Some(task);
        self
    }

    /// Makes the `n`th and later `analyze()` calls hang.
    fn stalling_from(mut self, n: usize) -> Self {
        self.stall_from = Some(n);
        self
    }

    fn task(&self, title: &str, priority: TaskPriority, clearance: ClearanceLevel) -> Task {
        Task::new(&self.domain, title, priority, clearance)
    }
}

#[async_trait]
impl WorkSource for ScriptedSource {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self) -> Result<Vec<Task>, WorkSourceError> {
        let call = self.analyses.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stall_from.is_some_and(|n| call >= n) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail_analysis {
            return Err(WorkSourceError::Analysis("upstream unavailable".to_string()));
        }
        let mut tasks = std::mem::take(&mut *self.once.lock().await);
        tasks.extend(self.resubmit.clone());
        for (title, clearance) in &self.repeat {
            tasks.push(self.task(title, TaskPriority::Medium, *clearance));
        }
        Ok(tasks)
    }

    fn can_execute(&self, _task: &Task) -> bool {
        self.executable
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, WorkSourceError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.executed.lock().await.push(task.title().to_string());

        match self.behaviour {
            Behaviour::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
            _ => tokio::time::sleep(self.work).await,
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Succeed => Ok(TaskResult::success(json!({ "title": task.title() }))),
            Behaviour::Fail => Err(WorkSourceError::Execution("disk full".to_string())),
            Behaviour::Panic => panic!("source bug"),
            Behaviour::Hang => unreachable!(),
        }
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        global_clearance: ClearanceLevel::Suggest,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(config: OrchestratorConfig) -> (Arc<Orchestrator>, EventReceiver) {
    orchestrator_with_store(config, Arc::new(InMemoryStateStore::new()))
}

fn orchestrator_with_store(
    config: OrchestratorConfig,
    store: Arc<dyn LearningStateStore>,
) -> (Arc<Orchestrator>, EventReceiver) {
    let event_bus = EventBus::new(4096);
    let receiver = event_bus.subscribe();
    (Arc::new(Orchestrator::new(config, event_bus, store)), receiver)
}

async fn wait_for(receiver: &mut EventReceiver, name: &str) -> DomainEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match receiver.recv().await {
                Ok(event) if event.name() == name => return event,
                Ok(_) | Err(EventBusError::Lagged(_)) => continue,
                Err(e) => panic!("event bus failed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

async fn wait_for_n(receiver: &mut EventReceiver, name: &str, n: usize) {
    for _ in 0..n {
        wait_for(receiver, name).await;
    }
}

#[tokio::test]
async fn test_scenario_a_suggestion_is_auto_approved_and_completes() {
    let (orch, mut events) = orchestrator(config());
    let source = ScriptedSource::new("docs");
    let task = source.task("Tighten README wording", TaskPriority::Medium, ClearanceLevel::Suggest);
    let task_id = task.id();
    orch.register_source(Arc::new(source.proposing(vec![task]))).await.unwrap();

    orch.start().await.unwrap();

    match wait_for(&mut events, "decision:made").await {
        DomainEvent::Learning(LearningEvent::DecisionMade { outcome, confidence, .. }) => {
            assert_eq!(outcome, DecisionOutcome::Execute);
            assert!((confidence - 0.90).abs() < f64::EPSILON);
        }
        other => panic!("unexpected event {}", other.name()),
    }
    wait_for(&mut events, "task:completed").await;

    let task = orch.task(task_id).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.result().unwrap().success);

    let agents = orch.get_agent_statuses();
    assert_eq!(agents[0].completed, 1);
    assert_eq!(agents[0].active_tasks, 0);

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_scenario_b_production_change_waits_for_approval() {
    let (orch, mut events) = orchestrator(config());
    let source = Arc::new(ScriptedSource::new("infra").proposing(vec![Task::new(
        "infra",
        "Rotate database credentials",
        TaskPriority::Critical,
        ClearanceLevel::ModifyProduction,
    )]));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();

    let task_id = match wait_for(&mut events, "approval:required").await {
        DomainEvent::Approval(ApprovalEvent::ApprovalRequired { task_id, reasoning, .. }) => {
            assert_eq!(reasoning, "exceeds global clearance ceiling");
            task_id
        }
        other => panic!("unexpected event {}", other.name()),
    };
    wait_for(&mut events, "analysis:completed").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = orch.get_status().await;
    assert_eq!(status.pending_approvals.len(), 1);
    assert_eq!(status.pending_approvals[0].id(), task_id);
    assert_eq!(status.active_tasks, 0);
    assert!(source.executed.lock().await.is_empty());

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_scenario_c_concurrency_limit_is_never_exceeded() {
    let (orch, mut events) = orchestrator(OrchestratorConfig {
        max_concurrent_tasks: 2,
        ..config()
    });
    let source = ScriptedSource::new("audit").taking(Duration::from_millis(50));
    let tasks: Vec<Task> = (0..5)
        .map(|i| source.task(&format!("scan shard {i}"), TaskPriority::Low, ClearanceLevel::ReadOnly))
        .collect();
    let source = Arc::new(source.proposing(tasks));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for_n(&mut events, "task:completed", 5).await;

    assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    assert_eq!(source.executed.lock().await.len(), 5);
    let status = orch.get_status().await;
    assert_eq!(status.counts.completed, 5);
    assert_eq!(status.queued_tasks, 0);

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_approved_task_runs_and_feeds_back_positively() {
    let (orch, mut events) = orchestrator(config());
    let source = Arc::new(ScriptedSource::new("infra").repeating("Resize volume", ClearanceLevel::ModifySafe));
    orch.register_source(source.clone()).await.unwrap();
    orch.start().await.unwrap();

    let (task_id, decision_id) = match wait_for(&mut events, "approval:required").await {
        DomainEvent::Approval(ApprovalEvent::ApprovalRequired { task_id, decision_id, .. }) => (task_id, decision_id),
        other => panic!("unexpected event {}", other.name()),
    };

    let approved = orch.approve_task(task_id, "alice").await.unwrap();
    assert_eq!(approved.status(), TaskStatus::Queued);
    wait_for(&mut events, "task:completed").await;
    wait_for(&mut events, "feedback:received").await;

    assert_eq!(orch.task(task_id).unwrap().status(), TaskStatus::Completed);
    let decision = orch.learner().decision(decision_id).await.unwrap();
    assert_eq!(decision.feedback.map(|f| f.feedback), Some(Feedback::Positive));

    let err = orch.approve_task(task_id, "alice").await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Task(TaskError::NotPendingApproval {
            status: TaskStatus::Completed,
            ..
        })
    ));

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_rejected_task_is_cancelled_with_negative_feedback() {
    let (orch, mut events) = orchestrator(config());
    orch.register_source(Arc::new(
        ScriptedSource::new("infra").repeating("Drop stale tables", ClearanceLevel::ModifyProduction),
    ))
    .await
    .unwrap();
    orch.start().await.unwrap();

    let (task_id, decision_id) = match wait_for(&mut events, "approval:required").await {
        DomainEvent::Approval(ApprovalEvent::ApprovalRequired { task_id, decision_id, .. }) => (task_id, decision_id),
        other => panic!("unexpected event {}", other.name()),
    };

    let rejected = orch.reject_task(task_id, "not during freeze").await.unwrap();
    assert_eq!(rejected.status(), TaskStatus::Cancelled);
    wait_for(&mut events, "task:cancelled").await;

    let decision = orch.learner().decision(decision_id).await.unwrap();
    assert_eq!(decision.feedback.map(|f| f.feedback), Some(Feedback::Negative));
    assert!(orch.pending_approvals().is_empty());

    let err = orch.reject_task(steward_core::domain::TaskId::new(), "gone").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Task(TaskError::NotFound(_))));

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_failing_source_does_not_stop_the_tick() {
    let (orch, mut events) = orchestrator(config());
    orch.register_source(Arc::new(ScriptedSource::new("broken").broken())).await.unwrap();
    let healthy = ScriptedSource::new("healthy");
    let task = healthy.task("Collect stats", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    orch.register_source(Arc::new(healthy.proposing(vec![task]))).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "task:completed").await;

    let agents = orch.get_agent_statuses();
    assert_eq!(agents[0].domain, "broken");
    assert!(agents[0].last_error.as_deref().unwrap().contains("upstream unavailable"));
    assert_eq!(agents[1].domain, "healthy");
    assert!(agents[1].last_error.is_none());
    assert_eq!(agents[1].completed, 1);

    orch.stop().await.unwrap();
}

async fn run_single(source: ScriptedSource, config: OrchestratorConfig) -> Task {
    let (orch, mut events) = orchestrator(config);
    let task = source.task("Compact logs", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    let task_id = task.id();
    orch.register_source(Arc::new(source.proposing(vec![task]))).await.unwrap();
    orch.start().await.unwrap();

    wait_for(&mut events, "task:failed").await;
    let task = orch.task(task_id).unwrap();
    assert_eq!(orch.get_agent_statuses()[0].failed, 1);
    orch.stop().await.unwrap();
    task
}

#[tokio::test]
async fn test_execute_error_marks_task_failed() {
    let task = run_single(ScriptedSource::new("ops").behaving(Behaviour::Fail), config()).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert!(task.result().unwrap().error.as_deref().unwrap().contains("disk full"));
}

#[tokio::test]
async fn test_panicking_execute_is_contained() {
    let task = run_single(ScriptedSource::new("ops").behaving(Behaviour::Panic), config()).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.result().unwrap().error.as_deref(), Some("execute panicked"));
}

#[tokio::test]
async fn test_hanging_execute_times_out() {
    let config = OrchestratorConfig {
        task_timeout_ms: 100,
        ..config()
    };
    let task = run_single(ScriptedSource::new("ops").behaving(Behaviour::Hang), config).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert!(task.result().unwrap().error.as_deref().unwrap().contains("Timed out"));
}

#[tokio::test]
async fn test_declined_task_fails_without_executing() {
    let task = run_single(ScriptedSource::new("ops").declining(), config()).await;
    assert_eq!(task.status(), TaskStatus::Failed);
}

#[tokio::test]
async fn test_dependent_task_waits_for_its_dependency() {
    let (orch, mut events) = orchestrator(config());
    let source = ScriptedSource::new("build").taking(Duration::from_millis(30));
    let first = source.task("compile", TaskPriority::Low, ClearanceLevel::ReadOnly);
    let second = source
        .task("package", TaskPriority::Critical, ClearanceLevel::ReadOnly)
        .with_dependency(first.id());
    let source = Arc::new(source.proposing(vec![second, first]));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for_n(&mut events, "task:completed", 2).await;

    assert_eq!(*source.executed.lock().await, vec!["compile", "package"]);
    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_dependent_task_fails_when_dependency_fails() {
    let (orch, mut events) = orchestrator(config());
    let source = ScriptedSource::new("build").behaving(Behaviour::Fail);
    let first = source.task("compile", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    let first_id = first.id();
    let second = source
        .task("package", TaskPriority::Medium, ClearanceLevel::ReadOnly)
        .with_dependency(first_id);
    let second_id = second.id();
    let source = Arc::new(source.proposing(vec![first, second]));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for_n(&mut events, "task:failed", 2).await;

    let task = orch.task(second_id).unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(
        task.result().unwrap().error.as_deref(),
        Some(format!("dependency {} did not complete", first_id).as_str())
    );
    assert_eq!(*source.executed.lock().await, vec!["compile"]);
    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_repeated_proposals_are_deduplicated() {
    let (orch, mut events) = orchestrator(config());
    orch.register_source(Arc::new(
        ScriptedSource::new("infra").repeating("Patch kernel", ClearanceLevel::ModifyProduction),
    ))
    .await
    .unwrap();
    orch.start().await.unwrap();
    wait_for(&mut events, "analysis:completed").await;

    let summary = orch.trigger_analysis().await.unwrap();
    assert_eq!(summary.proposed, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.escalated, 0);
    assert_eq!(orch.pending_approvals().len(), 1);

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_foreign_domain_proposals_are_discarded() {
    let (orch, mut events) = orchestrator(config());
    let stray = Task::new("billing", "Refund order", TaskPriority::High, ClearanceLevel::ReadOnly);
    orch.register_source(Arc::new(ScriptedSource::new("support").proposing(vec![stray])))
        .await
        .unwrap();
    orch.start().await.unwrap();
    wait_for(&mut events, "analysis:completed").await;

    assert!(orch.tasks().is_empty());
    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_second_start_is_ignored() {
    let (orch, mut events) = orchestrator(config());
    orch.start().await.unwrap();
    orch.start().await.unwrap();
    assert_eq!(orch.lifecycle(), LifecycleState::Running);

    wait_for(&mut events, "orchestrator:started").await;
    orch.stop().await.unwrap();
    assert_eq!(orch.lifecycle(), LifecycleState::Stopped);

    // Restart after a clean stop works.
    orch.start().await.unwrap();
    assert_eq!(orch.lifecycle(), LifecycleState::Running);
    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_source_registered_while_running_is_initialized() {
    let (orch, _events) = orchestrator(config());
    orch.start().await.unwrap();
    orch.register_source(Arc::new(ScriptedSource::new("late"))).await.unwrap();

    let agents = orch.get_agent_statuses();
    assert!(agents[0].healthy);
    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_writes_final_learning_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    let store = Arc::new(JsonFileStateStore::new(&path));
    let (orch, mut events) = orchestrator_with_store(config(), store.clone());
    let source = ScriptedSource::new("docs");
    let task = source.task("Fix typo", TaskPriority::Medium, ClearanceLevel::Suggest);
    orch.register_source(Arc::new(source.proposing(vec![task]))).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "task:completed").await;
    wait_for(&mut events, "pattern:identified").await;
    orch.stop().await.unwrap();
    assert!(path.exists());

    let event_bus = EventBus::new(16);
    let restored = Orchestrator::new(config(), event_bus, store);
    let outcome = restored.learner().load().await;
    assert!(matches!(outcome, LoadOutcome::Restored { decisions: 1, .. }));
}

#[tokio::test]
async fn test_stop_reports_abandoned_tasks_after_timeout() {
    let (orch, mut events) = orchestrator(OrchestratorConfig {
        shutdown_timeout_ms: 100,
        ..config()
    });
    let source = ScriptedSource::new("ops").behaving(Behaviour::Hang);
    let task = source.task("Long migration", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    orch.register_source(Arc::new(source.proposing(vec![task]))).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "task:started").await;
    orch.stop().await.unwrap();

    match wait_for(&mut events, "orchestrator:stopped").await {
        DomainEvent::Orchestrator(OrchestratorEvent::OrchestratorStopped { abandoned_tasks, .. }) => {
            assert_eq!(abandoned_tasks, 1);
        }
        other => panic!("unexpected event {}", other.name()),
    }
}

#[tokio::test]
async fn test_update_config_sanitizes_and_applies() {
    let (orch, _events) = orchestrator(config());

    let corrections = orch
        .update_config(OrchestratorConfigPatch {
            max_concurrent_tasks: Some(0),
            global_clearance: Some(ClearanceLevel::ModifySafe),
            ..OrchestratorConfigPatch::default()
        })
        .await;

    assert_eq!(corrections.len(), 1);
    let config = orch.config();
    assert_eq!(config.max_concurrent_tasks, 3);
    assert_eq!(config.global_clearance, ClearanceLevel::ModifySafe);
    assert_eq!(orch.get_status().await.max_concurrent_tasks, 3);
}

#[tokio::test]
async fn test_trigger_analysis_requires_running() {
    let (orch, _events) = orchestrator(config());
    let err = orch.trigger_analysis().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidLifecycle(LifecycleState::Stopped)));
}

#[tokio::test]
async fn test_finished_task_is_not_revived_by_resubmission() {
    let (orch, mut events) = orchestrator(config());
    let source = ScriptedSource::new("ops");
    let task = source.task("Rotate logs", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    let task_id = task.id();
    let source = Arc::new(source.resubmitting(task));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "task:completed").await;

    let summary = orch.trigger_analysis().await.unwrap();
    assert_eq!(summary.proposed, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.queued, 0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(orch.task(task_id).unwrap().status(), TaskStatus::Completed);
    assert_eq!(source.executed.lock().await.len(), 1);
    assert_eq!(orch.get_status().await.counts.completed, 1);

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_oversized_durations_are_corrected_and_persistence_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    let mut oversized = OrchestratorConfig {
        analysis_interval_ms: u64::MAX,
        shutdown_timeout_ms: u64::MAX,
        persistence_interval_ms: u64::MAX,
        max_finished_tasks: 0,
        ..config()
    };
    oversized.learning.retention_days = 200_000_000;
    let (orch, mut events) = orchestrator_with_store(oversized, Arc::new(JsonFileStateStore::new(&path)));

    let defaults = OrchestratorConfig::default();
    let effective = orch.config();
    assert_eq!(effective.analysis_interval_ms, defaults.analysis_interval_ms);
    assert_eq!(effective.shutdown_timeout_ms, defaults.shutdown_timeout_ms);
    assert_eq!(effective.persistence_interval_ms, defaults.persistence_interval_ms);
    assert_eq!(effective.max_finished_tasks, defaults.max_finished_tasks);
    assert_eq!(effective.learning.retention_days, defaults.learning.retention_days);

    let source = ScriptedSource::new("docs");
    let task = source.task("Fix typo", TaskPriority::Medium, ClearanceLevel::Suggest);
    orch.register_source(Arc::new(source.proposing(vec![task]))).await.unwrap();
    orch.start().await.unwrap();
    wait_for(&mut events, "task:completed").await;
    wait_for(&mut events, "pattern:identified").await;

    assert_eq!(orch.learner().prune(chrono::Utc::now()).await, 0);
    orch.stop().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_rejecting_a_dependency_fails_its_queued_dependent() {
    let (orch, mut events) = orchestrator(config());
    let source = ScriptedSource::new("infra");
    let migrate = source.task("Migrate schema", TaskPriority::Medium, ClearanceLevel::ModifyProduction);
    let migrate_id = migrate.id();
    let verify = source
        .task("Verify schema", TaskPriority::Medium, ClearanceLevel::ReadOnly)
        .with_dependency(migrate_id);
    let verify_id = verify.id();
    let source = Arc::new(source.proposing(vec![migrate, verify]));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "analysis:completed").await;
    assert_eq!(orch.task(verify_id).unwrap().status(), TaskStatus::Queued);

    orch.reject_task(migrate_id, "change freeze").await.unwrap();
    wait_for(&mut events, "task:failed").await;

    let verify = orch.task(verify_id).unwrap();
    assert_eq!(verify.status(), TaskStatus::Failed);
    assert_eq!(
        verify.result().unwrap().error.as_deref(),
        Some(format!("dependency {} did not complete", migrate_id).as_str())
    );
    assert!(source.executed.lock().await.is_empty());

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_once_for_analysis_and_tasks() {
    let (orch, mut events) = orchestrator(OrchestratorConfig {
        analysis_interval_ms: 1000,
        analysis_timeout_ms: 60_000,
        shutdown_timeout_ms: 400,
        ..config()
    });
    let source = ScriptedSource::new("ops").behaving(Behaviour::Hang).stalling_from(2);
    let task = source.task("Long migration", TaskPriority::Medium, ClearanceLevel::ReadOnly);
    let source = Arc::new(source.proposing(vec![task]));
    orch.register_source(source.clone()).await.unwrap();

    orch.start().await.unwrap();
    wait_for(&mut events, "task:started").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while source.analyses.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = std::time::Instant::now();
    orch.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_millis(750), "stop took {:?}", elapsed);
    match wait_for(&mut events, "orchestrator:stopped").await {
        DomainEvent::Orchestrator(OrchestratorEvent::OrchestratorStopped { abandoned_tasks, .. }) => {
            assert_eq!(abandoned_tasks, 1);
        }
        other => panic!("unexpected event {}", other.name()),
    }
}
