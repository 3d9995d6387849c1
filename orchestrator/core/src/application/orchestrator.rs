// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestrator - Composition root for analysis, approval and execution
//!
//! Lifecycle: `Stopped → Starting → Running → Stopping → Stopped`.
//!
//! # Tick
//!
//! Every `analysisIntervalMs` (and once right after start) each healthy work
//! source is asked for proposals, bounded by `analysisTimeoutMs`. Proposals
//! are sorted by priority (stable, so source order breaks ties), assessed for
//! risk, run through the approval policy and routed:
//!
//! - `execute` → queued for the scheduler
//! - `escalate` → parked in `PendingApproval`, `approval:required` emitted
//! - `reject` → cancelled
//! - `defer` → dropped, may be proposed again next tick
//!
//! # Execution
//!
//! [`Orchestrator::process_queue`] is a synchronous loop that admits tasks
//! while slots are free. Each admitted task runs on the task tracker; its
//! `execute()` call runs in a nested tokio task bounded by `taskTimeoutMs`,
//! so a panic or a hang becomes a `Failed` result. On completion the slot is
//! freed, the task's decision receives feedback and the queue is drained
//! again.
//!
//! # Locking
//!
//! Registry, scheduler and agent bookkeeping share one `parking_lot::Mutex`
//! which is never held across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use steward_cortex::{
    AdaptiveLearner, Decision, DecisionOutcome, Feedback, LearnerSummary, LearningPersister,
    LearningPersisterConfig, LearningStateStore,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::registry::{DependencyState, StatusCounts, TaskRegistry};
use super::scheduler::ConcurrencyScheduler;
use crate::domain::approval::ApprovalPolicy;
use crate::domain::config::{OrchestratorConfig, OrchestratorConfigPatch};
use crate::domain::events::{ApprovalEvent, OrchestratorEvent, TaskEvent};
use crate::domain::risk::RiskAssessor;
use crate::domain::task::{Task, TaskError, TaskId, TaskResult, TaskStatus};
use crate::domain::work_source::{WorkSource, WorkSourceError};
use crate::infrastructure::event_bus::EventBus;

/// Time the final learning snapshot may still take once the shutdown
/// deadline has passed.
const FINAL_SNAPSHOT_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("A work source for domain '{0}' is already registered")]
    DuplicateSource(String),

    #[error("Operation not allowed while orchestrator is {0}")]
    InvalidLifecycle(LifecycleState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub domain: String,
    /// False until `initialize()` succeeds, and after it fails.
    pub healthy: bool,
    pub last_analysis: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub proposed: u64,
    pub completed: u64,
    pub failed: u64,
    pub active_tasks: usize,
}

impl AgentStatus {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            healthy: false,
            last_analysis: None,
            last_error: None,
            proposed: 0,
            completed: 0,
            failed: 0,
            active_tasks: 0,
        }
    }
}

/// Outcome of one analysis tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub sources_polled: usize,
    pub failed_sources: usize,
    pub proposed: usize,
    /// Proposals dropped for carrying another source's domain or a non-pending status.
    pub discarded: usize,
    pub duplicates: usize,
    pub queued: usize,
    pub escalated: usize,
    pub rejected: usize,
    pub deferred: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub state: LifecycleState,
    pub enabled: bool,
    pub sources: usize,
    pub max_concurrent_tasks: usize,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub pending_approvals: Vec<Task>,
    pub counts: StatusCounts,
    pub last_analysis: Option<DateTime<Utc>>,
    pub learning: LearnerSummary,
}

struct OrchestratorState {
    lifecycle: LifecycleState,
    registry: TaskRegistry,
    scheduler: ConcurrencyScheduler,
    agents: HashMap<String, AgentStatus>,
    last_analysis: Option<DateTime<Utc>>,
}

struct BackgroundTasks {
    analysis_token: CancellationToken,
    analysis: JoinHandle<()>,
    persister_token: CancellationToken,
    persister: JoinHandle<()>,
}

pub struct Orchestrator {
    config: RwLock<OrchestratorConfig>,
    sources: RwLock<Vec<Arc<dyn WorkSource>>>,
    state: Mutex<OrchestratorState>,
    learner: Arc<AdaptiveLearner>,
    event_bus: EventBus,
    tracker: TaskTracker,
    background: Mutex<Option<BackgroundTasks>>,
    analysis_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        mut config: OrchestratorConfig,
        event_bus: EventBus,
        store: Arc<dyn LearningStateStore>,
    ) -> Self {
        for correction in config.sanitize() {
            warn!("Configuration corrected: {}", correction);
        }
        let learner = Arc::new(AdaptiveLearner::new(
            config.learning.clone(),
            store,
            Arc::new(event_bus.clone()),
        ));
        let state = OrchestratorState {
            lifecycle: LifecycleState::Stopped,
            registry: TaskRegistry::new(config.max_finished_tasks),
            scheduler: ConcurrencyScheduler::new(config.max_concurrent_tasks),
            agents: HashMap::new(),
            last_analysis: None,
        };

        Self {
            config: RwLock::new(config),
            sources: RwLock::new(Vec::new()),
            state: Mutex::new(state),
            learner,
            event_bus,
            tracker: TaskTracker::new(),
            background: Mutex::new(None),
            analysis_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn learner(&self) -> Arc<AdaptiveLearner> {
        self.learner.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config.read().clone()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    /// Adds a work source. Sources registered while running are initialized
    /// immediately.
    pub async fn register_source(&self, source: Arc<dyn WorkSource>) -> Result<(), OrchestratorError> {
        let domain = source.domain().to_string();
        {
            let mut sources = self.sources.write();
            if sources.iter().any(|s| s.domain() == domain) {
                return Err(OrchestratorError::DuplicateSource(domain));
            }
            sources.push(source.clone());
        }
        let running = {
            let mut state = self.state.lock();
            state.agents.insert(domain.clone(), AgentStatus::new(&domain));
            state.lifecycle == LifecycleState::Running
        };
        info!(domain = %domain, "Work source registered");

        if running {
            self.initialize_source(source).await;
        }
        Ok(())
    }

    async fn initialize_source(&self, source: Arc<dyn WorkSource>) {
        let domain = source.domain().to_string();
        let timeout = self.config.read().analysis_timeout();
        let result = match tokio::time::timeout(timeout, source.initialize()).await {
            Ok(result) => result,
            Err(_) => Err(WorkSourceError::Timeout(timeout)),
        };

        let mut state = self.state.lock();
        let Some(agent) = state.agents.get_mut(&domain) else {
            return;
        };
        match result {
            Ok(()) => {
                agent.healthy = true;
                agent.last_error = None;
                debug!(domain = %domain, "Work source initialized");
            }
            Err(e) => {
                agent.healthy = false;
                agent.last_error = Some(e.to_string());
                warn!(domain = %domain, error = %e, "Work source failed to initialize, excluding from analysis");
            }
        }
    }

    /// Loads learning state, initializes sources and arms the analysis loop.
    /// Calling it while already running logs a warning and does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        let config = self.config();
        if !config.enabled {
            info!("Orchestrator is disabled, not starting");
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            match state.lifecycle {
                LifecycleState::Stopped => state.lifecycle = LifecycleState::Starting,
                LifecycleState::Starting | LifecycleState::Running => {
                    warn!(state = %state.lifecycle, "Orchestrator already started, ignoring start()");
                    return Ok(());
                }
                LifecycleState::Stopping => {
                    return Err(OrchestratorError::InvalidLifecycle(LifecycleState::Stopping));
                }
            }
        }
        info!("Starting orchestrator");

        self.learner.update_config(config.learning.clone()).await;
        self.learner.load().await;

        let sources: Vec<Arc<dyn WorkSource>> = self.sources.read().clone();
        for source in &sources {
            self.initialize_source(source.clone()).await;
        }

        self.tracker.reopen();

        let persister_token = CancellationToken::new();
        let persister = Arc::new(LearningPersister::new(
            self.learner.clone(),
            LearningPersisterConfig {
                interval: config.persistence_interval(),
                ..LearningPersisterConfig::default()
            },
            persister_token.clone(),
        ))
        .start();

        self.state.lock().lifecycle = LifecycleState::Running;

        let analysis_token = CancellationToken::new();
        let analysis = tokio::spawn(Arc::clone(self).analysis_loop(analysis_token.clone()));

        *self.background.lock() = Some(BackgroundTasks {
            analysis_token,
            analysis,
            persister_token,
            persister,
        });

        let domains: Vec<String> = sources.iter().map(|s| s.domain().to_string()).collect();
        info!(
            sources = domains.len(),
            interval_ms = config.analysis_interval_ms,
            max_concurrent_tasks = config.max_concurrent_tasks,
            "Orchestrator running"
        );
        self.event_bus.publish_orchestrator_event(OrchestratorEvent::OrchestratorStarted {
            sources: domains,
            started_at: Utc::now(),
        });
        Ok(())
    }

    async fn analysis_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            self.run_analysis().await;

            // Re-read each cycle so interval updates apply from the next wait.
            let interval = self.config.read().analysis_interval();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Analysis loop stopped");
    }

    /// Runs one analysis tick outside the regular schedule.
    pub async fn trigger_analysis(self: &Arc<Self>) -> Result<TickSummary, OrchestratorError> {
        let lifecycle = self.lifecycle();
        if lifecycle != LifecycleState::Running {
            return Err(OrchestratorError::InvalidLifecycle(lifecycle));
        }
        Ok(self.run_analysis().await)
    }

    async fn run_analysis(self: &Arc<Self>) -> TickSummary {
        let _tick = self.analysis_lock.lock().await;
        counter!("steward_analysis_ticks_total").increment(1);

        let (timeout, global_clearance, auto_approve) = {
            let config = self.config.read();
            (config.analysis_timeout(), config.global_clearance, config.auto_approve)
        };
        let sources: Vec<Arc<dyn WorkSource>> = {
            let sources = self.sources.read().clone();
            let state = self.state.lock();
            sources
                .into_iter()
                .filter(|s| state.agents.get(s.domain()).is_some_and(|a| a.healthy))
                .collect()
        };

        let mut summary = TickSummary::default();
        let mut proposals = Vec::new();

        for source in sources {
            let domain = source.domain().to_string();
            summary.sources_polled += 1;
            let result = match tokio::time::timeout(timeout, source.analyze()).await {
                Ok(result) => result,
                Err(_) => Err(WorkSourceError::Timeout(timeout)),
            };

            let now = Utc::now();
            match result {
                Ok(tasks) => {
                    debug!(domain = %domain, proposed = tasks.len(), "Work source analyzed");
                    let mut accepted = 0u64;
                    for task in tasks {
                        if task.domain() != domain {
                            warn!(
                                domain = %domain,
                                task_domain = %task.domain(),
                                title = %task.title(),
                                "Discarding proposal for another domain"
                            );
                            summary.discarded += 1;
                        } else if task.status() != TaskStatus::Pending {
                            warn!(domain = %domain, status = %task.status(), "Discarding proposal that is not pending");
                            summary.discarded += 1;
                        } else {
                            accepted += 1;
                            proposals.push(task);
                        }
                    }
                    let mut state = self.state.lock();
                    if let Some(agent) = state.agents.get_mut(&domain) {
                        agent.last_analysis = Some(now);
                        agent.last_error = None;
                        agent.proposed += accepted;
                    }
                }
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Work source analysis failed, skipping for this tick");
                    counter!("steward_source_failures_total", "domain" => domain.clone()).increment(1);
                    summary.failed_sources += 1;
                    let mut state = self.state.lock();
                    if let Some(agent) = state.agents.get_mut(&domain) {
                        agent.last_analysis = Some(now);
                        agent.last_error = Some(e.to_string());
                    }
                }
            }
        }

        summary.proposed = proposals.len();
        proposals.sort_by(|a, b| b.priority().cmp(&a.priority()));

        for task in proposals {
            let duplicate = {
                let state = self.state.lock();
                state.registry.contains(task.id())
                    || state.registry.has_active_duplicate(task.domain(), task.title())
            };
            if duplicate {
                debug!(domain = %task.domain(), title = %task.title(), "Skipping duplicate proposal");
                summary.duplicates += 1;
                continue;
            }

            let risks = RiskAssessor::assess(&task);
            let decision = ApprovalPolicy::decide(&task, global_clearance, &auto_approve, &risks);
            self.learner.record_decision(decision.clone()).await;
            self.route(task, &decision, &mut summary);
        }

        self.state.lock().last_analysis = Some(Utc::now());
        self.process_queue();

        info!(
            sources = summary.sources_polled,
            failed_sources = summary.failed_sources,
            proposed = summary.proposed,
            queued = summary.queued,
            escalated = summary.escalated,
            "Analysis tick completed"
        );
        self.event_bus.publish_orchestrator_event(OrchestratorEvent::AnalysisCompleted {
            proposed: summary.proposed,
            queued: summary.queued,
            escalated: summary.escalated,
            completed_at: Utc::now(),
        });
        summary
    }

    fn route(&self, task: Task, decision: &Decision, summary: &mut TickSummary) {
        let task_id = task.id();
        if decision.outcome == DecisionOutcome::Defer {
            debug!(task_id = %task_id, title = %task.title(), "Proposal deferred");
            summary.deferred += 1;
            return;
        }

        let mut state = self.state.lock();
        let priority = task.priority();
        let created = TaskEvent::TaskCreated {
            task_id,
            domain: task.domain().to_string(),
            title: task.title().to_string(),
            priority,
            clearance: task.clearance(),
            created_at: task.created_at(),
        };
        if let Err(e) = state.registry.insert(task) {
            warn!(task_id = %task_id, error = %e, "Skipping resubmitted task");
            summary.duplicates += 1;
            return;
        }
        self.event_bus.publish_task_event(created);
        state.registry.link_decision(task_id, decision.id);

        let routed = match decision.outcome {
            DecisionOutcome::Execute => state.registry.transition(task_id, TaskStatus::Queued).map(|_| {
                state.scheduler.enqueue(task_id, priority);
                summary.queued += 1;
                debug!(task_id = %task_id, confidence = decision.confidence, "Task auto-approved");
            }),
            DecisionOutcome::Escalate => state
                .registry
                .transition(task_id, TaskStatus::PendingApproval)
                .map(|task| {
                    summary.escalated += 1;
                    info!(
                        task_id = %task_id,
                        domain = %task.domain(),
                        clearance = %task.clearance(),
                        reason = %decision.reasoning,
                        "Task requires approval"
                    );
                    self.event_bus.publish_approval_event(ApprovalEvent::ApprovalRequired {
                        task_id,
                        decision_id: decision.id,
                        domain: task.domain().to_string(),
                        title: task.title().to_string(),
                        clearance: task.clearance(),
                        reasoning: decision.reasoning.clone(),
                        risks: decision.risks.clone(),
                        requested_at: Utc::now(),
                    });
                }),
            DecisionOutcome::Reject => state.registry.transition(task_id, TaskStatus::Cancelled).map(|task| {
                summary.rejected += 1;
                info!(task_id = %task_id, reason = %decision.reasoning, "Task rejected by policy");
                self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
                    task_id,
                    domain: task.domain().to_string(),
                    reason: decision.reasoning.clone(),
                    cancelled_at: Utc::now(),
                });
            }),
            DecisionOutcome::Defer => Ok(()),
        };
        if let Err(e) = routed {
            warn!(task_id = %task_id, error = %e, "Failed to route task");
        }
    }

    /// Admits queued tasks while slots are free. Iterative: completions call
    /// back into this method instead of recursing.
    pub fn process_queue(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.lifecycle != LifecycleState::Running {
            return;
        }

        loop {
            let OrchestratorState {
                registry,
                scheduler,
                agents,
                ..
            } = &mut *state;

            let admitted = scheduler.admit_next(|id| registry.dependency_state(id) != DependencyState::Waiting);
            let Some(task_id) = admitted else {
                break;
            };

            let blocked_by = match registry.dependency_state(task_id) {
                DependencyState::Blocked(dep) => Some(dep),
                _ => None,
            };
            let task = match registry.transition(task_id, TaskStatus::InProgress) {
                Ok(task) => task,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Dropping task that cannot start");
                    scheduler.complete(task_id);
                    continue;
                }
            };
            if let Some(agent) = agents.get_mut(task.domain()) {
                agent.active_tasks += 1;
            }
            gauge!("steward_active_tasks").set(scheduler.active_count() as f64);

            self.event_bus.publish_task_event(TaskEvent::TaskStarted {
                task_id,
                domain: task.domain().to_string(),
                started_at: task.started_at().unwrap_or_else(Utc::now),
            });
            debug!(task_id = %task_id, domain = %task.domain(), "Task started");

            let source = self
                .sources
                .read()
                .iter()
                .find(|s| s.domain() == task.domain())
                .cloned();
            let this = Arc::clone(self);
            self.tracker.spawn(async move {
                this.run_task(task, source, blocked_by).await;
            });
        }
    }

    async fn run_task(
        self: Arc<Self>,
        task: Task,
        source: Option<Arc<dyn WorkSource>>,
        blocked_by: Option<TaskId>,
    ) {
        let started = Instant::now();
        let mut result = match (blocked_by, source) {
            (Some(dep), _) => TaskResult::failure(format!("dependency {} did not complete", dep)),
            (None, None) => TaskResult::failure(format!("no work source registered for domain '{}'", task.domain())),
            (None, Some(source)) => self.execute_task(&task, source).await,
        };
        result.metrics.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(decision_id) = self.finish_task(task.id(), result.clone()) {
            let feedback = if result.success {
                Feedback::Positive
            } else {
                Feedback::Negative
            };
            if let Err(e) = self.learner.provide_feedback(decision_id, feedback).await {
                debug!(task_id = %task.id(), error = %e, "Feedback not recorded");
            }
        }

        self.process_queue();
    }

    async fn execute_task(&self, task: &Task, source: Arc<dyn WorkSource>) -> TaskResult {
        if !source.can_execute(task) {
            let reason = WorkSourceError::Declined(task.title().to_string());
            return TaskResult::failure(reason.to_string());
        }

        let timeout = self.config.read().task_timeout();
        let exec_task = task.clone();
        let mut handle = tokio::spawn(async move { source.execute(&exec_task).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => TaskResult::failure(e.to_string()),
            Ok(Err(join_error)) if join_error.is_panic() => TaskResult::failure("execute panicked"),
            Ok(Err(_)) => TaskResult::failure("execute was cancelled"),
            Err(_) => {
                handle.abort();
                TaskResult::failure(WorkSourceError::Timeout(timeout).to_string())
            }
        }
    }

    /// Records the result and frees the slot. Returns the task's decision so
    /// the caller can feed the learner.
    fn finish_task(&self, task_id: TaskId, result: TaskResult) -> Option<steward_cortex::DecisionId> {
        let mut state = self.state.lock();
        state.scheduler.complete(task_id);
        gauge!("steward_active_tasks").set(state.scheduler.active_count() as f64);
        let decision_id = state.registry.decision_for(task_id);

        let task = match state.registry.finish(task_id, result) {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to record task result");
                return decision_id;
            }
        };

        let status = task.status();
        let domain = task.domain().to_string();
        counter!("steward_tasks_total", "domain" => domain.clone(), "status" => status.as_str()).increment(1);

        if let Some(agent) = state.agents.get_mut(&domain) {
            agent.active_tasks = agent.active_tasks.saturating_sub(1);
            if status == TaskStatus::Completed {
                agent.completed += 1;
            } else {
                agent.failed += 1;
            }
        }

        let result = task.result();
        let now = Utc::now();
        if status == TaskStatus::Completed {
            let duration_ms = result.map(|r| r.metrics.duration_ms).unwrap_or_default();
            info!(task_id = %task_id, domain = %domain, duration_ms, "Task completed");
            self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
                task_id,
                domain,
                duration_ms,
                completed_at: now,
            });
        } else {
            let error = result
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!(task_id = %task_id, domain = %domain, error = %error, "Task failed");
            self.event_bus.publish_task_event(TaskEvent::TaskFailed {
                task_id,
                domain,
                error,
                failed_at: now,
            });
        }

        decision_id
    }

    /// Releases an escalated task to the scheduler.
    pub async fn approve_task(self: &Arc<Self>, task_id: TaskId, approver: &str) -> Result<Task, OrchestratorError> {
        let task = {
            let mut state = self.state.lock();
            let task = Self::pending_approval(&state.registry, task_id)?;
            let task = state.registry.transition(task.id(), TaskStatus::Queued)?;
            state.scheduler.enqueue(task_id, task.priority());
            task
        };

        info!(task_id = %task_id, approver = %approver, "Task approved");
        self.event_bus.publish_approval_event(ApprovalEvent::ApprovalGranted {
            task_id,
            approver: approver.to_string(),
            granted_at: Utc::now(),
        });

        self.process_queue();
        Ok(task)
    }

    /// Cancels an escalated task and records negative feedback on its decision.
    pub async fn reject_task(self: &Arc<Self>, task_id: TaskId, reason: &str) -> Result<Task, OrchestratorError> {
        let (task, decision_id) = {
            let mut state = self.state.lock();
            Self::pending_approval(&state.registry, task_id)?;
            let decision_id = state.registry.decision_for(task_id);
            let task = state.registry.transition(task_id, TaskStatus::Cancelled)?;
            (task, decision_id)
        };

        info!(task_id = %task_id, reason = %reason, "Task rejected");
        let now = Utc::now();
        self.event_bus.publish_approval_event(ApprovalEvent::ApprovalRejected {
            task_id,
            reason: reason.to_string(),
            rejected_at: now,
        });
        self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
            task_id,
            domain: task.domain().to_string(),
            reason: reason.to_string(),
            cancelled_at: now,
        });

        if let Some(decision_id) = decision_id {
            if let Err(e) = self.learner.provide_feedback(decision_id, Feedback::Negative).await {
                debug!(task_id = %task_id, error = %e, "Feedback not recorded");
            }
        }

        // Dependents of the rejected task are now blocked.
        self.process_queue();
        Ok(task)
    }

    fn pending_approval(registry: &TaskRegistry, task_id: TaskId) -> Result<Task, TaskError> {
        let task = registry.get(task_id).ok_or(TaskError::NotFound(task_id))?;
        if task.status() != TaskStatus::PendingApproval {
            return Err(TaskError::NotPendingApproval {
                task_id,
                status: task.status(),
            });
        }
        Ok(task.clone())
    }

    pub async fn get_status(&self) -> OrchestratorStatus {
        let learning = self.learner.summary().await;
        let (enabled, max_concurrent_tasks) = {
            let config = self.config.read();
            (config.enabled, config.max_concurrent_tasks)
        };
        let sources = self.sources.read().len();
        let state = self.state.lock();
        OrchestratorStatus {
            state: state.lifecycle,
            enabled,
            sources,
            max_concurrent_tasks,
            active_tasks: state.scheduler.active_count(),
            queued_tasks: state.scheduler.queued_count(),
            pending_approvals: state.registry.with_status(TaskStatus::PendingApproval),
            counts: state.registry.counts(),
            last_analysis: state.last_analysis,
            learning,
        }
    }

    pub fn get_agent_statuses(&self) -> Vec<AgentStatus> {
        let state = self.state.lock();
        let mut agents: Vec<AgentStatus> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.domain.cmp(&b.domain));
        agents
    }

    pub fn pending_approvals(&self) -> Vec<Task> {
        self.state.lock().registry.with_status(TaskStatus::PendingApproval)
    }

    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.state.lock().registry.get(task_id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().registry.all()
    }

    /// Applies a partial update and returns the corrections made while
    /// sanitizing it. Scheduling limits and learner settings apply at once;
    /// the analysis interval applies from the next cycle.
    pub async fn update_config(self: &Arc<Self>, patch: OrchestratorConfigPatch) -> Vec<String> {
        let (corrections, learning, max_concurrent, max_finished) = {
            let mut config = self.config.write();
            config.apply(patch);
            let corrections = config.sanitize();
            (
                corrections,
                config.learning.clone(),
                config.max_concurrent_tasks,
                config.max_finished_tasks,
            )
        };
        for correction in &corrections {
            warn!("Configuration corrected: {}", correction);
        }

        {
            let mut state = self.state.lock();
            state.scheduler.set_max_concurrent(max_concurrent);
            state.registry.set_max_finished(max_finished);
        }
        self.learner.update_config(learning).await;
        info!(max_concurrent_tasks = max_concurrent, "Configuration updated");

        self.process_queue();
        corrections
    }

    /// Stops the analysis loop, waits up to `shutdownTimeoutMs` for running
    /// tasks, then writes a final learning snapshot. Tasks still running when
    /// the wait expires are left to finish on their own.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        {
            let mut state = self.state.lock();
            match state.lifecycle {
                LifecycleState::Running => state.lifecycle = LifecycleState::Stopping,
                LifecycleState::Stopped | LifecycleState::Stopping => {
                    debug!(state = %state.lifecycle, "Orchestrator not running, ignoring stop()");
                    return Ok(());
                }
                LifecycleState::Starting => {
                    return Err(OrchestratorError::InvalidLifecycle(LifecycleState::Starting));
                }
            }
        }
        info!("Stopping orchestrator");

        // One deadline bounds the analysis and task waits. The final snapshot
        // may run past it by at most FINAL_SNAPSHOT_GRACE.
        let shutdown_timeout = self.config.read().shutdown_timeout();
        let deadline = tokio::time::Instant::now() + shutdown_timeout;
        let mut background = self.background.lock().take();

        if let Some(bg) = background.as_mut() {
            bg.analysis_token.cancel();
            if tokio::time::timeout_at(deadline, &mut bg.analysis).await.is_err() {
                warn!("Analysis tick did not finish within shutdown timeout, aborting it");
                bg.analysis.abort();
            }
        }

        self.tracker.close();
        let abandoned = match tokio::time::timeout_at(deadline, self.tracker.wait()).await {
            Ok(()) => 0,
            Err(_) => {
                let active = self.state.lock().scheduler.active_count();
                warn!(
                    active,
                    timeout_ms = shutdown_timeout.as_millis() as u64,
                    "Shutdown timeout elapsed with tasks still running"
                );
                active
            }
        };

        if let Some(mut bg) = background {
            bg.persister_token.cancel();
            let save_deadline = deadline.max(tokio::time::Instant::now() + FINAL_SNAPSHOT_GRACE);
            if tokio::time::timeout_at(save_deadline, &mut bg.persister).await.is_err() {
                warn!("Final learning snapshot did not finish within shutdown timeout");
                bg.persister.abort();
            }
        }

        self.tracker.reopen();
        self.state.lock().lifecycle = LifecycleState::Stopped;
        info!(abandoned_tasks = abandoned, "Orchestrator stopped");
        self.event_bus.publish_orchestrator_event(OrchestratorEvent::OrchestratorStopped {
            abandoned_tasks: abandoned,
            stopped_at: Utc::now(),
        });
        Ok(())
    }
}
