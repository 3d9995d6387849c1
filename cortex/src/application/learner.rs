// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AdaptiveLearner — Pattern Confidence, Domain Models & Decision Scoring
//!
//! Closes the feedback loop of the orchestrator: every finished task becomes a
//! [`TrainingPoint`], which either creates a [`LearningPattern`] for a new
//! fingerprint or reinforces the existing one.
//!
//! ## Confidence
//!
//! New patterns start at `0.5`. Each repeat moves confidence by
//! `learning_rate * 0.1` (up for positive feedback, down for negative) and the
//! result is clamped to `[0, 1]`.
//!
//! ## Models
//!
//! Each domain owns one [`DomainModel`]. Whenever the domain's training point
//! count reaches a multiple of `retrain_threshold`, the model is recomputed:
//! `accuracy` becomes the positive share of the last `accuracy_window`
//! feedback values and `version` is bumped.
//!
//! ## Ownership
//!
//! The learner is the only writer of patterns, models and decisions. All state
//! sits behind one `RwLock`, and events are published after the lock is
//! released.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    Decision, DecisionId, DecisionOption, DecisionOutcome, DomainModel, Feedback,
    FeedbackRecord, LearnerState, LearnerStats, LearningConfig, LearningEvent, LearningPattern,
    LearningSnapshot, PatternId, TrainingPoint, SNAPSHOT_VERSION,
};
use crate::infrastructure::{LearningStateStore, StateStoreError};

/// Sink for learning events. The orchestrator's event bus implements this.
pub trait LearningEventPublisher: Send + Sync {
    fn publish(&self, event: LearningEvent);
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

impl LearningEventPublisher for NoopEventPublisher {
    fn publish(&self, _event: LearningEvent) {}
}

#[derive(Debug, Error)]
pub enum LearnerError {
    #[error("No options supplied for a decision in domain '{0}'")]
    NoOptions(String),

    #[error("Decision {0} not found")]
    UnknownDecision(DecisionId),
}

/// What `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored {
        patterns: usize,
        models: usize,
        decisions: usize,
    },
    /// Nothing persisted yet.
    Fresh,
    /// Persisted state was unreadable; starting from defaults.
    Recovered { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub success_rate: f64,
    pub pattern_count: usize,
    pub accuracy: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerSummary {
    pub patterns: usize,
    pub models: usize,
    pub decisions: usize,
    pub stats: LearnerStats,
    pub observed_accuracy: f64,
}

#[derive(Default)]
struct LearnerInner {
    config: LearningConfig,
    patterns: HashMap<PatternId, LearningPattern>,
    models: HashMap<String, DomainModel>,
    decisions: VecDeque<Decision>,
    state: LearnerState,
}

impl LearnerInner {
    fn learn(&mut self, point: &TrainingPoint, now: DateTime<Utc>, events: &mut Vec<LearningEvent>) -> PatternId {
        let id = PatternId::fingerprint(&point.domain, &point.input);
        let step = self.config.confidence_step();

        match self.patterns.get_mut(&id) {
            Some(pattern) => {
                let old_confidence = pattern.confidence;
                pattern.reinforce(point.feedback, step, now);
                events.push(LearningEvent::PatternReinforced {
                    pattern_id: id.clone(),
                    domain: point.domain.clone(),
                    frequency: pattern.frequency,
                    old_confidence,
                    new_confidence: pattern.confidence,
                    timestamp: now,
                });
            }
            None => {
                let pattern = LearningPattern::new(id.clone(), point.domain.clone(), point.feedback, now);
                self.patterns.insert(id.clone(), pattern);
                events.push(LearningEvent::PatternIdentified {
                    pattern_id: id.clone(),
                    domain: point.domain.clone(),
                    timestamp: now,
                });
            }
        }

        let window = self.config.accuracy_window;
        let training = self.state.training.entry(point.domain.clone()).or_default();
        training.record(point.feedback, window);
        let total = training.total_points;

        if self.config.auto_adapt && total % self.config.retrain_threshold == 0 {
            self.retrain(&point.domain, now, events);
        }

        id
    }

    fn retrain(&mut self, domain: &str, now: DateTime<Utc>, events: &mut Vec<LearningEvent>) -> Option<DomainModel> {
        let training = self.state.training.get(domain)?;
        let accuracy = training.window_accuracy();
        let total = training.total_points;

        let model = self
            .models
            .entry(domain.to_string())
            .or_insert_with(|| DomainModel {
                domain: domain.to_string(),
                version: 0,
                accuracy: 0.0,
                training_data_count: 0,
                last_trained: now,
            });
        model.version += 1;
        model.accuracy = accuracy;
        model.training_data_count = total;
        model.last_trained = now;

        events.push(LearningEvent::ModelUpdated {
            domain: domain.to_string(),
            version: model.version,
            accuracy: model.accuracy,
            training_data_count: model.training_data_count,
            timestamp: now,
        });
        Some(model.clone())
    }

    fn record_decision(&mut self, decision: Decision, events: &mut Vec<LearningEvent>) {
        events.push(LearningEvent::DecisionMade {
            decision_id: decision.id,
            domain: decision.domain.clone(),
            outcome: decision.outcome,
            confidence: decision.confidence,
            timestamp: decision.timestamp,
        });
        self.state.stats.decisions_made += 1;
        self.decisions.push_back(decision);
        self.trim_decisions();
    }

    fn trim_decisions(&mut self) {
        while self.decisions.len() > self.config.max_decisions {
            self.decisions.pop_front();
        }
    }

    fn score(&self, domain: &str, option: &DecisionOption) -> f64 {
        let confidence = option.confidence.clamp(0.0, 1.0);
        match self.models.get(domain) {
            Some(model) => {
                let w = &self.config.weights;
                model.accuracy * w.model_accuracy + confidence * w.option_confidence
            }
            None => confidence,
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> LearningSnapshot {
        let mut models: Vec<DomainModel> = self.models.values().cloned().collect();
        models.sort_by(|a, b| a.domain.cmp(&b.domain));
        let mut patterns: Vec<LearningPattern> = self.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.id.cmp(&b.id));

        LearningSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            models,
            patterns,
            decisions: self.decisions.iter().cloned().collect(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }

    fn restore(&mut self, snapshot: LearningSnapshot) {
        self.patterns = snapshot
            .patterns
            .into_iter()
            .map(|mut p| {
                p.confidence = p.confidence.clamp(0.0, 1.0);
                p.frequency = p.frequency.max(1);
                (p.id.clone(), p)
            })
            .collect();
        self.models = snapshot
            .models
            .into_iter()
            .map(|m| (m.domain.clone(), m))
            .collect();
        self.decisions = snapshot.decisions.into_iter().collect();
        self.trim_decisions();
        self.state = snapshot.state;
    }
}

pub struct AdaptiveLearner {
    inner: RwLock<LearnerInner>,
    store: Arc<dyn LearningStateStore>,
    events: Arc<dyn LearningEventPublisher>,
}

impl AdaptiveLearner {
    pub fn new(
        mut config: LearningConfig,
        store: Arc<dyn LearningStateStore>,
        events: Arc<dyn LearningEventPublisher>,
    ) -> Self {
        for correction in config.sanitize() {
            warn!("Learning config corrected: {}", correction);
        }
        Self {
            inner: RwLock::new(LearnerInner {
                config,
                ..LearnerInner::default()
            }),
            store,
            events,
        }
    }

    fn publish_all(&self, events: Vec<LearningEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    pub async fn config(&self) -> LearningConfig {
        self.inner.read().await.config.clone()
    }

    pub async fn update_config(&self, mut config: LearningConfig) {
        for correction in config.sanitize() {
            warn!("Learning config corrected: {}", correction);
        }
        let mut inner = self.inner.write().await;
        inner.config = config;
        inner.trim_decisions();
    }

    /// Replaces in-memory state with the persisted document. Never fails: a
    /// missing document starts fresh, an unreadable one is logged and ignored.
    pub async fn load(&self) -> LoadOutcome {
        match self.store.load().await {
            Ok(Some(snapshot)) => {
                if snapshot.version != SNAPSHOT_VERSION {
                    warn!(
                        found = snapshot.version,
                        expected = SNAPSHOT_VERSION,
                        "Learning state version mismatch, loading anyway"
                    );
                }
                let mut inner = self.inner.write().await;
                inner.restore(snapshot);
                let outcome = LoadOutcome::Restored {
                    patterns: inner.patterns.len(),
                    models: inner.models.len(),
                    decisions: inner.decisions.len(),
                };
                info!(?outcome, "Learning state restored");
                outcome
            }
            Ok(None) => {
                info!("No persisted learning state, starting fresh");
                LoadOutcome::Fresh
            }
            Err(e) => {
                warn!(error = %e, "Failed to load learning state, starting from defaults");
                let mut inner = self.inner.write().await;
                let config = std::mem::take(&mut inner.config);
                *inner = LearnerInner {
                    config,
                    ..LearnerInner::default()
                };
                LoadOutcome::Recovered { reason: e.to_string() }
            }
        }
    }

    pub async fn save(&self) -> Result<(), StateStoreError> {
        let snapshot = self.snapshot().await;
        self.store.save(&snapshot).await
    }

    pub async fn snapshot(&self) -> LearningSnapshot {
        self.inner.read().await.snapshot(Utc::now())
    }

    pub async fn learn(&self, point: TrainingPoint) -> PatternId {
        let mut events = Vec::new();
        let id = {
            let mut inner = self.inner.write().await;
            inner.learn(&point, Utc::now(), &mut events)
        };
        debug!(pattern_id = %id, domain = %point.domain, "Training point recorded");
        self.publish_all(events);
        id
    }

    /// Recomputes a domain's model on demand, regardless of `auto_adapt`.
    pub async fn retrain(&self, domain: &str) -> Option<DomainModel> {
        let mut events = Vec::new();
        let model = self.inner.write().await.retrain(domain, Utc::now(), &mut events);
        self.publish_all(events);
        model
    }

    pub async fn score(&self, domain: &str, option: &DecisionOption) -> f64 {
        self.inner.read().await.score(domain, option)
    }

    /// Scores every option and records a decision for the best one. Ties go to
    /// the earliest option.
    pub async fn make_decision(
        &self,
        domain: &str,
        context: Value,
        options: &[DecisionOption],
    ) -> Result<Decision, LearnerError> {
        let mut events = Vec::new();
        let decision = {
            let mut inner = self.inner.write().await;
            let (best, score) = options
                .iter()
                .map(|option| (option, inner.score(domain, option)))
                .fold(None, |best: Option<(&DecisionOption, f64)>, (option, score)| match best {
                    Some((_, best_score)) if best_score >= score => best,
                    _ => Some((option, score)),
                })
                .ok_or_else(|| LearnerError::NoOptions(domain.to_string()))?;

            let outcome = if score >= inner.config.confidence_threshold {
                DecisionOutcome::Execute
            } else {
                DecisionOutcome::Defer
            };
            let decision = Decision::new(domain, outcome, format!("selected based on {:.2} score", score), score)
                .with_context(context)
                .with_selected(best.label.clone());
            inner.record_decision(decision.clone(), &mut events);
            decision
        };
        self.publish_all(events);
        Ok(decision)
    }

    /// Stores a decision made elsewhere (e.g. by the approval policy) so it can
    /// later receive feedback.
    pub async fn record_decision(&self, decision: Decision) {
        let mut events = Vec::new();
        self.inner.write().await.record_decision(decision, &mut events);
        self.publish_all(events);
    }

    /// Attaches feedback to a stored decision and learns from it.
    pub async fn provide_feedback(&self, decision_id: DecisionId, feedback: Feedback) -> Result<PatternId, LearnerError> {
        let now = Utc::now();
        let mut events = Vec::new();
        let pattern_id = {
            let mut inner = self.inner.write().await;
            let decision = inner
                .decisions
                .iter_mut()
                .find(|d| d.id == decision_id)
                .ok_or(LearnerError::UnknownDecision(decision_id))?;
            if decision.feedback.is_some() {
                debug!(decision_id = %decision_id, "Replacing earlier feedback");
            }
            decision.feedback = Some(FeedbackRecord {
                feedback,
                received_at: now,
            });
            let point = TrainingPoint::new(
                decision.domain.clone(),
                decision.context.clone(),
                json!({ "outcome": decision.outcome, "selected": decision.selected }),
                feedback,
            );

            let stats = &mut inner.state.stats;
            stats.feedback_received += 1;
            match feedback {
                Feedback::Positive => stats.positive_feedback += 1,
                Feedback::Negative => stats.negative_feedback += 1,
                Feedback::Neutral => {}
            }

            events.push(LearningEvent::FeedbackReceived {
                decision_id,
                feedback,
                timestamp: now,
            });
            inner.learn(&point, now, &mut events)
        };
        self.publish_all(events);
        Ok(pattern_id)
    }

    /// Weighted blend of pattern success rate, pattern coverage and model
    /// accuracy for one domain.
    pub async fn performance(&self, domain: &str) -> PerformanceReport {
        let inner = self.inner.read().await;
        let (mut positive, mut negative, mut count) = (0u64, 0u64, 0usize);
        for pattern in inner.patterns.values().filter(|p| p.domain == domain) {
            positive += pattern.outcomes.positive;
            negative += pattern.outcomes.negative;
            count += 1;
        }
        let success_rate = if positive + negative == 0 {
            0.0
        } else {
            positive as f64 / (positive + negative) as f64
        };
        let coverage = (count as f64 / inner.config.max_patterns_per_domain as f64).min(1.0);
        let accuracy = inner.models.get(domain).map(|m| m.accuracy).unwrap_or(0.0);
        let w = &inner.config.weights;

        PerformanceReport {
            success_rate,
            pattern_count: count,
            accuracy,
            score: success_rate * w.success_rate + coverage * w.pattern_coverage + accuracy * w.accuracy,
        }
    }

    /// Drops patterns unseen for longer than `retention_days`, then trims each
    /// domain to `max_patterns_per_domain` by evicting the least confident
    /// (oldest first on ties). Returns the number removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let retention_days = inner.config.retention_days;
        let cap = inner.config.max_patterns_per_domain;
        // A window reaching past the representable range keeps everything.
        let cutoff = Duration::try_days(i64::from(retention_days)).and_then(|d| now.checked_sub_signed(d));

        let before = inner.patterns.len();
        if let Some(cutoff) = cutoff {
            inner.patterns.retain(|_, p| p.last_seen >= cutoff);
        }

        let mut by_domain: HashMap<String, Vec<(f64, DateTime<Utc>, PatternId)>> = HashMap::new();
        for pattern in inner.patterns.values() {
            by_domain
                .entry(pattern.domain.clone())
                .or_default()
                .push((pattern.confidence, pattern.last_seen, pattern.id.clone()));
        }
        for (_, mut entries) in by_domain.into_iter().filter(|(_, e)| e.len() > cap) {
            entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let excess = entries.len() - cap;
            for (_, _, id) in entries.into_iter().take(excess) {
                inner.patterns.remove(&id);
            }
        }

        let removed = before - inner.patterns.len();
        drop(inner);

        if removed > 0 {
            info!(removed, retention_days, "Pruned learning patterns");
            self.events.publish(LearningEvent::PatternsPruned {
                count: removed,
                retention_days,
                timestamp: now,
            });
        }
        removed
    }

    pub async fn summary(&self) -> LearnerSummary {
        let inner = self.inner.read().await;
        LearnerSummary {
            patterns: inner.patterns.len(),
            models: inner.models.len(),
            decisions: inner.decisions.len(),
            stats: inner.state.stats,
            observed_accuracy: inner.state.stats.observed_accuracy(),
        }
    }

    pub async fn model(&self, domain: &str) -> Option<DomainModel> {
        self.inner.read().await.models.get(domain).cloned()
    }

    pub async fn pattern(&self, id: &PatternId) -> Option<LearningPattern> {
        self.inner.read().await.patterns.get(id).cloned()
    }

    pub async fn decision(&self, id: DecisionId) -> Option<Decision> {
        self.inner.read().await.decisions.iter().find(|d| d.id == id).cloned()
    }

    /// Highest `confidence * frequency` first.
    pub async fn top_patterns(&self, domain: &str, limit: usize) -> Vec<LearningPattern> {
        let inner = self.inner.read().await;
        let mut patterns: Vec<LearningPattern> = inner
            .patterns
            .values()
            .filter(|p| p.domain == domain)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| {
            let sa = a.confidence * a.frequency as f64;
            let sb = b.confidence * b.frequency as f64;
            sb.total_cmp(&sa).then(b.last_seen.cmp(&a.last_seen))
        });
        patterns.truncate(limit);
        patterns
    }
}
