// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the learning bounded context.
//! Published through a [`crate::application::LearningEventPublisher`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{DecisionId, DecisionOutcome, Feedback};
use super::pattern::PatternId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningEvent {
    /// First occurrence of a fingerprint.
    PatternIdentified {
        pattern_id: PatternId,
        domain: String,
        timestamp: DateTime<Utc>,
    },

    /// Repeat occurrence of a known fingerprint.
    PatternReinforced {
        pattern_id: PatternId,
        domain: String,
        frequency: u64,
        old_confidence: f64,
        new_confidence: f64,
        timestamp: DateTime<Utc>,
    },

    ModelUpdated {
        domain: String,
        version: u64,
        accuracy: f64,
        training_data_count: u64,
        timestamp: DateTime<Utc>,
    },

    DecisionMade {
        decision_id: DecisionId,
        domain: String,
        outcome: DecisionOutcome,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    FeedbackReceived {
        decision_id: DecisionId,
        feedback: Feedback,
        timestamp: DateTime<Utc>,
    },

    PatternsPruned {
        count: usize,
        retention_days: u32,
        timestamp: DateTime<Utc>,
    },
}

impl LearningEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LearningEvent::PatternIdentified { timestamp, .. } => *timestamp,
            LearningEvent::PatternReinforced { timestamp, .. } => *timestamp,
            LearningEvent::ModelUpdated { timestamp, .. } => *timestamp,
            LearningEvent::DecisionMade { timestamp, .. } => *timestamp,
            LearningEvent::FeedbackReceived { timestamp, .. } => *timestamp,
            LearningEvent::PatternsPruned { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            LearningEvent::PatternIdentified { .. } => "pattern:identified",
            LearningEvent::PatternReinforced { .. } => "pattern:reinforced",
            LearningEvent::ModelUpdated { .. } => "model:updated",
            LearningEvent::DecisionMade { .. } => "decision:made",
            LearningEvent::FeedbackReceived { .. } => "feedback:received",
            LearningEvent::PatternsPruned { .. } => "patterns:pruned",
        }
    }
}
