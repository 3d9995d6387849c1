// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-domain model and the training data that feeds it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decision::Feedback;

/// One observed outcome handed to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPoint {
    pub domain: String,
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    pub feedback: Feedback,
}

impl TrainingPoint {
    pub fn new(domain: impl Into<String>, input: Value, output: Value, feedback: Feedback) -> Self {
        Self {
            domain: domain.into(),
            input,
            output,
            feedback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainModel {
    pub domain: String,
    /// Bumped on every retrain; never decreases.
    pub version: u64,
    /// Positive share of the most recent feedback window.
    pub accuracy: f64,
    pub training_data_count: u64,
    pub last_trained: DateTime<Utc>,
}

/// Running training record for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainTraining {
    pub total_points: u64,
    pub recent_feedback: VecDeque<Feedback>,
}

impl DomainTraining {
    pub fn record(&mut self, feedback: Feedback, window: usize) {
        self.total_points += 1;
        self.recent_feedback.push_back(feedback);
        while self.recent_feedback.len() > window.max(1) {
            self.recent_feedback.pop_front();
        }
    }

    pub fn window_accuracy(&self) -> f64 {
        if self.recent_feedback.is_empty() {
            return 0.0;
        }
        let positive = self
            .recent_feedback
            .iter()
            .filter(|f| **f == Feedback::Positive)
            .count();
        positive as f64 / self.recent_feedback.len() as f64
    }
}
