// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Learner tuning knobs.

use serde::{Deserialize, Serialize};

/// Upper bound on `retention_days` (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningConfig {
    /// Scales the per-observation confidence step (`learning_rate * 0.1`).
    pub learning_rate: f64,
    /// Minimum score for `make_decision` to return `execute` rather than `defer`.
    pub confidence_threshold: f64,
    pub max_patterns_per_domain: usize,
    pub retention_days: u32,
    /// Retrain models automatically as training points arrive.
    pub auto_adapt: bool,
    /// Retrain a domain every time its point count reaches a multiple of this.
    pub retrain_threshold: u64,
    /// Number of most recent feedback values a model's accuracy is computed over.
    pub accuracy_window: usize,
    /// Decisions retained in memory and in the persisted document.
    pub max_decisions: usize,
    pub weights: ScoringWeights,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            confidence_threshold: 0.7,
            max_patterns_per_domain: 1000,
            retention_days: 90,
            auto_adapt: true,
            retrain_threshold: 10,
            accuracy_window: 50,
            max_decisions: 1000,
            weights: ScoringWeights::default(),
        }
    }
}

impl LearningConfig {
    /// Confidence adjustment applied per positive/negative observation.
    pub fn confidence_step(&self) -> f64 {
        self.learning_rate * 0.1
    }

    /// Clamps out-of-range values back to defaults and reports each correction.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut corrections = Vec::new();

        if !(0.0..=1.0).contains(&self.learning_rate) {
            corrections.push(format!(
                "learning.learningRate {} outside [0,1], using {}",
                self.learning_rate, defaults.learning_rate
            ));
            self.learning_rate = defaults.learning_rate;
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            corrections.push(format!(
                "learning.confidenceThreshold {} outside [0,1], using {}",
                self.confidence_threshold, defaults.confidence_threshold
            ));
            self.confidence_threshold = defaults.confidence_threshold;
        }
        if self.max_patterns_per_domain == 0 {
            corrections.push(format!(
                "learning.maxPatternsPerDomain must be >= 1, using {}",
                defaults.max_patterns_per_domain
            ));
            self.max_patterns_per_domain = defaults.max_patterns_per_domain;
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            corrections.push(format!(
                "learning.retentionDays {} above maximum {}, using {}",
                self.retention_days, MAX_RETENTION_DAYS, defaults.retention_days
            ));
            self.retention_days = defaults.retention_days;
        }
        if self.retrain_threshold == 0 {
            corrections.push(format!(
                "learning.retrainThreshold must be >= 1, using {}",
                defaults.retrain_threshold
            ));
            self.retrain_threshold = defaults.retrain_threshold;
        }
        if self.accuracy_window == 0 {
            corrections.push(format!(
                "learning.accuracyWindow must be >= 1, using {}",
                defaults.accuracy_window
            ));
            self.accuracy_window = defaults.accuracy_window;
        }
        if self.max_decisions == 0 {
            corrections.push(format!(
                "learning.maxDecisions must be >= 1, using {}",
                defaults.max_decisions
            ));
            self.max_decisions = defaults.max_decisions;
        }
        if !self.weights.is_valid() {
            corrections.push("learning.weights must be finite and non-negative, using defaults".to_string());
            self.weights = defaults.weights;
        }

        corrections
    }
}

/// Blend weights for option scoring and the per-domain performance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringWeights {
    /// Weight of the domain model's accuracy when scoring an option.
    pub model_accuracy: f64,
    /// Weight of the option's own confidence when scoring an option.
    pub option_confidence: f64,
    pub success_rate: f64,
    pub pattern_coverage: f64,
    pub accuracy: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            model_accuracy: 0.6,
            option_confidence: 0.4,
            success_rate: 0.4,
            pattern_coverage: 0.2,
            accuracy: 0.4,
        }
    }
}

impl ScoringWeights {
    fn is_valid(&self) -> bool {
        [
            self.model_accuracy,
            self.option_confidence,
            self.success_rate,
            self.pattern_coverage,
            self.accuracy,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
    }
}
