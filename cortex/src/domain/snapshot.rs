// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The single document the learner persists and reloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::LearningConfig;
use super::decision::Decision;
use super::model::{DomainModel, DomainTraining};
use super::pattern::LearningPattern;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerStats {
    pub decisions_made: u64,
    pub feedback_received: u64,
    pub positive_feedback: u64,
    pub negative_feedback: u64,
}

impl LearnerStats {
    /// Positive share of decided feedback.
    pub fn observed_accuracy(&self) -> f64 {
        let decided = self.positive_feedback + self.negative_feedback;
        if decided == 0 {
            0.0
        } else {
            self.positive_feedback as f64 / decided as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerState {
    pub training: HashMap<String, DomainTraining>,
    pub stats: LearnerStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub models: Vec<DomainModel>,
    #[serde(default)]
    pub patterns: Vec<LearningPattern>,
    /// Oldest first.
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub config: LearningConfig,
    #[serde(default)]
    pub state: LearnerState,
}
