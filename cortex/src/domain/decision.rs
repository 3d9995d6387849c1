// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Decision and risk value objects shared by the approval policy and the
//! adaptive learner.
//!
//! A [`Decision`] is created once per evaluation and never rewritten; the
//! only later change is the attachment of a [`FeedbackRecord`] when the
//! outcome of the decided work becomes known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Execute,
    Escalate,
    Reject,
    Defer,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Execute => "execute",
            DecisionOutcome::Escalate => "escalate",
            DecisionOutcome::Reject => "reject",
            DecisionOutcome::Defer => "defer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskCategory {
    Cost,
    Performance,
    Security,
    Availability,
    DataLoss,
}

/// Ordered so that `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub category: RiskCategory,
    pub severity: RiskSeverity,
    pub description: String,
    /// Likelihood in `[0, 1]`.
    pub probability: f64,
}

impl Risk {
    pub fn new(
        category: RiskCategory,
        severity: RiskSeverity,
        description: impl Into<String>,
        probability: f64,
    ) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub feedback: Feedback,
    pub received_at: DateTime<Utc>,
}

/// One candidate considered by [`crate::application::AdaptiveLearner::make_decision`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl DecisionOption {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            value: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: DecisionId,
    /// Task the decision was made for; `None` for free-standing decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub domain: String,
    /// Input the decision was made on. Feedback re-learns against this.
    #[serde(default)]
    pub context: serde_json::Value,
    pub outcome: DecisionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub risks: Vec<Risk>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackRecord>,
}

impl Decision {
    pub fn new(
        domain: impl Into<String>,
        outcome: DecisionOutcome,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: DecisionId::new(),
            task_id: None,
            domain: domain.into(),
            context: serde_json::Value::Null,
            outcome,
            selected: None,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
            risks: Vec::new(),
            timestamp: Utc::now(),
            feedback: None,
        }
    }

    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_risks(mut self, risks: Vec<Risk>) -> Self {
        self.risks = risks;
        self
    }

    pub fn with_selected(mut self, label: impl Into<String>) -> Self {
        self.selected = Some(label.into());
        self
    }
}
