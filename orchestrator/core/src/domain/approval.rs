// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Clearance-based approval policy.
//!
//! Rules are evaluated in a fixed order and the first match wins. The
//! clearance ceiling comes first and nothing after it can override it.

use serde::{Deserialize, Serialize};
use steward_cortex::{Decision, DecisionOutcome, Risk, RiskSeverity};

use super::task::{ClearanceLevel, Task, TaskPriority};

pub const REASON_EXCEEDS_CEILING: &str = "exceeds global clearance ceiling";
pub const REASON_AUTO_APPROVE_DISABLED: &str = "auto-approval disabled for this clearance tier";
pub const REASON_NEEDS_HUMAN: &str = "requires human approval given risk/priority combination";

/// Per-tier auto-approval switches. `FULL_AUTONOMY` has no switch and is never
/// auto-approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoApproveFlags {
    pub read_only: bool,
    pub suggestions_only: bool,
    pub modify_safe: bool,
    pub modify_production: bool,
}

impl Default for AutoApproveFlags {
    fn default() -> Self {
        Self {
            read_only: true,
            suggestions_only: true,
            modify_safe: false,
            modify_production: false,
        }
    }
}

impl AutoApproveFlags {
    pub fn allows(&self, clearance: ClearanceLevel) -> bool {
        match clearance {
            ClearanceLevel::ReadOnly => self.read_only,
            ClearanceLevel::Suggest => self.suggestions_only,
            ClearanceLevel::ModifySafe => self.modify_safe,
            ClearanceLevel::ModifyProduction => self.modify_production,
            ClearanceLevel::FullAutonomy => false,
        }
    }
}

pub struct ApprovalPolicy;

impl ApprovalPolicy {
    pub fn decide(
        task: &Task,
        global_clearance: ClearanceLevel,
        auto_approve: &AutoApproveFlags,
        risks: &[Risk],
    ) -> Decision {
        let (outcome, reasoning, confidence) = Self::evaluate(task, global_clearance, auto_approve, risks);
        Decision::new(task.domain(), outcome, reasoning, confidence)
            .for_task(task.id().0)
            .with_context(task.learning_context())
            .with_risks(risks.to_vec())
    }

    fn evaluate(
        task: &Task,
        global_clearance: ClearanceLevel,
        auto_approve: &AutoApproveFlags,
        risks: &[Risk],
    ) -> (DecisionOutcome, &'static str, f64) {
        use DecisionOutcome::{Escalate, Execute};

        if task.clearance() > global_clearance {
            return (Escalate, REASON_EXCEEDS_CEILING, 1.0);
        }
        if !auto_approve.allows(task.clearance()) {
            return (Escalate, REASON_AUTO_APPROVE_DISABLED, 1.0);
        }
        if task.priority() == TaskPriority::Critical && risks.is_empty() {
            return (Execute, "critical priority with no identified risks", 0.95);
        }
        if task.priority() >= TaskPriority::High
            && !risks.iter().any(|r| r.severity == RiskSeverity::Critical)
        {
            return (Execute, "high priority without critical risks", 0.85);
        }
        match task.clearance() {
            ClearanceLevel::ReadOnly => (Execute, "read-only task", 0.99),
            ClearanceLevel::Suggest => (Execute, "suggestion-only task, output is reviewed downstream", 0.90),
            _ => (Escalate, REASON_NEEDS_HUMAN, 0.70),
        }
    }
}
