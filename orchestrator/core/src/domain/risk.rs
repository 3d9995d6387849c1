// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rule-based risk assessment. Rules are independent; a task may trip all of
//! them.

use steward_cortex::{Risk, RiskCategory, RiskSeverity};

use super::task::{ClearanceLevel, Task};

/// Tasks estimated above this cost carry a cost risk.
pub const COST_RISK_THRESHOLD: f64 = 1.0;

pub struct RiskAssessor;

impl RiskAssessor {
    pub fn assess(task: &Task) -> Vec<Risk> {
        let mut risks = Vec::new();

        if let Some(cost) = task.estimated_cost().filter(|c| *c > COST_RISK_THRESHOLD) {
            risks.push(Risk::new(
                RiskCategory::Cost,
                RiskSeverity::Medium,
                format!("estimated cost {:.2} exceeds {:.2}", cost, COST_RISK_THRESHOLD),
                0.8,
            ));
        }

        if task.clearance() >= ClearanceLevel::ModifyProduction {
            risks.push(Risk::new(
                RiskCategory::Availability,
                RiskSeverity::High,
                "changes production systems",
                1.0,
            ));
        }

        if task.files_modified() || task.clearance() >= ClearanceLevel::ModifySafe {
            risks.push(Risk::new(
                RiskCategory::DataLoss,
                RiskSeverity::Low,
                "modifies files or data",
                0.3,
            ));
        }

        risks
    }
}
