// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod learner;
pub mod persister;

pub use learner::{
    AdaptiveLearner, LearnerError, LearnerSummary, LearningEventPublisher, LoadOutcome,
    NoopEventPublisher, PerformanceReport,
};
pub use persister::{LearningPersister, LearningPersisterConfig};
