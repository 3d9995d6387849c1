// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Steward core
//!
//! Runs registered work sources on a schedule, gates their proposals through
//! a clearance-based approval policy and executes approved tasks under a
//! concurrency limit. Outcomes are fed back to the adaptive learner in
//! `steward-cortex`.
//!
//! # Architecture
//!
//! - **domain:** tasks, the `WorkSource` contract, risk and approval rules, config, events
//! - **application:** task registry, scheduler and the `Orchestrator` itself
//! - **infrastructure:** the broadcast event bus

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
