// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Steward Cortex
//!
//! Adaptive learning for the Steward orchestrator: decisions and their
//! feedback, pattern confidence, per-domain models and durable learning state.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Turns task outcomes into confidence that later decisions
//!   are scored against. Has no knowledge of tasks or work sources.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;
