// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer of the learning context: decisions, risks, patterns, models
//! and the events raised when any of them change.

pub mod config;
pub mod decision;
pub mod events;
pub mod model;
pub mod pattern;
pub mod snapshot;

pub use config::*;
pub use decision::*;
pub use events::*;
pub use model::*;
pub use pattern::*;
pub use snapshot::*;
