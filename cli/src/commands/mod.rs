// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Steward CLI

pub mod config;
pub mod learning;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::learning::LearningCommand;
pub use self::run::RunArgs;
