// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the learning context

pub mod state_store;

pub use state_store::{InMemoryStateStore, JsonFileStateStore, LearningStateStore, StateStoreError};
