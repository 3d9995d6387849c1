// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;

pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver, TaskEventReceiver};
