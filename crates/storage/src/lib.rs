// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Event storage: the store interface and its backends

mod index;
mod jsonl;
mod memory;
mod store;

pub use jsonl::JsonlEventStore;
pub use memory::MemoryEventStore;
pub use store::{
    EventFilter, EventStore, RetentionReport, SortOrder, StoreError, StoreStats,
};
