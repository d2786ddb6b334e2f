// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! evr-core: value types for the event router
//!
//! This crate provides:
//! - The immutable [`Event`] and its builders
//! - Subscription patterns (type wildcards plus attribute filters) and matchers
//! - Retention policies and configuration
//! - Clock and id abstractions for deterministic tests

pub mod clock;
pub mod config;
pub mod delivery;
pub mod event;
pub mod id;
pub mod matcher;
pub mod pattern;
pub mod payload;
pub mod retention;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    ConfigError, EvrConfig, HookConfig, ReplayConfig, ReplayErrorPolicy, RetryPolicy, RouterConfig,
    StoreConfig,
};
pub use delivery::DeliveryMode;
pub use event::{Event, EventBuilder, EventDerivation, EventError, REPLAY_OF, REPLAY_RUN};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use matcher::{
    matcher_for_cache_size, CachedMatcher, MatcherStats, PatternMatcher, WildcardMatcher,
};
pub use pattern::{AttributeFilter, EventPattern, Operator, PatternError, TypePattern};
pub use payload::{payload_from, resolve_path, Payload};
pub use retention::{RetentionPlan, RetentionPolicy, TypeRetention};
