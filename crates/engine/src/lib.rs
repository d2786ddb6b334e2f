// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! evr-engine: event routing
//!
//! The [`EventRouter`] dispatches published events to subscriptions. The
//! [`Correlator`], the store subscription and hooks attach to it like any
//! other subscriber; the [`Replayer`] republishes stored history through it.

mod correlator;
mod error;
mod handler;
mod hooks;
mod replayer;
mod router;
mod subscription;

pub use correlator::{CorrelationStats, Correlator, CORRELATOR_PRIORITY};
pub use error::{
    CorrelationError, HandlerError, HookAdapterError, HookError, PublishError, ReplayError,
    SubscriptionError,
};
pub use handler::{handler_fn, EventHandler, FnHandler};
pub use hooks::{
    hook_chain, hook_outcome_type, Hook, HookCounts, HookExecutionStats, HookOutput,
    HookTriggerAdapter, HOOK_CHAIN,
};
pub use replayer::{
    CancellationFlag, ReplayOptions, ReplayReport, Replayer, REPLAY_OF, REPLAY_RUN,
};
pub use router::{
    DeadLetter, DeliveryReport, EventRouter, FailureCallback, FailureHandlerId, Persistence,
    PublishOptions, RedeliveryReport, RouterBuilder, RouterStats, WeakRouter,
    DELIVERY_CONFIRMATION_TYPE, ROUTER_SOURCE, STORE_PRIORITY,
};
pub use subscription::{SubscribeOptions, Subscription, SubscriptionId, SubscriptionInfo};
