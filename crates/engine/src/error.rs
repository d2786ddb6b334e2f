// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the router and its companions

use evr_core::{EventError, PatternError};
use evr_storage::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Rejected `subscribe` call
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),
    #[error("invalid subscription options: {0}")]
    InvalidOptions(String),
}

/// Failure reported by a subscriber
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HandlerError::Timeout(_))
    }
}

/// Router-internal failure surfaced to the publisher
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("persistence required but no store is attached")]
    NoStore,
    #[error("failed to persist event: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid event: {0}")]
    Event(#[from] EventError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error("router has shut down")]
    RouterClosed,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to fetch events: {0}")]
    Fetch(#[from] StoreError),
    #[error("failed to republish {event_id}: {source}")]
    Publish {
        event_id: String,
        source: PublishError,
    },
    #[error("speed multiplier must be a finite number >= 0, got {0}")]
    InvalidSpeed(f64),
}

/// Failure reported by a hook's `execute`
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
    #[error("hook exited with {}: {stderr}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },
    #[error("hook timed out after {0:?}")]
    Timeout(Duration),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl HookError {
    pub fn failed(message: impl fmt::Display) -> Self {
        HookError::Failed(message.to_string())
    }
}

#[derive(Debug, Error)]
pub enum HookAdapterError {
    #[error("hook already registered: {0}")]
    DuplicateHook(String),
    #[error("hook not registered: {0}")]
    UnknownHook(String),
    #[error("invalid hook name: {0:?}")]
    InvalidName(String),
    #[error("router has shut down")]
    RouterClosed,
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}
