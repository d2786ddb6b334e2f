// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake hook for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use async_trait::async_trait;
use evr_core::{DeliveryMode, Event, EventPattern};
use evr_engine::{Hook, HookError, HookOutput};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Recorded hook execution
#[derive(Debug, Clone)]
pub struct HookCall {
    pub event: Event,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<HookCall>,
    scripted: VecDeque<Result<HookOutput, HookError>>,
    failure: Option<HookError>,
}

/// Fake hook recording every execution.
///
/// Returns scripted results in order, then the sticky failure if one is
/// set, otherwise an empty success.
#[derive(Clone)]
pub struct FakeHook {
    name: String,
    pattern: EventPattern,
    mode: DeliveryMode,
    state: Arc<Mutex<FakeState>>,
}

impl FakeHook {
    pub fn new(name: impl Into<String>, pattern: EventPattern) -> Self {
        Self {
            name: name.into(),
            pattern,
            mode: DeliveryMode::Sync,
            state: Arc::default(),
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Queue the result for the next execution
    pub fn push_result(&self, result: Result<HookOutput, HookError>) {
        self.lock().scripted.push_back(result);
    }

    /// Fail every execution once scripted results run out
    pub fn fail_with(&self, error: HookError) {
        self.lock().failure = Some(error);
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Hook for FakeHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> EventPattern {
        self.pattern.clone()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    async fn execute(&self, event: &Event) -> Result<HookOutput, HookError> {
        let mut state = self.lock();
        state.calls.push(HookCall {
            event: event.clone(),
        });
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }
        match &state.failure {
            Some(error) => Err(error.clone()),
            None => Ok(HookOutput::default()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
