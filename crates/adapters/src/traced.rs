// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced hook wrapper for consistent observability

use async_trait::async_trait;
use evr_core::{DeliveryMode, Event, EventPattern};
use evr_engine::{Hook, HookError, HookOutput};
use std::time::Duration;
use tracing::Instrument;

/// Wrapper that adds a span and timing logs to any hook
#[derive(Clone)]
pub struct TracedHook<H> {
    inner: H,
}

impl<H> TracedHook<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: Hook> Hook for TracedHook<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pattern(&self) -> EventPattern {
        self.inner.pattern()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.inner.delivery_mode()
    }

    fn execution_timeout(&self) -> Option<Duration> {
        self.inner.execution_timeout()
    }

    fn should_execute(&self, event: &Event) -> bool {
        let execute = self.inner.should_execute(event);
        if !execute {
            tracing::trace!(hook = self.inner.name(), event_id = event.id(), "skipped");
        }
        execute
    }

    async fn execute(&self, event: &Event) -> Result<HookOutput, HookError> {
        let span = tracing::info_span!(
            "hook.execute",
            hook = self.inner.name(),
            event_id = event.id(),
            event_type = event.event_type()
        );

        async {
            tracing::info!("starting");

            let start = std::time::Instant::now();
            let result = self.inner.execute(event).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(output) => tracing::info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    output_keys = output.payload.len(),
                    "hook completed"
                ),
                Err(HookError::Timeout(limit)) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    limit_ms = limit.as_millis() as u64,
                    "hook timed out"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "hook failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
