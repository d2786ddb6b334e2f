// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay of stored events
//!
//! Stored events are fetched in timestamp order and republished as copies
//! marked `is_replay`, each with a new id plus `replay_of` and `replay_run`
//! metadata. The stored originals are never modified.

use crate::error::ReplayError;
use crate::router::{EventRouter, Persistence, PublishOptions};
use chrono::{DateTime, Utc};
use evr_core::{DeliveryMode, Event, ReplayConfig, ReplayErrorPolicy};
pub use evr_core::{REPLAY_OF, REPLAY_RUN};
use evr_storage::{EventFilter, EventStore, SortOrder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Shared flag that stops a replay run before its next event
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReplayOptions {
    /// 0 replays as fast as possible; otherwise original gaps are divided
    /// by this factor
    pub speed_multiplier: f64,
    pub cancel: Option<CancellationFlag>,
    /// Extra criteria applied to the source query
    pub filter: EventFilter,
    /// Overrides the configured delivery mode
    pub mode: Option<DeliveryMode>,
    pub persistence: Persistence,
}

impl ReplayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speed(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    pub fn cancel_with(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn persist(mut self) -> Self {
        self.persistence = Persistence::Required;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub run_id: String,
    /// Copies republished
    pub replayed: usize,
    /// Events whose republish failed under the skip policy
    pub skipped: usize,
    /// Handler failures while delivering replayed copies
    pub failed_deliveries: usize,
    pub cancelled: bool,
}

pub struct Replayer {
    router: EventRouter,
    store: Arc<dyn EventStore>,
    config: ReplayConfig,
}

impl Replayer {
    pub fn new(router: EventRouter, store: Arc<dyn EventStore>) -> Self {
        Self {
            router,
            store,
            config: ReplayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay one correlation chain in timestamp order
    pub async fn replay_by_correlation_id(
        &self,
        correlation_id: &str,
        options: ReplayOptions,
    ) -> Result<ReplayReport, ReplayError> {
        let filter = options.filter.clone().correlation_id(correlation_id);
        self.replay(filter, options).await
    }

    /// Replay every event with `start <= timestamp <= end`
    pub async fn replay_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: ReplayOptions,
    ) -> Result<ReplayReport, ReplayError> {
        let filter = options.filter.clone().between(start, end);
        self.replay(filter, options).await
    }

    /// Replay whatever `filter` selects
    pub async fn replay(
        &self,
        mut filter: EventFilter,
        options: ReplayOptions,
    ) -> Result<ReplayReport, ReplayError> {
        let speed = options.speed_multiplier;
        if !speed.is_finite() || speed < 0.0 {
            return Err(ReplayError::InvalidSpeed(speed));
        }

        filter.order = SortOrder::Ascending;
        if !self.config.include_replayed && filter.is_replay.is_none() {
            filter.is_replay = Some(false);
        }
        let events = self.store.query_events(&filter)?;

        let run_id = self.router.next_id();
        let span = tracing::info_span!("replay.run", run_id = %run_id, events = events.len());
        self.run(events, run_id, &options).instrument(span).await
    }

    async fn run(
        &self,
        events: Vec<Event>,
        run_id: String,
        options: &ReplayOptions,
    ) -> Result<ReplayReport, ReplayError> {
        let publish = PublishOptions {
            mode: options.mode.unwrap_or(self.config.delivery_mode),
            persistence: options.persistence,
        };
        let mut report = ReplayReport {
            run_id,
            ..ReplayReport::default()
        };
        let mut previous: Option<DateTime<Utc>> = None;

        for event in events {
            if is_cancelled(options) {
                report.cancelled = true;
                break;
            }
            if let Some(prev) = previous {
                let delay = pacing(prev, event.timestamp(), options.speed_multiplier);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                    if is_cancelled(options) {
                        report.cancelled = true;
                        break;
                    }
                }
            }
            previous = Some(event.timestamp());

            let copy = event
                .derive()
                .id(self.router.next_id())
                .replay_of(&report.run_id)
                .finish();

            match self.router.publish_with(copy, publish).await {
                Ok(delivery) => {
                    report.replayed += 1;
                    report.failed_deliveries += delivery.failed;
                }
                Err(e) => match self.config.on_error {
                    ReplayErrorPolicy::Skip => {
                        tracing::warn!(event_id = event.id(), error = %e, "skipping event");
                        report.skipped += 1;
                    }
                    ReplayErrorPolicy::Abort => {
                        tracing::error!(event_id = event.id(), error = %e, "aborting replay");
                        return Err(ReplayError::Publish {
                            event_id: event.id().to_string(),
                            source: e,
                        });
                    }
                },
            }
        }

        tracing::info!(
            replayed = report.replayed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "replay finished"
        );
        Ok(report)
    }
}

fn is_cancelled(options: &ReplayOptions) -> bool {
    options
        .cancel
        .as_ref()
        .is_some_and(CancellationFlag::is_cancelled)
}

/// Sleep before republishing an event recorded at `next`, given the
/// previous one was recorded at `prev`
fn pacing(prev: DateTime<Utc>, next: DateTime<Utc>, speed_multiplier: f64) -> Duration {
    if speed_multiplier <= 0.0 {
        return Duration::ZERO;
    }
    let gap = (next - prev).to_std().unwrap_or(Duration::ZERO);
    Duration::try_from_secs_f64(gap.as_secs_f64() / speed_multiplier).unwrap_or(Duration::MAX)
}

#[cfg(test)]
#[path = "replayer_tests.rs"]
mod tests;
