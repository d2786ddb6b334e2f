// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation enrichment
//!
//! The correlator subscribes to every event. An event without a
//! correlation id is republished as a derived copy carrying a fresh
//! `corr_` id; the copy has its own id and the same type, source, payload,
//! metadata and causation. Events that already carry a correlation id, and
//! replayed events, pass through untouched, so a derived copy is never
//! enriched again.
//!
//! Chains are read back from the store; the correlator keeps no index of
//! its own.

use crate::error::{CorrelationError, HandlerError, SubscriptionError};
use crate::handler::EventHandler;
use crate::router::{EventRouter, WeakRouter};
use crate::subscription::{SubscribeOptions, SubscriptionId};
use async_trait::async_trait;
use evr_core::{DeliveryMode, Event, EventPattern, Payload};
use evr_storage::{EventFilter, EventStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// The correlator runs after every other subscriber, so they see the
/// original event before its correlated copy
pub const CORRELATOR_PRIORITY: i32 = i32::MIN;

/// Correlation counts over the stored live events
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub chains: usize,
    pub correlated_events: usize,
    pub uncorrelated_events: usize,
    pub largest_chain: usize,
}

impl CorrelationStats {
    pub fn average_chain_len(&self) -> f64 {
        if self.chains == 0 {
            0.0
        } else {
            self.correlated_events as f64 / self.chains as f64
        }
    }
}

pub struct Correlator {
    router: WeakRouter,
    store: Arc<dyn EventStore>,
    subscription: OnceLock<SubscriptionId>,
    correlated: AtomicU64,
    failures: AtomicU64,
}

impl Correlator {
    /// Subscribe a correlator to `router`, reading chains from `store`
    pub fn attach(
        router: &EventRouter,
        store: Arc<dyn EventStore>,
    ) -> Result<Arc<Self>, SubscriptionError> {
        let correlator = Arc::new(Self {
            router: router.downgrade(),
            store,
            subscription: OnceLock::new(),
            correlated: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });
        let subscription = router.subscribe_internal(
            EventPattern::any(),
            Arc::clone(&correlator) as Arc<dyn EventHandler>,
            SubscribeOptions::new(DeliveryMode::Sync)
                .priority(CORRELATOR_PRIORITY)
                .name("correlator"),
        )?;
        let _ = correlator.subscription.set(subscription.id);
        Ok(correlator)
    }

    /// Stop enriching events. Returns false if already detached.
    pub fn detach(&self) -> bool {
        match (self.subscription.get(), self.router.upgrade()) {
            (Some(id), Some(router)) => router.unsubscribe(id),
            _ => false,
        }
    }

    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription.get()
    }

    /// Events republished with a new correlation id so far
    pub fn correlated_count(&self) -> u64 {
        self.correlated.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Republish `event` with a fresh correlation id if it has none.
    ///
    /// Returns the derived event, or `None` when the event is already
    /// correlated or is a replay.
    pub async fn correlate(&self, event: &Event) -> Result<Option<Event>, CorrelationError> {
        if event.is_replay() || event.correlation_id().is_some() {
            return Ok(None);
        }
        let router = self.router.upgrade().ok_or(CorrelationError::RouterClosed)?;

        let correlation_id = router.next_correlation_id();
        let derived = event
            .derive()
            .id(router.next_id())
            .correlation_id(correlation_id.as_str())
            .finish();
        tracing::debug!(
            event_id = event.id(),
            derived_id = derived.id(),
            correlation_id = %correlation_id,
            "assigned correlation id"
        );

        router.publish(derived.clone(), DeliveryMode::Sync).await?;
        self.correlated.fetch_add(1, Ordering::Relaxed);
        Ok(Some(derived))
    }

    /// Every stored live event with `correlation_id`, oldest first
    pub fn get_correlation_chain(&self, correlation_id: &str) -> Result<Vec<Event>, CorrelationError> {
        let filter = EventFilter::new()
            .correlation_id(correlation_id)
            .replayed(false);
        Ok(self.store.query_events(&filter)?)
    }

    /// The event and its causes, root cause first. Stops at a missing
    /// cause or a cycle.
    pub fn get_causation_chain(&self, event_id: &str) -> Result<Vec<Event>, CorrelationError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(event_id.to_string());

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                tracing::warn!(event_id = %id, "causation cycle detected");
                break;
            }
            let Some(event) = self.store.get_event_by_id(&id)? else {
                break;
            };
            next = event.causation_id().map(str::to_string);
            chain.push(event);
        }

        chain.reverse();
        Ok(chain)
    }

    /// The event's correlation chain, or the event alone if uncorrelated
    pub fn get_related_events(&self, event_id: &str) -> Result<Vec<Event>, CorrelationError> {
        let Some(event) = self.store.get_event_by_id(event_id)? else {
            return Ok(Vec::new());
        };
        match event.correlation_id() {
            Some(correlation_id) => self.get_correlation_chain(correlation_id),
            None => Ok(vec![event]),
        }
    }

    /// Chain counts read from the store; replays are not counted
    pub fn statistics(&self) -> Result<CorrelationStats, CorrelationError> {
        let events = self.store.query_events(&EventFilter::new().replayed(false))?;
        let mut chains: HashMap<&str, usize> = HashMap::new();
        let mut stats = CorrelationStats::default();
        for event in &events {
            match event.correlation_id() {
                Some(id) => *chains.entry(id).or_default() += 1,
                None => stats.uncorrelated_events += 1,
            }
        }
        stats.chains = chains.len();
        stats.correlated_events = chains.values().sum();
        stats.largest_chain = chains.values().copied().max().unwrap_or(0);
        Ok(stats)
    }

    /// Publish a follow-up event caused by `parent` in the same chain
    pub async fn correlate_child(
        &self,
        parent: &Event,
        event_type: &str,
        payload: Payload,
    ) -> Result<Event, CorrelationError> {
        let router = self.router.upgrade().ok_or(CorrelationError::RouterClosed)?;
        let child = parent
            .child(event_type)
            .payload(payload)
            .id(router.next_id())
            .timestamp(router.now())
            .build()?;
        router.publish(child.clone(), DeliveryMode::Sync).await?;
        Ok(child)
    }
}

#[async_trait]
impl EventHandler for Correlator {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if let Err(e) = self.correlate(event).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                event_id = event.id(),
                error = %e,
                "correlation failed, event proceeds uncorrelated"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
