// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event store

use crate::index::EventIndex;
use crate::store::{EventFilter, EventStore, RetentionReport, StoreError, StoreStats};
use chrono::{DateTime, Utc};
use evr_core::{Event, RetentionPlan, RetentionPolicy};
use std::sync::RwLock;

/// Reference store: everything lives behind one reader/writer lock
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    index: RwLock<EventIndex>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for MemoryEventStore {
    fn store(&self, event: &Event) -> Result<bool, StoreError> {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        let inserted = index.insert(event.clone());
        if !inserted {
            tracing::debug!(event_id = event.id(), "duplicate event id, not stored");
        }
        Ok(inserted)
    }

    fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.get(id).cloned())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.query(filter))
    }

    fn count_events(&self, filter: &EventFilter) -> Result<usize, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.count(filter))
    }

    fn event_types(&self) -> Result<Vec<String>, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.event_types())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.stats())
    }

    fn apply_retention_policy_at(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, StoreError> {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        let plan = policy.plan(&index.snapshot(), now);
        index.remove(&plan.removed());
        let report = RetentionReport::from(&plan);
        tracing::info!(
            expired = report.expired,
            capped = report.capped,
            remaining = report.remaining,
            "applied retention policy"
        );
        Ok(report)
    }

    fn retention_preview(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan, StoreError> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(policy.plan(&index.snapshot(), now))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.index.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
