// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event index shared by the store backends

use crate::store::{EventFilter, SortOrder, StoreStats};
use chrono::{DateTime, Utc};
use evr_core::Event;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Ordering key: timestamp, then insertion sequence
type Key = (DateTime<Utc>, u64);

/// Events ordered by `(timestamp, insertion)` with an id lookup
#[derive(Debug, Default)]
pub(crate) struct EventIndex {
    by_time: BTreeMap<Key, Event>,
    by_id: HashMap<String, Key>,
    next_seq: u64,
}

impl EventIndex {
    /// Insert unless the id is already present
    pub fn insert(&mut self, event: Event) -> bool {
        if self.by_id.contains_key(event.id()) {
            return false;
        }
        let key = (event.timestamp(), self.next_seq);
        self.next_seq += 1;
        self.by_id.insert(event.id().to_string(), key);
        self.by_time.insert(key, event);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.by_id.get(id).and_then(|key| self.by_time.get(key))
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    fn ordered<'a>(&'a self, order: SortOrder) -> Box<dyn Iterator<Item = &'a Event> + 'a> {
        match order {
            SortOrder::Ascending => Box::new(self.by_time.values()),
            SortOrder::Descending => Box::new(self.by_time.values().rev()),
        }
    }

    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        self.ordered(filter.order)
            .filter(|e| filter.matches(e))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn count(&self, filter: &EventFilter) -> usize {
        self.by_time.values().filter(|e| filter.matches(e)).count()
    }

    /// Every event in store order
    pub fn snapshot(&self) -> Vec<Event> {
        self.by_time.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.by_time.values()
    }

    /// Remove the given ids, returning how many were present
    pub fn remove(&mut self, ids: &HashSet<&str>) -> usize {
        let mut removed = 0;
        for id in ids {
            if let Some(key) = self.by_id.remove(*id) {
                self.by_time.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.by_time.clear();
        self.by_id.clear();
    }

    pub fn event_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self.by_time.values().map(|e| e.event_type()).collect();
        types.into_iter().map(str::to_string).collect()
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.by_time.len(),
            oldest: self.by_time.keys().next().map(|(t, _)| *t),
            newest: self.by_time.keys().map(|(t, _)| *t).max(),
            ..StoreStats::default()
        };
        for event in self.by_time.values() {
            *stats
                .by_type
                .entry(event.event_type().to_string())
                .or_default() += 1;
            *stats
                .by_source
                .entry(event.source().to_string())
                .or_default() += 1;
            if event.is_replay() {
                stats.replayed += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
