// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pattern matchers used by the router's hot path

use crate::event::Event;
use crate::pattern::{EventPattern, TypePattern};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Cache statistics reported by a matcher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatcherStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl MatcherStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Evaluates events against subscription patterns
pub trait PatternMatcher: Send + Sync {
    fn matches_type(&self, pattern: &TypePattern, event_type: &str) -> bool;

    /// Type match first, then attribute filters
    fn matches(&self, pattern: &EventPattern, event: &Event) -> bool {
        self.matches_type(pattern.type_pattern(), event.event_type())
            && pattern.matches_attributes(event)
    }

    /// Drop memoized results (called when subscriptions change)
    fn invalidate(&self) {}

    fn stats(&self) -> MatcherStats {
        MatcherStats::default()
    }
}

/// Direct evaluation, no memoization
#[derive(Clone, Copy, Debug, Default)]
pub struct WildcardMatcher;

impl PatternMatcher for WildcardMatcher {
    fn matches_type(&self, pattern: &TypePattern, event_type: &str) -> bool {
        pattern.matches(event_type)
    }
}

type CacheKey = (String, String);

#[derive(Default)]
struct CacheState {
    results: HashMap<CacheKey, bool>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// Memoizes type-match results keyed by `(pattern, event_type)`.
///
/// Bounded FIFO: once `capacity` entries are held the oldest is evicted.
/// Attribute filters depend on the payload and are never cached.
pub struct CachedMatcher {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl CachedMatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }
}

impl PatternMatcher for CachedMatcher {
    fn matches_type(&self, pattern: &TypePattern, event_type: &str) -> bool {
        if self.capacity == 0 {
            return pattern.matches(event_type);
        }

        let key = (pattern.as_str().to_string(), event_type.to_string());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&hit) = state.results.get(&key) {
            state.hits += 1;
            return hit;
        }

        state.misses += 1;
        let result = pattern.matches(event_type);
        while state.order.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.results.remove(&oldest);
                }
                None => break,
            }
        }
        state.order.push_back(key.clone());
        state.results.insert(key, result);
        result
    }

    fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.results.clear();
        state.order.clear();
    }

    fn stats(&self) -> MatcherStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        MatcherStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.results.len(),
            capacity: self.capacity,
        }
    }
}

/// Matcher for a configured cache size (0 disables caching)
pub fn matcher_for_cache_size(capacity: usize) -> Box<dyn PatternMatcher> {
    if capacity == 0 {
        Box::new(WildcardMatcher)
    } else {
        Box::new(CachedMatcher::new(capacity))
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
