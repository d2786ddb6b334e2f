// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention policies and eviction planning
//!
//! Stores keep events until a retention pass runs. [`RetentionPolicy::plan`]
//! decides which events a pass removes; stores then apply the plan.

use crate::event::Event;
use crate::pattern::TypePattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Overrides for one event type (or type pattern)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeRetention {
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
    pub max_per_type: Option<usize>,
}

/// How long, and how many, events a store keeps
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Events older than this are eligible for purge
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
    /// Cap on stored events per event type
    pub max_per_type: Option<usize>,
    /// Cap on stored events overall
    pub max_count: Option<usize>,
    /// Keyed by exact type or type pattern; exact keys win
    pub type_overrides: BTreeMap<String, TypeRetention>,
    /// Keep expired events while their correlation chain has a live event
    pub preserve_correlations: bool,
}

impl RetentionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn max_per_type(mut self, cap: usize) -> Self {
        self.max_per_type = Some(cap);
        self
    }

    pub fn max_count(mut self, cap: usize) -> Self {
        self.max_count = Some(cap);
        self
    }

    pub fn type_override(mut self, event_type: impl Into<String>, rule: TypeRetention) -> Self {
        self.type_overrides.insert(event_type.into(), rule);
        self
    }

    pub fn preserve_correlations(mut self, preserve: bool) -> Self {
        self.preserve_correlations = preserve;
        self
    }

    /// True if the policy never removes anything
    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none()
            && self.max_per_type.is_none()
            && self.max_count.is_none()
            && self
                .type_overrides
                .values()
                .all(|o| o.max_age.is_none() && o.max_per_type.is_none())
    }

    fn override_for(&self, event_type: &str) -> Option<&TypeRetention> {
        if let Some(rule) = self.type_overrides.get(event_type) {
            return Some(rule);
        }
        self.type_overrides.iter().find_map(|(key, rule)| {
            TypePattern::parse(key)
                .ok()
                .filter(|p| !p.is_literal() && p.matches(event_type))
                .map(|_| rule)
        })
    }

    pub fn max_age_for(&self, event_type: &str) -> Option<Duration> {
        self.override_for(event_type)
            .and_then(|o| o.max_age)
            .or(self.max_age)
    }

    pub fn max_per_type_for(&self, event_type: &str) -> Option<usize> {
        self.override_for(event_type)
            .and_then(|o| o.max_per_type)
            .or(self.max_per_type)
    }

    /// Decide which events to remove.
    ///
    /// `events` must be in store order (timestamp ascending, ties by
    /// insertion). Eviction is oldest first: age limits apply, then per-type
    /// caps, then the global cap.
    pub fn plan(&self, events: &[Event], now: DateTime<Utc>) -> RetentionPlan {
        let expired_flags: Vec<bool> = events
            .iter()
            .map(|e| match self.max_age_for(e.event_type()) {
                Some(max_age) => match chrono::Duration::from_std(max_age) {
                    Ok(max_age) => now.signed_duration_since(e.timestamp()) > max_age,
                    Err(_) => false,
                },
                None => false,
            })
            .collect();

        let live_chains: HashSet<&str> = if self.preserve_correlations {
            events
                .iter()
                .zip(&expired_flags)
                .filter(|(_, expired)| !**expired)
                .filter_map(|(e, _)| e.correlation_id())
                .collect()
        } else {
            HashSet::new()
        };

        let mut plan = RetentionPlan::default();
        let mut survivors: Vec<&Event> = Vec::with_capacity(events.len());
        for (event, expired) in events.iter().zip(&expired_flags) {
            let preserved = event
                .correlation_id()
                .is_some_and(|c| live_chains.contains(c));
            if *expired && !preserved {
                plan.expired.push(event.id().to_string());
            } else {
                survivors.push(event);
            }
        }

        let mut per_type: HashMap<&str, usize> = HashMap::new();
        for event in &survivors {
            *per_type.entry(event.event_type()).or_default() += 1;
        }
        let mut excess: HashMap<&str, usize> = per_type
            .iter()
            .filter_map(|(t, count)| {
                self.max_per_type_for(t)
                    .filter(|cap| count > cap)
                    .map(|cap| (*t, count - cap))
            })
            .collect();

        let mut kept: Vec<&Event> = Vec::with_capacity(survivors.len());
        for event in survivors {
            match excess.get_mut(event.event_type()) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    plan.capped.push(event.id().to_string());
                }
                _ => kept.push(event),
            }
        }

        if let Some(max_count) = self.max_count {
            let overflow = kept.len().saturating_sub(max_count);
            for event in kept.drain(..overflow) {
                plan.capped.push(event.id().to_string());
            }
        }

        plan.remaining = kept.len();
        plan
    }
}

/// Result of planning a retention pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Ids removed for exceeding their max age
    pub expired: Vec<String>,
    /// Ids removed by per-type or global caps
    pub capped: Vec<String>,
    /// Events left after the pass
    pub remaining: usize,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.capped.is_empty()
    }

    /// Every id the pass removes
    pub fn removed(&self) -> HashSet<&str> {
        self.expired
            .iter()
            .chain(&self.capped)
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
