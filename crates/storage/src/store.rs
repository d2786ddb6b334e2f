// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event store interface

use chrono::{DateTime, Utc};
use evr_core::{AttributeFilter, Event, PatternError, RetentionPlan, RetentionPolicy, TypePattern};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event log {} is locked by another process", .0.display())]
    Locked(PathBuf),
    #[error("corrupt record at {}:{line}: {message}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("event store was opened read-only")]
    ReadOnly,
}

/// Durable or in-memory ledger of events.
///
/// Writes (`store`, retention, `clear`) are serialized against reads so a
/// query never observes a partial append. Query results are in timestamp
/// order, ties broken by insertion order.
pub trait EventStore: Send + Sync {
    /// Append an event. Returns `false` if an event with the same id is
    /// already stored (the call is then a no-op).
    fn store(&self, event: &Event) -> Result<bool, StoreError>;

    fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, StoreError>;

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    /// Number of matching events, ignoring `offset` and `limit`
    fn count_events(&self, filter: &EventFilter) -> Result<usize, StoreError>;

    /// Distinct event types currently stored, sorted
    fn event_types(&self) -> Result<Vec<String>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Purge events per `policy`, oldest first
    fn apply_retention_policy(
        &self,
        policy: &RetentionPolicy,
    ) -> Result<RetentionReport, StoreError> {
        self.apply_retention_policy_at(policy, Utc::now())
    }

    /// Purge events per `policy` with ages measured from `now`
    fn apply_retention_policy_at(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, StoreError>;

    /// What a retention pass at `now` would remove, without removing it
    fn retention_preview(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan, StoreError>;

    /// Remove every event
    fn clear(&self) -> Result<(), StoreError>;
}

/// Result ordering for queries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Criteria for [`EventStore::query_events`]. All set criteria must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub type_pattern: Option<TypePattern>,
    pub source: Option<String>,
    /// Sources matched with the same wildcards as event types
    pub source_pattern: Option<TypePattern>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    /// Inclusive lower bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end_time: Option<DateTime<Utc>>,
    pub is_replay: Option<bool>,
    /// Dotted paths into the payload
    pub payload_filters: BTreeMap<String, AttributeFilter>,
    /// Dotted paths into the metadata
    pub metadata_filters: BTreeMap<String, AttributeFilter>,
    /// Case-insensitive substring searched in payload and metadata values
    pub text: Option<String>,
    pub order: SortOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Match types against a wildcard pattern (`container.**`)
    pub fn type_pattern(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.type_pattern = Some(TypePattern::parse(pattern)?);
        Ok(self)
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Match sources against a wildcard pattern (`agent.*.processor`)
    pub fn source_pattern(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.source_pattern = Some(TypePattern::parse(pattern)?);
        Ok(self)
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.since(start).until(end)
    }

    pub fn replayed(mut self, is_replay: bool) -> Self {
        self.is_replay = Some(is_replay);
        self
    }

    /// Require a payload path to equal `value`
    pub fn where_payload(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload_filters
            .insert(path.into(), AttributeFilter::Equals(value.into()));
        self
    }

    pub fn where_payload_filter(mut self, path: impl Into<String>, filter: AttributeFilter) -> Self {
        self.payload_filters.insert(path.into(), filter);
        self
    }

    /// Require a metadata path to equal `value`
    pub fn where_metadata(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata_filters
            .insert(path.into(), AttributeFilter::Equals(value.into()));
        self
    }

    /// Route a prefixed path: `metadata.x` filters metadata, `payload.x`
    /// or a bare path filters the payload. `value` may be an operator object.
    pub fn where_path(mut self, path: &str, value: Value) -> Result<Self, PatternError> {
        let (target, path) = match path.strip_prefix("metadata.") {
            Some(rest) => (&mut self.metadata_filters, rest),
            None => (
                &mut self.payload_filters,
                path.strip_prefix("payload.").unwrap_or(path),
            ),
        };
        if path.is_empty() {
            return Err(PatternError::EmptyPath);
        }
        target.insert(path.to_string(), AttributeFilter::from_value(path, value)?);
        Ok(self)
    }

    /// Require `query` somewhere in a payload or metadata value, ignoring case
    pub fn text(mut self, query: impl Into<String>) -> Self {
        self.text = Some(query.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check every criterion except ordering and pagination
    pub fn matches(&self, event: &Event) -> bool {
        if self.event_type.as_deref().is_some_and(|t| t != event.event_type()) {
            return false;
        }
        if self
            .type_pattern
            .as_ref()
            .is_some_and(|p| !p.matches(event.event_type()))
        {
            return false;
        }
        if self.source.as_deref().is_some_and(|s| s != event.source()) {
            return false;
        }
        if self
            .source_pattern
            .as_ref()
            .is_some_and(|p| !p.matches(event.source()))
        {
            return false;
        }
        if self.correlation_id.is_some() && self.correlation_id.as_deref() != event.correlation_id()
        {
            return false;
        }
        if self.causation_id.is_some() && self.causation_id.as_deref() != event.causation_id() {
            return false;
        }
        if self.start_time.is_some_and(|t| event.timestamp() < t) {
            return false;
        }
        if self.end_time.is_some_and(|t| event.timestamp() > t) {
            return false;
        }
        if self.is_replay.is_some_and(|r| r != event.is_replay()) {
            return false;
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let found = event
                .payload()
                .values()
                .chain(event.metadata().values())
                .any(|v| value_contains(v, &needle));
            if !found {
                return false;
            }
        }
        self.payload_filters
            .iter()
            .all(|(path, f)| f.matches(event.payload_value(path)))
            && self
                .metadata_filters
                .iter()
                .all(|(path, f)| f.matches(event.metadata_value(path)))
    }
}

/// Search nested JSON values for `needle` (already lowercased). Keys are
/// not searched; scalars are compared by their JSON text.
fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
        other => other.to_string().to_lowercase().contains(needle),
    }
}

/// Summary of store contents
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub replayed: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub by_type: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
}

/// Outcome of a retention pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Removed for exceeding their max age
    pub expired: usize,
    /// Removed by per-type or global caps
    pub capped: usize,
    pub remaining: usize,
}

impl RetentionReport {
    pub fn removed(&self) -> usize {
        self.expired + self.capped
    }
}

impl From<&RetentionPlan> for RetentionReport {
    fn from(plan: &RetentionPlan) -> Self {
        Self {
            expired: plan.expired.len(),
            capped: plan.capped.len(),
            remaining: plan.remaining,
        }
    }
}
