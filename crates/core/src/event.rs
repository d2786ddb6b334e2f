// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event value object
//!
//! An [`Event`] is immutable once built: fields are private and there are no
//! setters. Copies with changed fields (correlation, replay) are produced
//! through [`Event::derive`], which always yields a new value.

use crate::clock::Clock;
use crate::id::IdGen;
use crate::payload::{resolve_path, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Metadata key naming the original event of a replay copy
pub const REPLAY_OF: &str = "replay_of";
/// Metadata key naming the replay run that produced a copy
pub const REPLAY_RUN: &str = "replay_run";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event type cannot be empty")]
    EmptyType,
    #[error("event source cannot be empty")]
    EmptySource,
    #[error("event id cannot be empty")]
    EmptyId,
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unit of communication routed by the event router.
///
/// Serializes to one JSON object with the fields `id`, `type`, `source`,
/// `timestamp`, `correlation_id`, `causation_id`, `payload`, `metadata`
/// and `is_replay`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    timestamp: DateTime<Utc>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    payload: Payload,
    metadata: Payload,
    is_replay: bool,
}

/// Unvalidated wire form, checked on the way in
#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    causation_id: Option<String>,
    #[serde(default)]
    payload: Payload,
    #[serde(default)]
    metadata: Payload,
    #[serde(default)]
    is_replay: bool,
}

impl TryFrom<RawEvent> for Event {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        validate(&raw.id, &raw.event_type, &raw.source)?;
        Ok(Event {
            id: raw.id,
            event_type: raw.event_type,
            source: raw.source,
            timestamp: raw.timestamp,
            correlation_id: raw.correlation_id,
            causation_id: raw.causation_id,
            payload: raw.payload,
            metadata: raw.metadata,
            is_replay: raw.is_replay,
        })
    }
}

fn validate(id: &str, event_type: &str, source: &str) -> Result<(), EventError> {
    if id.is_empty() {
        return Err(EventError::EmptyId);
    }
    if event_type.trim().is_empty() {
        return Err(EventError::EmptyType);
    }
    if source.trim().is_empty() {
        return Err(EventError::EmptySource);
    }
    Ok(())
}

impl Event {
    /// Start building a new event
    pub fn builder(event_type: impl Into<String>, source: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type, source)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dot-segmented routing key, e.g. `container.health.unhealthy`
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Payload {
        &self.metadata
    }

    pub fn is_replay(&self) -> bool {
        self.is_replay
    }

    /// Resolve a dotted path inside the payload
    pub fn payload_value(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.payload, path)
    }

    /// Resolve a dotted path inside the metadata
    pub fn metadata_value(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.metadata, path)
    }

    /// Copy this event with overrides. The copy gets a fresh id unless
    /// [`EventDerivation::keep_id`] or [`EventDerivation::id`] is used.
    pub fn derive(&self) -> EventDerivation {
        EventDerivation {
            base: self.clone(),
            id: None,
            keep_id: false,
        }
    }

    /// Builder for a follow-up event caused by this one.
    ///
    /// The child joins this event's correlation chain (or starts one rooted
    /// at this event's id) and names this event as its cause.
    pub fn child(&self, event_type: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type, self.source.clone())
            .correlation_id(
                self.correlation_id
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            )
            .causation_id(self.id.clone())
            .metadata(self.metadata.clone())
    }

    /// Encode as a single-line JSON object
    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON object, validating required fields
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builder for new events
#[derive(Clone, Debug)]
pub struct EventBuilder {
    event_type: String,
    source: String,
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    payload: Payload,
    metadata: Payload,
}

impl EventBuilder {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            id: None,
            timestamp: None,
            correlation_id: None,
            causation_id: None,
            payload: Payload::new(),
            metadata: Payload::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set a single payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set a single metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build with a UUID id and the current system time
    pub fn build(self) -> Result<Event, EventError> {
        self.build_with(&crate::id::UuidIdGen, &crate::clock::SystemClock)
    }

    /// Build using the given id generator and clock for unset fields
    pub fn build_with(self, id_gen: &impl IdGen, clock: &impl Clock) -> Result<Event, EventError> {
        let id = self.id.unwrap_or_else(|| id_gen.next());
        validate(&id, &self.event_type, &self.source)?;
        Ok(Event {
            id,
            event_type: self.event_type,
            source: self.source,
            timestamp: self.timestamp.unwrap_or_else(|| clock.now()),
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            payload: self.payload,
            metadata: self.metadata,
            is_replay: false,
        })
    }
}

/// Copy-with-overrides of an existing event
#[derive(Clone, Debug)]
pub struct EventDerivation {
    base: Event,
    id: Option<String>,
    keep_id: bool,
}

impl EventDerivation {
    /// Keep the original event's id
    pub fn keep_id(mut self) -> Self {
        self.keep_id = true;
        self
    }

    /// Use an explicit id for the copy
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.base.correlation_id = Some(id.into());
        self
    }

    pub fn causation_id(mut self, id: Option<String>) -> Self {
        self.base.causation_id = id;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.base.timestamp = timestamp;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.base.payload = payload;
        self
    }

    /// Add or replace one metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.base.metadata.insert(key.into(), value.into());
        self
    }

    /// Mark the copy as a replay of the original within run `run_id`.
    ///
    /// Sets `is_replay` together with `replay_of` and `replay_run` metadata.
    /// Reserved for the replayer; live traffic never carries the flag.
    pub fn replay_of(mut self, run_id: &str) -> Self {
        let original = self.base.id.clone();
        self.base.is_replay = true;
        self.base.metadata.insert(REPLAY_OF.to_string(), original.into());
        self.base.metadata.insert(REPLAY_RUN.to_string(), run_id.into());
        self
    }

    /// Finish with a UUID id for the copy
    pub fn finish(self) -> Event {
        self.finish_with(&crate::id::UuidIdGen)
    }

    /// Finish using the given id generator for the copy's id
    pub fn finish_with(self, id_gen: &impl IdGen) -> Event {
        let mut event = self.base;
        match (self.id, self.keep_id) {
            (Some(id), _) if !id.is_empty() => event.id = id,
            (_, true) => {}
            _ => event.id = id_gen.next(),
        }
        event
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
