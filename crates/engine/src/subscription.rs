// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriptions and the registry the router scans

use crate::handler::EventHandler;
use chrono::{DateTime, Utc};
use evr_core::{DeliveryMode, Event, EventPattern};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Subscription handle id
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub String);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for [`crate::EventRouter::subscribe_with`]
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    pub mode: DeliveryMode,
    /// Higher runs first; ties go by registration order
    pub priority: i32,
    /// Expire after this many deliveries
    pub max_events: Option<u64>,
    /// Expire this long after subscribing
    pub ttl: Option<Duration>,
    pub name: Option<String>,
}

impl SubscribeOptions {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Handle returned by `subscribe`
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub pattern: EventPattern,
    pub mode: DeliveryMode,
    pub name: Option<String>,
}

/// Point-in-time view of a registered subscription
#[derive(Clone, Debug)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub name: Option<String>,
    pub pattern: EventPattern,
    pub mode: DeliveryMode,
    pub priority: i32,
    pub active: bool,
    pub paused: bool,
    pub delivered: u64,
    pub failed: u64,
    pub max_events: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub(crate) enum Mailbox {
    /// No async delivery yet
    Idle,
    Open(mpsc::UnboundedSender<Event>),
    Closed,
}

pub(crate) struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub name: Option<String>,
    pub pattern: EventPattern,
    pub handler: Arc<dyn EventHandler>,
    pub mode: DeliveryMode,
    pub priority: i32,
    /// Router-owned subscriber (store, correlator)
    pub internal: bool,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_events: Option<u64>,
    active: AtomicBool,
    paused: AtomicBool,
    claimed: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub mailbox: Mutex<Mailbox>,
}

pub(crate) struct EntryParams {
    pub id: SubscriptionId,
    pub pattern: EventPattern,
    pub handler: Arc<dyn EventHandler>,
    pub options: SubscribeOptions,
    pub internal: bool,
    pub now: DateTime<Utc>,
}

impl SubscriptionEntry {
    pub fn new(params: EntryParams, seq: u64) -> Self {
        let EntryParams {
            id,
            pattern,
            handler,
            options,
            internal,
            now,
        } = params;
        let expires_at = options
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));
        Self {
            id,
            name: options.name,
            pattern,
            handler,
            mode: options.mode,
            priority: options.priority,
            internal,
            seq,
            created_at: now,
            expires_at,
            max_events: options.max_events,
            active: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            claimed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            mailbox: Mutex::new(Mailbox::Idle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns true if this call deactivated it
    pub fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        self.close_mailbox();
        was_active
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
            || self
                .max_events
                .is_some_and(|max| self.claimed.load(Ordering::SeqCst) >= max)
    }

    /// Active, not paused and not expired
    pub fn is_deliverable(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && !self.is_paused() && !self.is_expired(now)
    }

    /// Reserve one delivery against `max_events`
    pub fn try_claim(&self) -> bool {
        match self.max_events {
            None => {
                self.claimed.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(max) => self
                .claimed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    (c < max).then_some(c + 1)
                })
                .is_ok(),
        }
    }

    /// Stop accepting async deliveries; queued events still drain
    pub fn close_mailbox(&self) {
        let mut mailbox = self.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        *mailbox = Mailbox::Closed;
    }

    pub fn handle(&self) -> Subscription {
        Subscription {
            id: self.id.clone(),
            pattern: self.pattern.clone(),
            mode: self.mode,
            name: self.name.clone(),
        }
    }

    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            mode: self.mode,
            priority: self.priority,
            active: self.is_active(),
            paused: self.is_paused(),
            delivered: self.delivered.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            max_events: self.max_events,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

type Snapshot = Arc<Vec<Arc<SubscriptionEntry>>>;

/// Copy-on-write list of subscriptions.
///
/// Writers replace the whole list; a publish holds the list it started
/// with, so subscriptions added mid-publish do not see that event.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: RwLock<Snapshot>,
    next_seq: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Current list, ordered by priority (descending) then registration
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn insert(&self, entry: Arc<SubscriptionEntry>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<_> = entries.iter().cloned().collect();
        next.push(entry);
        next.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        *entries = Arc::new(next);
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<Arc<SubscriptionEntry>> {
        self.snapshot().iter().find(|e| &e.id == id).cloned()
    }

    /// Remove every entry matching `pred`, returning the removed entries
    pub fn remove_where(
        &self,
        pred: impl Fn(&SubscriptionEntry) -> bool,
    ) -> Vec<Arc<SubscriptionEntry>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let (removed, kept): (Vec<_>, Vec<_>) =
            entries.iter().cloned().partition(|e| pred(e));
        if !removed.is_empty() {
            *entries = Arc::new(kept);
        }
        removed
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
