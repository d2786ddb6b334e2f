// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::HandlerError;
use crate::handler::handler_fn;
use chrono::TimeZone;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

fn entry(registry: &SubscriptionRegistry, id: &str, options: SubscribeOptions) -> Arc<SubscriptionEntry> {
    let params = EntryParams {
        id: SubscriptionId(id.to_string()),
        pattern: EventPattern::any(),
        handler: Arc::new(handler_fn(|_event| async { Ok::<(), HandlerError>(()) })),
        options,
        internal: false,
        now: now(),
    };
    Arc::new(SubscriptionEntry::new(params, registry.next_seq()))
}

fn ids(snapshot: &[Arc<SubscriptionEntry>]) -> Vec<&str> {
    snapshot.iter().map(|e| e.id.0.as_str()).collect()
}

#[test]
fn snapshot_orders_by_priority_then_registration() {
    let registry = SubscriptionRegistry::default();
    registry.insert(entry(&registry, "low", SubscribeOptions::default()));
    registry.insert(entry(&registry, "high", SubscribeOptions::default().priority(10)));
    registry.insert(entry(&registry, "low2", SubscribeOptions::default()));
    registry.insert(entry(&registry, "neg", SubscribeOptions::default().priority(-1)));

    assert_eq!(ids(&registry.snapshot()), vec!["high", "low", "low2", "neg"]);
}

#[test]
fn snapshot_is_unaffected_by_later_changes() {
    let registry = SubscriptionRegistry::default();
    registry.insert(entry(&registry, "a", SubscribeOptions::default()));
    let before = registry.snapshot();

    registry.insert(entry(&registry, "b", SubscribeOptions::default()));
    registry.remove_where(|e| e.id.0 == "a");

    assert_eq!(ids(&before), vec!["a"]);
    assert_eq!(ids(&registry.snapshot()), vec!["b"]);
}

#[test]
fn max_events_claims_are_bounded() {
    let registry = SubscriptionRegistry::default();
    let e = entry(&registry, "once", SubscribeOptions::default().max_events(2));
    assert!(e.is_deliverable(now()));
    assert!(e.try_claim());
    assert!(e.try_claim());
    assert!(!e.try_claim());
    assert!(e.is_expired(now()));
    assert!(!e.is_deliverable(now()));
}

#[test]
fn ttl_sets_expiry() {
    let registry = SubscriptionRegistry::default();
    let e = entry(
        &registry,
        "short",
        SubscribeOptions::default().ttl(Duration::from_secs(60)),
    );
    assert_eq!(e.expires_at, Some(now() + chrono::Duration::seconds(60)));
    assert!(!e.is_expired(now() + chrono::Duration::seconds(59)));
    assert!(e.is_expired(now() + chrono::Duration::seconds(60)));
}

#[test]
fn deactivate_reports_first_call_only() {
    let registry = SubscriptionRegistry::default();
    let e = entry(&registry, "x", SubscribeOptions::default());
    assert!(e.deactivate());
    assert!(!e.deactivate());
    assert!(!e.is_active());
    assert!(matches!(*e.mailbox.lock().unwrap(), Mailbox::Closed));
}

#[test]
fn paused_entries_are_not_deliverable() {
    let registry = SubscriptionRegistry::default();
    let e = entry(&registry, "x", SubscribeOptions::default());
    e.set_paused(true);
    assert!(!e.is_deliverable(now()));
    e.set_paused(false);
    assert!(e.is_deliverable(now()));
    assert!(e.info().active);
}
