// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use evr_core::{AttributeFilter, Operator};
use serde_json::json;
use std::time::Duration;

fn t(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 10, minute, 0).unwrap()
}

fn event(id: &str, event_type: &str, minute: u32) -> Event {
    Event::builder(event_type, "monitor")
        .id(id)
        .timestamp(t(minute))
        .build()
        .unwrap()
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(Event::id).collect()
}

fn seeded() -> MemoryEventStore {
    let store = MemoryEventStore::new();
    let correlated = |id: &str, minute: u32, status: &str| {
        Event::builder("container.db.unhealthy", "health")
            .id(id)
            .timestamp(t(minute))
            .correlation_id("corr_a")
            .with("status", status)
            .with("restarts", minute)
            .meta("host", "node-1")
            .build()
            .unwrap()
    };
    store.store(&correlated("c1", 1, "warning")).unwrap();
    store.store(&event("u1", "container.web.up", 2)).unwrap();
    store.store(&correlated("c2", 3, "critical")).unwrap();
    store.store(&event("s1", "system.boot", 4)).unwrap();
    store
}

#[test]
fn store_is_idempotent_on_id() {
    let store = MemoryEventStore::new();
    let e = event("x", "a", 1);
    assert!(store.store(&e).unwrap());
    assert!(!store.store(&e).unwrap());
    assert_eq!(store.len(), 1);
}

#[test]
fn get_by_id() {
    let store = seeded();
    assert_eq!(store.get_event_by_id("u1").unwrap().unwrap().id(), "u1");
    assert!(store.get_event_by_id("nope").unwrap().is_none());
}

#[test]
fn query_by_type_source_and_correlation() {
    let store = seeded();
    let by_type = store
        .query_events(&EventFilter::new().event_type("system.boot"))
        .unwrap();
    assert_eq!(ids(&by_type), vec!["s1"]);

    let by_source = store
        .query_events(&EventFilter::new().source("health"))
        .unwrap();
    assert_eq!(ids(&by_source), vec!["c1", "c2"]);

    let chain = store
        .query_events(&EventFilter::new().correlation_id("corr_a"))
        .unwrap();
    assert_eq!(ids(&chain), vec!["c1", "c2"]);
}

#[test]
fn query_by_type_pattern() {
    let store = seeded();
    let filter = EventFilter::new().type_pattern("container.**").unwrap();
    assert_eq!(ids(&store.query_events(&filter).unwrap()), vec!["c1", "u1", "c2"]);
}

#[test]
fn time_range_is_inclusive() {
    let store = seeded();
    let filter = EventFilter::new().between(t(2), t(3));
    assert_eq!(ids(&store.query_events(&filter).unwrap()), vec!["u1", "c2"]);
}

#[test]
fn payload_and_metadata_filters() {
    let store = seeded();
    let critical = EventFilter::new().where_payload("status", "critical");
    assert_eq!(ids(&store.query_events(&critical).unwrap()), vec!["c2"]);

    let on_host = EventFilter::new().where_metadata("host", "node-1");
    assert_eq!(store.count_events(&on_host).unwrap(), 2);

    let restarts = EventFilter::new().where_payload_filter(
        "restarts",
        AttributeFilter::Conditions(vec![(Operator::Gte, json!(2))]),
    );
    assert_eq!(ids(&store.query_events(&restarts).unwrap()), vec!["c2"]);
}

#[test]
fn where_path_routes_by_prefix() {
    let store = seeded();
    let filter = EventFilter::new()
        .where_path("payload.status", json!("warning"))
        .unwrap()
        .where_path("metadata.host", json!("node-1"))
        .unwrap();
    assert_eq!(ids(&store.query_events(&filter).unwrap()), vec!["c1"]);
    assert!(EventFilter::new().where_path("metadata.", json!(1)).is_err());
}

#[test]
fn query_by_source_pattern() {
    let store = seeded();
    store
        .store(
            &Event::builder("job.done", "agent.alpha.processor")
                .id("a1")
                .timestamp(t(5))
                .build()
                .unwrap(),
        )
        .unwrap();

    let agents = EventFilter::new().source_pattern("agent.*.processor").unwrap();
    assert_eq!(ids(&store.query_events(&agents).unwrap()), vec!["a1"]);

    let everything_but = EventFilter::new().source_pattern("!agent.**").unwrap();
    assert_eq!(store.count_events(&everything_but).unwrap(), 4);

    assert!(EventFilter::new().source_pattern("a..b").is_err());
}

#[test]
fn text_search_covers_payload_and_metadata_values() {
    let store = seeded();
    store
        .store(
            &Event::builder("deploy.finished", "ci")
                .id("d1")
                .timestamp(t(6))
                .with("steps", json!([{"name": "Migrate DB"}, {"name": "restart"}]))
                .build()
                .unwrap(),
        )
        .unwrap();

    let critical = EventFilter::new().text("CRIT");
    assert_eq!(ids(&store.query_events(&critical).unwrap()), vec!["c2"]);

    let host = EventFilter::new().text("node-1");
    assert_eq!(ids(&store.query_events(&host).unwrap()), vec!["c1", "c2"]);

    let nested = EventFilter::new().text("migrate");
    assert_eq!(ids(&store.query_events(&nested).unwrap()), vec!["d1"]);

    // Numbers match on their text; keys are not searched
    assert_eq!(store.count_events(&EventFilter::new().text("3")).unwrap(), 1);
    assert_eq!(store.count_events(&EventFilter::new().text("restarts")).unwrap(), 0);
}

#[test]
fn stats_and_types() {
    let store = seeded();
    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.oldest, Some(t(1)));
    assert_eq!(stats.newest, Some(t(4)));
    assert_eq!(stats.by_type["container.db.unhealthy"], 2);
    assert_eq!(stats.by_source["monitor"], 2);
    assert_eq!(
        store.event_types().unwrap(),
        vec!["container.db.unhealthy", "container.web.up", "system.boot"]
    );
}

#[test]
fn retention_removes_old_events() {
    let store = seeded();
    let policy = RetentionPolicy::new().max_age(Duration::from_secs(90));

    let preview = store.retention_preview(&policy, t(4)).unwrap();
    assert_eq!(preview.expired, vec!["c1", "u1"]);
    assert_eq!(store.len(), 4);

    let report = store.apply_retention_policy_at(&policy, t(4)).unwrap();
    assert_eq!(report.expired, 2);
    assert_eq!(report.remaining, 2);

    let remaining = store.query_events(&EventFilter::new()).unwrap();
    assert!(remaining.iter().all(|e| t(4) - e.timestamp() <= chrono::Duration::seconds(90)));
}

#[test]
fn clear_empties_store() {
    let store = seeded();
    store.clear().unwrap();
    assert!(store.is_empty());
}
