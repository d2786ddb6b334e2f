// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn event(id: &str, second: u32) -> Event {
    Event::builder("a.b", "test")
        .id(id)
        .timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).unwrap())
        .build()
        .unwrap()
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(Event::id).collect()
}

#[test]
fn duplicate_id_is_ignored() {
    let mut index = EventIndex::default();
    assert!(index.insert(event("x", 1)));
    assert!(!index.insert(event("x", 2)));
    assert_eq!(index.len(), 1);
    assert_eq!(index.get("x").unwrap().timestamp(), event("x", 1).timestamp());
}

#[test]
fn equal_timestamps_keep_insertion_order() {
    let mut index = EventIndex::default();
    index.insert(event("second", 5));
    index.insert(event("first", 1));
    index.insert(event("third", 5));
    let all = index.query(&EventFilter::new());
    assert_eq!(ids(&all), vec!["first", "second", "third"]);

    let desc = index.query(&EventFilter::new().descending());
    assert_eq!(ids(&desc), vec!["third", "second", "first"]);
}

#[test]
fn pagination_applies_after_filtering() {
    let mut index = EventIndex::default();
    for i in 0..6 {
        index.insert(event(&format!("e{i}"), i));
    }
    let page = index.query(&EventFilter::new().offset(2).limit(3));
    assert_eq!(ids(&page), vec!["e2", "e3", "e4"]);
    assert_eq!(index.count(&EventFilter::new().offset(2).limit(3)), 6);
}

#[test]
fn remove_drops_from_both_maps() {
    let mut index = EventIndex::default();
    index.insert(event("a", 1));
    index.insert(event("b", 2));
    let removed = index.remove(&HashSet::from(["a", "missing"]));
    assert_eq!(removed, 1);
    assert!(!index.contains("a"));
    assert_eq!(ids(&index.snapshot()), vec!["b"]);

    // A removed id can be stored again
    assert!(index.insert(event("a", 3)));
}
