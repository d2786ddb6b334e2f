// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn at(id: &str, event_type: &str, minutes_ago: i64) -> Event {
    Event::builder(event_type, "test")
        .id(id)
        .timestamp(base() - chrono::Duration::minutes(minutes_ago))
        .build()
        .unwrap()
}

fn ids(list: &[String]) -> Vec<&str> {
    list.iter().map(String::as_str).collect()
}

#[test]
fn unbounded_policy_removes_nothing() {
    let events = vec![at("a", "x", 600), at("b", "x", 1)];
    let policy = RetentionPolicy::new();
    assert!(policy.is_unbounded());
    let plan = policy.plan(&events, base());
    assert!(plan.is_empty());
    assert_eq!(plan.remaining, 2);
}

#[test]
fn max_age_expires_old_events() {
    let events = vec![at("old", "x", 120), at("edge", "x", 60), at("new", "x", 5)];
    let plan = RetentionPolicy::new()
        .max_age(Duration::from_secs(3600))
        .plan(&events, base());
    assert_eq!(ids(&plan.expired), vec!["old"]);
    assert!(plan.capped.is_empty());
    assert_eq!(plan.remaining, 2);
}

#[test]
fn per_type_cap_evicts_oldest_first() {
    let events = vec![
        at("a1", "a", 50),
        at("b1", "b", 40),
        at("a2", "a", 30),
        at("a3", "a", 20),
    ];
    let plan = RetentionPolicy::new().max_per_type(2).plan(&events, base());
    assert_eq!(ids(&plan.capped), vec!["a1"]);
    assert_eq!(plan.remaining, 3);
}

#[test]
fn global_cap_applies_after_type_caps() {
    let events = vec![
        at("a1", "a", 50),
        at("b1", "b", 40),
        at("a2", "a", 30),
        at("b2", "b", 20),
    ];
    let plan = RetentionPolicy::new().max_count(2).plan(&events, base());
    assert_eq!(ids(&plan.capped), vec!["a1", "b1"]);
    assert_eq!(plan.remaining, 2);
}

#[test]
fn type_override_wins_over_default() {
    let events = vec![at("debug", "log.debug", 30), at("audit", "audit.login", 30)];
    let policy = RetentionPolicy::new()
        .max_age(Duration::from_secs(7 * 24 * 3600))
        .type_override(
            "log.*",
            TypeRetention {
                max_age: Some(Duration::from_secs(600)),
                max_per_type: None,
            },
        );
    assert_eq!(policy.max_age_for("log.debug"), Some(Duration::from_secs(600)));
    assert_eq!(
        policy.max_age_for("audit.login"),
        Some(Duration::from_secs(7 * 24 * 3600))
    );
    let plan = policy.plan(&events, base());
    assert_eq!(ids(&plan.expired), vec!["debug"]);
}

#[test]
fn exact_override_beats_pattern_override() {
    let policy = RetentionPolicy::new()
        .type_override(
            "log.**",
            TypeRetention {
                max_per_type: Some(10),
                ..Default::default()
            },
        )
        .type_override(
            "log.error",
            TypeRetention {
                max_per_type: Some(1000),
                ..Default::default()
            },
        );
    assert_eq!(policy.max_per_type_for("log.error"), Some(1000));
    assert_eq!(policy.max_per_type_for("log.warn"), Some(10));
    assert_eq!(policy.max_per_type_for("audit"), None);
}

#[test]
fn preserve_correlations_keeps_live_chains() {
    let old_in_chain = Event::builder("job.started", "test")
        .id("old")
        .correlation_id("corr_1")
        .timestamp(base() - chrono::Duration::hours(3))
        .build()
        .unwrap();
    let live_in_chain = Event::builder("job.finished", "test")
        .id("live")
        .correlation_id("corr_1")
        .timestamp(base() - chrono::Duration::minutes(1))
        .build()
        .unwrap();
    let old_alone = at("alone", "job.started", 180);
    let events = vec![old_alone, old_in_chain, live_in_chain];

    let policy = RetentionPolicy::new().max_age(Duration::from_secs(3600));
    let plan = policy.clone().plan(&events, base());
    assert_eq!(ids(&plan.expired), vec!["alone", "old"]);

    let plan = policy.preserve_correlations(true).plan(&events, base());
    assert_eq!(ids(&plan.expired), vec!["alone"]);
    assert_eq!(plan.remaining, 2);
}

#[test]
fn removed_lists_every_id() {
    let events = vec![at("a", "x", 120), at("b", "x", 10), at("c", "x", 5)];
    let plan = RetentionPolicy::new()
        .max_age(Duration::from_secs(3600))
        .max_count(1)
        .plan(&events, base());
    let removed = plan.removed();
    assert!(removed.contains("a"));
    assert!(removed.contains("b"));
    assert!(!removed.contains("c"));
}

#[test]
fn parses_from_toml() {
    let policy: RetentionPolicy = toml::from_str(
        r#"
        max_age = "7d"
        max_per_type = 500
        preserve_correlations = true

        [type_overrides."log.debug"]
        max_age = "1h"
        "#,
    )
    .unwrap();
    assert_eq!(policy.max_age, Some(Duration::from_secs(7 * 24 * 3600)));
    assert_eq!(policy.max_per_type, Some(500));
    assert_eq!(policy.max_count, None);
    assert!(policy.preserve_correlations);
    assert_eq!(
        policy.max_age_for("log.debug"),
        Some(Duration::from_secs(3600))
    );
}
