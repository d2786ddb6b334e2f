// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::router::EventRouter;
use evr_core::{RetryPolicy, RouterConfig};
use serde_json::json;
use yare::parameterized;

/// Hook that records the events it ran on
struct ScriptedHook {
    name: &'static str,
    pattern: &'static str,
    mode: DeliveryMode,
    fail: bool,
    skip_source: Option<&'static str>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHook {
    fn new(name: &'static str, pattern: &'static str) -> Self {
        Self {
            name,
            pattern,
            mode: DeliveryMode::Sync,
            fail: false,
            skip_source: None,
            calls: Arc::default(),
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Hook for ScriptedHook {
    fn name(&self) -> &str {
        self.name
    }

    fn pattern(&self) -> EventPattern {
        EventPattern::new(self.pattern).unwrap()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    fn should_execute(&self, event: &Event) -> bool {
        self.skip_source != Some(event.source())
    }

    async fn execute(&self, event: &Event) -> Result<HookOutput, HookError> {
        self.calls.lock().unwrap().push(event.id().to_string());
        if self.fail {
            Err(HookError::failed("webhook returned 500"))
        } else {
            Ok(HookOutput::default().with("notified", true))
        }
    }
}

#[derive(Clone, Default)]
struct Outcomes(Arc<Mutex<Vec<Event>>>);

#[async_trait]
impl EventHandler for Outcomes {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl Outcomes {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

fn watch_outcomes(router: &EventRouter) -> Outcomes {
    let outcomes = Outcomes::default();
    router
        .subscribe(
            EventPattern::new("hook.**").unwrap(),
            outcomes.clone(),
            DeliveryMode::Sync,
        )
        .unwrap();
    outcomes
}

fn event(event_type: &str) -> Event {
    Event::builder(event_type, "test").build().unwrap()
}

#[tokio::test]
async fn successful_hook_publishes_succeeded_event() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    let hook = ScriptedHook::new("notify", "container.*.unhealthy");
    let calls = hook.calls();
    router.register_hook(Arc::new(hook)).unwrap();

    let trigger = Event::builder("container.db.unhealthy", "monitor")
        .correlation_id("corr_00000000beef")
        .build()
        .unwrap();
    router.publish(trigger.clone(), DeliveryMode::Sync).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![trigger.id().to_string()]);
    let outcomes = outcomes.events();
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.event_type(), "hook.notify.succeeded");
    assert_eq!(outcome.source(), "hook.notify");
    assert_eq!(outcome.causation_id(), Some(trigger.id()));
    assert_eq!(outcome.correlation_id(), Some("corr_00000000beef"));
    assert_eq!(outcome.payload_value("success"), Some(&json!(true)));
    assert_eq!(outcome.payload_value("output.notified"), Some(&json!(true)));
    assert_eq!(outcome.payload_value("event_type"), Some(&json!("container.db.unhealthy")));
    assert!(outcome.payload_value("duration_ms").is_some());
    assert_eq!(outcome.metadata_value(HOOK_CHAIN), Some(&json!(["notify"])));
}

#[tokio::test]
async fn failing_hook_publishes_failed_event_without_failing_delivery() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    router
        .register_hook(Arc::new(ScriptedHook::new("pager", "alert").failing()))
        .unwrap();

    let report = router.publish(event("alert"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(report.failed, 0);
    assert!(router.dead_letters().is_empty());
    let outcome = &outcomes.events()[0];
    assert_eq!(outcome.event_type(), "hook.pager.failed");
    assert_eq!(outcome.payload_value("error"), Some(&json!("webhook returned 500")));
    assert_eq!(outcome.payload_value("output"), Some(&json!(null)));
}

#[tokio::test]
async fn hook_never_triggers_on_its_own_outcome() {
    let router = EventRouter::default();
    let hook = ScriptedHook::new("audit", "**");
    let calls = hook.calls();
    router.register_hook(Arc::new(hook)).unwrap();

    router.publish(event("a.b"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn hooks_can_react_to_other_hooks() {
    let router = EventRouter::default();
    router
        .register_hook(Arc::new(ScriptedHook::new("first", "job.done")))
        .unwrap();
    let follow = ScriptedHook::new("second", "hook.first.succeeded");
    let calls = follow.calls();
    router.register_hook(Arc::new(follow)).unwrap();

    router.publish(event("job.done"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_execute_guards_each_event() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    let mut hook = ScriptedHook::new("guarded", "a");
    hook.skip_source = Some("noisy");
    let calls = hook.calls();
    router.register_hook(Arc::new(hook)).unwrap();

    let noisy = Event::builder("a", "noisy").build().unwrap();
    router.publish(noisy, DeliveryMode::Sync).await.unwrap();
    router.publish(event("a"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(outcomes.events().len(), 1);
}

#[tokio::test]
async fn async_hooks_run_on_workers() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    let mut hook = ScriptedHook::new("bg", "a");
    hook.mode = DeliveryMode::Async;
    router.register_hook(Arc::new(hook)).unwrap();

    let report = router.publish(event("a"), DeliveryMode::Sync).await.unwrap();
    assert_eq!(report.scheduled, 1);

    router.wait_idle().await;
    assert_eq!(outcomes.events()[0].event_type(), "hook.bg.succeeded");
}

#[test]
fn duplicate_hook_names_are_rejected() {
    let router = EventRouter::default();
    router
        .register_hook(Arc::new(ScriptedHook::new("dup", "a")))
        .unwrap();
    let err = router
        .register_hook(Arc::new(ScriptedHook::new("dup", "b")))
        .unwrap_err();
    assert!(matches!(err, HookAdapterError::DuplicateHook(name) if name == "dup"));
    assert_eq!(router.hooks().hook_names(), vec!["dup".to_string()]);
}

#[parameterized(
    empty = { "" },
    dotted = { "a.b" },
    wildcard = { "a*" },
    spaced = { "my hook" },
)]
fn invalid_hook_names_are_rejected(name: &'static str) {
    let router = EventRouter::default();
    let err = router
        .register_hook(Arc::new(ScriptedHook::new(name, "a")))
        .unwrap_err();
    assert!(matches!(err, HookAdapterError::InvalidName(_)));
    assert!(router.subscriptions().is_empty());
}

#[tokio::test]
async fn unregistered_hook_stops_running() {
    let router = EventRouter::default();
    let hook = ScriptedHook::new("gone", "a");
    let calls = hook.calls();
    router.register_hook(Arc::new(hook)).unwrap();

    router.unregister_hook("gone").unwrap();
    router.publish(event("a"), DeliveryMode::Sync).await.unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert!(router.subscriptions().is_empty());
    assert!(matches!(
        router.unregister_hook("gone"),
        Err(HookAdapterError::UnknownHook(_))
    ));
}

#[tokio::test]
async fn execution_stats_are_recorded() {
    let router = EventRouter::default();
    router
        .register_hook(Arc::new(ScriptedHook::new("ok", "a")))
        .unwrap();
    router
        .register_hook(Arc::new(ScriptedHook::new("bad", "a").failing()))
        .unwrap();

    router.publish(event("a"), DeliveryMode::Sync).await.unwrap();
    router.publish(event("a"), DeliveryMode::Sync).await.unwrap();

    let stats = router.hooks().stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(
        stats.per_hook["bad"],
        HookCounts {
            total: 2,
            succeeded: 0,
            failed: 2
        }
    );
    assert!(stats.min_duration <= stats.max_duration);
    assert!(stats.avg_duration().is_some());
}

#[tokio::test]
async fn trigger_hook_can_be_called_directly() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    let hook = ScriptedHook::new("manual", "never.matches");

    let output = router
        .hooks()
        .trigger_hook(&hook, &event("x"))
        .await
        .unwrap();

    assert_eq!(output.payload["notified"], json!(true));
    assert_eq!(outcomes.events()[0].event_type(), "hook.manual.succeeded");
}

/// Sync hook that only finishes when its timeout cuts it off
struct SlowHook {
    limit: Option<Duration>,
}

#[async_trait]
impl Hook for SlowHook {
    fn name(&self) -> &str {
        "slow"
    }

    fn pattern(&self) -> EventPattern {
        EventPattern::new("job").unwrap()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Sync
    }

    fn execution_timeout(&self) -> Option<Duration> {
        self.limit
    }

    async fn execute(&self, _event: &Event) -> Result<HookOutput, HookError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(HookOutput::default())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_hook_reports_failed_outcome_under_router_timeout() {
    let router = EventRouter::new(RouterConfig {
        handler_timeout: Duration::from_secs(5),
        retry: RetryPolicy::retries(2),
        ..RouterConfig::default()
    });
    let outcomes = watch_outcomes(&router);
    router
        .register_hook(Arc::new(SlowHook { limit: None }))
        .unwrap();

    let report = router.publish(event("job"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert!(router.dead_letters().is_empty());
    let outcomes = outcomes.events();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].event_type(), "hook.slow.failed");
    assert_eq!(
        outcomes[0].payload_value("error"),
        Some(&json!("hook timed out after 5s"))
    );
    let stats = router.hooks().stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn hook_timeout_overrides_router_timeout() {
    let router = EventRouter::default();
    let outcomes = watch_outcomes(&router);
    router
        .register_hook(Arc::new(SlowHook {
            limit: Some(Duration::from_millis(100)),
        }))
        .unwrap();

    router.publish(event("job"), DeliveryMode::Sync).await.unwrap();

    assert_eq!(
        outcomes.events()[0].payload_value("error"),
        Some(&json!("hook timed out after 100ms"))
    );
}

#[tokio::test]
async fn hooks_reacting_to_each_other_terminate() {
    let router = EventRouter::default();
    router
        .register_hook(Arc::new(ScriptedHook::new("start", "job")))
        .unwrap();
    let a = ScriptedHook::new("a", "hook.**");
    let a_calls = a.calls();
    router.register_hook(Arc::new(a)).unwrap();
    let b = ScriptedHook::new("b", "hook.**");
    let b_calls = b.calls();
    router.register_hook(Arc::new(b)).unwrap();

    router.publish(event("job"), DeliveryMode::Sync).await.unwrap();

    // Each runs on start's outcome and on the other's reaction to it
    assert_eq!(a_calls.lock().unwrap().len(), 2);
    assert_eq!(b_calls.lock().unwrap().len(), 2);
    assert_eq!(router.hooks().stats().total, 5);
}

#[test]
fn chain_is_empty_without_metadata() {
    assert!(hook_chain(&event("a")).is_empty());
}

#[test]
fn outcome_types() {
    assert_eq!(hook_outcome_type("n", true), "hook.n.succeeded");
    assert_eq!(hook_outcome_type("n", false), "hook.n.failed");
}

#[test]
fn empty_stats_have_no_average() {
    assert_eq!(HookExecutionStats::default().avg_duration(), None);
}
