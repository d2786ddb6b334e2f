// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn event(event_type: &str) -> Event {
    Event::builder(event_type, "test").build().unwrap()
}

#[tokio::test]
async fn fake_hook_records_calls() {
    let hook = FakeHook::new("fake", EventPattern::any());

    hook.execute(&event("a")).await.unwrap();
    hook.execute(&event("b")).await.unwrap();

    let calls = hook.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].event.event_type(), "a");
    assert_eq!(calls[1].event.event_type(), "b");
}

#[tokio::test]
async fn scripted_results_come_before_sticky_failure() {
    let hook = FakeHook::new("fake", EventPattern::any());
    hook.push_result(Ok(HookOutput::default().with("n", 1)));
    hook.fail_with(HookError::failed("down"));

    let first = hook.execute(&event("a")).await.unwrap();
    assert_eq!(first.payload["n"], 1);
    assert_eq!(
        hook.execute(&event("a")).await.unwrap_err(),
        HookError::failed("down")
    );
    assert_eq!(hook.call_count(), 2);
}

#[tokio::test]
async fn clones_share_recorded_calls() {
    let hook = FakeHook::new("fake", EventPattern::any());
    let observer = hook.clone();

    hook.execute(&event("a")).await.unwrap();

    assert_eq!(observer.call_count(), 1);
}
