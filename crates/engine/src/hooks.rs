// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External hooks and the adapter that turns their results into events
//!
//! A hook is an external collaborator identified by name. The adapter
//! subscribes it to its pattern, runs it on each matching event and then
//! publishes `hook.<name>.succeeded` or `hook.<name>.failed` so other
//! subscribers can react.
//!
//! Outcome events carry a `hook_chain` metadata list naming every hook that
//! ran on the way to them. A hook never runs on an event whose chain already
//! names it, so hooks reacting to each other's outcomes always terminate.

use crate::error::{HandlerError, HookAdapterError, HookError};
use crate::handler::EventHandler;
use crate::router::WeakRouter;
use crate::subscription::{SubscribeOptions, Subscription, SubscriptionId};
use async_trait::async_trait;
use evr_core::{DeliveryMode, Event, EventBuilder, EventPattern, Payload};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Metadata key listing the hooks that led to an outcome event
pub const HOOK_CHAIN: &str = "hook_chain";

/// Payload returned by a successful hook
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookOutput {
    pub payload: Payload,
}

impl HookOutput {
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    /// Unique name; outcome events are `hook.<name>.*`
    fn name(&self) -> &str;

    fn pattern(&self) -> EventPattern;

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Async
    }

    /// Per-event guard checked before `execute`
    fn should_execute(&self, _event: &Event) -> bool {
        true
    }

    /// Limit on one `execute` call; the router's handler timeout when `None`
    fn execution_timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, event: &Event) -> Result<HookOutput, HookError>;
}

/// Per-hook execution counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookCounts {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Execution statistics across all hooks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookExecutionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub per_hook: BTreeMap<String, HookCounts>,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    total_duration: Duration,
}

impl HookExecutionStats {
    pub fn avg_duration(&self) -> Option<Duration> {
        u32::try_from(self.total)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_duration / n)
    }

    fn record(&mut self, hook: &str, success: bool, elapsed: Duration) {
        let counts = self.per_hook.entry(hook.to_string()).or_default();
        counts.total += 1;
        self.total += 1;
        if success {
            counts.succeeded += 1;
            self.succeeded += 1;
        } else {
            counts.failed += 1;
            self.failed += 1;
        }
        self.total_duration += elapsed;
        self.min_duration = Some(self.min_duration.map_or(elapsed, |d| d.min(elapsed)));
        self.max_duration = Some(self.max_duration.map_or(elapsed, |d| d.max(elapsed)));
    }
}

struct Registration {
    hook: Arc<dyn Hook>,
    subscription: SubscriptionId,
}

/// Registers hooks with the router and publishes their outcomes
pub struct HookTriggerAdapter {
    router: WeakRouter,
    registrations: Mutex<HashMap<String, Registration>>,
    stats: Mutex<HookExecutionStats>,
}

/// Hooks already run on the way to `event`, oldest first
pub fn hook_chain(event: &Event) -> Vec<&str> {
    event
        .metadata_value(HOOK_CHAIN)
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Outcome event type for a hook run
pub fn hook_outcome_type(name: &str, success: bool) -> String {
    let status = if success { "succeeded" } else { "failed" };
    format!("hook.{name}.{status}")
}

fn validate_name(name: &str) -> Result<(), HookAdapterError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(HookAdapterError::InvalidName(name.to_string()))
    }
}

impl HookTriggerAdapter {
    pub(crate) fn new(router: WeakRouter) -> Self {
        Self {
            router,
            registrations: Mutex::new(HashMap::new()),
            stats: Mutex::new(HookExecutionStats::default()),
        }
    }

    pub fn register_hook(&self, hook: Arc<dyn Hook>) -> Result<Subscription, HookAdapterError> {
        let name = hook.name().to_string();
        validate_name(&name)?;
        let router = self.router.upgrade().ok_or(HookAdapterError::RouterClosed)?;

        let mut registrations = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if registrations.contains_key(&name) {
            return Err(HookAdapterError::DuplicateHook(name));
        }

        let subscriber = HookSubscriber {
            router: self.router.clone(),
            hook: Arc::clone(&hook),
            own_prefix: format!("hook.{name}."),
        };
        // Timeouts are enforced per execution so a slow hook still reports
        // a failed outcome
        let subscription = router.subscribe_internal(
            hook.pattern(),
            Arc::new(subscriber),
            SubscribeOptions::new(hook.delivery_mode()).name(format!("hook:{name}")),
        )?;
        registrations.insert(
            name.clone(),
            Registration {
                hook,
                subscription: subscription.id.clone(),
            },
        );
        tracing::info!(hook = %name, subscription_id = %subscription.id, "hook registered");
        Ok(subscription)
    }

    pub fn unregister_hook(&self, name: &str) -> Result<(), HookAdapterError> {
        let registration = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .ok_or_else(|| HookAdapterError::UnknownHook(name.to_string()))?;
        if let Some(router) = self.router.upgrade() {
            router.unsubscribe(&registration.subscription);
        }
        tracing::info!(hook = %name, "hook unregistered");
        Ok(())
    }

    /// Registered hook names, sorted
    pub fn hook_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn hook(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|r| Arc::clone(&r.hook))
    }

    pub fn stats(&self) -> HookExecutionStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run `hook` on `event` within its timeout, record the outcome and
    /// publish the `hook.<name>.*` event. The hook's own result is returned.
    pub async fn trigger_hook(
        &self,
        hook: &dyn Hook,
        event: &Event,
    ) -> Result<HookOutput, HookError> {
        let name = hook.name();
        let limit = hook
            .execution_timeout()
            .or_else(|| self.router.upgrade().map(|r| r.config().handler_timeout));
        let start = Instant::now();
        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, hook.execute(event))
                .await
                .unwrap_or_else(|_| Err(HookError::Timeout(limit))),
            None => hook.execute(event).await,
        };
        let elapsed = start.elapsed();

        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(name, result.is_ok(), elapsed);

        match &result {
            Ok(_) => tracing::debug!(
                hook = name,
                event_id = event.id(),
                elapsed_ms = elapsed.as_millis() as u64,
                "hook succeeded"
            ),
            Err(e) => tracing::warn!(
                hook = name,
                event_id = event.id(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "hook failed"
            ),
        }

        self.publish_outcome(name, event, &result, elapsed).await;
        result
    }

    async fn publish_outcome(
        &self,
        name: &str,
        event: &Event,
        result: &Result<HookOutput, HookError>,
        elapsed: Duration,
    ) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        let (output, error) = match result {
            Ok(output) => (Value::Object(output.payload.clone()), None),
            Err(e) => (Value::Null, Some(e.to_string())),
        };
        let mut chain = hook_chain(event);
        chain.push(name);

        let mut builder = EventBuilder::new(
            hook_outcome_type(name, result.is_ok()),
            format!("hook.{name}"),
        )
        .id(router.next_id())
        .timestamp(router.now())
        .causation_id(event.id())
        .with("hook", name)
        .with("event_id", event.id())
        .with("event_type", event.event_type())
        .with("success", result.is_ok())
        .with("output", output)
        .with("error", error)
        .with("duration_ms", elapsed.as_millis() as u64)
        .meta(HOOK_CHAIN, chain);
        if let Some(correlation_id) = event.correlation_id() {
            builder = builder.correlation_id(correlation_id);
        }

        match builder.build() {
            Ok(outcome) => {
                if let Err(e) = router.publish(outcome, DeliveryMode::Sync).await {
                    tracing::warn!(hook = name, error = %e, "failed to publish hook outcome");
                }
            }
            Err(e) => tracing::warn!(hook = name, error = %e, "invalid hook outcome event"),
        }
    }
}

/// Router subscription standing in for one hook
struct HookSubscriber {
    router: WeakRouter,
    hook: Arc<dyn Hook>,
    own_prefix: String,
}

#[async_trait]
impl EventHandler for HookSubscriber {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if event.event_type().starts_with(&self.own_prefix)
            || hook_chain(event).contains(&self.hook.name())
            || !self.hook.should_execute(event)
        {
            return Ok(());
        }
        let Some(router) = self.router.upgrade() else {
            return Ok(());
        };
        // Hook failures become `hook.<name>.failed` events, not delivery failures
        let _ = router.hooks().trigger_hook(self.hook.as_ref(), event).await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
