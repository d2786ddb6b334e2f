// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event router
//!
//! `publish` selects matching subscriptions from a registry snapshot taken
//! when the call starts and delivers to each:
//!
//! - Sync deliveries run inline, one after another, in priority then
//!   registration order. The call returns once they finish.
//! - Async deliveries go to the subscription's mailbox, a FIFO drained by one
//!   worker task per subscription. Workers share a semaphore that bounds how
//!   many async handlers run at once.
//!
//! A delivery is async if either the subscription or the publish call asks
//! for async. Failed deliveries are retried per the configured
//! [`RetryPolicy`](evr_core::RetryPolicy) and then dead-lettered.

use crate::error::{HandlerError, HookAdapterError, PublishError, SubscriptionError};
use crate::handler::EventHandler;
use crate::hooks::{Hook, HookTriggerAdapter};
use crate::subscription::{
    EntryParams, Mailbox, SubscribeOptions, Subscription, SubscriptionEntry, SubscriptionId,
    SubscriptionInfo, SubscriptionRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evr_core::{
    matcher_for_cache_size, Clock, DeliveryMode, Event, EventBuilder, EventPattern, IdGen,
    MatcherStats, PatternMatcher, RouterConfig, SystemClock, UuidIdGen,
};
use evr_storage::EventStore;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::Instrument;

/// Event type published after each delivery when confirmations are enabled
pub const DELIVERY_CONFIRMATION_TYPE: &str = "system.delivery.confirmation";

/// Source of events the router itself publishes
pub const ROUTER_SOURCE: &str = "event-router";

/// Priority of the store subscription (runs before everything else)
pub const STORE_PRIORITY: i32 = i32::MAX;

/// Whether a publish call requires the event to be persisted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Persistence {
    /// The store subscription records the event; failures are dead-lettered
    #[default]
    BestEffort,
    /// Write to the attached store before dispatch; fail the call if that fails
    Required,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub mode: DeliveryMode,
    pub persistence: Persistence,
}

impl PublishOptions {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            persistence: Persistence::BestEffort,
        }
    }

    pub fn persist(mut self) -> Self {
        self.persistence = Persistence::Required;
        self
    }
}

/// What one publish call did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscriptions selected for this event
    pub matched: usize,
    /// Sync deliveries that succeeded
    pub delivered: usize,
    /// Sync deliveries that failed after retries
    pub failed: usize,
    /// Async deliveries handed to mailboxes
    pub scheduled: usize,
}

/// A delivery that failed after all retries
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub event: Event,
    pub subscription_id: SubscriptionId,
    pub subscription_name: Option<String>,
    pub error: HandlerError,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Callback run for each delivery that fails after all retries
pub type FailureCallback = Arc<dyn Fn(&DeadLetter) + Send + Sync>;

/// Handle for removing a callback added with
/// [`EventRouter::on_delivery_failure`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FailureHandlerId(u64);

/// Outcome of [`EventRouter::redeliver_dead_letters`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Letters whose subscription no longer exists
    pub orphaned: usize,
}

/// Router counters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouterStats {
    pub published: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub sync_deliveries: u64,
    pub async_deliveries: u64,
    pub dead_letters: u64,
    pub pending_dead_letters: usize,
    pub persistence_failures: u64,
    pub total_subscriptions: usize,
    pub active_subscriptions: usize,
    pub matcher: MatcherStats,
}

impl RouterStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_deliveries + self.failed_deliveries;
        if total == 0 {
            1.0
        } else {
            self.successful_deliveries as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    sync_deliveries: AtomicU64,
    async_deliveries: AtomicU64,
    dead_letters: AtomicU64,
    persistence_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Object-safe view of an [`IdGen`]
trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
    fn next_correlation(&self) -> String;
}

impl<G: IdGen> IdSource for G {
    fn next_id(&self) -> String {
        self.next()
    }

    fn next_correlation(&self) -> String {
        IdGen::next_correlation(self)
    }
}

type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub(crate) type PublishFuture<'a> =
    Pin<Box<dyn Future<Output = Result<DeliveryReport, PublishError>> + Send + 'a>>;

pub(crate) struct RouterInner {
    config: RouterConfig,
    registry: SubscriptionRegistry,
    matcher: Box<dyn PatternMatcher>,
    store: RwLock<Option<(Arc<dyn EventStore>, SubscriptionId)>>,
    counters: Counters,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    failure_handlers: RwLock<Vec<(FailureHandlerId, FailureCallback)>>,
    next_failure_handler: AtomicU64,
    workers: Arc<Semaphore>,
    pending: AtomicUsize,
    idle: Notify,
    now: NowFn,
    ids: Box<dyn IdSource>,
    hooks: HookTriggerAdapter,
    self_ref: Weak<RouterInner>,
}

/// Publish/subscribe router. Cloning shares the same router.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

/// Non-owning router reference held by router-owned subscribers
#[derive(Clone)]
pub struct WeakRouter(Weak<RouterInner>);

impl WeakRouter {
    pub fn upgrade(&self) -> Option<EventRouter> {
        self.0.upgrade().map(|inner| EventRouter { inner })
    }
}

/// Builder for [`EventRouter`]
pub struct RouterBuilder {
    config: RouterConfig,
    now: NowFn,
    ids: Box<dyn IdSource>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        let clock = SystemClock;
        Self {
            config: RouterConfig::default(),
            now: Arc::new(move || clock.now()),
            ids: Box::new(UuidIdGen),
        }
    }
}

impl RouterBuilder {
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.now = Arc::new(move || clock.now());
        self
    }

    pub fn id_gen(mut self, id_gen: impl IdGen) -> Self {
        self.ids = Box::new(id_gen);
        self
    }

    pub fn build(self) -> EventRouter {
        let RouterBuilder { config, now, ids } = self;
        let inner = Arc::new_cyclic(|weak: &Weak<RouterInner>| RouterInner {
            matcher: matcher_for_cache_size(config.matcher_cache_size),
            workers: Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1))),
            config,
            registry: SubscriptionRegistry::default(),
            store: RwLock::new(None),
            counters: Counters::default(),
            dead_letters: Mutex::new(VecDeque::new()),
            failure_handlers: RwLock::new(Vec::new()),
            next_failure_handler: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            now,
            ids,
            hooks: HookTriggerAdapter::new(WeakRouter(weak.clone())),
            self_ref: weak.clone(),
        });
        EventRouter { inner }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Current time from the router's clock
    pub fn now(&self) -> DateTime<Utc> {
        (self.inner.now)()
    }

    /// Fresh id from the router's id generator
    pub fn next_id(&self) -> String {
        self.inner.ids.next_id()
    }

    /// Fresh `corr_` correlation id
    pub fn next_correlation_id(&self) -> String {
        self.inner.ids.next_correlation()
    }

    /// Subscribe with default options
    pub fn subscribe(
        &self,
        pattern: EventPattern,
        handler: impl EventHandler + 'static,
        mode: DeliveryMode,
    ) -> Result<Subscription, SubscriptionError> {
        self.subscribe_with(pattern, handler, SubscribeOptions::new(mode))
    }

    /// Subscribe to a type pattern given as a string
    pub fn subscribe_type(
        &self,
        pattern: &str,
        handler: impl EventHandler + 'static,
        mode: DeliveryMode,
    ) -> Result<Subscription, SubscriptionError> {
        let pattern = EventPattern::new(pattern)?;
        self.subscribe(pattern, handler, mode)
    }

    pub fn subscribe_with(
        &self,
        pattern: EventPattern,
        handler: impl EventHandler + 'static,
        options: SubscribeOptions,
    ) -> Result<Subscription, SubscriptionError> {
        self.inner
            .add_subscription(pattern, Arc::new(handler), options, false)
    }

    /// Register a router-owned subscriber: no handler timeout, no
    /// delivery confirmations
    pub(crate) fn subscribe_internal(
        &self,
        pattern: EventPattern,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<Subscription, SubscriptionError> {
        self.inner.add_subscription(pattern, handler, options, true)
    }

    /// Deactivate and remove a subscription. Returns false if it was
    /// already gone; calling twice is harmless.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.inner.registry.remove_where(|e| &e.id == id);
        let mut was_active = false;
        for entry in removed {
            was_active |= entry.deactivate();
        }
        if was_active {
            self.inner.matcher.invalidate();
            tracing::debug!(subscription_id = %id, "unsubscribed");
        }
        was_active
    }

    /// Stop deliveries to a subscription until resumed
    pub fn pause(&self, id: &SubscriptionId) -> bool {
        match self.inner.registry.get(id) {
            Some(entry) => {
                entry.set_paused(true);
                true
            }
            None => false,
        }
    }

    pub fn resume(&self, id: &SubscriptionId) -> bool {
        match self.inner.registry.get(id) {
            Some(entry) => {
                entry.set_paused(false);
                true
            }
            None => false,
        }
    }

    pub fn subscription(&self, id: &SubscriptionId) -> Option<SubscriptionInfo> {
        self.inner.registry.get(id).map(|e| e.info())
    }

    /// Every registered subscription, in delivery order
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner
            .registry
            .snapshot()
            .iter()
            .map(|e| e.info())
            .collect()
    }

    /// Subscriptions that would receive a matching event right now
    pub fn active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let now = self.now();
        self.inner
            .registry
            .snapshot()
            .iter()
            .filter(|e| e.is_deliverable(now))
            .map(|e| e.info())
            .collect()
    }

    /// Remove subscriptions past their ttl or `max_events`
    pub fn cleanup_expired_subscriptions(&self) -> usize {
        let now = self.now();
        let removed = self
            .inner
            .registry
            .remove_where(|e| e.is_expired(now) || !e.is_active());
        for entry in &removed {
            entry.deactivate();
            tracing::debug!(subscription_id = %entry.id, "removed expired subscription");
        }
        if !removed.is_empty() {
            self.inner.matcher.invalidate();
        }
        removed.len()
    }

    /// Route every event to `store` through a subscription that runs
    /// before all others. Replaces any previously attached store.
    pub fn attach_store(&self, store: Arc<dyn EventStore>) -> Result<Subscription, SubscriptionError> {
        self.detach_store();
        let subscription = self.subscribe_internal(
            EventPattern::any(),
            Arc::new(StoreSubscriber {
                store: Arc::clone(&store),
            }),
            SubscribeOptions::new(DeliveryMode::Sync)
                .priority(STORE_PRIORITY)
                .name("event-store"),
        )?;
        let mut slot = self.inner.store.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some((store, subscription.id.clone()));
        Ok(subscription)
    }

    pub fn detach_store(&self) -> Option<Arc<dyn EventStore>> {
        let previous = self
            .inner
            .store
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        previous.map(|(store, id)| {
            self.unsubscribe(&id);
            store
        })
    }

    pub fn store(&self) -> Option<Arc<dyn EventStore>> {
        self.inner.store()
    }

    /// Best-effort publish
    pub async fn publish(
        &self,
        event: Event,
        mode: DeliveryMode,
    ) -> Result<DeliveryReport, PublishError> {
        self.publish_with(event, PublishOptions::new(mode)).await
    }

    /// Publish to every matching active subscription.
    ///
    /// Handler failures never fail the call; only a required store write
    /// that fails does.
    pub async fn publish_with(
        &self,
        event: Event,
        options: PublishOptions,
    ) -> Result<DeliveryReport, PublishError> {
        self.inner.publish_boxed(event, options).await
    }

    /// Wait until every scheduled async delivery (including ones scheduled
    /// by those deliveries) has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    /// Run `callback` for every delivery that fails after its retries,
    /// whether or not the dead-letter buffer keeps it. A panicking callback
    /// is logged and does not affect the publisher.
    pub fn on_delivery_failure(
        &self,
        callback: impl Fn(&DeadLetter) + Send + Sync + 'static,
    ) -> FailureHandlerId {
        let id = FailureHandlerId(
            self.inner
                .next_failure_handler
                .fetch_add(1, Ordering::Relaxed),
        );
        self.inner
            .failure_handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns false if the callback was already removed
    pub fn remove_failure_handler(&self, id: FailureHandlerId) -> bool {
        let mut handlers = self
            .inner
            .failure_handlers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(handler, _)| *handler != id);
        handlers.len() != before
    }

    /// Retry every dead letter synchronously against its subscription
    pub async fn redeliver_dead_letters(&self) -> RedeliveryReport {
        let mut report = RedeliveryReport::default();
        for letter in self.drain_dead_letters() {
            match self.inner.registry.get(&letter.subscription_id) {
                Some(entry) if entry.is_active() => {
                    let span = tracing::info_span!(
                        "router.redeliver",
                        event_id = letter.event.id(),
                        subscription_id = %entry.id
                    );
                    let delivered = self
                        .inner
                        .deliver(&entry, &letter.event, DeliveryMode::Sync)
                        .instrument(span)
                        .await;
                    if delivered {
                        report.delivered += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                _ => {
                    tracing::warn!(
                        event_id = letter.event.id(),
                        subscription_id = %letter.subscription_id,
                        "dropping dead letter for removed subscription"
                    );
                    report.orphaned += 1;
                }
            }
        }
        report
    }

    pub fn stats(&self) -> RouterStats {
        let c = &self.inner.counters;
        let snapshot = self.inner.registry.snapshot();
        let now = self.now();
        RouterStats {
            published: c.published.load(Ordering::Relaxed),
            successful_deliveries: c.successful.load(Ordering::Relaxed),
            failed_deliveries: c.failed.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            sync_deliveries: c.sync_deliveries.load(Ordering::Relaxed),
            async_deliveries: c.async_deliveries.load(Ordering::Relaxed),
            dead_letters: c.dead_letters.load(Ordering::Relaxed),
            pending_dead_letters: self
                .inner
                .dead_letters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            persistence_failures: c.persistence_failures.load(Ordering::Relaxed),
            total_subscriptions: snapshot.len(),
            active_subscriptions: snapshot.iter().filter(|e| e.is_deliverable(now)).count(),
            matcher: self.inner.matcher.stats(),
        }
    }

    /// Subscribe an external hook; its outcomes come back as
    /// `hook.<name>.succeeded` / `hook.<name>.failed` events
    pub fn register_hook(&self, hook: Arc<dyn Hook>) -> Result<Subscription, HookAdapterError> {
        self.inner.hooks.register_hook(hook)
    }

    pub fn unregister_hook(&self, name: &str) -> Result<(), HookAdapterError> {
        self.inner.hooks.unregister_hook(name)
    }

    pub fn hooks(&self) -> &HookTriggerAdapter {
        &self.inner.hooks
    }
}

impl RouterInner {
    fn store(&self) -> Option<Arc<dyn EventStore>> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(store, _)| Arc::clone(store))
    }

    fn add_subscription(
        &self,
        pattern: EventPattern,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
        internal: bool,
    ) -> Result<Subscription, SubscriptionError> {
        if options.max_events == Some(0) {
            return Err(SubscriptionError::InvalidOptions(
                "max_events must be at least 1".to_string(),
            ));
        }
        if options.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(SubscriptionError::InvalidOptions(
                "ttl must be greater than zero".to_string(),
            ));
        }

        let params = EntryParams {
            id: SubscriptionId(self.ids.next_id()),
            pattern,
            handler,
            options,
            internal,
            now: (self.now)(),
        };
        let entry = Arc::new(SubscriptionEntry::new(params, self.registry.next_seq()));
        let subscription = entry.handle();
        self.registry.insert(entry);
        self.matcher.invalidate();

        tracing::debug!(
            subscription_id = %subscription.id,
            pattern = %subscription.pattern,
            mode = %subscription.mode,
            "subscribed"
        );
        Ok(subscription)
    }

    /// Type-erased publish. Deliveries publish follow-up events (delivery
    /// confirmations) through this, which keeps the recursion boxed.
    pub(crate) fn publish_boxed(&self, event: Event, options: PublishOptions) -> PublishFuture<'_> {
        let span = tracing::info_span!(
            "router.publish",
            event_id = event.id(),
            event_type = event.event_type()
        );
        Box::pin(self.dispatch(event, options).instrument(span))
    }

    async fn dispatch(
        &self,
        event: Event,
        options: PublishOptions,
    ) -> Result<DeliveryReport, PublishError> {
        bump(&self.counters.published);

        if options.persistence == Persistence::Required {
            let store = self.store().ok_or(PublishError::NoStore)?;
            if let Err(e) = store.store(&event) {
                bump(&self.counters.persistence_failures);
                tracing::error!(error = %e, "required persistence failed");
                return Err(e.into());
            }
        }

        let now = (self.now)();
        let snapshot = self.registry.snapshot();
        let mut report = DeliveryReport::default();

        for entry in snapshot.iter() {
            if !entry.is_deliverable(now) || !self.matcher.matches(&entry.pattern, &event) {
                continue;
            }
            if !entry.try_claim() {
                continue;
            }

            let async_delivery =
                entry.mode == DeliveryMode::Async || options.mode == DeliveryMode::Async;
            if async_delivery {
                if self.enqueue(entry, &event) {
                    bump(&self.counters.async_deliveries);
                    report.matched += 1;
                    report.scheduled += 1;
                }
            } else {
                bump(&self.counters.sync_deliveries);
                report.matched += 1;
                if self.deliver(entry, &event, DeliveryMode::Sync).await {
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        if report.matched == 0 {
            tracing::trace!("no matching subscriptions");
        }
        Ok(report)
    }

    /// Hand an event to the subscription's mailbox, starting its worker on
    /// first use and restarting it if it stopped. Returns false if the
    /// subscription no longer takes deliveries.
    fn enqueue(&self, entry: &Arc<SubscriptionEntry>, event: &Event) -> bool {
        let mut mailbox = entry.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        if let Mailbox::Open(tx) = &*mailbox {
            if tx.is_closed() {
                tracing::warn!(subscription_id = %entry.id, "mailbox worker stopped, restarting");
                *mailbox = Mailbox::Idle;
            }
        }
        if matches!(*mailbox, Mailbox::Idle) {
            let (tx, rx) = mpsc::unbounded_channel();
            let receiver = MailboxReceiver {
                router: self.self_ref.clone(),
                rx,
            };
            tokio::spawn(run_mailbox(Arc::clone(entry), receiver));
            *mailbox = Mailbox::Open(tx);
        }
        let Mailbox::Open(tx) = &*mailbox else {
            return false;
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(event.clone()).is_ok() {
            return true;
        }
        self.finish_pending();
        bump(&entry.failed);
        bump(&self.counters.failed);
        tracing::error!(
            subscription_id = %entry.id,
            event_id = event.id(),
            "mailbox rejected event"
        );
        self.dead_letter(
            entry,
            event,
            HandlerError::failed("subscription mailbox is closed"),
            0,
        );
        false
    }

    fn finish_pending(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Run the handler with retries. Returns true on success.
    async fn deliver(&self, entry: &SubscriptionEntry, event: &Event, mode: DeliveryMode) -> bool {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts();
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            match self.invoke(entry, event).await {
                Ok(()) => break Ok(()),
                Err(e) => {
                    if e.is_timeout() {
                        bump(&self.counters.timeouts);
                    }
                    if attempts >= max_attempts {
                        break Err(e);
                    }
                    bump(&self.counters.retries);
                    let delay = retry.backoff(attempts);
                    tracing::warn!(
                        subscription_id = %entry.id,
                        event_id = event.id(),
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        match &outcome {
            Ok(()) => {
                bump(&entry.delivered);
                bump(&self.counters.successful);
                tracing::trace!(subscription_id = %entry.id, "delivered");
            }
            Err(e) => {
                bump(&entry.failed);
                bump(&self.counters.failed);
                tracing::error!(
                    subscription_id = %entry.id,
                    event_id = event.id(),
                    attempts,
                    error = %e,
                    "delivery failed"
                );
                self.dead_letter(entry, event, e.clone(), attempts);
            }
        }

        if self.config.delivery_confirmation
            && !entry.internal
            && event.event_type() != DELIVERY_CONFIRMATION_TYPE
        {
            self.confirm(entry, event, outcome.as_ref().err(), mode).await;
        }

        outcome.is_ok()
    }

    /// Run the handler in its own task so a panic comes back as
    /// [`HandlerError::Panicked`] instead of unwinding into the publisher
    async fn invoke(&self, entry: &SubscriptionEntry, event: &Event) -> Result<(), HandlerError> {
        let handler = Arc::clone(&entry.handler);
        let event = event.clone();
        let task = tokio::spawn(async move { handler.handle(&event).await }.in_current_span());
        let _abort = AbortOnDrop(task.abort_handle());

        let joined = if entry.internal {
            task.await
        } else {
            let timeout = self.config.handler_timeout;
            match tokio::time::timeout(timeout, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(HandlerError::Timeout(timeout)),
            }
        };
        joined.unwrap_or_else(|e| Err(join_failure(e)))
    }

    fn dead_letter(&self, entry: &SubscriptionEntry, event: &Event, error: HandlerError, attempts: u32) {
        let letter = DeadLetter {
            event: event.clone(),
            subscription_id: entry.id.clone(),
            subscription_name: entry.name.clone(),
            error,
            attempts,
            failed_at: (self.now)(),
        };
        self.notify_failure(&letter);

        let capacity = self.config.dead_letter_capacity;
        if capacity == 0 {
            return;
        }
        let mut letters = self.dead_letters.lock().unwrap_or_else(|e| e.into_inner());
        while letters.len() >= capacity {
            letters.pop_front();
        }
        letters.push_back(letter);
        bump(&self.counters.dead_letters);
    }

    fn notify_failure(&self, letter: &DeadLetter) {
        let callbacks: Vec<FailureCallback> = self
            .failure_handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(letter))).is_err() {
                tracing::error!(
                    subscription_id = %letter.subscription_id,
                    event_id = letter.event.id(),
                    "delivery failure callback panicked"
                );
            }
        }
    }

    async fn confirm(
        &self,
        entry: &SubscriptionEntry,
        event: &Event,
        error: Option<&HandlerError>,
        mode: DeliveryMode,
    ) {
        let mut builder = EventBuilder::new(DELIVERY_CONFIRMATION_TYPE, ROUTER_SOURCE)
            .id(self.ids.next_id())
            .timestamp((self.now)())
            .causation_id(event.id())
            .with("event_id", event.id())
            .with("event_type", event.event_type())
            .with("subscription_id", entry.id.0.clone())
            .with("success", error.is_none())
            .with("error", error.map(|e| e.to_string()));
        if let Some(correlation_id) = event.correlation_id() {
            builder = builder.correlation_id(correlation_id);
        }

        let confirmation = match builder.build() {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build delivery confirmation");
                return;
            }
        };
        if let Err(e) = self
            .publish_boxed(confirmation, PublishOptions::new(mode))
            .await
        {
            tracing::warn!(error = %e, "failed to publish delivery confirmation");
        }
    }
}

impl Drop for RouterInner {
    fn drop(&mut self) {
        for entry in self.registry.snapshot().iter() {
            entry.close_mailbox();
        }
    }
}

/// Cancels a handler task when its delivery is dropped or times out
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn join_failure(error: tokio::task::JoinError) -> HandlerError {
    if !error.is_panic() {
        return HandlerError::failed("handler task was cancelled");
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    HandlerError::Panicked(message)
}

/// Releases one pending delivery when dropped
struct PendingSlot(Arc<RouterInner>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.finish_pending();
    }
}

/// Receiving end of a mailbox. Events still queued when the worker exits
/// release their pending slots so `wait_idle` cannot hang on them.
struct MailboxReceiver {
    router: Weak<RouterInner>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Drop for MailboxReceiver {
    fn drop(&mut self) {
        self.rx.close();
        let Some(inner) = self.router.upgrade() else {
            return;
        };
        while self.rx.try_recv().is_ok() {
            inner.finish_pending();
        }
    }
}

/// Worker draining one subscription's mailbox in order
async fn run_mailbox(entry: Arc<SubscriptionEntry>, mut mailbox: MailboxReceiver) {
    while let Some(event) = mailbox.rx.recv().await {
        let Some(inner) = mailbox.router.upgrade() else {
            break;
        };
        let _slot = PendingSlot(Arc::clone(&inner));
        let permit = Arc::clone(&inner.workers).acquire_owned().await.ok();
        let span = tracing::info_span!(
            "router.deliver",
            event_id = event.id(),
            event_type = event.event_type(),
            subscription_id = %entry.id
        );
        inner
            .deliver(&entry, &event, DeliveryMode::Async)
            .instrument(span)
            .await;
        drop(permit);
    }
}

/// Internal subscriber writing every event to the attached store
struct StoreSubscriber {
    store: Arc<dyn EventStore>,
}

#[async_trait]
impl EventHandler for StoreSubscriber {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.store
            .store(event)
            .map(|_| ())
            .map_err(HandlerError::failed)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
