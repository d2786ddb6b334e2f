// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr publish <type>` - append one event through the router

use super::parse_assignment;
use crate::context::Context;
use anyhow::{bail, Result};
use clap::Args;
use evr_core::{DeliveryMode, Event, Payload};
use evr_engine::{Correlator, PublishOptions};
use serde_json::Value;

#[derive(Args)]
pub struct PublishArgs {
    /// Event type, e.g. `order.paid`
    pub event_type: String,

    /// Component the event comes from
    #[arg(long, default_value = "evr")]
    pub source: String,

    /// Payload as a JSON object
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Metadata entry KEY=VALUE (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,

    /// Join an existing correlation chain
    #[arg(long)]
    pub correlation: Option<String>,

    /// Id of the event that caused this one
    #[arg(long)]
    pub causation: Option<String>,
}

fn parse_payload(raw: &str) -> Result<Payload> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("payload must be a JSON object, got {}", other),
    }
}

pub async fn handle(args: PublishArgs, ctx: &Context) -> Result<()> {
    let payload = parse_payload(&args.payload)?;
    let store = ctx.open_writable()?;

    let router = ctx.router();
    router.attach_store(store.clone())?;
    Correlator::attach(&router, store)?;
    ctx.register_hooks(&router)?;

    let mut builder = Event::builder(args.event_type, args.source)
        .id(router.next_id())
        .timestamp(router.now())
        .payload(payload);
    for entry in &args.metadata {
        let (key, value) = parse_assignment(entry)?;
        builder = builder.meta(key, value);
    }
    if let Some(id) = args.correlation {
        builder = builder.correlation_id(id);
    }
    if let Some(id) = args.causation {
        builder = builder.causation_id(id);
    }
    let event = builder.build()?;

    let report = router
        .publish_with(event.clone(), PublishOptions::new(DeliveryMode::Sync).persist())
        .await?;
    router.wait_idle().await;

    tracing::info!(event_id = event.id(), matched = report.matched, "published");
    println!("{}", event.id());
    Ok(())
}
