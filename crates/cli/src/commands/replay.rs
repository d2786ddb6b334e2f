// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr replay` - republish history and print what comes out

use super::parse_time;
use crate::context::Context;
use crate::error::CliError;
use anyhow::{Context as _, Result};
use clap::Args;
use evr_core::{DeliveryMode, Event, EventPattern};
use evr_engine::{handler_fn, CancellationFlag, HandlerError, ReplayOptions, Replayer};
use evr_storage::EventFilter;

#[derive(Args)]
pub struct ReplayArgs {
    /// Replay one correlation chain
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub correlation: Option<String>,

    /// Start of the time window (RFC 3339, inclusive)
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End of the time window (RFC 3339, inclusive)
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Restrict the window to matching event types
    #[arg(long)]
    pub type_pattern: Option<String>,

    /// 0 replays as fast as possible; 1 keeps the original pacing; 10 is
    /// ten times faster
    #[arg(long, default_value_t = 0.0)]
    pub speed: f64,

    /// Append the replayed copies to the log
    #[arg(long)]
    pub record: bool,
}

pub async fn handle(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let store = if args.record {
        ctx.open_writable()?
    } else {
        ctx.open_read_only()?
    };

    let router = ctx.router();
    if args.record {
        router.attach_store(store.clone())?;
    }
    ctx.register_hooks(&router)?;
    // Hook outcomes flow through the same router; only the copies are printed
    router.subscribe(
        EventPattern::any(),
        handler_fn(|event: Event| async move {
            if !event.is_replay() {
                return Ok(());
            }
            let line = event.to_json().map_err(HandlerError::failed)?;
            println!("{}", line);
            Ok::<(), HandlerError>(())
        }),
        DeliveryMode::Sync,
    )?;

    let cancel = CancellationFlag::new();
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, stopping replay");
        flag.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let mut options = ReplayOptions::new().speed(args.speed).cancel_with(cancel);
    if let Some(pattern) = &args.type_pattern {
        options = options.filter(EventFilter::new().type_pattern(pattern)?);
    }
    if args.record {
        options = options.persist();
    }

    let replayer = Replayer::new(router.clone(), store).with_config(ctx.config.replay.clone());
    let report = match (&args.correlation, &args.from, &args.to) {
        (Some(correlation), _, _) => replayer.replay_by_correlation_id(correlation, options).await?,
        (None, Some(from), Some(to)) => {
            replayer
                .replay_by_time_range(parse_time(from)?, parse_time(to)?, options)
                .await?
        }
        _ => return Err(CliError::no_replay_selection().into()),
    };
    router.wait_idle().await;

    eprintln!(
        "replay {}: {} replayed, {} skipped, {} failed deliveries{}",
        report.run_id,
        report.replayed,
        report.skipped,
        report.failed_deliveries,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
