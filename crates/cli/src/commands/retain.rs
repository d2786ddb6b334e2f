// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr retain` - enforce (or preview) the retention policy

use crate::context::Context;
use crate::error::CliError;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use evr_core::RetentionPolicy;
use evr_storage::RetentionReport;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Args, Default)]
pub struct RetainArgs {
    /// Remove events older than this, e.g. `7d` or `12h`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub max_age: Option<Duration>,

    /// Keep at most this many events of each type
    #[arg(long)]
    pub max_per_type: Option<usize>,

    /// Keep at most this many events overall
    #[arg(long)]
    pub max_count: Option<usize>,

    /// Report what would be removed without touching the log
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub json: bool,
}

impl RetainArgs {
    /// The configured policy with command-line limits layered on top
    pub fn policy(&self, configured: &RetentionPolicy) -> RetentionPolicy {
        let mut policy = configured.clone();
        if let Some(age) = self.max_age {
            policy = policy.max_age(age);
        }
        if let Some(cap) = self.max_per_type {
            policy = policy.max_per_type(cap);
        }
        if let Some(cap) = self.max_count {
            policy = policy.max_count(cap);
        }
        policy
    }
}

#[derive(Serialize)]
struct RetainView {
    dry_run: bool,
    #[serde(flatten)]
    report: RetentionReport,
}

impl fmt::Display for RetainView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        write!(
            f,
            "{} {} events ({} expired, {} over cap), {} remaining",
            verb,
            self.report.removed(),
            self.report.expired,
            self.report.capped,
            self.report.remaining
        )
    }
}

pub fn handle(args: RetainArgs, ctx: &Context) -> Result<()> {
    let policy = args.policy(&ctx.config.store.retention);
    if policy.is_unbounded() {
        return Err(CliError::no_retention_limits().into());
    }
    let format = OutputFormat::from_json_flag(args.json);

    let report = if args.dry_run {
        let plan = ctx.open_read_only()?.retention_preview(&policy, Utc::now())?;
        if format == OutputFormat::Text {
            for id in &plan.expired {
                println!("expired  {}", id);
            }
            for id in &plan.capped {
                println!("capped   {}", id);
            }
        }
        RetentionReport::from(&plan)
    } else {
        ctx.open_writable()?.apply_retention_policy(&policy)?
    };

    tracing::info!(
        dry_run = args.dry_run,
        expired = report.expired,
        capped = report.capped,
        remaining = report.remaining,
        "retention pass"
    );
    output::print(
        &RetainView {
            dry_run: args.dry_run,
            report,
        },
        format,
    )
}
