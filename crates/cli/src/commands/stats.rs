// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr stats` - summarize the log

use crate::context::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use evr_storage::StoreStats;
use serde::Serialize;
use std::fmt;

#[derive(Args)]
pub struct StatsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(transparent)]
struct StatsView(StoreStats);

impl fmt::Display for StatsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.0;
        writeln!(f, "Events:   {} ({} replayed)", s.total, s.replayed)?;
        writeln!(f, "Oldest:   {}", time(s.oldest))?;
        write!(f, "Newest:   {}", time(s.newest))?;
        if !s.by_type.is_empty() {
            write!(f, "\n\nBy type:")?;
            for (event_type, count) in &s.by_type {
                write!(f, "\n  {:<32} {}", event_type, count)?;
            }
        }
        if !s.by_source.is_empty() {
            write!(f, "\n\nBy source:")?;
            for (source, count) in &s.by_source {
                write!(f, "\n  {:<32} {}", source, count)?;
            }
        }
        Ok(())
    }
}

fn time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(
        || "-".to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

pub fn handle(args: StatsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_read_only()?;
    let stats = StatsView(store.stats()?);
    output::print(&stats, OutputFormat::from_json_flag(args.json))
}
