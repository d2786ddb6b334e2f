// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr query` - filter the log

use super::{parse_assignment, parse_time};
use crate::context::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use evr_storage::EventFilter;

#[derive(Args, Default)]
pub struct QueryArgs {
    /// Exact event type
    #[arg(long = "type")]
    pub event_type: Option<String>,

    /// Event type wildcard, e.g. `container.*.unhealthy` or `order.**`
    #[arg(long)]
    pub type_pattern: Option<String>,

    #[arg(long)]
    pub source: Option<String>,

    /// Source wildcard, e.g. `agent.*.processor`
    #[arg(long)]
    pub source_pattern: Option<String>,

    #[arg(long)]
    pub correlation: Option<String>,

    /// Events directly caused by this event id
    #[arg(long)]
    pub causation: Option<String>,

    /// Earliest timestamp (RFC 3339, inclusive)
    #[arg(long)]
    pub since: Option<String>,

    /// Latest timestamp (RFC 3339, inclusive)
    #[arg(long)]
    pub until: Option<String>,

    /// Payload or metadata condition PATH=VALUE; VALUE may be JSON such as
    /// `{"$gte": 3}`. Prefix PATH with `metadata.` to match metadata.
    #[arg(long = "where", value_name = "PATH=VALUE")]
    pub conditions: Vec<String>,

    /// Case-insensitive text anywhere in payload or metadata values
    #[arg(long)]
    pub text: Option<String>,

    /// Only replayed events (true) or only originals (false)
    #[arg(long)]
    pub replayed: Option<bool>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Newest first
    #[arg(long)]
    pub desc: bool,

    /// Print only the number of matching events
    #[arg(long)]
    pub count: bool,

    /// One JSON object per line
    #[arg(long)]
    pub json: bool,
}

impl QueryArgs {
    pub fn filter(&self) -> Result<EventFilter> {
        let mut filter = EventFilter::new().offset(self.offset);
        if let Some(t) = &self.event_type {
            filter = filter.event_type(t);
        }
        if let Some(p) = &self.type_pattern {
            filter = filter.type_pattern(p)?;
        }
        if let Some(s) = &self.source {
            filter = filter.source(s);
        }
        if let Some(p) = &self.source_pattern {
            filter = filter.source_pattern(p)?;
        }
        if let Some(c) = &self.correlation {
            filter = filter.correlation_id(c);
        }
        if let Some(c) = &self.causation {
            filter = filter.causation_id(c);
        }
        if let Some(t) = &self.since {
            filter = filter.since(parse_time(t)?);
        }
        if let Some(t) = &self.until {
            filter = filter.until(parse_time(t)?);
        }
        for condition in &self.conditions {
            let (path, value) = parse_assignment(condition)?;
            filter = filter.where_path(&path, value)?;
        }
        if let Some(text) = &self.text {
            filter = filter.text(text);
        }
        if let Some(replayed) = self.replayed {
            filter = filter.replayed(replayed);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        if self.desc {
            filter = filter.descending();
        }
        Ok(filter)
    }
}

pub fn handle(args: QueryArgs, ctx: &Context) -> Result<()> {
    let filter = args.filter()?;
    let store = ctx.open_read_only()?;

    if args.count {
        println!("{}", store.count_events(&filter)?);
        return Ok(());
    }

    let events = store.query_events(&filter)?;
    output::print_events(&events, OutputFormat::from_json_flag(args.json))
}
