// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr chain <id>` - follow correlation or causation links

use crate::context::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use evr_engine::Correlator;

#[derive(Args)]
pub struct ChainArgs {
    /// Correlation id, or an event id with --causes
    pub id: String,

    /// Walk causation links back from an event to its root cause
    #[arg(long)]
    pub causes: bool,

    /// One JSON object per line
    #[arg(long)]
    pub json: bool,
}

pub fn handle(args: ChainArgs, ctx: &Context) -> Result<()> {
    let router = ctx.router();
    let correlator = Correlator::attach(&router, ctx.open_read_only()?)?;

    let events = if args.causes {
        correlator.get_causation_chain(&args.id)?
    } else {
        correlator.get_correlation_chain(&args.id)?
    };
    output::print_events(&events, OutputFormat::from_json_flag(args.json))
}
