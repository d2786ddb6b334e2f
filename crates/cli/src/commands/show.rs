// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `evr show <id>` - print one event

use crate::context::Context;
use crate::error::CliError;
use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct ShowArgs {
    /// Event id
    pub id: String,
}

pub fn handle(args: ShowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_read_only()?;
    let event = store
        .get_event_by_id(&args.id)?
        .ok_or_else(|| CliError::event_not_found(&args.id))?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
