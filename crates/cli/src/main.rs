// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! evr - inspect, query, replay and trim an event log

mod commands;
mod context;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{chain, publish, query, replay, retain, show, stats};
use context::Context;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evr", version, about = "Event router log tooling")]
struct Cli {
    /// Config file (default: ./evr.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Event log (JSON lines); overrides `store.path`
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Diagnostic filter for stderr, e.g. `info` or `evr_engine=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one event as JSON
    Show(show::ShowArgs),
    /// List events matching a filter
    Query(query::QueryArgs),
    /// Print a correlation (or causation) chain in order
    Chain(chain::ChainArgs),
    /// Summarize the log
    Stats(stats::StatsArgs),
    /// Apply or preview the retention policy
    Retain(retain::RetainArgs),
    /// Republish stored events as replays
    Replay(replay::ReplayArgs),
    /// Append one event through a router with the log and correlator attached
    Publish(publish::PublishArgs),
}

/// Diagnostics go to stderr so stdout stays machine readable
fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let ctx = Context::load(cli.config.as_deref(), cli.log)?;

    match cli.command {
        Commands::Show(args) => show::handle(args, &ctx),
        Commands::Query(args) => query::handle(args, &ctx),
        Commands::Chain(args) => chain::handle(args, &ctx),
        Commands::Stats(args) => stats::handle(args, &ctx),
        Commands::Retain(args) => retain::handle(args, &ctx),
        Commands::Replay(args) => replay::handle(args, &ctx).await,
        Commands::Publish(args) => publish::handle(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn replay_rejects_correlation_with_time_window() {
        let parsed = Cli::try_parse_from([
            "evr",
            "replay",
            "--correlation",
            "corr_000000000001",
            "--from",
            "2026-05-04T10:00:00Z",
            "--to",
            "2026-05-04T11:00:00Z",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["evr", "stats", "--log", "events.jsonl"]).unwrap();
        assert_eq!(cli.log, Some(PathBuf::from("events.jsonl")));
        assert!(matches!(cli.command, Commands::Stats(_)));
    }
}
