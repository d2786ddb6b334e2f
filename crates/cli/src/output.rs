// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use chrono::SecondsFormat;
use clap::ValueEnum;
use evr_core::Event;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Print a value as text or pretty JSON
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Print events as a table, or as one JSON object per line
pub fn print_events(events: &[Event], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            if events.is_empty() {
                println!("No events");
                return Ok(());
            }
            println!(
                "{:<24} {:<36} {:<28} {:<16} CORRELATION",
                "TIMESTAMP", "ID", "TYPE", "SOURCE"
            );
            for event in events {
                println!("{}", EventRow(event));
            }
        }
        OutputFormat::Json => {
            for event in events {
                println!("{}", event.to_json()?);
            }
        }
    }
    Ok(())
}

/// One table line
pub struct EventRow<'a>(pub &'a Event);

impl fmt::Display for EventRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = self.0;
        let event_type = if e.is_replay() {
            format!("{} (replay)", e.event_type())
        } else {
            e.event_type().to_string()
        };
        write!(
            f,
            "{:<24} {:<36} {:<28} {:<16} {}",
            e.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true),
            e.id(),
            event_type,
            e.source(),
            e.correlation_id().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn row_shows_replay_marker_and_missing_correlation() {
        let event = Event::builder("order.paid", "shop")
            .id("evt-1")
            .timestamp(Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap())
            .build()
            .unwrap()
            .derive()
            .keep_id()
            .replay_of("run-1")
            .finish();

        let row = EventRow(&event).to_string();

        assert!(row.starts_with("2026-05-04T10:00:00.000Z"));
        assert!(row.contains("order.paid (replay)"));
        assert!(row.trim_end().ends_with('-'));
    }
}
