// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing errors with context and suggestions

use std::fmt;
use std::path::Path;

/// Error with context and recovery suggestions for display on stderr.
#[derive(Debug)]
pub struct CliError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Neither `--log` nor `store.path` names an event log
    pub fn no_log() -> Self {
        CliError::new("no event log configured")
            .with_suggestion("Pass one explicitly: evr --log events.jsonl <command>")
            .with_suggestion("Or set `path` under [store] in evr.toml")
    }

    /// A writer already holds the log lock
    pub fn log_locked(path: &Path) -> Self {
        CliError::new(format!("event log {} is in use", path.display()))
            .with_context("Another process holds the write lock on this log")
            .with_suggestion("Wait for the other writer to exit")
            .with_suggestion("Read-only commands (show, query, chain, stats) still work")
    }

    pub fn event_not_found(id: &str) -> Self {
        CliError::new(format!("event '{}' not found", id))
            .with_context("It may have been removed by retention")
            .with_suggestion("Search for it: evr query --limit 20 --desc")
    }

    /// `evr retain` with nothing to enforce
    pub fn no_retention_limits() -> Self {
        CliError::new("no retention limits configured")
            .with_suggestion("Pass a limit: evr retain --max-age 7d")
            .with_suggestion("Or add a [store.retention] section to evr.toml")
    }

    /// Neither a correlation id nor a time range was given to `evr replay`
    pub fn no_replay_selection() -> Self {
        CliError::new("nothing selected for replay")
            .with_suggestion("Replay one chain: evr replay --correlation <id>")
            .with_suggestion("Replay a window: evr replay --from <time> --to <time>")
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_context_and_numbered_suggestions() {
        let err = CliError::new("Something went wrong")
            .with_context("First context")
            .with_context("Second context")
            .with_suggestion("Try this")
            .with_suggestion("Or this");

        let output = err.to_string();
        assert!(output.starts_with("Something went wrong\n"));
        assert!(output.contains("-> First context"));
        assert!(output.contains("-> Second context"));
        assert!(output.contains("1. Try this"));
        assert!(output.contains("2. Or this"));
    }

    #[test]
    fn locked_log_names_the_path() {
        let output = CliError::log_locked(Path::new("/var/evr/events.jsonl")).to_string();
        assert!(output.contains("/var/evr/events.jsonl"));
        assert!(output.contains("write lock"));
    }

    #[test]
    fn missing_event_names_the_id() {
        let output = CliError::event_not_found("evt-42").to_string();
        assert!(output.contains("'evt-42' not found"));
    }
}
