// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod chain;
pub mod publish;
pub mod query;
pub mod replay;
pub mod retain;
pub mod show;
pub mod stats;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Parse an RFC 3339 timestamp such as `2026-05-04T10:00:00Z`
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(e) => bail!("invalid timestamp '{}': {} (expected RFC 3339)", s, e),
    }
}

/// Split `path=value`; the value is JSON when it parses, a string otherwise
pub fn parse_assignment(s: &str) -> Result<(String, Value)> {
    let Some((path, raw)) = s.split_once('=') else {
        bail!("expected PATH=VALUE, got '{}'", s);
    };
    let path = path.trim();
    if path.is_empty() {
        bail!("empty path in '{}'", s);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path.to_string(), value))
}
