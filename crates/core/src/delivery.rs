// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an event reaches a subscriber.
///
/// `Sync` runs the handler inline with the publish call; `Async` hands the
/// event to the subscriber's mailbox and returns immediately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Sync,
    Async,
}

impl DeliveryMode {
    pub fn is_sync(self) -> bool {
        self == DeliveryMode::Sync
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Sync => "sync",
            DeliveryMode::Async => "async",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(DeliveryMode::Sync),
            "async" => Ok(DeliveryMode::Async),
            other => Err(format!(
                "invalid delivery mode: {}. Valid modes are: sync, async",
                other
            )),
        }
    }
}
