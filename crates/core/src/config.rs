// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration file (`evr.toml`)
//!
//! ```toml
//! [router]
//! handler_timeout = "30s"
//! max_concurrent_deliveries = 10
//!
//! [router.retry]
//! max_retries = 3
//! initial_backoff = "100ms"
//!
//! [store]
//! path = "events.jsonl"
//!
//! [store.retention]
//! max_age = "7d"
//!
//! [replay]
//! on_error = "abort"
//!
//! [[hooks]]
//! name = "page-oncall"
//! pattern = "container.*.unhealthy"
//! command = ["./page.sh", "--team", "infra"]
//! timeout = "10s"
//! ```

use crate::delivery::DeliveryMode;
use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvrConfig {
    pub router: RouterConfig,
    pub store: StoreConfig,
    pub replay: ReplayConfig,
    pub hooks: Vec<HookConfig>,
}

impl EvrConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Read a config file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EvrConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.max_concurrent_deliveries == 0 {
            return Err(ConfigError::Invalid(
                "router.max_concurrent_deliveries must be at least 1".to_string(),
            ));
        }
        if self.router.handler_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "router.handler_timeout must be greater than zero".to_string(),
            ));
        }
        if self.router.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "router.retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        let mut names = std::collections::HashSet::new();
        for hook in &self.hooks {
            hook.validate()?;
            if !names.insert(hook.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "hook '{}' is defined twice",
                    hook.name
                )));
            }
        }
        Ok(())
    }
}

/// Router dispatch settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-handler timeout; exceeding it counts as a handler failure
    #[serde(with = "humantime_serde")]
    pub handler_timeout: Duration,
    /// Async worker-pool bound
    pub max_concurrent_deliveries: usize,
    /// Type-match cache entries (0 disables caching)
    pub matcher_cache_size: usize,
    pub dead_letter_capacity: usize,
    /// Publish `system.delivery.confirmation` after each delivery
    pub delivery_confirmation: bool,
    pub retry: RetryPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            max_concurrent_deliveries: 10,
            matcher_cache_size: 1000,
            dead_letter_capacity: 1000,
            delivery_confirmation: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries)
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    /// Retry `max_retries` times with the default backoff
    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }
}

/// Event store settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSONL event log; absent means in-memory
    pub path: Option<PathBuf>,
    pub retention: RetentionPolicy,
}

/// What a replay run does when one event fails to republish
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayErrorPolicy {
    /// Log, count as skipped and continue
    #[default]
    Skip,
    /// Stop the run with an error
    Abort,
}

/// Replayer settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub on_error: ReplayErrorPolicy,
    pub delivery_mode: DeliveryMode,
    /// Also replay events that were themselves replays
    pub include_replayed: bool,
}

/// An external command run for matching events
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    pub name: String,
    /// Type pattern the hook fires on
    pub pattern: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
    #[serde(default = "default_hook_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_hook_mode")]
    pub mode: DeliveryMode,
}

fn default_hook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_hook_mode() -> DeliveryMode {
    DeliveryMode::Async
}

impl HookConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("hook name must not be empty".to_string()));
        }
        match self.command.first() {
            Some(program) if !program.is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "hook '{}' has no command",
                    self.name
                )))
            }
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "hook '{}' timeout must be greater than zero",
                self.name
            )));
        }
        crate::pattern::TypePattern::parse(&self.pattern).map_err(|e| {
            ConfigError::Invalid(format!("hook '{}': {}", self.name, e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
