// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved configuration and access to the event log

use crate::error::CliError;
use anyhow::{Context as _, Result};
use evr_adapters::{CommandHook, TracedHook};
use evr_core::{EventPattern, EvrConfig};
use evr_engine::EventRouter;
use evr_storage::{EventStore, JsonlEventStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "evr.toml";

pub struct Context {
    pub config: EvrConfig,
    log_path: Option<PathBuf>,
}

impl Context {
    /// Load config and decide which log to use; `--log` wins over `store.path`
    pub fn load(config: Option<&Path>, log: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(path) => EvrConfig::load(path)?,
            None => EvrConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
        };
        let log_path = log.or_else(|| config.store.path.clone());
        tracing::debug!(log = ?log_path, "resolved event log");
        Ok(Self { config, log_path })
    }

    pub fn log_path(&self) -> Result<&Path, CliError> {
        self.log_path.as_deref().ok_or_else(CliError::no_log)
    }

    /// Open the log for queries without taking the writer lock
    pub fn open_read_only(&self) -> Result<Arc<dyn EventStore>> {
        let path = self.log_path()?;
        let store = JsonlEventStore::open_read_only(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Open the log for appends and retention
    pub fn open_writable(&self) -> Result<Arc<dyn EventStore>> {
        let path = self.log_path()?;
        match JsonlEventStore::open(path) {
            Ok(store) => Ok(Arc::new(store)),
            Err(StoreError::Locked(_)) => Err(CliError::log_locked(path).into()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("failed to open {}", path.display()))),
        }
    }

    /// A router built from the `[router]` section
    pub fn router(&self) -> EventRouter {
        EventRouter::new(self.config.router.clone())
    }

    /// Register every `[[hooks]]` entry as a traced command hook
    pub fn register_hooks(&self, router: &EventRouter) -> Result<usize> {
        for hook in &self.config.hooks {
            let Some((program, args)) = hook.command.split_first() else {
                anyhow::bail!("hook '{}' has no command", hook.name);
            };
            let pattern = EventPattern::new(&hook.pattern)
                .with_context(|| format!("hook '{}'", hook.name))?;
            let command = CommandHook::new(&hook.name, pattern, program)
                .args(args)
                .timeout(hook.timeout)
                .mode(hook.mode);
            router.register_hook(Arc::new(TracedHook::new(command)))?;
            tracing::debug!(hook = %hook.name, pattern = %hook.pattern, "registered hook");
        }
        Ok(self.config.hooks.len())
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
