// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook that runs an external command per event

use async_trait::async_trait;
use evr_core::{DeliveryMode, Event, EventPattern};
use evr_engine::{Hook, HookError, HookOutput};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default limit on a single command run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `program` with the event JSON on stdin.
///
/// Exit status 0 is success; the output payload carries `stdout`, `stderr`
/// and `exit_code`. The event id and type are also exported as
/// `EVR_EVENT_ID` and `EVR_EVENT_TYPE`.
#[derive(Clone, Debug)]
pub struct CommandHook {
    name: String,
    pattern: EventPattern,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    mode: DeliveryMode,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, pattern: EventPattern, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            mode: DeliveryMode::Async,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Hook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> EventPattern {
        self.pattern.clone()
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    fn execution_timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn execute(&self, event: &Event) -> Result<HookOutput, HookError> {
        let input = event.to_json().map_err(HookError::failed)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("EVR_EVENT_ID", event.id())
            .env("EVR_EVENT_TYPE", event.event_type())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| HookError::failed(format!("failed to spawn {}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The command may exit without reading its input
                let _ = stdin.write_all(input.as_bytes()).await;
            }
        };
        let run = async move { tokio::join!(feed, child.wait_with_output()).1 };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result.map_err(HookError::failed)?,
            Err(_) => return Err(HookError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(HookOutput::default()
                .with("stdout", stdout)
                .with("stderr", stderr)
                .with("exit_code", output.status.code()))
        } else {
            Err(HookError::Exited {
                code: output.status.code(),
                stderr: stderr.trim_end().to_string(),
            })
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
