// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-lines event log
//!
//! One event object per line, appended and fsynced on every store. The whole
//! log is indexed in memory on open. A sidecar `<log>.lock` file holds an
//! exclusive advisory lock so only one process writes a log at a time.

use crate::index::EventIndex;
use crate::store::{EventFilter, EventStore, RetentionReport, StoreError, StoreStats};
use chrono::{DateTime, Utc};
use evr_core::{Event, RetentionPlan, RetentionPolicy};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

struct LogState {
    /// Append handle; `None` when opened read-only
    file: Option<File>,
    index: EventIndex,
}

/// File-backed event store
pub struct JsonlEventStore {
    path: PathBuf,
    state: RwLock<LogState>,
    // Held for the lifetime of a writable store
    _lock: Option<File>,
}

impl JsonlEventStore {
    /// Open or create a log for reading and writing.
    ///
    /// Fails with [`StoreError::Locked`] if another process has it open.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = File::create(lock_path(&path))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.clone()))?;
        let mut lock_file = lock_file;
        writeln!(lock_file, "{}", std::process::id())?;

        let loaded = load(&path)?;
        if let Some(valid_len) = loaded.truncate_to {
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), events = loaded.index.len(), "opened event log");

        Ok(Self {
            path,
            state: RwLock::new(LogState {
                file: Some(file),
                index: loaded.index,
            }),
            _lock: Some(lock_file),
        })
    }

    /// Open an existing log for queries only, without taking the lock.
    ///
    /// A missing file reads as an empty log. Writes fail with
    /// [`StoreError::ReadOnly`].
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let loaded = load(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(LogState {
                file: None,
                index: loaded.index,
            }),
            _lock: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .index
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the log with `events` via temp file + rename and return an
    /// append handle on the new log. The old log is untouched on failure.
    fn rewrite<'a>(&self, events: impl Iterator<Item = &'a Event>) -> Result<File, StoreError> {
        let tmp = sibling_path(&self.path, ".tmp");
        let result = write_log(&tmp, events).and_then(|()| {
            // Opened before the rename so the handle follows the new file
            let append = OpenOptions::new().append(true).open(&tmp)?;
            fs::rename(&tmp, &self.path)?;
            Ok(append)
        });
        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                tracing::debug!(path = %tmp.display(), error = %e, "temp log not removed");
            }
        }
        result
    }
}

/// Append target for log records
trait RecordSink: Write {
    fn committed_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl RecordSink for File {
    fn committed_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append one newline-terminated record and sync it. A failed write is cut
/// back so the log never keeps a partial record.
fn append_record(sink: &mut impl RecordSink, record: &[u8]) -> io::Result<()> {
    let committed = sink.committed_len()?;
    let Err(e) = sink.write_all(record).and_then(|()| sink.sync()) else {
        return Ok(());
    };
    if let Err(rollback) = sink.truncate_to(committed) {
        tracing::error!(error = %rollback, "failed to cut back partial event record");
    }
    Err(e)
}

fn write_log<'a>(path: &Path, events: impl Iterator<Item = &'a Event>) -> Result<(), StoreError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

impl EventStore for JsonlEventStore {
    fn store(&self, event: &Event) -> Result<bool, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.index.contains(event.id()) {
            tracing::debug!(event_id = event.id(), "duplicate event id, not stored");
            return Ok(false);
        }
        let mut record = serde_json::to_vec(event)?;
        record.push(b'\n');
        let file = state.file.as_mut().ok_or(StoreError::ReadOnly)?;
        append_record(file, &record)?;
        state.index.insert(event.clone());
        Ok(true)
    }

    fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.get(id).cloned())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.query(filter))
    }

    fn count_events(&self, filter: &EventFilter) -> Result<usize, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.count(filter))
    }

    fn event_types(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.event_types())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.index.stats())
    }

    fn apply_retention_policy_at(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, StoreError> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        if state.file.is_none() {
            return Err(StoreError::ReadOnly);
        }
        let plan = policy.plan(&state.index.snapshot(), now);
        let report = RetentionReport::from(&plan);
        if !plan.is_empty() {
            let removed = plan.removed();
            let kept = state.index.iter().filter(|e| !removed.contains(e.id()));
            state.file = Some(self.rewrite(kept)?);
            state.index.remove(&removed);
        }
        tracing::info!(
            path = %self.path.display(),
            expired = report.expired,
            capped = report.capped,
            remaining = report.remaining,
            "applied retention policy"
        );
        Ok(report)
    }

    fn retention_preview(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(policy.plan(&state.index.snapshot(), now))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let file = state.file.as_mut().ok_or(StoreError::ReadOnly)?;
        file.set_len(0)?;
        file.sync_all()?;
        state.index.clear();
        Ok(())
    }
}

struct Loaded {
    index: EventIndex,
    /// Byte length to cut the file back to when the last record is torn
    truncate_to: Option<u64>,
}

/// Read every record. A malformed final line (torn write) is dropped with a
/// warning; a malformed line anywhere else is an error.
fn load(path: &Path) -> Result<Loaded, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Loaded {
                index: EventIndex::default(),
                truncate_to: None,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut index = EventIndex::default();
    let mut offset: u64 = 0;
    let mut line_no = 0;
    let mut torn: Option<(usize, u64, String)> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let start = offset;
        offset += read as u64;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((bad_line, _, message)) = torn.take() {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                line: bad_line,
                message,
            });
        }
        match Event::from_json(trimmed) {
            Ok(event) => {
                index.insert(event);
            }
            Err(e) => torn = Some((line_no, start, e.to_string())),
        }
    }

    let truncate_to = torn.map(|(bad_line, start, message)| {
        tracing::warn!(
            path = %path.display(),
            line = bad_line,
            error = %message,
            "ignoring torn record at end of event log"
        );
        start
    });

    Ok(Loaded { index, truncate_to })
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn lock_path(path: &Path) -> PathBuf {
    sibling_path(path, ".lock")
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
