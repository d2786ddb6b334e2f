// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use std::time::Duration;

fn t(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 10, minute, 0).unwrap()
}

fn event(id: &str, minute: u32) -> Event {
    Event::builder("job.step", "runner")
        .id(id)
        .timestamp(t(minute))
        .with("n", minute)
        .build()
        .unwrap()
}

fn ids(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.id().to_string()).collect()
}

#[test]
fn events_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    {
        let store = JsonlEventStore::open(&path).unwrap();
        store.store(&event("a", 2)).unwrap();
        store.store(&event("b", 1)).unwrap();
        assert!(!store.store(&event("a", 2)).unwrap());
    }

    let store = JsonlEventStore::open(&path).unwrap();
    assert_eq!(store.len(), 2);
    let all = store.query_events(&EventFilter::new()).unwrap();
    assert_eq!(ids(&all), vec!["b", "a"]);

    // One line per stored event
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn records_are_plain_event_objects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store = JsonlEventStore::open(&path).unwrap();
    store.store(&event("a", 1)).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(value["id"], "a");
    assert_eq!(value["type"], "job.step");
    assert_eq!(value["is_replay"], false);
}

#[test]
fn second_writer_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let _first = JsonlEventStore::open(&path).unwrap();
    let second = JsonlEventStore::open(&path);
    assert!(matches!(second, Err(StoreError::Locked(_))));

    // Readers do not need the lock
    assert!(JsonlEventStore::open_read_only(&path).is_ok());
}

#[test]
fn read_only_store_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlEventStore::open_read_only(dir.path().join("missing.jsonl")).unwrap();
    assert!(store.is_empty());
    assert!(matches!(store.store(&event("a", 1)), Err(StoreError::ReadOnly)));
    assert!(matches!(store.clear(), Err(StoreError::ReadOnly)));
}

#[test]
fn torn_trailing_record_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    {
        let store = JsonlEventStore::open(&path).unwrap();
        store.store(&event("a", 1)).unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    write!(file, "{{\"id\":\"b\",\"type\":\"job.st").unwrap();
    drop(file);

    let store = JsonlEventStore::open(&path).unwrap();
    assert_eq!(store.len(), 1);
    store.store(&event("c", 3)).unwrap();
    drop(store);

    let reopened = JsonlEventStore::open_read_only(&path).unwrap();
    assert_eq!(ids(&reopened.query_events(&EventFilter::new()).unwrap()), vec!["a", "c"]);
}

#[test]
fn corrupt_middle_record_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let good = serde_json::to_string(&event("a", 1)).unwrap();
    fs::write(&path, format!("{good}\nnot json\n{good}\n")).unwrap();

    match JsonlEventStore::open_read_only(&path) {
        Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected corrupt error, got {:?}", other.err()),
    }
}

#[test]
fn retention_rewrites_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store = JsonlEventStore::open(&path).unwrap();
    for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
        store.store(&event(id, i as u32)).unwrap();
    }

    let policy = RetentionPolicy::new().max_age(Duration::from_secs(90));
    let report = store.apply_retention_policy_at(&policy, t(3)).unwrap();
    assert_eq!(report.expired, 2);
    assert_eq!(report.remaining, 2);

    // Appends continue on the rewritten file
    store.store(&event("e", 4)).unwrap();
    drop(store);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(!sibling_path(&path, ".tmp").exists());

    let reopened = JsonlEventStore::open(&path).unwrap();
    assert_eq!(ids(&reopened.query_events(&EventFilter::new()).unwrap()), vec!["c", "d", "e"]);
}

#[test]
fn clear_truncates_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store = JsonlEventStore::open(&path).unwrap();
    store.store(&event("a", 1)).unwrap();
    store.clear().unwrap();
    assert!(store.is_empty());
    store.store(&event("b", 2)).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
}

#[test]
fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/deeper/events.jsonl");
    let store = JsonlEventStore::open(&path).unwrap();
    store.store(&event("a", 1)).unwrap();
    assert!(path.exists());
    assert_eq!(store.path(), path.as_path());
}

/// Sink that accepts `budget` bytes and then fails like a full disk
struct FullDisk {
    data: Vec<u8>,
    budget: usize,
}

impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.budget.saturating_sub(self.data.len());
        if room == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let n = room.min(buf.len());
        self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RecordSink for FullDisk {
    fn committed_len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.data.truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn failed_append_leaves_no_partial_record() {
    let first = b"{\"id\":\"a\"}\n".to_vec();
    let mut sink = FullDisk {
        budget: first.len() + 5,
        data: first.clone(),
    };

    let result = append_record(&mut sink, b"{\"id\":\"b\",\"type\":\"job.step\"}\n");

    assert!(result.is_err());
    assert_eq!(sink.data, first);

    // Once space frees up the next record starts on its own line
    sink.budget = usize::MAX;
    append_record(&mut sink, b"{\"id\":\"c\"}\n").unwrap();
    assert_eq!(sink.data, b"{\"id\":\"a\"}\n{\"id\":\"c\"}\n");
}

#[test]
fn failed_retention_rewrite_keeps_index_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store = JsonlEventStore::open(&path).unwrap();
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        store.store(&event(id, i as u32)).unwrap();
    }
    // A directory in the temp file's place makes the rewrite fail
    fs::create_dir(sibling_path(&path, ".tmp")).unwrap();

    let policy = RetentionPolicy::new().max_count(1);
    assert!(store.apply_retention_policy_at(&policy, t(3)).is_err());

    assert_eq!(store.len(), 3);
    store.store(&event("d", 4)).unwrap();
    drop(store);

    let reopened = JsonlEventStore::open_read_only(&path).unwrap();
    assert_eq!(
        ids(&reopened.query_events(&EventFilter::new()).unwrap()),
        vec!["a", "b", "c", "d"]
    );
}
