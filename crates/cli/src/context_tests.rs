// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("custom.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn log_flag_overrides_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[store]\npath = \"configured.jsonl\"\n");

    let ctx = Context::load(Some(&config), Some(PathBuf::from("flag.jsonl"))).unwrap();

    assert_eq!(ctx.log_path().unwrap(), Path::new("flag.jsonl"));
}

#[test]
fn configured_path_and_router_settings_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[router]\nhandler_timeout = \"2s\"\n\n[store]\npath = \"configured.jsonl\"\n",
    );

    let ctx = Context::load(Some(&config), None).unwrap();

    assert_eq!(ctx.log_path().unwrap(), Path::new("configured.jsonl"));
    assert_eq!(ctx.router().config().handler_timeout, Duration::from_secs(2));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Context::load(Some(&dir.path().join("absent.toml")), None).is_err());
}

#[test]
fn no_log_anywhere_is_reported() {
    let ctx = Context {
        config: EvrConfig::default(),
        log_path: None,
    };

    let err = ctx.log_path().unwrap_err();

    assert_eq!(err.message, "no event log configured");
}

#[test]
fn second_writer_is_told_the_log_is_in_use() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context {
        config: EvrConfig::default(),
        log_path: Some(dir.path().join("events.jsonl")),
    };
    let _first = ctx.open_writable().unwrap();

    let err = ctx.open_writable().err().unwrap();

    assert!(err.to_string().contains("is in use"), "{err}");
}
