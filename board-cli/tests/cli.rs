//! End-to-end tests for the `meshboard` binary.
//!
//! Every service endpoint points at a closed local port, so these exercise
//! argument handling, persisted files and offline behaviour only.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const OFFLINE_CONFIG: &str = r#"
[content]
api_url = "http://127.0.0.1:9"
timeout_secs = 1

[gateway]
public_gateways = []
default_gateway = "https://gateway.example/ipfs/"
probe_timeout_ms = 200

[replication]
url = "http://127.0.0.1:9"
timeout_secs = 1
"#;

fn meshboard(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("meshboard").unwrap();
    cmd.arg("--data-dir").arg(dir).env("RUST_LOG", "error");
    cmd
}

fn offline_dir() -> TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("meshboard.toml"), OFFLINE_CONFIG).unwrap();
    dir
}

// =============================================================================
// Basics
// =============================================================================

#[test]
fn help_lists_commands() {
    Command::cargo_bin("meshboard")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("post"));
}

#[test]
fn status_before_login() {
    let dir = offline_dir();
    meshboard(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT LOGGED IN"));
}

#[test]
fn login_normalises_address() {
    let dir = offline_dir();
    meshboard(dir.path())
        .args(["login", "0xA11CE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as 0xa11ce"));

    assert!(dir.path().join("session.json").exists());
    meshboard(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("0xa11ce"));
}

#[test]
fn bad_config_file_is_reported() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[sync\ninterval_secs = ").unwrap();

    meshboard(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure();
}

// =============================================================================
// Chats
// =============================================================================

#[test]
fn chat_requires_login() {
    let dir = offline_dir();
    meshboard(dir.path())
        .args(["chat", "send", "0xb0b", "hi"])
        .assert()
        .failure();
}

#[test]
fn offline_send_is_queued_and_listed() {
    let dir = offline_dir();
    meshboard(dir.path()).args(["login", "0xa11ce"]).assert().success();

    meshboard(dir.path())
        .args(["chat", "send", "0xB0B", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued"));

    assert!(dir.path().join("state.json").exists());
    meshboard(dir.path())
        .args(["chat", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0xb0b"))
        .stdout(predicate::str::contains("hi"));
}

#[test]
fn offline_sync_fails() {
    let dir = offline_dir();
    meshboard(dir.path()).args(["login", "0xa11ce"]).assert().success();

    meshboard(dir.path())
        .args(["chat", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sync pass failed"));
}

#[test]
fn show_unknown_chat_fails() {
    let dir = offline_dir();
    meshboard(dir.path()).args(["login", "0xa11ce"]).assert().success();

    meshboard(dir.path())
        .args(["chat", "show", "0xb0b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No chat with 0xb0b"));
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn resolve_rejects_malformed_identifier() {
    let dir = offline_dir();
    meshboard(dir.path())
        .args(["resolve", "../../etc/passwd"])
        .assert()
        .failure();
}

#[test]
fn resolve_falls_back_to_default_gateway() {
    let dir = offline_dir();
    meshboard(dir.path())
        .args(["resolve", "bafkreiexample", "--mime", "video/mp4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DefaultGateway"))
        .stdout(predicate::str::contains(
            "https://gateway.example/ipfs/bafkreiexample",
        ));
}

#[test]
fn put_with_unreachable_node_fails() {
    let dir = offline_dir();
    let file = dir.path().join("note.txt");
    std::fs::write(&file, "hello").unwrap();

    meshboard(dir.path())
        .arg("put")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to store content"));
}

#[test]
fn feed_without_index_explains_setup() {
    let dir = offline_dir();
    meshboard(dir.path())
        .arg("feed")
        .assert()
        .success()
        .stdout(predicate::str::contains("No discovery index configured"));
}
