//! CLI smoke tests for terra.
//!
//! These tests verify that commands parse, fail cleanly without an agent, and
//! return appropriate exit codes.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the terra binary.
fn terra_cmd() -> Command {
  cargo_bin_cmd!("terra")
}

/// An address nothing listens on.
fn dead_address() -> String {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let address = listener.local_addr().unwrap().to_string();
  drop(listener);
  address
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  terra_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  terra_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("terra"));
}

#[test]
fn subcommand_help_works() {
  for args in [
    &["agent"][..],
    &["manifest"],
    &["manifest", "apply"],
    &["manifest", "update"],
    &["manifest", "list"],
    &["nodes"],
    &["status"],
  ] {
    terra_cmd()
      .args(args)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn manifest_apply_requires_file() {
  terra_cmd().args(["manifest", "apply"]).assert().failure();
}

// =============================================================================
// Without an agent
// =============================================================================

#[test]
fn manifest_apply_missing_file_fails() {
  terra_cmd()
    .args(["manifest", "apply", "/nonexistent/manifests.json"])
    .args(["--address", &dead_address()])
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to read manifest list"));
}

#[test]
fn manifest_apply_invalid_json_fails() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("manifests.json");
  std::fs::write(&path, "{ not json").unwrap();

  terra_cmd()
    .args(["manifest", "apply"])
    .arg(&path)
    .args(["--address", &dead_address()])
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to parse manifest list"));
}

#[test]
fn status_without_agent_fails() {
  terra_cmd()
    .arg("status")
    .args(["--address", &dead_address(), "--timeout", "1s"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to fetch status"));
}

#[test]
fn address_comes_from_environment() {
  let address = dead_address();
  terra_cmd()
    .arg("nodes")
    .env("TERRA_ADDRESS", &address)
    .args(["--timeout", "1s"])
    .assert()
    .failure()
    .stderr(predicate::str::contains(address));
}

#[test]
fn agent_rejects_bad_config() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("terra.toml");
  std::fs::write(&path, "sync_interval = \"whenever\"\n").unwrap();

  terra_cmd()
    .arg("agent")
    .arg("--config")
    .arg(&path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to parse config"));
}
