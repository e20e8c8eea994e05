//! CLI tests for the `flame` binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn flame() -> Command {
    let mut cmd = cargo_bin_cmd!("flame");
    cmd.env_remove("FLAME_DATA_DIR")
        .env_remove("FLAME_API_TOKEN")
        .env_remove("FLAME_PORT");
    cmd
}

#[test]
fn test_flame_help() {
    flame()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_flame_version() {
    flame().arg("--version").assert().success();
}

#[test]
fn test_init_creates_data_dir() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");

    flame()
        .current_dir(dir.path())
        .args(["init", "--data-dir"])
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("(created)"));

    assert!(data.join("db.sqlite").exists());
    assert!(data.join("flame.toml").exists());
    assert!(data.join("uploads").is_dir());

    // A second run keeps the existing file.
    flame()
        .current_dir(dir.path())
        .args(["init", "--data-dir"])
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("(kept)"));
}

#[test]
fn test_config_show_reports_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flame.toml"),
        "[server]\nport = 6006\n[auth]\ntoken = \"a-long-enough-token\"\n",
    )
    .unwrap();

    flame()
        .args(["config", "show", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 6006"))
        .stdout(predicate::str::contains("token = (set)"))
        .stdout(predicate::str::contains("a-long-enough-token").not());
}

#[test]
fn test_config_validate_warns_without_token() {
    let dir = TempDir::new().unwrap();
    flame()
        .args(["config", "validate", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("auth.token is unset"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    flame()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("nope.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
