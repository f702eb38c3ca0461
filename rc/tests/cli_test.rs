//! End-to-end tests for the `rc` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `rc` with logs, user config and working directory confined to a temp dir
fn rc(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rc").expect("rc binary should build");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rc(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("queue-depth: 3"))
        .stdout(predicate::str::contains("stepping-timeout-ms: 500"))
        .stdout(predicate::str::contains("drain-order: fifo"));
}

#[test]
fn test_config_reads_project_local_file() {
    let home = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(home.path().join(".runcontrol.yml"), "step-queue:\n  queue-depth: 7\n").unwrap();

    rc(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("queue-depth: 7"));
}

#[test]
fn test_explicit_config_must_exist() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rc(&home)
        .args(["--config", "missing.yml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_simulate_reports_json_metrics() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rc(&home)
        .args([
            "simulate",
            "--presses",
            "2",
            "--interval-ms",
            "0",
            "--latency-ms",
            "20",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("press   1: accepted"))
        .stdout(predicate::str::contains("\"dispatched\": 2"))
        .stdout(predicate::str::contains("\"dropped\": 0"));
}

#[test]
fn test_simulate_rejects_unknown_step_type() {
    let home = TempDir::new().expect("Failed to create temp dir");
    rc(&home)
        .args(["simulate", "--step-type", "sideways"])
        .assert()
        .failure();
}
