//! Scenario: `kdw` config and mode guards, no database required
//!
//! # Invariants under test
//!
//! 1. `kdw config-hash` prints a stable SHA-256 of the merged layers, and the
//!    same hash regardless of key order in the files.
//! 2. A secret literal in any layer makes the command fail with
//!    CONFIG_SECRET_DETECTED.
//! 3. `kdw cycle` rejects an unknown mode and a LIVE run with missing secrets
//!    before it ever connects to Postgres.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn kdw() -> Command {
    let mut cmd = Command::cargo_bin("kdw").unwrap();
    cmd.env_remove("KDW_DATABASE_URL")
        .env_remove("RIOT_API_KEY")
        .env_remove("TWILIO_ACCOUNT_SID")
        .env_remove("TWILIO_AUTH_TOKEN")
        .env_remove("TWILIO_MY_NUMBER");
    cmd
}

fn hash_line(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .unwrap()
        .to_string()
}

#[test]
fn config_hash_is_stable_across_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    fs::write(
        &a,
        "scheduler:\n  poll_interval_secs: 300\nreconcile:\n  ratio_threshold: 1.5\n",
    )
    .unwrap();
    fs::write(
        &b,
        "reconcile:\n  ratio_threshold: 1.5\nscheduler:\n  poll_interval_secs: 300\n",
    )
    .unwrap();

    let out_a = kdw()
        .args(["config-hash", a.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_match("config_hash=[0-9a-f]{64}").unwrap())
        .get_output()
        .stdout
        .clone();
    let out_b = kdw()
        .args(["config-hash", b.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(hash_line(&out_a), hash_line(&out_b));
}

#[test]
fn secret_literal_in_overlay_fails() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("local.yaml");
    fs::write(&base, "riot:\n  keys_env:\n    api_key: RIOT_API_KEY\n").unwrap();
    fs::write(
        &overlay,
        "riot:\n  keys_env:\n    api_key: RGAPI-00000000-1111-2222-3333-444444444444\n",
    )
    .unwrap();

    kdw()
        .args([
            "config-hash",
            base.to_str().unwrap(),
            overlay.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
}

#[test]
fn cycle_rejects_unknown_mode() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    fs::write(&base, "scheduler:\n  poll_interval_secs: 600\n").unwrap();

    kdw()
        .args(["cycle", "--config", base.to_str().unwrap(), "--mode", "PAPER"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_UNKNOWN_MODE"));
}

#[test]
fn live_cycle_without_secrets_fails_before_db() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    fs::write(&base, "scheduler:\n  poll_interval_secs: 600\n").unwrap();

    kdw()
        .args(["cycle", "--config", base.to_str().unwrap(), "--mode", "LIVE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains("KDW_DATABASE_URL").not());
}
