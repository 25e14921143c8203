//! Integration tests for the bock-health binary.
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bock_health() -> Command {
    let mut cmd = Command::cargo_bin("bock-health").expect("binary built");
    cmd.env_remove("BOCK_HEALTH_TIMEOUT")
        .env_remove("BOCK_HEALTH_INTERVAL")
        .env_remove("BOCK_HEALTH_RETRIES")
        .env_remove("BOCK_HEALTH_WORKDIR")
        .timeout(std::time::Duration::from_secs(20));
    cmd
}

#[test]
fn probe_success_prints_result() {
    bock_health()
        .args(["probe", "--", "echo", "all good"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""exitCode": 0"#))
        .stdout(predicate::str::contains("all good"))
        .stdout(predicate::str::contains(r#""outcome": "exited""#));
}

#[test]
fn probe_failure_exits_non_zero() {
    bock_health()
        .args(["probe", "--shell", "--", "echo broken >&2; exit 3"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""exitCode": 3"#))
        .stdout(predicate::str::contains("broken"));
}

#[test]
fn probe_timeout_is_reported() {
    bock_health()
        .args(["probe", "--timeout", "100ms", "--", "sleep", "10"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Health check exceeded timeout (100ms)",
        ))
        .stdout(predicate::str::contains(r#""outcome": "timedOut""#));
}

#[test]
fn probe_uses_workdir_and_env() {
    let temp_dir = TempDir::new().expect("tempdir");
    let workdir = temp_dir.path().canonicalize().expect("canonical path");

    bock_health()
        .env("BOCK_HEALTH_WORKDIR", &workdir)
        .args([
            "probe",
            "--env",
            "GREETING=hello",
            "--shell",
            "--",
            r#"echo "$GREETING from $PWD""#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "hello from {}",
            workdir.display()
        )));
}

#[test]
fn probe_rejects_bad_env() {
    bock_health()
        .args(["probe", "--env", "NOEQUALS", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn watch_exits_when_healthy() {
    bock_health()
        .args([
            "watch",
            "--interval",
            "50ms",
            "--exit-on",
            "healthy",
            "--",
            "true",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("starting -> healthy"));
}

#[test]
fn watch_json_reports_unhealthy() {
    bock_health()
        .args([
            "watch",
            "--json",
            "--interval",
            "50ms",
            "--retries",
            "2",
            "--exit-on",
            "unhealthy",
            "--",
            "false",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""status":"unhealthy""#))
        .stdout(predicate::str::contains(r#""failingStreak":2"#));
}

#[test]
fn watch_rejects_invalid_config() {
    bock_health()
        .args(["watch", "--interval", "10us", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid health check configuration"));
}
