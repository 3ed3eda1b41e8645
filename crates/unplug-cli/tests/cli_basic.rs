//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &TempDir, args: &[&str], stdin: &str) -> (String, String, i32) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_unplug-cli"))
        .args(args)
        .env("HOME", home.path())
        .env("UNPLUG_ENV", "dev")
        .env("UNPLUG_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute CLI command");

    if let Some(mut input) = child.stdin.take() {
        input.write_all(stdin.as_bytes()).unwrap();
    }
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

fn home() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn test_config_list_is_json() {
    let home = home();
    let (stdout, _, code) = run_cli(&home, &["config", "list"], "");
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["notifications"]["max_notifications"], 10);
}

#[test]
fn test_config_set_then_get() {
    let home = home();
    let (_, _, code) = run_cli(
        &home,
        &["config", "set", "notifications.max_notifications", "3"],
        "",
    );
    assert_eq!(code, 0);
    let (stdout, _, code) = run_cli(
        &home,
        &["config", "get", "notifications.max_notifications"],
        "",
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "3");
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let home = home();
    let (_, stderr, code) = run_cli(
        &home,
        &["config", "set", "notifications.notification_frequency_secs", "0"],
        "",
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}

#[test]
fn test_config_get_unknown_key() {
    let home = home();
    let (_, stderr, code) = run_cli(&home, &["config", "get", "nope"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_stats_totals_start_empty() {
    let home = home();
    let (stdout, _, code) = run_cli(&home, &["stats", "totals"], "");
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["sessions_completed"], 0);
}

#[test]
fn test_run_short_session_records_stats() {
    let home = home();
    let (stdout, _, code) = run_cli(&home, &["run", "--seconds", "1"], "");
    assert_eq!(code, 0);
    assert!(stdout.contains("session complete"));

    let (stdout, _, code) = run_cli(&home, &["stats", "history"], "");
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
}

#[test]
fn test_run_stop_from_stdin() {
    let home = home();
    let (stdout, _, code) = run_cli(&home, &["run", "--minutes", "30", "--json"], "stop\n");
    assert_eq!(code, 0);
    assert!(stdout.contains("\"type\":\"TimerStopped\""));
}

#[test]
fn test_run_rejects_zero_duration() {
    let home = home();
    let (_, stderr, code) = run_cli(&home, &["run", "--seconds", "0"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("error"));
}
