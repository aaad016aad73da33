//! CLI integration tests

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn crashdump(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_crashdump"))
        .args(args)
        .env_remove("CRASHDUMP_BUS_FIXTURE")
        .env_remove("CRASHDUMP_API_URL")
        .output()
        .expect("Failed to execute command")
}

fn daemon_asset(path: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../crashdumpd")
        .join(path)
        .display()
        .to_string()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = crashdump(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("crash-dump"), "Should show app description");
    assert!(stdout.contains("collect"), "Should show collect command");
    assert!(stdout.contains("trigger"), "Should show trigger command");
    assert!(stdout.contains("logs"), "Should show logs command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = crashdump(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("crashdump"), "Should show binary name");
}

#[test]
fn test_collect_help_lists_options() {
    let output = crashdump(&["collect", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--type"), "Should show trigger type option");
    assert!(stdout.contains("--fixture"), "Should show fixture option");
    assert!(stdout.contains("[SOCKET]"), "Should show socket argument");
}

#[test]
fn test_logs_help_lists_subcommands() {
    let output = crashdump(&["logs", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("list"));
    assert!(stdout.contains("show"));
    assert!(stdout.contains("delete-all"));
}

#[test]
fn test_collect_prints_document() {
    let fixture = daemon_asset("fixtures/bus_spr.json");
    let input = daemon_asset("input");
    let output = crashdump(&[
        "collect",
        "--type",
        "IERR",
        "--fixture",
        &fixture,
        "--input-dir",
        &input,
    ]);

    assert!(
        output.status.success(),
        "collect failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let metadata = &document["crash_data"]["METADATA"];
    assert_eq!(metadata["trigger_type"], "IERR");
    assert_eq!(metadata["cpu0"]["cpuid"], "0x806f8");
}

#[test]
fn test_collect_writes_output_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("dump.json");
    let fixture = daemon_asset("fixtures/bus_spr.json");
    let input = daemon_asset("input");
    let output = crashdump(&[
        "collect",
        "0",
        "--fixture",
        &fixture,
        "--input-dir",
        &input,
        "--output",
        target.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert!(output.stdout.is_empty(), "Document should not go to stdout");
    let contents = std::fs::read_to_string(&target).unwrap();
    let document: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(document["crash_data"]["METADATA"]["trigger_type"], "On-Demand");
}

#[test]
fn test_collect_unknown_socket_fails() {
    let fixture = daemon_asset("fixtures/bus_spr.json");
    let output = crashdump(&["collect", "3", "--fixture", &fixture]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Socket 3 not found"));
}

#[test]
fn test_collect_without_bus_fails() {
    let home = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_crashdump"))
        .args(["collect"])
        .env("HOME", home.path())
        .env_remove("CRASHDUMP_BUS_FIXTURE")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--fixture"));
}
