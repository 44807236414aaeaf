// CLI integration tests for flows that do not need the native engine installed.
use std::process::{Command, Output};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_vwgate");
    let mut command = Command::new(exe);
    command.env_remove("VWGATE_LIB").env_remove("RUST_LOG");
    command
}

fn stderr_error(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .rev()
        .find(|line| line.starts_with('{'))
        .expect("json error line");
    let value: Value = serde_json::from_str(line).expect("valid json");
    value.get("error").cloned().expect("error object")
}

#[test]
fn version_without_library_reports_load_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lib = temp.path().join("libvwgate-missing.so");

    let output = cmd()
        .args(["--lib", lib.to_str().unwrap(), "version"])
        .output()
        .expect("version");
    assert_eq!(output.status.code(), Some(5));
    assert!(output.stdout.is_empty());

    let err = stderr_error(&output);
    assert_eq!(err["kind"], "Load");
    assert_eq!(err["message"], "failed to load native engine library");
    assert_eq!(err["path"].as_str(), lib.to_str());
    assert!(err["causes"].as_array().is_some_and(|causes| !causes.is_empty()));
}

#[test]
fn library_path_is_read_from_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lib = temp.path().join("libvwgate-env.so");

    let output = cmd()
        .env("VWGATE_LIB", &lib)
        .arg("smoke")
        .output()
        .expect("smoke");
    assert_eq!(output.status.code(), Some(5));
    let err = stderr_error(&output);
    assert_eq!(err["kind"], "Load");
    assert_eq!(err["path"].as_str(), lib.to_str());
}

#[test]
fn run_rejects_conflicting_modes() {
    let output = cmd()
        .args(["run", "--learn", "--topics"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_error(&output);
    assert_eq!(err["kind"], "Usage");
}

#[test]
fn help_exits_cleanly() {
    let output = cmd().arg("--help").output().expect("help");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("version"));
    assert!(text.contains("smoke"));
    assert!(text.contains("run"));
}
