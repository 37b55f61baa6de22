//! CLI contract tests.

use std::fs;

use assert_cmd::Command;

fn deskmate() -> Command {
    match Command::cargo_bin("deskmate") {
        Ok(cmd) => cmd,
        Err(err) => panic!("binary should build: {err}"),
    }
}

#[test]
fn help_lists_subcommands() {
    let output = deskmate().arg("--help").output().expect("runs");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["chat", "ask", "context"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn ask_requires_a_message() {
    let output = deskmate().arg("ask").output().expect("runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<MESSAGE>"));
}

#[test]
fn invalid_config_fails_before_sign_in() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[google]\ndefault_time_zone = \"Mars/Olympus\"\n").expect("write config");

    let output = deskmate()
        .arg("context")
        .env("DESKMATE_CONFIG_PATH", &path)
        .env("HOME", tmp.path())
        .output()
        .expect("runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"));
    assert!(stderr.contains("Mars/Olympus"));
}

#[test]
fn missing_client_id_is_reported() {
    let tmp = tempfile::tempdir().expect("temp dir");

    let output = deskmate()
        .arg("context")
        .env("DESKMATE_CONFIG_PATH", tmp.path().join("absent.toml"))
        .env("HOME", tmp.path())
        .env_remove("GOOGLE_CLIENT_ID")
        .env_remove("DESKMATE_TIME_ZONE")
        .output()
        .expect("runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("GOOGLE_CLIENT_ID"));
}
