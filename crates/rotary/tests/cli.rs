//! End-to-end tests for the rotary binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Output, Stdio};
use tempfile::TempDir;

fn rotary(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rotary").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("LOG_TO_FILE")
        .env_remove("LOG_FOLDER_NAME")
        .env_remove("LOG_MAX_SIZE")
        .env_remove("RUST_LOG");
    cmd
}

/// Run rotary with the read end of its stdout already closed
fn run_with_closed_stdout(dir: &TempDir, args: &[&str], input: &str) -> Output {
    let mut child = StdCommand::new(env!("CARGO_BIN_EXE_rotary"))
        .current_dir(dir.path())
        .env_remove("LOG_TO_FILE")
        .env_remove("LOG_FOLDER_NAME")
        .env_remove("LOG_MAX_SIZE")
        .env_remove("RUST_LOG")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    drop(child.stdout.take());
    if let Some(mut stdin) = child.stdin.take() {
        // rotary may exit before reading everything
        let _ = stdin.write_all(input.as_bytes());
    }
    child.wait_with_output().unwrap()
}

fn log_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(log_files(&path));
            } else if path.extension().map_or(false, |e| e == "log") {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

fn logged_text(root: &Path) -> String {
    log_files(root)
        .iter()
        .map(|file| fs::read_to_string(file).unwrap())
        .collect()
}

#[test]
fn test_tee_round_trip() {
    let dir = TempDir::new().unwrap();

    rotary(&dir)
        .args(["--folder", "out"])
        .write_stdin("hello\nworld\n")
        .assert()
        .success()
        .stdout("hello\nworld\n");

    let logs = dir.path().join("out").join("logs");
    let files = log_files(&logs);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].parent().unwrap().file_name().unwrap(), "stdout");
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "hello\nworld\n");
}

#[test]
fn test_merge_skips_stream_subfolder() {
    let dir = TempDir::new().unwrap();

    rotary(&dir)
        .args(["-m", "-f", "merged"])
        .write_stdin("one line\n")
        .assert()
        .success();

    let files = log_files(&dir.path().join("merged").join("logs"));
    assert_eq!(files.len(), 1);
    assert_ne!(files[0].parent().unwrap().file_name().unwrap(), "stdout");
}

#[test]
fn test_tag_lines() {
    let dir = TempDir::new().unwrap();

    rotary(&dir)
        .args(["-m", "-t", "-f", "tagged"])
        .write_stdin("tagged\n")
        .assert()
        .success()
        .stdout("tagged\n");

    assert_eq!(
        logged_text(&dir.path().join("tagged").join("logs")),
        "[STDOUT] tagged\n"
    );
}

#[test]
fn test_append_keeps_previous_runs() {
    let dir = TempDir::new().unwrap();

    for text in ["first\n", "second\n"] {
        rotary(&dir)
            .args(["-a", "-m", "-f", "appended"])
            .write_stdin(text)
            .assert()
            .success();
    }

    assert_eq!(
        logged_text(&dir.path().join("appended").join("logs")),
        "first\nsecond\n"
    );
}

#[test]
fn test_log_to_file_disabled_by_env() {
    let dir = TempDir::new().unwrap();

    rotary(&dir)
        .env("LOG_TO_FILE", "0")
        .args(["-f", "quiet"])
        .write_stdin("screen only\n")
        .assert()
        .success()
        .stdout("screen only\n");

    assert!(log_files(&dir.path().join("quiet")).is_empty());
}

#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rotary.toml");
    fs::write(
        &config,
        format!(
            "log_folder = {:?}\nflush_size = 4\n",
            dir.path().join("from-config").display().to_string()
        ),
    )
    .unwrap();

    rotary(&dir)
        .args(["-m", "-c"])
        .arg(&config)
        .write_stdin("configured\n")
        .assert()
        .success();

    assert_eq!(
        logged_text(&dir.path().join("from-config").join("logs")),
        "configured\n"
    );
}

#[test]
fn test_no_writable_folder_fails() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a folder").unwrap();
    let config = dir.path().join("rotary.toml");
    fs::write(
        &config,
        format!(
            "log_folder = {:?}\ndefault_log_folder = {:?}\n",
            blocker.join("a").display().to_string(),
            blocker.join("b").display().to_string()
        ),
    )
    .unwrap();

    rotary(&dir)
        .arg("-c")
        .arg(&config)
        .write_stdin("lost\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not writable"));
}

#[test]
fn test_invalid_output_error_mode() {
    let dir = TempDir::new().unwrap();

    rotary(&dir)
        .args(["-p", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_exit_policy_on_broken_stdout() {
    let dir = TempDir::new().unwrap();

    let output = run_with_closed_stdout(&dir, &["-m", "-p", "exit", "-f", "broken"], "relayed\n");

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        logged_text(&dir.path().join("broken").join("logs")),
        "relayed\n"
    );
}

#[test]
fn test_warn_policy_keeps_logging() {
    let dir = TempDir::new().unwrap();

    let output = run_with_closed_stdout(&dir, &["-m", "-p", "warn", "-f", "warned"], "one\ntwo\n");

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[rotary] Broken pipe on stdout"));
    assert_eq!(
        logged_text(&dir.path().join("warned").join("logs")),
        "one\ntwo\n"
    );
}
