//! The `dialog` subcommand rejects bad payloads before touching the terminal

use std::io::Write;
use std::process::{Command, Stdio};

fn dialog() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_interactive-feedback"));
    cmd.arg("dialog")
        .env("FEEDBACK_CONFIG", "/nonexistent/interactive_feedback.toml")
        .env_remove("GEMINI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn malformed_inline_request_exits_2() {
    let output = dialog().args(["--request", "{not json"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed request"));
    assert!(output.stdout.is_empty());
}

#[test]
fn request_without_prompt_exits_2() {
    let mut child = dialog()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"predefined_options": ["A"]}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unreadable_request_file_fails() {
    let output = dialog()
        .args(["--request-file", "/nonexistent/request.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.trim().lines().count(), 1, "stderr was: {stderr}");
    assert!(stderr.contains("reading request file /nonexistent/request.json"));
    assert!(!stderr.contains("Caused by"));
    assert!(!stderr.contains("Stack backtrace"));
}
