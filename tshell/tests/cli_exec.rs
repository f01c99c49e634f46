//! CLI tests for the `tshell` binary.
//!
//! Spawns the binary against the stand-in tool and checks output and exit
//! codes.

#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use tshell::exit_codes;
use tshell::io::config::{ShellConfig, load_config};
use tshell::test_support::write_fake_tessent;

#[test]
fn exec_prints_each_response() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");

    let output = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("exec")
        .arg("--tessent-path")
        .arg(&tessent)
        .args(["--timeout-secs", "10"])
        .args(["-c", "puts hello", "-c", "set_system_mode analysis", "-c", "puts bye"])
        .output()
        .expect("tshell exec");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\nbye\n");
}

#[test]
fn exec_missing_tool_exits_with_shell_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("exec")
        .arg("--tessent-path")
        .arg(temp.path().join("missing").join("tessent"))
        .args(["-c", "puts hello"])
        .output()
        .expect("tshell exec");

    assert_eq!(output.status.code(), Some(exit_codes::SHELL));
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not find tessent"));
}

#[test]
fn exec_timeout_exits_with_timeout_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");

    let status = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("exec")
        .arg("--tessent-path")
        .arg(&tessent)
        .args(["--timeout-secs", "1", "-c", "sleep 3"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("tshell exec");

    assert_eq!(status.code(), Some(exit_codes::TIMEOUT));
}

#[test]
fn repl_relays_stdin_until_close() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");

    let mut child = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("repl")
        .arg("--tessent-path")
        .arg(&tessent)
        .args(["--timeout-secs", "10"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn tshell repl");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"puts from repl\nclose\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("tshell repl");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tessent Shell (stand-in)"));
    assert!(stdout.contains("tshell> from repl\n"));
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("tshell.toml");

    let status = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("tshell init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), ShellConfig::default());

    fs::write(&path, "timeout_secs = 7\n").expect("edit config");
    let status = Command::new(env!("CARGO_BIN_EXE_tshell"))
        .current_dir(temp.path())
        .arg("init")
        .stderr(Stdio::null())
        .status()
        .expect("tshell init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert_eq!(load_config(&path).expect("load").timeout_secs, 7);
}
