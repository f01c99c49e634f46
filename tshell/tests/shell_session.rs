//! Session tests against a stand-in `tessent` script.
//!
//! These go through the real process plumbing: spawn, reader threads,
//! prompt detection, timeouts and shutdown.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tshell::core::launch::LaunchOptions;
use tshell::test_support::write_fake_tessent;
use tshell::{CommandShell, ShellError, TessentShell};

fn options(tessent: &Path) -> LaunchOptions {
    LaunchOptions::default()
        .with_tessent_path(tessent)
        .with_timeout(Some(Duration::from_secs(10)))
}

#[test]
fn launch_keeps_banner_and_answers_commands() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert!(shell.is_open());
    assert!(shell.pid().is_some());
    assert!(shell.banner().contains("Tessent Shell (stand-in)"));
    assert_eq!(shell.current_prompt(), Some("SETUP> "));

    assert_eq!(shell.send_command("puts hello").expect("send"), "hello");
    assert_eq!(
        shell.send_command("puts two words").expect("send"),
        "two words"
    );
    assert_eq!(
        shell.send_command("report_coverage").expect("send"),
        "// Error: unknown command report_coverage"
    );
    shell.close().expect("close");
}

#[test]
fn prompt_switches_with_system_mode() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert_eq!(shell.send_command("set_system_mode analysis").expect("send"), "");
    assert_eq!(shell.current_prompt(), Some("ANALYSIS> "));
    assert_eq!(shell.send_command("puts in analysis").expect("send"), "in analysis");

    shell.send_command("set_system_mode setup").expect("send");
    assert_eq!(shell.current_prompt(), Some("SETUP> "));
}

#[test]
fn prompt_text_mid_line_does_not_end_response() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert_eq!(
        shell.send_command("puts before SETUP> after").expect("send"),
        "before SETUP> after"
    );
    assert_eq!(shell.send_command("puts next").expect("send"), "next");
}

#[test]
fn echoed_command_is_stripped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut opts = options(&tessent);
    opts.arguments.insert("echo".to_string(), "1".to_string());
    let mut shell = TessentShell::launch(&opts).expect("launch");

    assert_eq!(shell.send_command("puts hi").expect("send"), "hi");
    assert_eq!(shell.send_command("set_system_mode analysis").expect("send"), "");
}

#[test]
fn launch_arguments_reach_the_tool() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut opts = options(&tessent).with_logfile(temp.path().join("t.log"), true);
    opts.dofile = Some(temp.path().join("setup.do"));
    opts.arguments.insert("design".to_string(), "s1196".to_string());
    let mut shell = TessentShell::launch(&opts).expect("launch");

    let args = shell.send_command("report_args").expect("send");
    assert_eq!(
        args,
        format!(
            "-shell -dofile {} -logfile {} -replace -arguments design=s1196",
            temp.path().join("setup.do").display(),
            temp.path().join("t.log").display()
        )
    );
}

#[test]
fn timeout_returns_partial_output_and_keeps_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    let err = shell
        .send_command_with_timeout("sleep 2", Some(Duration::from_millis(200)))
        .expect_err("timeout");
    match err {
        ShellError::Timeout { waited, .. } => assert!(waited >= Duration::from_millis(200)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(shell.is_open());
    assert!(shell.is_busy());
    shell.close().expect("close");
}

#[test]
fn command_after_timeout_gets_its_own_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert_eq!(shell.send_command("puts a").expect("send"), "a");
    let short = Some(Duration::from_millis(200));
    assert!(matches!(
        shell.send_command_with_timeout("sleep 1", short),
        Err(ShellError::Timeout { .. })
    ));
    // Still waiting on the first sleep, so this one is never sent.
    assert!(matches!(
        shell.send_command_with_timeout("sleep 1", short),
        Err(ShellError::Timeout { .. })
    ));
    assert!(shell.is_busy());

    thread::sleep(Duration::from_millis(1500));
    assert_eq!(shell.send_command("puts first").expect("send"), "first");
    assert!(!shell.is_busy());
    assert_eq!(shell.send_command("puts second").expect("send"), "second");
    shell.close().expect("close");
}

#[test]
fn command_after_timeout_waits_for_the_stale_prompt() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert!(matches!(
        shell.send_command_with_timeout("sleep 1", Some(Duration::from_millis(100))),
        Err(ShellError::Timeout { .. })
    ));
    assert_eq!(shell.send_command("puts next").expect("send"), "next");
    assert!(!shell.is_busy());
    shell.close().expect("close");
}

#[test]
fn send_after_close_fails_cleanly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    shell.close().expect("close");
    assert!(!shell.is_open());
    assert_eq!(shell.current_prompt(), None);
    assert!(matches!(
        shell.send_command("puts late"),
        Err(ShellError::Closed)
    ));
    shell.close().expect("second close is a no-op");
}

#[test]
fn multiline_commands_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    assert!(matches!(
        shell.send_command("puts a\nputs b"),
        Err(ShellError::MultilineCommand(_))
    ));
    assert_eq!(shell.send_command("puts still fine").expect("send"), "still fine");
}

#[test]
fn tool_exit_mid_session_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let mut shell = TessentShell::launch(&options(&tessent)).expect("launch");

    match shell.send_command("crash") {
        Err(ShellError::ProcessExited { output }) => assert!(output.contains("fatal")),
        other => panic!("expected process exit, got {other:?}"),
    }
}

#[test]
fn missing_executable_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = TessentShell::launch(&options(&temp.path().join("tessent")));
    assert!(matches!(result, Err(ShellError::NotFound { path: Some(_) })));
}

#[test]
fn exit_before_first_prompt_is_reported() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = temp.path().join("tessent");
    fs::write(&tessent, "#!/bin/sh\necho 'license checkout failed'\nexit 1\n").expect("write");
    fs::set_permissions(&tessent, fs::Permissions::from_mode(0o755)).expect("chmod");

    match TessentShell::launch(&options(&tessent)) {
        Err(ShellError::ProcessExited { output }) => {
            assert!(output.contains("license checkout failed"));
        }
        Err(other) => panic!("expected process exit, got {other:?}"),
        Ok(_) => panic!("expected process exit, got a session"),
    }
}

#[test]
fn transcript_records_tool_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let transcript = temp.path().join("transcript.log");
    let mut opts = options(&tessent);
    opts.transcript = Some(transcript.clone());

    let mut shell = TessentShell::launch(&opts).expect("launch");
    shell.send_command("puts recorded").expect("send");
    shell.close().expect("close");

    let text = fs::read_to_string(&transcript).expect("transcript");
    assert!(text.contains("Tessent Shell (stand-in)"));
    assert!(text.contains("recorded\nSETUP> "));
}

#[test]
fn transcript_is_appended_across_sessions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
    let transcript = temp.path().join("transcript.log");
    let mut opts = options(&tessent);
    opts.transcript = Some(transcript.clone());

    for word in ["earlier", "later"] {
        let mut shell = TessentShell::launch(&opts).expect("launch");
        shell.send_command(&format!("puts {word}")).expect("send");
        shell.close().expect("close");
    }

    let text = fs::read_to_string(&transcript).expect("transcript");
    assert!(text.contains("earlier\nSETUP> "));
    assert!(text.contains("later\nSETUP> "));
    assert_eq!(text.matches("Tessent Shell (stand-in)").count(), 2);
}
