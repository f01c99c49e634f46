//! CLI tests for the `backcone` binary.
//!
//! The tool is the stand-in `tessent` script, so structure comes from
//! snapshots built here against an in-memory design.

#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use backcone::analysis::{build_backcone, render_failpaths};
use backcone::config::{BackconeConfig, FailBit};
use tshell::circuit::LogicValue::{One, Zero};
use tshell::circuit::snapshot::{read_snapshot, write_snapshot};
use tshell::exit_codes;
use tshell::test_support::{MemoryNetlist, write_fake_tessent};

const YAML: &str = "\
name: s27
flatmodel: s27.flat.gz
patdb: s27.patdb
failbits:
  - chain: chain1
    cell: 1
    failpatterns: [4]
defectsites: [u1/Y]
";

fn config() -> BackconeConfig {
    BackconeConfig {
        name: "s27".to_string(),
        flatmodel: PathBuf::from("s27.flat.gz"),
        patdb: PathBuf::from("s27.patdb"),
        binpat: None,
        failbits: vec![FailBit {
            chain: "chain1".to_string(),
            cell: 1,
            failpatterns: vec![4],
        }],
        defectsites: vec!["u1/Y".to_string()],
    }
}

/// Analyse the in-memory design, save it as a snapshot and return the
/// failing-path report it produces.
fn saved_backcone(path: &Path) -> String {
    let mut nl = MemoryNetlist::new()
        .gate("ff1", "DFF", &["D", "CK"], &["Q"])
        .gate("ff2", "DFF", &["D", "CK"], &["Q"])
        .gate("u1", "INV", &["A"], &["Y"])
        .sequential("DFF")
        .connect("ff1/Q", "u1/A")
        .connect("u1/Y", "ff2/D")
        .scan_cell("chain1", 1, "ff2/D")
        .pattern_values(4, "ff1/Q", &[One, Zero]);
    let (mut circuit, patterns) = build_backcone(&config(), &mut nl, true).expect("build");
    write_snapshot(path, &mut circuit, &patterns).expect("snapshot");
    render_failpaths(&mut circuit, &patterns).expect("render")
}

struct Workspace {
    temp: tempfile::TempDir,
    tessent: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let tessent = write_fake_tessent(temp.path()).expect("fake tessent");
        fs::write(temp.path().join("tshell.toml"), "timeout_secs = 20\n").expect("config");
        fs::write(temp.path().join("bc.yaml"), YAML).expect("yaml");
        Self { temp, tessent }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn backcone(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_backcone"));
        cmd.current_dir(self.path());
        cmd
    }
}

#[test]
fn analyze_from_snapshot_writes_outputs() {
    let ws = Workspace::new();
    let expected = saved_backcone(&ws.path().join("saved.json"));

    let output = ws
        .backcone()
        .args(["analyze", "bc.yaml", "--from-snapshot", "saved.json", "--write-snapshot"])
        .arg("--tessent-path")
        .arg(&ws.tessent)
        .output()
        .expect("backcone analyze");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out_dir = ws.path().join("backcone_s27");
    let failpaths = fs::read_to_string(out_dir.join("failpaths.txt")).expect("failpaths");
    assert_eq!(failpaths, expected);
    assert!(failpaths.contains("u1/Y INV (00) *"));

    let (circuit, patterns) = read_snapshot(&out_dir.join("backcone.json")).expect("snapshot");
    assert_eq!(circuit.pin_count(), 4);
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].activated_pinpaths(), [0]);
}

#[test]
fn analyze_without_pattern_analysis_skips_report() {
    let ws = Workspace::new();
    saved_backcone(&ws.path().join("saved.json"));

    let status = ws
        .backcone()
        .args(["analyze", "bc.yaml", "--from-snapshot", "saved.json", "--no-analyze-patterns"])
        .args(["--out-dir", "results"])
        .arg("--tessent-path")
        .arg(&ws.tessent)
        .stdout(Stdio::null())
        .status()
        .expect("backcone analyze");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let out_dir = ws.path().join("results").join("backcone_s27");
    assert!(out_dir.is_dir());
    assert!(!out_dir.join("failpaths.txt").exists());
}

#[test]
fn malformed_yaml_names_the_file() {
    let ws = Workspace::new();
    fs::write(ws.path().join("broken.yaml"), "name: [unclosed\n").expect("yaml");

    let output = ws
        .backcone()
        .args(["analyze", "broken.yaml"])
        .output()
        .expect("backcone analyze");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("broken.yaml"));
}

#[test]
fn missing_tool_exits_with_shell_code() {
    let ws = Workspace::new();

    let status = ws
        .backcone()
        .args(["analyze", "bc.yaml", "--tessent-path"])
        .arg(ws.path().join("bin").join("tessent"))
        .stderr(Stdio::null())
        .status()
        .expect("backcone analyze");

    assert_eq!(status.code(), Some(exit_codes::SHELL));
}

#[test]
fn shell_prints_summary_then_relays() {
    let ws = Workspace::new();
    saved_backcone(&ws.path().join("saved.json"));

    let mut child = ws
        .backcone()
        .args(["shell", "bc.yaml", "--snapshot", "saved.json"])
        .arg("--tessent-path")
        .arg(&ws.tessent)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn backcone shell");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"puts relayed\nclose\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("backcone shell");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("backcone s27: 4 pins, 3 gates, 1 inputs, 1 outputs, 1 paths\n"));
    assert!(stdout.contains("  pattern 4: 1 activated paths\n"));
    assert!(stdout.contains("relayed\n"));
}
