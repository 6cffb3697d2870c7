mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use scumm_engine::opcodes::Op;
use serde::Deserialize;
use serde_json::Value;
use tempfile::tempdir;

use common::Program;

#[derive(Debug, Deserialize)]
struct Report {
    version: u16,
    frames: u64,
    halt: Option<String>,
    globals: std::collections::BTreeMap<String, i32>,
    scripts: Vec<Value>,
    requests: Vec<Value>,
    error: Option<String>,
}

fn run_engine(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_scumm_engine"))
        .args(args)
        .output()
        .context("running scumm_engine")
}

fn read_report(path: &Path) -> Result<Report> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading report {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing session report")
}

#[test]
fn data_directory_boot_writes_a_report() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary data directory")?;
    let scripts = temp_dir.path().join("scripts");
    fs::create_dir_all(&scripts)?;
    // Boot arg lands in local 0; count frames in var 61 forever.
    let boot = Program::new(72)
        .op(Op::PushWordVar)
        .word(0x4000)
        .write_var(60)
        .op(Op::WordVarInc)
        .word(61)
        .op(Op::BreakHere)
        .loop_back(7)
        .code;
    fs::write(scripts.join("3.bin"), boot)?;
    let report_path = temp_dir.path().join("report.json");

    let output = run_engine(&[
        "--he-version",
        "72",
        "--data",
        temp_dir.path().to_str().context("utf-8 temp path")?,
        "--boot",
        "3",
        "--boot-arg",
        "-12",
        "--frames",
        "5",
        "--mixer",
        "recording",
        "--report-json",
        report_path.to_str().context("utf-8 report path")?,
    ])?;
    assert!(
        output.status.success(),
        "engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Saved session report"), "stdout: {stdout}");

    let report = read_report(&report_path)?;
    assert_eq!(report.version, 72);
    assert_eq!(report.frames, 5);
    assert_eq!(report.halt, None);
    assert_eq!(report.globals.get("60"), Some(&-12));
    assert_eq!(report.globals.get("61"), Some(&6));
    assert_eq!(report.scripts.len(), 1);
    assert!(report.error.is_none());
    Ok(())
}

#[test]
fn quit_and_faults_are_reported() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory")?;

    let quit = Program::new(90)
        .op(Op::BreakHere)
        .op(Op::SystemOps)
        .byte(244)
        .end();
    let quit_path = temp_dir.path().join("quit.bin");
    fs::write(&quit_path, quit)?;
    let report_path = temp_dir.path().join("quit.json");
    let script_arg = format!("1={}", quit_path.display());
    let output = run_engine(&[
        "--script",
        &script_arg,
        "--frames",
        "30",
        "--report-json",
        report_path.to_str().context("utf-8 report path")?,
    ])?;
    assert!(output.status.success());
    let report = read_report(&report_path)?;
    assert_eq!(report.halt.as_deref(), Some("quit"));
    assert_eq!(report.frames, 1);
    assert_eq!(report.requests.len(), 1);
    assert_eq!(report.requests[0]["kind"], "quit");

    let program = Program::new(90);
    let bad = vec![program.unused_opcode()];
    let bad_path = temp_dir.path().join("bad.bin");
    fs::write(&bad_path, bad)?;
    let report_path = temp_dir.path().join("bad.json");
    let script_arg = format!("1={}", bad_path.display());
    let output = run_engine(&[
        "--script",
        &script_arg,
        "--report-json",
        report_path.to_str().context("utf-8 report path")?,
    ])?;
    assert!(!output.status.success());
    let report = read_report(&report_path)?;
    let error = report.error.context("fault should be recorded")?;
    assert!(error.contains("invalid opcode"), "error: {error}");
    Ok(())
}

#[test]
fn opcode_listing_names_the_version() -> Result<()> {
    let output = run_engine(&["--list-opcodes", "--he-version", "100"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("HE 100 opcode table"));
    assert!(stdout.contains("0x77 SoundOps"));
    Ok(())
}
