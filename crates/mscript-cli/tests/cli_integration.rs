//! CLI integration tests for mscript run / check / parse.
//!
//! These tests invoke the compiled binary to verify end-to-end behavior.

use std::process::Command;

fn mscript_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mscript-cli"))
}

const PATROL: &str = r#"<?xml version="1.0"?>
<mission name="patrol">
  <module name="director">
    <defvar name="waves" type="int" value="0"/>
    <script name="initgame">
      <call module="_std" name="print"><const type="string" value="patrol begins"/></call>
    </script>
    <script name="gameloop">
      <setvar name="waves">
        <exec module="util" name="inc"><var name="waves"/></exec>
      </setvar>
    </script>
    <script name="endgame">
      <call module="_std" name="print">
        <const type="string" value="waves:"/>
        <var name="waves"/>
      </call>
    </script>
  </module>
  <module name="util">
    <script name="inc" type="int">
      <params><defvar name="n" type="int"/></params>
      <return><fmath math="+"><var name="n"/><const type="int" value="1"/></fmath></return>
    </script>
  </module>
</mission>
"#;

fn write_source(dir: &tempfile::TempDir, name: &str, src: &str) -> std::path::PathBuf {
    let file = dir.path().join(name);
    std::fs::write(&file, src).expect("write source");
    file
}

#[test]
fn cli_run_mission() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "patrol.xml", PATROL);

    let output = mscript_bin()
        .args(["run", file.to_str().unwrap(), "--ticks", "3"])
        .output()
        .expect("run binary");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "mscript run should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("patrol begins"), "stdout: {}", stdout);
    assert!(stdout.contains("waves: 3"), "stdout: {}", stdout);
    assert!(
        stdout.contains("Mission patrol finished after 3 tick(s)."),
        "stdout: {}",
        stdout
    );
}

#[test]
fn cli_run_bare_statement_prints_result() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(
        &dir,
        "stmt.xml",
        r#"<block>
             <defvar name="x" type="int" value="6"/>
             <return><fmath math="*"><var name="x"/><const type="int" value="7"/></fmath></return>
           </block>"#,
    );

    let output = mscript_bin()
        .args(["run", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("result = 42"), "stdout: {}", stdout);
}

#[test]
fn cli_run_with_trace() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "patrol.xml", PATROL);
    let trace = dir.path().join("trace.jsonl");

    let output = mscript_bin()
        .args([
            "run",
            file.to_str().unwrap(),
            "--ticks",
            "2",
            "--trace",
            trace.to_str().unwrap(),
        ])
        .output()
        .expect("run binary");

    assert!(
        output.status.success(),
        "mscript run --trace should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let content = std::fs::read_to_string(&trace).expect("read trace file");
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid JSONL"))
        .collect();

    assert_eq!(records.first().unwrap()["record"], "header");
    assert_eq!(records.first().unwrap()["mission"], "patrol");
    let calls: Vec<_> = records.iter().filter(|r| r["record"] == "call").collect();
    // initgame print + endgame print
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c["function"] == "print"));
    let footer = records.last().unwrap();
    assert_eq!(footer["record"], "footer");
    assert_eq!(footer["mission_status"], "finished");
    assert_eq!(footer["call_count"], 2);
}

#[test]
fn cli_run_reports_runtime_error_location() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(
        &dir,
        "bad.xml",
        "<mission>\n  <module name=\"director\">\n    <script name=\"gameloop\">\n      <call module=\"_string\" name=\"concat\"/>\n    </script>\n  </module>\n</mission>\n",
    );

    let output = mscript_bin()
        .args(["run", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(":4:7:"), "stderr: {}", stderr);
    assert!(stderr.contains("expected void"), "stderr: {}", stderr);
}

#[test]
fn cli_check_reports_link_error_location() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(
        &dir,
        "arity.xml",
        "<block>\n  <while><const type=\"bool\" value=\"true\"/></while>\n</block>\n",
    );

    let output = mscript_bin()
        .args(["check", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(":2:3:"), "stderr: {}", stderr);
    assert!(stderr.contains("<while>"), "stderr: {}", stderr);
}

#[test]
fn cli_check_unknown_tag() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "unknown.xml", "<block><launch/></block>");

    let output = mscript_bin()
        .args(["check", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("launch"), "stderr: {}", stderr);
}

#[test]
fn cli_check_ok() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "patrol.xml", PATROL);

    let output = mscript_bin()
        .args(["check", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("ok (2 module(s), 4 script(s))"),
        "stdout: {}",
        stdout
    );
}

#[test]
fn cli_parse_json() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_source(&dir, "tiny.xml", r#"<if><var name="a"/><block/><block/></if>"#);

    let output = mscript_bin()
        .args(["parse", file.to_str().unwrap(), "--format", "json"])
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let tree: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("parse output is JSON");
    assert_eq!(tree["tag"], "if");
    assert_eq!(tree["children"].as_array().unwrap().len(), 3);
    assert_eq!(tree["children"][0]["attrs"][0]["value"], "a");
}

#[test]
fn cli_rejects_oversized_source() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let big = format!("<block>{}</block>", " ".repeat(1_000_001));
    let file = write_source(&dir, "big.xml", &big);

    let output = mscript_bin()
        .args(["check", file.to_str().unwrap()])
        .output()
        .expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exceeds"), "stderr: {}", stderr);
}
