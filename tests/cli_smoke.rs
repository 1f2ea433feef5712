//! CLI smoke tests
//!
//! Drive the compiled binary with assert_cmd to check argument handling
//! without any network activity.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("prdgen")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("prdgen")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("prdgen"));
}

#[test]
fn test_missing_subcommand_fails() {
    Command::cargo_bin("prdgen")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_export_requires_input_and_output() {
    Command::cargo_bin("prdgen")
        .unwrap()
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}

#[test]
fn test_export_roundtrip_via_cli() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prd.txt");
    let output = dir.path().join("prd.md");
    std::fs::write(&input, "## Goals\n- ship it\n").unwrap();

    Command::cargo_bin("prdgen")
        .unwrap()
        .args([
            "export",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--title",
            "Login PRD",
        ])
        .assert()
        .success();

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("# Login PRD"));
    assert!(written.contains("- ship it"));
}
