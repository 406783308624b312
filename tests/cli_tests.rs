//! Binary integration tests for the fieldforge CLI
//!
//! These run the actual binary as a subprocess. NO_COLOR keeps the
//! output free of escape codes so predicates can match plain text.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fieldforge() -> Command {
    let mut cmd = Command::cargo_bin("fieldforge").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("FIELDFORGE_CONFIG");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_help_lists_commands() {
    fieldforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("evaluate"))
        .stdout(predicate::str::contains("graph"))
        .stdout(predicate::str::contains("eval"));
}

#[test]
fn test_version() {
    fieldforge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ═══════════════════════════════════════════════════════════════════════════
// EVALUATE COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_evaluate_text() {
    fieldforge()
        .args(["evaluate", "test-data/eligibility.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eligible = false"));
}

#[test]
fn test_evaluate_with_set() {
    fieldforge()
        .args(["evaluate", "test-data/eligibility.yaml", "--set", "gender=Female"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eligible = true"));
}

#[test]
fn test_evaluate_json() {
    fieldforge()
        .args([
            "evaluate",
            "test-data/orders.yaml",
            "--format",
            "json",
            "--set",
            "discount=50",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 8.5"))
        .stdout(predicate::str::contains("\"first_item\": \"Pen\""));
}

#[test]
fn test_evaluate_reports_errors_in_json() {
    fieldforge()
        .args(["evaluate", "test-data/errors.yaml", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Cannot calculate square root of negative number",
        ))
        .stdout(predicate::str::contains("Cannot convert 'twelve' to a number"));
}

#[test]
fn test_evaluate_unknown_field_fails() {
    fieldforge()
        .args(["evaluate", "test-data/eligibility.yaml", "--set", "height=2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown field 'height'"));
}

#[test]
fn test_evaluate_bad_assignment_fails() {
    fieldforge()
        .args(["evaluate", "test-data/eligibility.yaml", "--set", "gender"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Expected id=value"));
}

#[test]
fn test_evaluate_lazy_config() {
    fieldforge()
        .args([
            "evaluate",
            "test-data/eligibility.yaml",
            "--config",
            "test-data/lazy.yaml",
            "--set",
            "gender=Female",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("eligible = true"));
}

#[test]
fn test_evaluate_malformed_yaml_fails() {
    fieldforge()
        .args(["evaluate", "test-data/malformed.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAML parsing error"));
}

#[test]
fn test_evaluate_missing_file_fails() {
    fieldforge()
        .args(["evaluate", "test-data/does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_evaluate_temp_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("form.yaml");
    fs::write(
        &path,
        r#"
fields:
  - id: first
    value: Grace
  - id: last
    value: Hopper
  - id: full
    type: text
    formula: 'concat({first}, " ", {last})'
"#,
    )
    .unwrap();

    fieldforge()
        .arg("evaluate")
        .arg(&path)
        .args(["--set", "first=Anita"])
        .assert()
        .success()
        .stdout(predicate::str::contains("full = \"Anita Hopper\""));
}

// ═══════════════════════════════════════════════════════════════════════════
// GRAPH COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_graph_reports_cycles() {
    fieldforge()
        .args(["graph", "test-data/cycle.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a -> b -> a"))
        .stdout(predicate::str::contains("(cycle)"));
}

#[test]
fn test_graph_acyclic() {
    fieldforge()
        .args(["graph", "test-data/orders.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No circular references"))
        .stdout(predicate::str::contains("used by: total"));
}

// ═══════════════════════════════════════════════════════════════════════════
// EVAL COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_eval_expression() {
    fieldforge()
        .args(["eval", "test-data/orders.yaml", "upper({products.0.item})"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"PEN\""));
}

#[test]
fn test_eval_field_formula() {
    fieldforge()
        .args(["eval", "test-data/orders.yaml", "{subtotal} * 2", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("34.0\n"));
}

#[test]
fn test_eval_error_fails() {
    fieldforge()
        .args(["eval", "test-data/orders.yaml", "{nope} + 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid reference"));
}
