//! End-to-end tests for the pulsar binary.

#![allow(deprecated)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A document written to a temporary directory.
struct TestDocument {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDocument {
    fn new(source: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("doc.pulsar");
        fs::write(&path, source).expect("Failed to write document");
        Self { _dir: dir, path }
    }

    fn path(&self) -> &str {
        self.path.to_str().expect("Non-UTF-8 temp path")
    }
}

fn pulsar() -> Command {
    Command::cargo_bin("pulsar").expect("Binary not built")
}

const CHAIN: &str = "\
// %% a
a = 1;

// %% b
b = a + 2;

// %% c
c = b + a;
";

#[test]
fn test_run_prints_published_values() {
    let doc = TestDocument::new(CHAIN);
    pulsar()
        .args(["run", doc.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("a = 1"))
        .stdout(predicate::str::contains("b = 3"))
        .stdout(predicate::str::contains("c = 4"));
}

#[test]
fn test_run_parallel_gives_same_values() {
    let doc = TestDocument::new(CHAIN);
    pulsar()
        .args(["run", doc.path(), "--parallel"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c = 4"));
}

#[test]
fn test_run_json_output() {
    let doc = TestDocument::new(CHAIN);
    let output = pulsar()
        .args(["run", doc.path(), "--json"])
        .output()
        .expect("Failed to run");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("Invalid JSON");
    assert_eq!(json["report"]["ran"], serde_json::json!([0, 1, 2]));
    assert_eq!(json["cells"][2]["label"], "c");
    assert_eq!(json["cells"][2]["status"], "ok");
    assert_eq!(json["cells"][2]["symbols"]["c"], "4");
}

#[test]
fn test_run_reports_runtime_errors() {
    let doc = TestDocument::new("// %% boom\nx = 1 / 0;\n// %% after\ny = x;\n");
    pulsar()
        .args(["run", doc.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("[error]"))
        .stdout(predicate::str::contains("[blocked]"));
}

#[test]
fn test_run_missing_document() {
    pulsar()
        .args(["run", "does-not-exist.pulsar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Document not found"));
}

#[test]
fn test_check_clean_document() {
    let doc = TestDocument::new(CHAIN);
    pulsar()
        .args(["check", doc.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No problems found."));
}

#[test]
fn test_check_fails_on_conflict() {
    let doc = TestDocument::new("// %% one\nx = 1;\n// %% two\nx = 2;\n");
    pulsar()
        .args(["check", doc.path()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error[conflict]"));
}

#[test]
fn test_check_json_reports_cycle() {
    let doc = TestDocument::new("// %% p\np = q;\n// %% q\nq = p;\n");
    let output = pulsar()
        .args(["check", doc.path(), "--json"])
        .output()
        .expect("Failed to run");
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("Invalid JSON");
    assert_eq!(json["cycles"], serde_json::json!([[0, 1]]));
}

#[test]
fn test_graph_prints_edges_and_order() {
    let doc = TestDocument::new(CHAIN);
    pulsar()
        .args(["graph", doc.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("a -> b (a)"))
        .stdout(predicate::str::contains("b -> c (b)"))
        .stdout(predicate::str::contains("a -> b -> c"));
}

#[test]
fn test_graph_json() {
    let doc = TestDocument::new("// %% late\ny = x + 1;\n// %% early\nx = 1;\n");
    let output = pulsar()
        .args(["graph", doc.path(), "--json"])
        .output()
        .expect("Failed to run");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("Invalid JSON");
    assert_eq!(json["order"], serde_json::json!(["early", "late"]));
    assert_eq!(json["edges"][0]["symbol"], "x");
}

#[test]
fn test_config_file_is_loaded() {
    let doc = TestDocument::new(CHAIN);
    let config = doc._dir.path().join("pulsar.json");
    fs::write(&config, r#"{ "policy": "parallel" }"#).unwrap();
    pulsar()
        .args(["run", doc.path(), "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("c = 4"));
}
