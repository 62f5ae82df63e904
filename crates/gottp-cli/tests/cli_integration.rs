// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end CLI tests driving the compiled `gottp` binary (§6.3).

use assert_cmd::Command;
use predicates::prelude::*;

fn gottp() -> Command {
    Command::cargo_bin("gottp").expect("binary `gottp` should be built")
}

#[test]
fn help_exits_zero_and_lists_subcommands() {
    gottp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("mock"));
}

#[test]
fn version_prints_version_string() {
    gottp().arg("version").assert().success().stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn init_then_validate_round_trips_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.gottp.yaml");

    gottp().args(["init", "--name", "Demo", "--output"]).arg(&path).assert().success();
    assert!(path.exists());

    gottp().arg("validate").arg(&path).assert().success().stdout(predicate::str::contains("valid"));
}

#[test]
fn init_refuses_to_overwrite_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.gottp.yaml");

    gottp().args(["init", "--output"]).arg(&path).assert().success();
    gottp().args(["init", "--output"]).arg(&path).assert().failure();
}

#[test]
fn fmt_check_reports_clean_file_as_formatted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.gottp.yaml");
    gottp().args(["init", "--output"]).arg(&path).assert().success();

    gottp().args(["fmt", "--check"]).arg(&path).assert().success();
}

#[test]
fn fmt_check_flags_a_file_needing_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.gottp.yaml");
    std::fs::write(&path, "name: Demo\nitems: []\n").unwrap();

    gottp()
        .args(["fmt", "--check"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("needs formatting"));
}

#[test]
fn import_curl_then_export_curl_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let collection_path = dir.path().join("curl.gottp.yaml");

    gottp()
        .args(["import", "-", "--format", "curl", "--output"])
        .arg(&collection_path)
        .write_stdin("curl -X POST https://example.com/tokens -H 'Content-Type: application/json' -d '{\"grant_type\":\"client_credentials\"}'")
        .assert()
        .success();

    let content = std::fs::read_to_string(&collection_path).unwrap();
    assert!(content.contains("example.com/tokens"));

    gottp()
        .args(["export", "--format", "curl", "--request", "POST https://example.com/tokens"])
        .arg(&collection_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("curl"));
}

#[test]
fn import_unknown_bytes_without_explicit_format_fails() {
    gottp()
        .args(["import", "-"])
        .write_stdin("nothing recognizable here")
        .assert()
        .failure();
}

#[test]
fn validate_reports_duplicate_request_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.gottp.yaml");
    std::fs::write(
        &path,
        "name: Demo\nitems:\n  - request:\n      id: same\n      name: A\n      method: GET\n      url: https://x\n  - request:\n      id: same\n      name: B\n      method: GET\n      url: https://y\n",
    )
    .unwrap();

    gottp().arg("validate").arg(&path).assert().failure().stdout(predicate::str::contains("duplicate request id"));
}

#[test]
fn completion_prints_a_nonempty_script_for_each_shell() {
    for shell in ["bash", "zsh", "fish"] {
        gottp().args(["completion", shell]).assert().success().stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn schema_prints_valid_json() {
    let output = gottp().arg("schema").assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(value.is_object());
}

#[test]
fn mock_rejects_out_of_range_error_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.gottp.yaml");
    gottp().args(["init", "--output"]).arg(&path).assert().success();

    gottp()
        .args(["mock", "--error-rate", "1.5"])
        .arg(&path)
        .assert()
        .code(2);
}

#[test]
fn run_against_missing_collection_fails() {
    gottp().args(["run", "nonexistent.gottp.yaml", "--request", "Ping"]).assert().failure();
}
