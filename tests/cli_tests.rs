//! Integration tests for the CLI interface
//!
//! Tests the main entry point, the dry-run path, and configuration errors

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALID_CONFIG: &str = r#"
stack_name: example-project
template_path: tower-project.yaml
parameters:
  S3ReadWriteAccessArns:
    - arn:aws:sts::111111111111:assumed-role/RoleName/jane.doe@example.org
"#;

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_sync_help() {
    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.arg("sync")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconcile Tower projects"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_missing_subcommand_fails() {
    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_dry_run_lists_valid_configs() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("example-project.yaml"), VALID_CONFIG).unwrap();

    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.arg("sync")
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "discovered and confirmed to be valid",
        ))
        .stdout(predicate::str::contains("example-project.yaml"));
}

#[test]
fn test_dry_run_fails_when_all_configs_are_invalid() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("bad-project.yaml"),
        "stack_name: bad\ntemplate_path: wrong.yaml\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.arg("sync")
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_debug_flag_echoes_api_exchanges() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizations": [],
        })))
        .mount(&server)
        .await;
    // Organization creation returns no record, stopping the run after two
    // exchanges
    Mock::given(method("POST"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "boom",
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("example-project.yaml"), VALID_CONFIG).unwrap();
    let uri = server.uri();

    tokio::task::spawn_blocking(move || {
        let mut cmd = Command::cargo_bin("tower-sync").unwrap();
        cmd.env("NXF_TOWER_TOKEN", "test-token")
            .env("NXF_TOWER_API_URL", uri)
            .arg("sync")
            .arg(dir.path())
            .arg("--debug")
            .assert()
            .failure()
            .stdout(predicate::str::contains("tower api exchange"));
    })
    .await
    .unwrap();
}

#[test]
fn test_sync_without_tower_env_fails_fast() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("example-project.yaml"), VALID_CONFIG).unwrap();

    let mut cmd = Command::cargo_bin("tower-sync").unwrap();
    cmd.env_remove("NXF_TOWER_TOKEN")
        .env_remove("TOWER_ACCESS_TOKEN")
        .env_remove("NXF_TOWER_API_URL")
        .env_remove("TOWER_API_ENDPOINT")
        .arg("sync")
        .arg(dir.path())
        .assert()
        .failure()
        // tracing's fmt subscriber writes to stdout
        .stdout(predicate::str::contains("NXF_TOWER_TOKEN"));
}
