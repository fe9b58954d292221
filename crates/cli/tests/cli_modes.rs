//! End-to-end tests for the reingestor binary
//!
//! These tests validate:
//! - Exit codes for configuration, list and preflight errors
//! - A process-list pass against mocked services
//! - Lock-held runs doing nothing
//! - The status and compare read-only commands
//! - A storage outage still advancing known packages

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const PIPELINE: &str = "9e3a5b1c-2f4d-4e8a-b6c7-1d2e3f4a5b6c";
const A: &str = "0b6a8b4c-1f3e-4c2d-9a7b-5e6f7a8b9c0d";
const B: &str = "1c7b9c5d-2a4f-4d3e-8b8c-6f7a8b9c0d1e";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a config pointing both services at `base_url`.
    fn write_config(&self, base_url: &str, pipeline_id: &str) -> PathBuf {
        self.write_config_with(base_url, pipeline_id, "")
    }

    /// Same as `write_config`, with `extra` appended.
    fn write_config_with(&self, base_url: &str, pipeline_id: &str, extra: &str) -> PathBuf {
        let mut config = format!(
            r#"
[pipeline]
url = "{base_url}"
user = "demo"
api_key = "dashboard-key"

[storage]
url = "{base_url}"
user = "demo"
api_key = "storage-key"

[reingest]
pipeline_id = "{pipeline_id}"
approval_latency_ms = 0

[http]
timeout_secs = 5
retry_delay_ms = 10

[database]
path = "{db}"

[process]
lock_path = "{lock}"
"#,
            db = self.path("reingest.db").display(),
            lock = self.path("reingest.lck").display(),
        );
        config.push_str(extra);
        let config_path = self.path("reingest.toml");
        std::fs::write(&config_path, config).unwrap();
        config_path
    }

    fn write_list(&self, contents: &str) -> PathBuf {
        let list_path = self.path("list.json");
        std::fs::write(&list_path, contents).unwrap();
        list_path
    }
}

fn reingestor(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reingestor").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

/// Mount the preflight endpoints: one known pipeline and the default
/// processing configuration.
async fn mount_preflight(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v2/pipeline/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": null },
            "objects": [{ "uuid": PIPELINE }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/processing-configuration/default/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<processingMCP/>"))
        .mount(server)
        .await;
}

#[test]
fn test_missing_config_exits_with_error() {
    let ws = Workspace::new();
    reingestor(&ws.path("nope.toml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_invalid_pipeline_id_exits_with_error() {
    let ws = Workspace::new();
    let config = ws.write_config("http://127.0.0.1:9", "pipeline-one");
    reingestor(&config)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("pipeline_id"));
}

#[test]
fn test_status_without_database_exits_with_error() {
    let ws = Workspace::new();
    let config = ws.write_config("http://127.0.0.1:9", PIPELINE);
    reingestor(&config)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));

    // A mistyped path must not leave an empty database behind
    assert!(!ws.path("reingest.db").exists());
}

#[tokio::test]
async fn test_malformed_list_exits_with_error() {
    let server = MockServer::start().await;
    mount_preflight(&server).await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list("['not-a-uuid']");

    reingestor(&config)
        .arg("process-list")
        .arg(&list)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a package UUID"));

    // The lock is released on the error path
    assert!(!ws.path("reingest.lck").exists());
}

#[tokio::test]
async fn test_preflight_failure_exits_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pipeline/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": null },
            "objects": []
        })))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list(&format!("['{}']", A));

    reingestor(&config)
        .arg("process-list")
        .arg(&list)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Preflight check failed"));
}

#[tokio::test]
async fn test_process_list_starts_first_package() {
    let server = MockServer::start().await;
    mount_preflight(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v2/file/{}/reingest/", A)))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "error": false,
            "message": "Package sent to pipeline for reingest",
            "reingest_uuid": "5f0e1d2c-3b4a-4958-8776-655443322110"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/api/transfer/status/5f0e1d2c-3b4a-4958-8776-655443322110/",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "PROCESSING",
            "directory": A,
            "microservice": "Extract packages"
        })))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list(&format!("['{}', '{}']", A, B));

    reingestor(&config)
        .arg("process-list")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("started=1"));

    reingestor(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("in_progress=1"))
        .stdout(predicate::str::contains("new=1"))
        .stdout(predicate::str::contains(
            "transfer=5f0e1d2c-3b4a-4958-8776-655443322110",
        ));
}

#[tokio::test]
async fn test_held_lock_does_nothing() {
    let server = MockServer::start().await;
    mount_preflight(&server).await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list(&format!("['{}']", A));
    // The test process is alive, so its pid makes the lock live
    std::fs::write(ws.path("reingest.lck"), format!("{}\n", std::process::id())).unwrap();

    reingestor(&config)
        .arg("process-list")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing done"));

    reingestor(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("total=0"));
    assert!(ws.path("reingest.lck").exists());
}

#[tokio::test]
async fn test_compare_reports_differences() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/file/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": null },
            "objects": [
                {
                    "uuid": B,
                    "current_path": format!("{}.7z", B),
                    "status": "UPLOADED",
                    "origin_pipeline": format!("/api/v2/pipeline/{}/", PIPELINE)
                }
            ]
        })))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list(&format!(r#"["{}"]"#, A));

    reingestor(&config)
        .arg("compare")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("Only in list (1)"))
        .stdout(predicate::str::contains(A))
        .stdout(predicate::str::contains("Only in storage (1)"))
        .stdout(predicate::str::contains(B));
}

#[tokio::test]
async fn test_storage_outage_still_advances_known_packages() {
    const TRANSFER: &str = "5f0e1d2c-3b4a-4958-8776-655443322110";

    let server = MockServer::start().await;
    mount_preflight(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v2/file/{}/reingest/", A)))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "error": false,
            "message": "Package sent to pipeline for reingest",
            "reingest_uuid": TRANSFER
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/transfer/status/{}/", TRANSFER)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Cannot fetch unitTransfer with UUID"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/ingest/status/{}/", A)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "COMPLETE",
            "directory": A,
            "microservice": "Remove the processing directory"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/file/{}/", A)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": A,
            "current_path": format!("{}.7z", A),
            "status": "UPLOADED",
            "origin_pipeline": format!("/api/v2/pipeline/{}/", PIPELINE)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/file/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let config = ws.write_config(&server.uri(), PIPELINE);
    let list = ws.write_list(&format!("['{}']", A));

    // Start A from a list, then lose the storage listing
    reingestor(&config)
        .arg("process-list")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("started=1"));

    reingestor(&config)
        .arg("process-storage")
        .assert()
        .success()
        .stdout(predicate::str::contains("completed=1"));

    reingestor(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("complete=1"))
        .stdout(predicate::str::contains("in_progress=0"));
}

#[tokio::test]
async fn test_json_log_file_written() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/file/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "next": null },
            "objects": []
        })))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let log_dir = ws.path("logs");
    let config = ws.write_config_with(
        &server.uri(),
        PIPELINE,
        &format!(
            "\n[logging]\npath = \"{}\"\nlevel = \"info\"\njson = true\n",
            log_dir.display()
        ),
    );

    reingestor(&config).arg("list-compressed").assert().success();

    let files: Vec<_> = std::fs::read_dir(&log_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let contents = std::fs::read_to_string(&files[0]).unwrap();
    let first = contents.lines().next().expect("log file is empty");
    let line: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(line.get("fields").is_some());
}
