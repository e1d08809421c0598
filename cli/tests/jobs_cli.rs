use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::str::contains;
use std::path::Path;
use tempfile::tempdir;

fn hcictl_cmd(server: &MockServer, config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hcictl").expect("hcictl binary");
    cmd.env_remove("HCICTL_HOST")
        .env_remove("HCICTL_USERNAME")
        .env_remove("HCICTL_PASSWORD")
        .arg("--host")
        .arg(server.base_url())
        .arg("--username")
        .arg("admin")
        .arg("--password")
        .arg("secret")
        .arg("--config")
        .arg(config);
    cmd
}

fn mock_schema(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/rest/vxm/api-doc.json");
        then.status(200).json_body_obj(&serde_json::json!({
            "paths": {
                "/v1/cluster/shutdown": {"post": {}},
                "/v2/cluster/shutdown": {"post": {}},
                "/v1/requests/{id}": {"get": {}},
                "/v1/hosts/{sn}": {"get": {}},
                "/v2/hosts/{sn}": {"get": {}}
            }
        }));
    })
}

#[test]
fn cluster_shutdown_dry_run_waits_and_succeeds() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    let schema = mock_schema(&server);

    let submit = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/vxm/v2/cluster/shutdown")
            .header("authorization", "Basic YWRtaW46c2VjcmV0")
            .json_body_obj(&serde_json::json!({"dryrun": true}));
        then.status(202)
            .json_body_obj(&serde_json::json!({"request_id": "SHUTDOWN-1"}));
    });
    let status = server.mock(|when, then| {
        when.method(GET).path("/rest/vxm/v1/requests/SHUTDOWN-1");
        then.status(200).json_body_obj(&serde_json::json!({
            "id": "SHUTDOWN-1",
            "state": "COMPLETED",
            "progress": 100,
            "extension": "{'passed': True}"
        }));
    });

    hcictl_cmd(&server, &tmp.path().join("config.json"))
        .args(["cluster", "shutdown", "--dry-run", "--wait", "--profile", "light"])
        .assert()
        .success()
        .stdout(contains("\"request_id\": \"SHUTDOWN-1\""))
        .stdout(contains("\"state\": \"COMPLETED\""))
        .stdout(contains("\"passed\": true"));

    schema.assert();
    submit.assert();
    status.assert();
}

#[test]
fn cluster_shutdown_without_wait_prints_handle() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    mock_schema(&server);
    let submit = server.mock(|when, then| {
        when.method(POST).path("/rest/vxm/v1/cluster/shutdown");
        then.status(202)
            .json_body_obj(&serde_json::json!({"request_id": "SHUTDOWN-2"}));
    });

    hcictl_cmd(&server, &tmp.path().join("config.json"))
        .args(["cluster", "shutdown", "--api-version", "1"])
        .assert()
        .success()
        .stdout(contains("\"request_id\": \"SHUTDOWN-2\""))
        .stdout(contains("\"operation_id\": \"v1_cluster_shutdown_post\""));

    submit.assert();
}

#[test]
fn failed_job_exits_3_with_decoded_reason() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    mock_schema(&server);
    server.mock(|when, then| {
        when.method(GET).path("/rest/vxm/v1/requests/REQ-1");
        then.status(200).json_body_obj(&serde_json::json!({
            "id": "REQ-1",
            "state": "FAILED",
            "progress": 20,
            "error": "{'message': 'Host V0123 is not reachable'}"
        }));
    });

    hcictl_cmd(&server, &tmp.path().join("config.json"))
        .args(["jobs", "watch", "REQ-1"])
        .assert()
        .code(3)
        .stdout(contains("\"state\": \"FAILED\""))
        .stderr(contains("REQ-1"))
        .stderr(contains("Host V0123 is not reachable"));
}

#[test]
fn jobs_get_reports_running_state() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    mock_schema(&server);
    let status = server.mock(|when, then| {
        when.method(GET).path("/rest/vxm/v1/requests/REQ-2");
        then.status(200).json_body_obj(&serde_json::json!({
            "id": "REQ-2",
            "state": "IN_PROGRESS",
            "progress": 45,
            "step": "Upgrading host 2 of 4"
        }));
    });

    hcictl_cmd(&server, &tmp.path().join("config.json"))
        .args(["jobs", "get", "REQ-2"])
        .assert()
        .success()
        .stdout(contains("\"state\": \"RUNNING\""))
        .stdout(contains("\"progress\": 45"));

    status.assert();
}

#[test]
fn unreachable_status_endpoint_exits_5() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    mock_schema(&server);
    let status = server.mock(|when, then| {
        when.method(GET).path("/rest/vxm/v1/requests/REQ-3");
        then.status(503);
    });

    hcictl_cmd(&server, &tmp.path().join("config.json"))
        .args([
            "jobs",
            "watch",
            "REQ-3",
            "--recovery-secs",
            "0",
            "--max-retries",
            "2",
        ])
        .assert()
        .code(5)
        .stderr(contains("REQ-3"));

    status.assert_hits(3);
}

#[test]
fn already_complete_rule_from_config_is_success() {
    let server = MockServer::start();
    let tmp = tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");
    std::fs::write(
        &cfg,
        r#"{"already_complete": [{"status": 400, "error_code": "E30102"}]}"#,
    )
    .expect("write");
    mock_schema(&server);
    server.mock(|when, then| {
        when.method(POST).path("/rest/vxm/v2/cluster/shutdown");
        then.status(400).json_body_obj(&serde_json::json!({
            "error_code": "E30102",
            "message": "Cluster is already shut down"
        }));
    });

    hcictl_cmd(&server, &cfg)
        .args(["cluster", "shutdown", "--wait"])
        .assert()
        .success()
        .stdout(contains("\"status\": \"already_complete\""))
        .stdout(contains("Cluster is already shut down"));
}
