use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_ID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";
const TENANT_ID: &str = "72f988bf-86f1-41af-91ab-2d7cd011db47";
const GRAPH_APP_ID: &str = "00000003-0000-0000-c000-000000000000";
const EXCHANGE_APP_ID: &str = "00000002-0000-0ff1-ce00-000000000000";

const GRAPH_ROLES: [&str; 6] = [
    "df021288-bdef-4463-88db-98f22de89214",
    "5b567255-7703-4780-807c-7be8301ae99b",
    "98830695-27a2-44f7-8c18-0c3ebc9698f6",
    "ef54d2bf-783f-4e0f-bca1-3210c0444d99",
    "01d4889c-1287-42c6-ac1f-5d1e02578ef6",
    "883ea226-0bf2-4a8f-9f9d-92c9162a727d",
];
const EXCHANGE_ROLE: &str = "dc50a0fb-09a3-484d-be87-e023b12c6440";

/// A command isolated from the operator's environment. Service URLs point at
/// a closed port unless a test overrides them.
fn calprov(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("calprov").unwrap();
    cmd.current_dir(dir)
        .env_remove("CALPROV_AUTOMATION_ACCOUNT")
        .env_remove("CALPROV_RESOURCE_GROUP")
        .env_remove("CALPROV_CERT_PASSPHRASE")
        .env_remove("CALPROV_STATE_FILE")
        .env_remove("CALPROV_CERT_DIR")
        .env_remove("CALPROV_GRANT_CATALOG")
        .env_remove("CALPROV_LOG_DIR")
        .env_remove("AZURE_SUBSCRIPTION_ID")
        .env_remove("AZURE_TENANT_ID")
        .env_remove("AZURE_CLIENT_ID")
        .env_remove("AZURE_CLIENT_SECRET")
        .env_remove("RUST_LOG")
        .env("CALPROV_ACCESS_TOKEN", "test-token")
        .env("CALPROV_GRAPH_URL", "http://127.0.0.1:9")
        .env("CALPROV_MANAGEMENT_URL", "http://127.0.0.1:9")
        .env("CALPROV_LOGIN_URL", "http://127.0.0.1:9");
    cmd
}

fn write_state(dir: &Path) -> std::path::PathBuf {
    let state_file = dir.join("provisioning-state.json");
    let state = json!({
        "SchemaVersion": 1,
        "ApplicationId": APP_ID,
        "ObjectId": "obj-1",
        "TenantId": TENANT_ID,
        "DisplayName": "Calendar Automation",
        "CertificateName": "Calendar-Automation-cert",
        "CertificateThumbprint": "AB12CD34",
        "ExecutionEnvironmentName": "aa1",
        "ExecutionEnvironmentResourceGroup": "rg1",
        "CreatedAt": "2026-01-05T10:00:00Z"
    });
    fs::write(&state_file, serde_json::to_string_pretty(&state).unwrap()).unwrap();
    state_file
}

async fn mount_directory(server: &MockServer, exchange_present: bool) {
    Mock::given(method("GET"))
        .and(path("/v1.0/applications"))
        .and(query_param("$filter", format!("appId eq '{}'", APP_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "obj-1", "appId": APP_ID, "displayName": "Calendar Automation" }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": TENANT_ID }] })),
        )
        .mount(server)
        .await;

    let principals = [
        (APP_ID, Some("sp-1")),
        (GRAPH_APP_ID, Some("graph-sp")),
        (EXCHANGE_APP_ID, exchange_present.then_some("exo-sp")),
    ];
    for (app_id, principal) in principals {
        let value = match principal {
            Some(id) => json!([{ "id": id, "appId": app_id }]),
            None => json!([]),
        };
        Mock::given(method("GET"))
            .and(path("/v1.0/servicePrincipals"))
            .and(query_param("$filter", format!("appId eq '{}'", app_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
            .mount(server)
            .await;
    }

    let mut assignments: Vec<Value> = GRAPH_ROLES
        .iter()
        .map(|role| json!({ "principalId": "sp-1", "resourceId": "graph-sp", "appRoleId": role }))
        .collect();
    if exchange_present {
        assignments.push(
            json!({ "principalId": "sp-1", "resourceId": "exo-sp", "appRoleId": EXCHANGE_ROLE }),
        );
    }
    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals/sp-1/appRoleAssignments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": assignments })))
        .mount(server)
        .await;
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("identity"))
        .stdout(predicate::str::contains("grant-permissions"))
        .stdout(predicate::str::contains("grant-site"));
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("calprov"));
}

#[test]
fn test_identity_requires_automation_account() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .args(["identity", "--resource-group", "rg1", "--passphrase", "longenough"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--automation-account"));
}

#[test]
fn test_identity_rejects_short_passphrase_before_any_work() {
    let dir = TempDir::new().unwrap();
    let certs = dir.path().join("certs");
    let state = dir.path().join("state.json");

    calprov(dir.path())
        .args(["identity", "--automation-account", "aa1", "--resource-group", "rg1"])
        .args(["--passphrase", "1234567"])
        .arg("--output-dir")
        .arg(&certs)
        .arg("--state-file")
        .arg(&state)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8 characters"));

    assert!(!certs.exists());
    assert!(!state.exists());
}

#[test]
fn test_identity_passphrase_from_env() {
    let dir = TempDir::new().unwrap();
    let certs = dir.path().join("certs");

    // Passphrase is accepted, so the run gets as far as the unreachable directory
    calprov(dir.path())
        .env("CALPROV_AUTOMATION_ACCOUNT", "aa1")
        .env("CALPROV_RESOURCE_GROUP", "rg1")
        .env("CALPROV_CERT_PASSPHRASE", "correct horse")
        .env("AZURE_SUBSCRIPTION_ID", "sub-1")
        .arg("identity")
        .arg("--output-dir")
        .arg(&certs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Query tenant failed"))
        .stderr(predicate::str::contains("at least 8 characters").not());

    assert!(!certs.exists());
}

#[test]
fn test_grant_site_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .args(["grant-site", "--site-url", "http://contoso.example.com/sites/team"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid site URL"));
}

#[test]
fn test_grant_site_rejects_unknown_permission() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .args(["grant-site", "--site-url", "https://contoso.sharepoint.com/sites/team"])
        .args(["--permission", "owner"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--permission"));
}

#[test]
fn test_grant_permissions_without_state() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .arg("grant-permissions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Provisioning state not found"))
        .stderr(predicate::str::contains("--app-id"));
}

#[test]
fn test_grant_permissions_rejects_non_guid_app_id() {
    let dir = TempDir::new().unwrap();
    calprov(dir.path())
        .args(["grant-permissions", "--app-id", "not-a-guid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a GUID"));
}

#[test]
fn test_state_show_text() {
    let dir = TempDir::new().unwrap();
    write_state(dir.path());

    calprov(dir.path())
        .args(["state", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Provisioning State"))
        .stdout(predicate::str::contains(APP_ID))
        .stdout(predicate::str::contains("aa1"));
}

#[test]
fn test_state_show_json() {
    let dir = TempDir::new().unwrap();
    let state_file = write_state(dir.path());

    let output = calprov(dir.path())
        .args(["state", "show", "--format", "json"])
        .arg("--state-file")
        .arg(&state_file)
        .output()
        .unwrap();

    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["ApplicationId"], APP_ID);
    assert_eq!(shown["TenantId"], TENANT_ID);
}

#[test]
fn test_state_show_rejects_newer_schema() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("provisioning-state.json"),
        json!({ "SchemaVersion": 9, "ApplicationId": APP_ID }).to_string(),
    )
    .unwrap();

    calprov(dir.path())
        .args(["state", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("schema version 9"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_grant_permissions_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_directory(&server, true).await;
    let dir = TempDir::new().unwrap();
    write_state(dir.path());

    let output = calprov(dir.path())
        .env("CALPROV_GRAPH_URL", server.uri())
        .args(["grant-permissions", "--format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stage"], "tenant_grants");
    let items = report["items"].as_array().unwrap();
    assert!(items
        .iter()
        .all(|item| item["status"] == "already_satisfied"));

    // Nothing already granted is posted again
    let posts = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_grant_permissions_missing_resource_is_degraded_unless_strict() {
    let server = MockServer::start().await;
    mount_directory(&server, false).await;
    let dir = TempDir::new().unwrap();
    write_state(dir.path());

    calprov(dir.path())
        .env("CALPROV_GRAPH_URL", server.uri())
        .arg("grant-permissions")
        .assert()
        .success()
        .stdout(predicate::str::contains("PARTIALLY FAILED"))
        .stdout(predicate::str::contains("Exchange.ManageAsApp"));

    calprov(dir.path())
        .env("CALPROV_GRAPH_URL", server.uri())
        .args(["grant-permissions", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 permission(s) could not be granted"));
}
