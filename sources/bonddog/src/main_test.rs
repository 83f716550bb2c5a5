use crate::args::Arguments;
use crate::config::Config;
use crate::main_inner;
use crate::report::{FileSink, StreamSink};
use crate::test_util::FakeRemote;
use log::LevelFilter;
use serde_json::{json, Value};
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const HOST: &str = "scaqan17adm01.example.com";

const MII_UP: &str = "\
Currently Active Slave: eth1
MII Status: up
--
Slave Interface: eth1
MII Status: up
--
Slave Interface: eth2
MII Status: up
";

fn inventory(deployment: &str) -> String {
    format!(
        r#"{{
            "deployment": "{}",
            "hosts": {{
                "{}": {{
                    "client": {{"bridge": "vmbondeth0", "bond_master": "bondeth0", "bond_slaves": "eth1 eth2"}}
                }}
            }}
        }}"#,
        deployment, HOST
    )
}

fn payload(current: &str, new: &str) -> String {
    format!(
        r#"{{
            "network_types": {{"client": {{"bonding_mode": {{"current": "{}", "new": "{}"}}}}}},
            "num_participating_computes": 1,
            "participating_computes": [
                {{"compute_node_alias": "node-1", "compute_node_hostname": "{}"}}
            ]
        }}"#,
        current, new, HOST
    )
}

// write the payload and inventory files in a tempdir and return the tempdir
fn create_files(payload: &str, inventory: &str) -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path().join("payload.json"), payload).unwrap();
    write(tmp.path().join("inventory.json"), inventory).unwrap();
    tmp
}

fn arguments(dir: &Path, operation: &str, scope_id: &str) -> Arguments {
    Arguments {
        config: None,
        log_level: LevelFilter::Off,
        payload: dir.join("payload.json"),
        inventory: dir.join("inventory.json"),
        scope_id: scope_id.to_string(),
        output: Some(result_path(dir)),
        operation: operation.to_string(),
    }
}

fn result_path(dir: &Path) -> PathBuf {
    dir.join("result.json")
}

fn config() -> Config {
    Config {
        settle_delay_secs: 0,
        ..Config::default()
    }
}

async fn run(dir: &Path, operation: &str, scope_id: &str, remote: FakeRemote) -> bool {
    let sink = FileSink::new(result_path(dir));
    main_inner(
        arguments(dir, operation, scope_id),
        &config(),
        Arc::new(remote),
        &sink,
    )
    .await
    .is_ok()
}

fn result(dir: &Path) -> Value {
    serde_json::from_str(&read_to_string(result_path(dir)).unwrap()).unwrap()
}

#[tokio::test]
async fn validation_writes_result() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("oci-exacc"));
    let remote = FakeRemote::new().respond("'MII Status'", 0, MII_UP);
    assert!(run(tmp.path(), "validation", "job-1", remote).await);

    assert_eq!(
        result(tmp.path()),
        json!({
            "overallStatus": "SUCCESS",
            "participating_computes": [{
                "compute_node_alias": "node-1",
                "compute_node_hostname": HOST,
                "network_types": {
                    "client": {
                        "bonding_mode": "lacp",
                        "status": "SUCCESS",
                        "msg": "Current and new bonding modes are same, no validation needed"
                    }
                }
            }]
        })
    );
}

#[tokio::test]
async fn unit_failures_still_exit_cleanly() {
    let tmp = create_files(&payload("active-backup", "lacp"), &inventory("oci-exacc"));
    let remote = FakeRemote::new()
        .respond("'MII Status'", 0, MII_UP)
        .fail("802.3ad");
    assert!(run(tmp.path(), "validation", "job-1", remote).await);

    let result = result(tmp.path());
    assert_eq!(result["overallStatus"], "FAILURE");
    assert_eq!(result["errorcode"], "VALIDATION_FAILED");
    assert_eq!(
        result["participating_computes"][0]["network_types"]["client"]["status"],
        "FAILURE"
    );
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let tmp = create_files(
        r#"{"network_types": {"client": {"bonding_mode": {"current": "lacp", "new": "lacp"}}}}"#,
        &inventory("oci-exacc"),
    );
    let remote = FakeRemote::new();
    assert!(!run(tmp.path(), "validation", "job-1", remote).await);

    let result = result(tmp.path());
    assert_eq!(result["overallStatus"], "FAILURE");
    assert_eq!(result["errorcode"], "INVALID_PAYLOAD");
    assert!(result["msg"]
        .as_str()
        .unwrap()
        .contains("missing participating_computes"));
    assert_eq!(result["participating_computes"], json!([]));
}

#[tokio::test]
async fn unsafe_scope_id_is_rejected() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("oci-exacc"));
    let remote = FakeRemote::new();
    assert!(!run(tmp.path(), "modification", "../etc", remote).await);
    assert_eq!(result(tmp.path())["errorcode"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn unsupported_operation_is_rejected() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("oci-exacc"));
    let remote = Arc::new(FakeRemote::new());
    let sink = FileSink::new(result_path(tmp.path()));
    assert!(main_inner(
        arguments(tmp.path(), "rollback", "job-1"),
        &config(),
        remote.clone(),
        &sink,
    )
    .await
    .is_err());

    let result = result(tmp.path());
    assert_eq!(result["errorcode"], "OPERATION_NOT_SUPPORTED");
    assert_eq!(result["msg"], "Wrong operation rollback identified");
    assert!(remote.commands().is_empty());
}

#[tokio::test]
async fn unsupported_deployment_is_rejected() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("exacs"));
    let remote = FakeRemote::new();
    assert!(!run(tmp.path(), "validation", "job-1", remote).await);
    assert_eq!(result(tmp.path())["errorcode"], "OPERATION_NOT_SUPPORTED");
}

#[tokio::test]
async fn missing_inventory_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path().join("payload.json"), payload("lacp", "lacp")).unwrap();
    let remote = FakeRemote::new();
    assert!(!run(tmp.path(), "validation", "job-1", remote).await);
    assert!(!result_path(tmp.path()).exists());
}

#[tokio::test]
async fn printed_result_is_bare_json() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("oci-exacc"));
    let remote = FakeRemote::new().respond("'MII Status'", 0, MII_UP);
    let sink = StreamSink::new(Vec::new());
    let mut args = arguments(tmp.path(), "validation", "job-1");
    args.output = None;
    main_inner(args, &config(), Arc::new(remote), &sink)
        .await
        .unwrap();

    let printed = sink.into_inner();
    let value: Value = serde_json::from_slice(&printed).unwrap();
    assert_eq!(value["overallStatus"], "SUCCESS");
    assert!(!result_path(tmp.path()).exists());
}

#[tokio::test]
async fn printed_rejection_is_bare_json() {
    let tmp = create_files(&payload("lacp", "lacp"), &inventory("oci-exacc"));
    let sink = StreamSink::new(Vec::new());
    assert!(main_inner(
        arguments(tmp.path(), "rollback", "job-1"),
        &config(),
        Arc::new(FakeRemote::new()),
        &sink,
    )
    .await
    .is_err());

    let value: Value = serde_json::from_slice(&sink.into_inner()).unwrap();
    assert_eq!(value["errorcode"], "OPERATION_NOT_SUPPORTED");
}
