// crates/dynamic-group-server/tests/http_routes.rs
// ============================================================================
// Module: HTTP Route Tests
// Description: End-to-end tests over a bound listener.
// Purpose: Validate startup wiring, routing, and persistence through HTTP.
// Dependencies: dynamic-group-server, dynamic-group-config, tokio
// ============================================================================

//! ## Overview
//! Builds servers from TOML configuration, binds them to an ephemeral port,
//! and drives the CMDB routes with raw HTTP/1.1 requests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use dynamic_group_config::DynamicGroupConfig;
use dynamic_group_server::Envelope;
use dynamic_group_server::GroupServer;
use dynamic_group_server::MAX_INVENTORY_BYTES;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes a small inventory fixture and returns its path.
fn write_inventory(dir: &Path) -> String {
    let path = dir.join("inventory.json");
    let inventory = json!({
        "instances": {
            "biz": [{"bk_biz_id": 5, "bk_biz_name": "game"}],
            "set": [{"bk_set_id": 1, "bk_biz_id": 5, "bk_parent_id": 5, "bk_set_name": "zone1"}],
            "module": [
                {"bk_module_id": 7, "bk_biz_id": 5, "bk_set_id": 1, "bk_module_name": "gate"}
            ],
            "host": [
                {"bk_host_id": 1, "bk_biz_id": 5, "bk_cloud_id": 0, "bk_module_id": [7],
                 "bk_host_innerip": "10.0.0.1"},
                {"bk_host_id": 2, "bk_biz_id": 5, "bk_cloud_id": 0, "bk_module_id": [],
                 "bk_host_innerip": "10.0.0.2"}
            ]
        }
    });
    fs::write(&path, serde_json::to_vec(&inventory).unwrap()).unwrap();
    path.display().to_string()
}

/// Builds a SQLite-backed configuration rooted in the temp directory.
fn sqlite_config(dir: &Path) -> DynamicGroupConfig {
    let inventory = write_inventory(dir);
    let database = dir.join("groups.db").display().to_string();
    let audit = dir.join("audit.jsonl").display().to_string();
    DynamicGroupConfig::from_toml(&format!(
        "[server.audit]\npath = '{audit}'\n\n[group_store]\ntype = \"sqlite\"\npath = \
         '{database}'\n\n[inventory]\npath = '{inventory}'\n"
    ))
    .unwrap()
}

/// Binds the server router to an ephemeral port.
async fn spawn(server: &GroupServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Sends one request and decodes the status and envelope.
async fn send(addr: SocketAddr, method: &str, path: &str, body: &Value) -> (u16, Envelope) {
    let payload = serde_json::to_string(body).unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nbk_user: admin\r\nContent-Type: \
         application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").expect("http response");
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (status, serde_json::from_str(body).unwrap())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies groups created over HTTP survive a server restart on SQLite.
#[test]
fn sqlite_groups_survive_restart() {
    let temp = TempDir::new().unwrap();
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let id = runtime.block_on(async {
        let server = GroupServer::from_config(sqlite_config(temp.path())).unwrap();
        let addr = spawn(&server).await;
        let (status, created) = send(
            addr,
            "POST",
            "/api/v3/dynamicgroup",
            &json!({
                "bk_biz_id": 5,
                "bk_obj_id": "host",
                "name": "gate hosts",
                "info": {"condition": [{"bk_obj_id": "module", "condition": [
                    {"field": "bk_module_name", "operator": "$eq", "value": "gate"}
                ]}]}
            }),
        )
        .await;
        assert_eq!(status, 200);
        assert!(created.result, "{created:?}");
        created.data["id"].as_str().unwrap().to_string()
    });
    drop(runtime);

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let server = GroupServer::from_config(sqlite_config(temp.path())).unwrap();
        let addr = spawn(&server).await;
        let (_, group) =
            send(addr, "GET", &format!("/api/v3/dynamicgroup/5/{id}"), &Value::Null).await;
        assert_eq!(group.data["name"], "gate hosts");
        assert_eq!(group.data["create_user"], "admin");

        let (_, result) = send(
            addr,
            "POST",
            &format!("/api/v3/dynamicgroup/data/5/{id}"),
            &json!({"page": {"limit": 10}, "fields": ["bk_host_innerip"]}),
        )
        .await;
        assert_eq!(result.data["count"], 1);
        assert_eq!(result.data["info"][0]["bk_host_innerip"], "10.0.0.1");

        let (_, health) = send(addr, "GET", "/healthz", &Value::Null).await;
        assert!(health.result);
    });

    let audit = fs::read_to_string(temp.path().join("audit.jsonl")).unwrap();
    let events: Vec<Value> =
        audit.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert!(events.iter().any(|event| event["event"] == "group_change"));
    assert!(events.iter().any(|event| event["operation"] == "execute"));
}

/// Verifies unknown routes return 404.
#[test]
fn unknown_routes_are_rejected() {
    let temp = TempDir::new().unwrap();
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let server = GroupServer::from_config(sqlite_config(temp.path())).unwrap();
        let addr = spawn(&server).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request =
            format!("GET /api/v3/unknown HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 404"), "{raw}");
    });
}

/// Verifies startup fails when the inventory fixture is missing or oversized.
#[test]
fn startup_rejects_bad_inventory() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.json").display().to_string();
    let config =
        DynamicGroupConfig::from_toml(&format!("[inventory]\npath = '{missing}'\n")).unwrap();
    let Err(error) = GroupServer::from_config(config) else {
        panic!("missing inventory accepted");
    };
    assert!(error.to_string().contains("inventory"), "{error}");

    let large = temp.path().join("large.json");
    let file = fs::File::create(&large).unwrap();
    file.set_len(MAX_INVENTORY_BYTES + 1).unwrap();
    let config = DynamicGroupConfig::from_toml(&format!(
        "[inventory]\npath = '{}'\n",
        large.display()
    ))
    .unwrap();
    let Err(error) = GroupServer::from_config(config) else {
        panic!("oversized inventory accepted");
    };
    assert!(error.to_string().contains("exceeds"), "{error}");
}

/// Verifies startup fails when the inventory is not valid JSON.
#[test]
fn startup_rejects_malformed_inventory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("inventory.json");
    fs::write(&path, b"{\"instances\": [").unwrap();
    let config = DynamicGroupConfig::from_toml(&format!(
        "[inventory]\npath = '{}'\n",
        path.display()
    ))
    .unwrap();
    assert!(GroupServer::from_config(config).is_err());
}
