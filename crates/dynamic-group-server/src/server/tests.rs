// crates/dynamic-group-server/src/server/tests.rs
// ============================================================================
// Module: Group Server Unit Tests
// Description: Handler tests for envelopes, error codes, and audit events.
// Purpose: Validate HTTP handling against an in-memory service.
// Dependencies: dynamic-group-server
// ============================================================================

//! ## Overview
//! Drives the route handlers directly with in-memory stores and a recording
//! audit sink, decoding every response as a CMDB envelope.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only handler assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::Response;
use dynamic_group_core::GroupLimits;
use dynamic_group_core::GroupService;
use dynamic_group_core::InMemoryGroupStore;
use dynamic_group_core::InMemoryInventory;
use dynamic_group_core::ObjectId;
use dynamic_group_core::SharedGroupStore;
use dynamic_group_core::SharedInventory;
use dynamic_group_core::runtime::IdGenerator;
use dynamic_group_core::runtime::ids::REQUEST_ID_PREFIX;
use serde_json::Value;
use serde_json::json;

use super::ServerState;
use super::handle_create;
use super::handle_delete;
use super::handle_execute;
use super::handle_get;
use super::handle_healthz;
use super::handle_search;
use super::handle_update;
use crate::audit::ChangeAction;
use crate::audit::GroupAuditSink;
use crate::audit::GroupChangeEvent;
use crate::audit::GroupRequestEvent;
use crate::audit::RequestOutcome;
use crate::envelope::CODE_DUPLICATE_ITEM;
use crate::envelope::CODE_JSON_UNMARSHAL_FAILED;
use crate::envelope::CODE_NOT_FOUND;
use crate::envelope::CODE_PAGE_LIMIT_EXCEEDED;
use crate::envelope::CODE_PARAMS_INVALID;
use crate::envelope::CODE_REQUEST_FAILED;
use crate::envelope::CODE_UNEXPECTED_FIELD_TYPE;
use crate::envelope::CODE_UNKNOWN_ERROR;
use crate::envelope::Envelope;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Audit sink that keeps events in memory.
#[derive(Default)]
struct RecordingAuditSink {
    /// Recorded request events.
    requests: Mutex<Vec<GroupRequestEvent>>,
    /// Recorded change events.
    changes: Mutex<Vec<GroupChangeEvent>>,
}

impl GroupAuditSink for RecordingAuditSink {
    fn record_request(&self, event: &GroupRequestEvent) {
        self.requests.lock().unwrap().push(event.clone());
    }

    fn record_change(&self, event: &GroupChangeEvent) {
        self.changes.lock().unwrap().push(event.clone());
    }
}

/// Handler state plus the sink it records into.
struct Harness {
    /// Shared handler state.
    state: Arc<ServerState>,
    /// Recording audit sink.
    audit: Arc<RecordingAuditSink>,
}

impl Harness {
    /// Builds a harness over a fresh in-memory store.
    fn new() -> Self {
        let store = SharedGroupStore::from_store(InMemoryGroupStore::new());
        Self::with(store, GroupLimits::default())
    }

    /// Builds a harness over a shared store with custom limits.
    fn with(store: SharedGroupStore, limits: GroupLimits) -> Self {
        Self::build(store, limits, Duration::from_secs(30), 64 * 1024)
    }

    /// Builds a harness with every knob explicit.
    fn build(
        store: SharedGroupStore,
        limits: GroupLimits,
        execute_timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        let inventory = InMemoryInventory::from_json(inventory_json().to_string().as_bytes())
            .expect("fixture inventory");
        let service =
            GroupService::new(store, SharedInventory::from_inventory(inventory), limits);
        let audit = Arc::new(RecordingAuditSink::default());
        let sink: Arc<dyn GroupAuditSink> = audit.clone();
        let state = Arc::new(ServerState {
            service,
            audit: sink,
            request_ids: IdGenerator::new(REQUEST_ID_PREFIX),
            max_body_bytes,
            execute_timeout,
            user_header: "bk_user".to_string(),
        });
        Self {
            state,
            audit,
        }
    }

    /// Posts a create request.
    fn create(&self, body: &Value) -> (StatusCode, HeaderMap, Envelope) {
        run(handle_create(State(self.state.clone()), user_headers(), json_body(body)))
    }

    /// Creates a host group matching `cc_os1` and returns its id.
    fn create_hosts(&self, name: &str) -> String {
        let (_, _, envelope) = self.create(&json!({
            "bk_biz_id": 2,
            "bk_obj_id": "host",
            "name": name,
            "info": {"condition": [{"bk_obj_id": "host", "condition": [
                {"field": "bk_os_name", "operator": "$eq", "value": "cc_os1"}
            ]}]}
        }));
        assert!(envelope.result, "{envelope:?}");
        envelope.data["id"].as_str().unwrap().to_string()
    }

    /// Executes a group in business 2.
    fn execute(&self, id: &str, body: &Value) -> Envelope {
        run(handle_execute(
            State(self.state.clone()),
            group_path("2", id),
            user_headers(),
            json_body(body),
        ))
        .2
    }
}

/// Inventory with one set, one module, and three hosts.
fn inventory_json() -> Value {
    json!({
        "instances": {
            "biz": [{"bk_biz_id": 2, "bk_biz_name": "blueking"}],
            "set": [{"bk_set_id": 1, "bk_biz_id": 2, "bk_parent_id": 2, "bk_set_name": "set1"}],
            "module": [
                {"bk_module_id": 10, "bk_biz_id": 2, "bk_set_id": 1, "bk_module_name": "web"}
            ],
            "host": [
                {"bk_host_id": 1, "bk_biz_id": 2, "bk_os_name": "cc_os1", "bk_cloud_id": 0,
                 "bk_host_innerip": "127.0.0.1", "bk_module_id": [10]},
                {"bk_host_id": 2, "bk_biz_id": 2, "bk_os_name": "cc_os2", "bk_cloud_id": 0,
                 "bk_host_innerip": "127.0.0.2", "bk_module_id": [10]},
                {"bk_host_id": 3, "bk_biz_id": 2, "bk_os_name": "cc_os1", "bk_cloud_id": 0,
                 "bk_host_innerip": "127.0.0.3", "bk_module_id": [10]}
            ]
        }
    })
}

/// Headers carrying the default user.
fn user_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("bk_user"), HeaderValue::from_static("admin"));
    headers
}

/// Serializes a JSON request body.
fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

/// Builds a business/group path extractor.
fn group_path(app: &str, id: &str) -> Path<(String, String)> {
    Path((app.to_string(), id.to_string()))
}

/// Drives a handler future and decodes its envelope.
fn run<F: Future<Output = Response>>(future: F) -> (StatusCode, HeaderMap, Envelope) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let response = future.await;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, headers, serde_json::from_slice(&bytes).expect("envelope"))
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies create, get, and execute succeed and emit request events.
#[test]
fn create_get_execute_round_trip() {
    let harness = Harness::new();
    let id = harness.create_hosts("linux hosts");

    let (status, _, envelope) =
        run(handle_get(State(harness.state.clone()), group_path("2", &id), user_headers()));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope.data["name"], "linux hosts");
    assert_eq!(envelope.data["bk_obj_id"], "host");
    assert_eq!(envelope.data["create_user"], "admin");

    let envelope = harness.execute(
        &id,
        &json!({
            "page": {"start": 0, "limit": 10, "sort": "-bk_host_id"},
            "fields": ["bk_host_innerip"]
        }),
    );
    assert!(envelope.result);
    assert_eq!(envelope.data["count"], 2);
    assert_eq!(
        envelope.data["info"],
        json!([
            {"bk_host_id": 3, "bk_host_innerip": "127.0.0.3"},
            {"bk_host_id": 1, "bk_host_innerip": "127.0.0.1"}
        ])
    );

    let requests = harness.audit.requests.lock().unwrap();
    let operations: Vec<&str> = requests.iter().map(|event| event.operation).collect();
    assert_eq!(operations, vec!["create", "get", "execute"]);
    assert!(requests.iter().all(|event| event.outcome == RequestOutcome::Ok));
    assert_eq!(requests[2].group_id.as_deref(), Some(id.as_str()));
    assert_eq!(requests[2].bk_biz_id, Some(2));
    let changes = harness.audit.changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ChangeAction::Create);
    assert!(changes[0].before.is_none());
}

/// Verifies mutations emit change events with before and after images.
#[test]
fn update_and_delete_emit_change_events() {
    let harness = Harness::new();
    let id = harness.create_hosts("hosts");
    let (_, _, envelope) = run(handle_update(
        State(harness.state.clone()),
        group_path("2", &id),
        user_headers(),
        json_body(&json!({"name": "renamed"})),
    ));
    assert!(envelope.result, "{envelope:?}");
    assert_eq!(envelope.data, Value::Null);

    let (_, _, envelope) =
        run(handle_delete(State(harness.state.clone()), group_path("2", &id), user_headers()));
    assert!(envelope.result);
    let (_, _, envelope) =
        run(handle_delete(State(harness.state.clone()), group_path("2", &id), user_headers()));
    assert_eq!(envelope.bk_error_code, CODE_NOT_FOUND);

    let changes = harness.audit.changes.lock().unwrap();
    let actions: Vec<ChangeAction> = changes.iter().map(|event| event.action).collect();
    assert_eq!(actions, vec![ChangeAction::Create, ChangeAction::Update, ChangeAction::Delete]);
    assert_eq!(changes[1].before.as_ref().unwrap()["name"], "hosts");
    assert_eq!(changes[1].after.as_ref().unwrap()["name"], "renamed");
    assert!(changes[2].after.is_none());
}

/// Verifies a reused name maps to the duplicate code with HTTP 200.
#[test]
fn duplicate_name_reports_duplicate_code() {
    let harness = Harness::new();
    harness.create_hosts("hosts");
    let (status, _, envelope) = harness.create(&json!({
        "bk_biz_id": 2,
        "bk_obj_id": "host",
        "name": "hosts",
        "info": {"condition": [{"bk_obj_id": "host", "condition": [
            {"field": "bk_os_name", "operator": "$eq", "value": "cc_os2"}
        ]}]}
    }));
    assert_eq!(status, StatusCode::OK);
    assert!(!envelope.result);
    assert_eq!(envelope.bk_error_code, CODE_DUPLICATE_ITEM);
    assert_eq!(envelope.permission, None);
}

/// Verifies undecodable bodies map to the unmarshal code.
#[test]
fn malformed_body_reports_unmarshal_code() {
    let harness = Harness::new();
    let (_, _, envelope) = run(handle_create(
        State(harness.state.clone()),
        user_headers(),
        Body::from("{\"bk_biz_id\": 2,"),
    ));
    assert_eq!(envelope.bk_error_code, CODE_JSON_UNMARSHAL_FAILED);
    let requests = harness.audit.requests.lock().unwrap();
    assert_eq!(requests[0].outcome, RequestOutcome::Error);
    assert_eq!(requests[0].error_code, Some(CODE_JSON_UNMARSHAL_FAILED));
}

/// Verifies requests without the user header are rejected.
#[test]
fn missing_user_header_is_rejected() {
    let harness = Harness::new();
    let (_, _, envelope) = run(handle_search(
        State(harness.state.clone()),
        Path("2".to_string()),
        HeaderMap::new(),
        json_body(&json!({"page": {"limit": 10}})),
    ));
    assert_eq!(envelope.bk_error_code, CODE_PARAMS_INVALID);
    assert!(envelope.bk_error_msg.contains("bk_user"));
}

/// Verifies non-numeric and zero business ids are rejected.
#[test]
fn invalid_business_path_is_rejected() {
    let harness = Harness::new();
    for app in ["abc", "0", "-1"] {
        let (_, _, envelope) =
            run(handle_get(State(harness.state.clone()), group_path(app, "dg-1"), user_headers()));
        assert_eq!(envelope.bk_error_code, CODE_PARAMS_INVALID, "app {app}");
    }
}

/// Verifies bodies over the limit change the HTTP status.
#[test]
fn oversized_body_is_rejected_with_413() {
    let harness = Harness::build(
        SharedGroupStore::from_store(InMemoryGroupStore::new()),
        GroupLimits::default(),
        Duration::from_secs(30),
        32,
    );
    let (status, _, envelope) = harness.create(&json!({
        "bk_biz_id": 2,
        "bk_obj_id": "host",
        "name": "a name long enough to push the body over the limit",
    }));
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(envelope.bk_error_code, CODE_PARAMS_INVALID);
}

/// Verifies execute validation failures map to distinct codes.
#[test]
fn execute_maps_validation_failures_to_codes() {
    let harness = Harness::new();
    let id = harness.create_hosts("hosts");
    let envelope = harness.execute(&id, &json!({"page": {"limit": 0}}));
    assert_eq!(envelope.bk_error_code, CODE_PAGE_LIMIT_EXCEEDED);
    let envelope = harness.execute(
        &id,
        &json!({
            "page": {"limit": 10},
            "variable_condition": [{"bk_obj_id": "host", "condition": [
                {"field": "bk_os_name", "operator": "$gt", "value": "cc_os1"}
            ]}]
        }),
    );
    assert_eq!(envelope.bk_error_code, CODE_UNEXPECTED_FIELD_TYPE);
    let envelope = harness.execute("dg-missing", &json!({"page": {"limit": 10}}));
    assert_eq!(envelope.bk_error_code, CODE_NOT_FOUND);
}

/// Verifies groups targeting non-executable objects fail at execute.
#[test]
fn non_executable_target_reports_unknown_error() {
    let store = SharedGroupStore::from_store(InMemoryGroupStore::new());
    let permissive = GroupLimits {
        executable_targets: vec![ObjectId::new("host"), ObjectId::new("module")],
        ..GroupLimits::default()
    };
    let creator = Harness::with(store.clone(), permissive);
    let (_, _, envelope) = creator.create(&json!({
        "bk_biz_id": 2,
        "bk_obj_id": "module",
        "name": "modules",
        "info": {"condition": [{"bk_obj_id": "module", "condition": [
            {"field": "bk_module_name", "operator": "$eq", "value": "web"}
        ]}]}
    }));
    let id = envelope.data["id"].as_str().unwrap().to_string();

    let strict = Harness::with(store, GroupLimits::default());
    let envelope = strict.execute(&id, &json!({"page": {"limit": 10}}));
    assert_eq!(envelope.bk_error_code, CODE_UNKNOWN_ERROR);
}

/// Verifies an expired execute deadline maps to the request failed code.
#[test]
fn expired_deadline_reports_request_failed() {
    let store = SharedGroupStore::from_store(InMemoryGroupStore::new());
    let creator = Harness::with(store.clone(), GroupLimits::default());
    let id = creator.create_hosts("hosts");
    let harness = Harness::build(store, GroupLimits::default(), Duration::ZERO, 64 * 1024);
    let envelope = harness.execute(&id, &json!({"page": {"limit": 10}}));
    assert_eq!(envelope.bk_error_code, CODE_REQUEST_FAILED);
}

/// Verifies client request ids are echoed and missing ones are issued.
#[test]
fn request_id_is_echoed_or_issued() {
    let harness = Harness::new();
    let mut headers = user_headers();
    headers.insert(HeaderName::from_static("x-request-id"), HeaderValue::from_static("trace-42"));
    let (_, response_headers, _) =
        run(handle_get(State(harness.state.clone()), group_path("2", "dg-1"), headers));
    assert_eq!(response_headers.get("x-request-id").unwrap(), "trace-42");

    let (_, response_headers, _) =
        run(handle_get(State(harness.state.clone()), group_path("2", "dg-1"), user_headers()));
    let issued = response_headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(issued.starts_with("dg-req-"), "{issued}");
    assert_eq!(response_headers.get("content-type").unwrap(), "application/json");
}

/// Verifies search filters by name substring and pages the result.
#[test]
fn search_pages_groups() {
    let harness = Harness::new();
    for name in ["alpha", "beta", "gamma"] {
        harness.create_hosts(name);
    }
    let (_, _, envelope) = run(handle_search(
        State(harness.state.clone()),
        Path("2".to_string()),
        user_headers(),
        json_body(&json!({
            "condition": {"name": "a"},
            "page": {"start": 1, "limit": 1, "sort": "name"}
        })),
    ));
    assert!(envelope.result);
    assert_eq!(envelope.data["count"], 3);
    assert_eq!(envelope.data["info"][0]["name"], "beta");
}

/// Verifies the readiness probe reports a ready store.
#[test]
fn healthz_reports_ready() {
    let harness = Harness::new();
    let (status, _, envelope) =
        run(handle_healthz(State(harness.state.clone()), HeaderMap::new()));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope.data, json!({"status": "ready"}));
}
