// crates/dynamic-group-server/src/server.rs
// ============================================================================
// Module: Dynamic Group HTTP Server
// Description: CMDB-compatible HTTP routes over the group service.
// Purpose: Expose create, update, delete, get, search, and execute.
// Dependencies: dynamic-group-core, dynamic-group-config, axum, tokio
// ============================================================================

//! ## Overview
//! The server maps the CMDB dynamic group routes onto [`GroupService`].
//! Bodies are read with a hard size cap, service calls run on the blocking
//! pool, and execute calls carry a deadline that cancels the resolver at its
//! next checkpoint. Every response uses the CMDB envelope and every request
//! produces a `group_request` audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use dynamic_group_config::AuditConfig;
use dynamic_group_config::DynamicGroupConfig;
use dynamic_group_config::GroupStoreConfig;
use dynamic_group_config::GroupStoreType;
use dynamic_group_config::ServerConfig;
use dynamic_group_core::AppId;
use dynamic_group_core::CreateGroupRequest;
use dynamic_group_core::DynamicGroup;
use dynamic_group_core::ExecuteRequest;
use dynamic_group_core::ExecutionContext;
use dynamic_group_core::GroupId;
use dynamic_group_core::GroupService;
use dynamic_group_core::InMemoryGroupStore;
use dynamic_group_core::InMemoryInventory;
use dynamic_group_core::ObjectModel;
use dynamic_group_core::SearchGroupRequest;
use dynamic_group_core::ServiceError;
use dynamic_group_core::SharedGroupStore;
use dynamic_group_core::SharedInventory;
use dynamic_group_core::UpdateGroupRequest;
use dynamic_group_core::ValidationError;
use dynamic_group_core::runtime::IdGenerator;
use dynamic_group_core::runtime::ids::REQUEST_ID_PREFIX;
use dynamic_group_core::runtime::ids::sanitize_client_id;
use dynamic_group_store_sqlite::SqliteGroupStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;

use crate::audit::ChangeAction;
use crate::audit::FileAuditSink;
use crate::audit::GroupAuditSink;
use crate::audit::GroupChangeEvent;
use crate::audit::GroupChangeEventParams;
use crate::audit::GroupRequestEvent;
use crate::audit::GroupRequestEventParams;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::envelope::ApiError;
use crate::envelope::Envelope;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the request identifier.
const REQUEST_ID_HEADER: &str = "x-request-id";
/// Maximum inventory fixture size in bytes.
pub const MAX_INVENTORY_BYTES: u64 = 64 * 1024 * 1024;
/// Envelope returned when the real envelope fails to serialize.
const FALLBACK_ENVELOPE: &str = "{\"result\":false,\"bk_error_code\":1199017,\"bk_error_msg\":\
                                 \"serialization failed\",\"permission\":null,\"data\":null}";

// ============================================================================
// SECTION: Server
// ============================================================================

/// Dynamic group HTTP server instance.
pub struct GroupServer {
    /// Server configuration.
    config: DynamicGroupConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl GroupServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the configuration is invalid or the store,
    /// inventory, or audit sink cannot be opened.
    pub fn from_config(config: DynamicGroupConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = build_group_store(&config.group_store)?;
        let inventory = load_inventory(config.inventory.path.as_deref())?;
        let audit = build_audit_sink(&config.server.audit)?;
        let service = GroupService::new(store, inventory, config.limits.group_limits());
        let state = Arc::new(ServerState::new(service, audit, &config.server));
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the axum router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    /// Serves HTTP requests until interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Resolves when the process receives an interrupt.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Builds the group store from configuration.
fn build_group_store(config: &GroupStoreConfig) -> Result<SharedGroupStore, ServerError> {
    match config.store_type {
        GroupStoreType::Memory => Ok(SharedGroupStore::from_store(InMemoryGroupStore::new())),
        GroupStoreType::Sqlite => {
            let sqlite_config = config.sqlite_config().ok_or_else(|| {
                ServerError::Config("sqlite group_store requires path".to_string())
            })?;
            let store = SqliteGroupStore::new(&sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(SharedGroupStore::from_store(store))
        }
    }
}

/// Loads the inventory fixture, or an empty default-model inventory.
fn load_inventory(path: Option<&std::path::Path>) -> Result<SharedInventory, ServerError> {
    let Some(path) = path else {
        let inventory = InMemoryInventory::new(ObjectModel::cmdb_default());
        return Ok(SharedInventory::from_inventory(inventory));
    };
    let metadata = fs::metadata(path)
        .map_err(|err| ServerError::Init(format!("inventory {}: {err}", path.display())))?;
    if metadata.len() > MAX_INVENTORY_BYTES {
        return Err(ServerError::Init(format!(
            "inventory {} exceeds {MAX_INVENTORY_BYTES} bytes",
            path.display()
        )));
    }
    let bytes = fs::read(path)
        .map_err(|err| ServerError::Init(format!("inventory {}: {err}", path.display())))?;
    let inventory =
        InMemoryInventory::from_json(&bytes).map_err(|err| ServerError::Init(err.to_string()))?;
    Ok(SharedInventory::from_inventory(inventory))
}

/// Builds the audit sink from configuration.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn GroupAuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(path).map_err(|err| {
                ServerError::Init(format!("audit log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Builds the route table.
fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/v3/dynamicgroup", post(handle_create))
        .route(
            "/api/v3/dynamicgroup/{bk_biz_id}/{id}",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/api/v3/dynamicgroup/search/{bk_biz_id}", post(handle_search))
        .route("/api/v3/dynamicgroup/data/{bk_biz_id}/{id}", post(handle_execute))
        .route("/healthz", get(handle_healthz))
        .with_state(state)
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for request handlers.
struct ServerState {
    /// Group service.
    service: GroupService,
    /// Audit sink for request and change events.
    audit: Arc<dyn GroupAuditSink>,
    /// Request identifier generator.
    request_ids: IdGenerator,
    /// Maximum request body size.
    max_body_bytes: usize,
    /// Deadline applied to execute calls.
    execute_timeout: Duration,
    /// Lowercased header carrying the calling user.
    user_header: String,
}

impl ServerState {
    /// Creates handler state from server settings.
    fn new(service: GroupService, audit: Arc<dyn GroupAuditSink>, config: &ServerConfig) -> Self {
        Self {
            service,
            audit,
            request_ids: IdGenerator::new(REQUEST_ID_PREFIX),
            max_body_bytes: config.max_body_bytes,
            execute_timeout: Duration::from_millis(config.execute_timeout_ms),
            user_header: config.user_header.trim().to_ascii_lowercase(),
        }
    }

    /// Records a change event for a successful mutation.
    fn record_change(
        &self,
        scope: &RequestScope,
        action: ChangeAction,
        before: Option<&DynamicGroup>,
        after: Option<&DynamicGroup>,
    ) {
        let Some(group) = after.or(before) else {
            return;
        };
        let event = GroupChangeEvent::new(GroupChangeEventParams {
            request_id: scope.request_id.clone(),
            action,
            bk_biz_id: group.app_id.get(),
            group_id: group.id.to_string(),
            name: group.name.clone(),
            user: scope.user.clone().unwrap_or_default(),
            before: before.and_then(|group| serde_json::to_value(group).ok()),
            after: after.and_then(|group| serde_json::to_value(group).ok()),
        });
        self.audit.record_change(&event);
    }
}

/// Audit details accumulated while handling one request.
struct RequestScope {
    /// Request identifier.
    request_id: String,
    /// Operation label.
    operation: &'static str,
    /// Business identifier when parsed.
    bk_biz_id: Option<u64>,
    /// Group identifier when known.
    group_id: Option<String>,
    /// Calling user when provided.
    user: Option<String>,
    /// Request body size in bytes.
    request_bytes: usize,
}

impl RequestScope {
    /// Starts a scope, reusing a safe client request id when supplied.
    fn new(state: &ServerState, operation: &'static str, headers: &HeaderMap) -> Self {
        let client_id = headers.get(REQUEST_ID_HEADER).and_then(|value| value.to_str().ok());
        let request_id =
            sanitize_client_id(client_id).unwrap_or_else(|| state.request_ids.issue());
        let user = headers
            .get(state.user_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            request_id,
            operation,
            bk_biz_id: None,
            group_id: None,
            user,
            request_bytes: 0,
        }
    }

    /// Returns the calling user or fails when the header is missing.
    fn require_user(&self, state: &ServerState) -> Result<String, ApiError> {
        self.user.clone().ok_or_else(|| ApiError::InvalidParam(state.user_header.clone()))
    }

    /// Parses the business path segment.
    fn parse_app(&mut self, raw: &str) -> Result<AppId, ApiError> {
        let value: u64 =
            raw.parse().map_err(|_| ApiError::InvalidParam("bk_biz_id".to_string()))?;
        self.bk_biz_id = Some(value);
        AppId::from_raw(value).ok_or(ApiError::Service(ServiceError::Validation(
            ValidationError::InvalidApp,
        )))
    }

    /// Parses the business and group path segments.
    fn parse_group_path(
        &mut self,
        raw_app: &str,
        raw_id: &str,
    ) -> Result<(AppId, GroupId), ApiError> {
        let app_id = self.parse_app(raw_app)?;
        let id = raw_id.trim();
        if id.is_empty() {
            return Err(ApiError::InvalidParam("id".to_string()));
        }
        self.group_id = Some(id.to_string());
        Ok((app_id, GroupId::new(id)))
    }

    /// Reads and records the request body.
    async fn read_body(&mut self, state: &ServerState, body: Body) -> Result<Bytes, ApiError> {
        let bytes = axum::body::to_bytes(body, state.max_body_bytes).await.map_err(|_| {
            ApiError::BodyTooLarge {
                limit: state.max_body_bytes,
            }
        })?;
        self.request_bytes = bytes.len();
        Ok(bytes)
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /api/v3/dynamicgroup`.
async fn handle_create(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let mut scope = RequestScope::new(&state, "create", &headers);
    let result = create_group(&state, &mut scope, body).await;
    respond(&state, &scope, result)
}

/// Handles `PUT /api/v3/dynamicgroup/{bk_biz_id}/{id}`.
async fn handle_update(
    State(state): State<Arc<ServerState>>,
    Path((app, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let mut scope = RequestScope::new(&state, "update", &headers);
    let result = update_group(&state, &mut scope, &app, &id, body).await;
    respond(&state, &scope, result)
}

/// Handles `DELETE /api/v3/dynamicgroup/{bk_biz_id}/{id}`.
async fn handle_delete(
    State(state): State<Arc<ServerState>>,
    Path((app, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut scope = RequestScope::new(&state, "delete", &headers);
    let result = delete_group(&state, &mut scope, &app, &id).await;
    respond(&state, &scope, result)
}

/// Handles `GET /api/v3/dynamicgroup/{bk_biz_id}/{id}`.
async fn handle_get(
    State(state): State<Arc<ServerState>>,
    Path((app, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut scope = RequestScope::new(&state, "get", &headers);
    let result = get_group(&state, &mut scope, &app, &id).await;
    respond(&state, &scope, result)
}

/// Handles `POST /api/v3/dynamicgroup/search/{bk_biz_id}`.
async fn handle_search(
    State(state): State<Arc<ServerState>>,
    Path(app): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let mut scope = RequestScope::new(&state, "search", &headers);
    let result = search_groups(&state, &mut scope, &app, body).await;
    respond(&state, &scope, result)
}

/// Handles `POST /api/v3/dynamicgroup/data/{bk_biz_id}/{id}`.
async fn handle_execute(
    State(state): State<Arc<ServerState>>,
    Path((app, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let mut scope = RequestScope::new(&state, "execute", &headers);
    let result = execute_group(&state, &mut scope, &app, &id, body).await;
    respond(&state, &scope, result)
}

/// Handles `GET /healthz`.
async fn handle_healthz(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let scope = RequestScope::new(&state, "healthz", &headers);
    let service = state.service.clone();
    let result = match run_blocking("healthz", move || service.readiness()).await {
        Ok(()) => Ok(json!({"status": "ready"})),
        Err(ApiError::Service(err)) => Err(ApiError::Unavailable(err.to_string())),
        Err(err) => Err(err),
    };
    respond(&state, &scope, result)
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Creates a group and returns its identifier.
async fn create_group(
    state: &ServerState,
    scope: &mut RequestScope,
    body: Body,
) -> Result<Value, ApiError> {
    let user = scope.require_user(state)?;
    let bytes = scope.read_body(state, body).await?;
    let request: CreateGroupRequest = decode(&bytes)?;
    scope.bk_biz_id = Some(request.app_id);
    let service = state.service.clone();
    let group = run_blocking("create", move || service.create(&user, request)).await?;
    scope.group_id = Some(group.id.to_string());
    state.record_change(scope, ChangeAction::Create, None, Some(&group));
    Ok(json!({"id": group.id}))
}

/// Applies a partial update.
async fn update_group(
    state: &ServerState,
    scope: &mut RequestScope,
    raw_app: &str,
    raw_id: &str,
    body: Body,
) -> Result<Value, ApiError> {
    let user = scope.require_user(state)?;
    let (app_id, id) = scope.parse_group_path(raw_app, raw_id)?;
    let bytes = scope.read_body(state, body).await?;
    let request: UpdateGroupRequest = decode(&bytes)?;
    let service = state.service.clone();
    let change =
        run_blocking("update", move || service.update(&user, app_id, &id, request)).await?;
    state.record_change(scope, ChangeAction::Update, Some(&change.before), Some(&change.after));
    Ok(Value::Null)
}

/// Deletes a group.
async fn delete_group(
    state: &ServerState,
    scope: &mut RequestScope,
    raw_app: &str,
    raw_id: &str,
) -> Result<Value, ApiError> {
    scope.require_user(state)?;
    let (app_id, id) = scope.parse_group_path(raw_app, raw_id)?;
    let service = state.service.clone();
    let removed = run_blocking("delete", move || service.delete(app_id, &id)).await?;
    state.record_change(scope, ChangeAction::Delete, Some(&removed), None);
    Ok(Value::Null)
}

/// Loads one group.
async fn get_group(
    state: &ServerState,
    scope: &mut RequestScope,
    raw_app: &str,
    raw_id: &str,
) -> Result<Value, ApiError> {
    scope.require_user(state)?;
    let (app_id, id) = scope.parse_group_path(raw_app, raw_id)?;
    let service = state.service.clone();
    let group = run_blocking("get", move || service.get(app_id, &id)).await?;
    to_data(&group)
}

/// Searches the business's groups.
async fn search_groups(
    state: &ServerState,
    scope: &mut RequestScope,
    raw_app: &str,
    body: Body,
) -> Result<Value, ApiError> {
    scope.require_user(state)?;
    let app_id = scope.parse_app(raw_app)?;
    let bytes = scope.read_body(state, body).await?;
    let request: SearchGroupRequest = decode(&bytes)?;
    let service = state.service.clone();
    let result = run_blocking("search", move || service.search(app_id, &request)).await?;
    to_data(&result)
}

/// Executes a group under the configured deadline.
async fn execute_group(
    state: &ServerState,
    scope: &mut RequestScope,
    raw_app: &str,
    raw_id: &str,
    body: Body,
) -> Result<Value, ApiError> {
    scope.require_user(state)?;
    let (app_id, id) = scope.parse_group_path(raw_app, raw_id)?;
    let bytes = scope.read_body(state, body).await?;
    let request: ExecuteRequest = decode(&bytes)?;
    let context = ExecutionContext::with_timeout(state.execute_timeout);
    let worker_context = context.clone();
    let service = state.service.clone();
    let task = tokio::task::spawn_blocking(move || {
        service.execute(app_id, &id, &request, &worker_context)
    });
    let result = match tokio::time::timeout(state.execute_timeout, task).await {
        Ok(joined) => joined.map_err(|err| join_failed("execute", &err))??,
        Err(_) => {
            context.cancel();
            return Err(ServiceError::Cancelled("deadline exceeded".to_string()).into());
        }
    };
    to_data(&result)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs a service call on the blocking pool.
async fn run_blocking<T, F>(operation: &'static str, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(call).await;
    joined.map_err(|err| join_failed(operation, &err))?.map_err(ApiError::from)
}

/// Maps a blocking task failure.
fn join_failed(operation: &str, error: &tokio::task::JoinError) -> ApiError {
    ApiError::Service(ServiceError::Backend(format!("{operation} join failed: {error}")))
}

/// Decodes a JSON request body.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|err| ApiError::MalformedBody(err.to_string()))
}

/// Serializes a response payload.
fn to_data<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| {
        ApiError::Service(ServiceError::Backend(format!("response serialization failed: {err}")))
    })
}

/// Wraps a result in the envelope and records the request event.
fn respond(state: &ServerState, scope: &RequestScope, result: Result<Value, ApiError>) -> Response {
    let (status, envelope) = match result {
        Ok(data) => (StatusCode::OK, Envelope::success(data)),
        Err(error) => (error.status(), Envelope::failure(&error)),
    };
    let body =
        serde_json::to_vec(&envelope).unwrap_or_else(|_| FALLBACK_ENVELOPE.as_bytes().to_vec());
    state.audit.record_request(&GroupRequestEvent::new(GroupRequestEventParams {
        request_id: scope.request_id.clone(),
        operation: scope.operation,
        bk_biz_id: scope.bk_biz_id,
        group_id: scope.group_id.clone(),
        user: scope.user.clone(),
        error_code: (!envelope.result).then_some(envelope.bk_error_code),
        request_bytes: scope.request_bytes,
        response_bytes: body.len(),
    }));
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&scope.request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    (status, headers, body).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
