// crates/dynamic-group-server/src/audit.rs
// ============================================================================
// Module: Group Audit Logging
// Description: Structured audit events for group requests and changes.
// Purpose: Emit JSON-line audit records without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Two event kinds are emitted: `group_request` for every API call and
//! `group_change` for every successful create, update, or delete. Sinks write
//! one JSON object per line so deployments can route events to their own
//! pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Request succeeded.
    Ok,
    /// Request failed with an error envelope.
    Error,
}

/// Group change action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Group created.
    Create,
    /// Group updated.
    Update,
    /// Group deleted.
    Delete,
}

/// Per-request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GroupRequestEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier.
    pub request_id: String,
    /// Operation label.
    pub operation: &'static str,
    /// Business identifier when known.
    pub bk_biz_id: Option<u64>,
    /// Group identifier when known.
    pub group_id: Option<String>,
    /// Calling user when provided.
    pub user: Option<String>,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Envelope error code on failure.
    pub error_code: Option<i64>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

/// Inputs required to construct a request audit event.
pub struct GroupRequestEventParams {
    /// Request identifier.
    pub request_id: String,
    /// Operation label.
    pub operation: &'static str,
    /// Business identifier when known.
    pub bk_biz_id: Option<u64>,
    /// Group identifier when known.
    pub group_id: Option<String>,
    /// Calling user when provided.
    pub user: Option<String>,
    /// Envelope error code on failure.
    pub error_code: Option<i64>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

/// Group change audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GroupChangeEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier.
    pub request_id: String,
    /// Change action.
    pub action: ChangeAction,
    /// Business identifier.
    pub bk_biz_id: u64,
    /// Group identifier.
    pub group_id: String,
    /// Group name after the change (before, for deletes).
    pub name: String,
    /// User that made the change.
    pub user: String,
    /// Definition before the change.
    pub before: Option<Value>,
    /// Definition after the change.
    pub after: Option<Value>,
}

/// Inputs required to construct a change audit event.
pub struct GroupChangeEventParams {
    /// Request identifier.
    pub request_id: String,
    /// Change action.
    pub action: ChangeAction,
    /// Business identifier.
    pub bk_biz_id: u64,
    /// Group identifier.
    pub group_id: String,
    /// Group name.
    pub name: String,
    /// User that made the change.
    pub user: String,
    /// Definition before the change.
    pub before: Option<Value>,
    /// Definition after the change.
    pub after: Option<Value>,
}

impl GroupRequestEvent {
    /// Creates a new request event with a consistent timestamp.
    #[must_use]
    pub fn new(params: GroupRequestEventParams) -> Self {
        let outcome =
            if params.error_code.is_some() { RequestOutcome::Error } else { RequestOutcome::Ok };
        Self {
            event: "group_request",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            operation: params.operation,
            bk_biz_id: params.bk_biz_id,
            group_id: params.group_id,
            user: params.user,
            outcome,
            error_code: params.error_code,
            request_bytes: params.request_bytes,
            response_bytes: params.response_bytes,
        }
    }
}

impl GroupChangeEvent {
    /// Creates a new change event with a consistent timestamp.
    #[must_use]
    pub fn new(params: GroupChangeEventParams) -> Self {
        Self {
            event: "group_change",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            action: params.action,
            bk_biz_id: params.bk_biz_id,
            group_id: params.group_id,
            name: params.name,
            user: params.user,
            before: params.before,
            after: params.after,
        }
    }
}

/// Returns the current time in milliseconds since the epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for group events.
pub trait GroupAuditSink: Send + Sync {
    /// Record a request event.
    fn record_request(&self, event: &GroupRequestEvent);

    /// Record a change event.
    fn record_change(&self, event: &GroupChangeEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl GroupAuditSink for StderrAuditSink {
    fn record_request(&self, event: &GroupRequestEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn record_change(&self, event: &GroupChangeEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized line.
    fn append(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl GroupAuditSink for FileAuditSink {
    fn record_request(&self, event: &GroupRequestEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }

    fn record_change(&self, event: &GroupChangeEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl GroupAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &GroupRequestEvent) {}

    fn record_change(&self, _event: &GroupChangeEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
