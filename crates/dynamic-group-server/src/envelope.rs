// crates/dynamic-group-server/src/envelope.rs
// ============================================================================
// Module: Response Envelope
// Description: CMDB response envelope and stable error codes.
// Purpose: Map service failures to `bk_error_code` values callers branch on.
// Dependencies: dynamic-group-core, axum, serde
// ============================================================================

//! ## Overview
//! Every API response is wrapped in
//! `{result, bk_error_code, bk_error_msg, permission, data}`. Business
//! failures are reported with HTTP 200 and a non-zero code; only transport
//! level failures such as oversized bodies change the HTTP status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use dynamic_group_core::ServiceError;
use dynamic_group_core::ValidationError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Success code.
pub const CODE_SUCCESS: i64 = 0;
/// Request body is not valid JSON for the operation.
pub const CODE_JSON_UNMARSHAL_FAILED: i64 = 1_199_000;
/// Execution was cancelled or hit its deadline.
pub const CODE_REQUEST_FAILED: i64 = 1_199_002;
/// Parameter is missing or invalid.
pub const CODE_PARAMS_INVALID: i64 = 1_199_011;
/// Name already used within the business.
pub const CODE_DUPLICATE_ITEM: i64 = 1_199_014;
/// Backend read failed.
pub const CODE_DB_SELECT_FAILED: i64 = 1_199_017;
/// Backend write failed.
pub const CODE_DB_INSERT_FAILED: i64 = 1_199_018;
/// Group not found.
pub const CODE_NOT_FOUND: i64 = 1_199_019;
/// Page limit is zero or too large.
pub const CODE_PAGE_LIMIT_EXCEEDED: i64 = 1_199_059;
/// Operator or value does not fit the field type.
pub const CODE_UNEXPECTED_FIELD_TYPE: i64 = 1_199_085;
/// Target object cannot be executed.
pub const CODE_UNKNOWN_ERROR: i64 = -2;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures surfaced through the response envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// Request body could not be decoded.
    #[error("invalid request body: {0}")]
    MalformedBody(String),
    /// Path or header parameter is invalid.
    #[error("invalid parameter {0}")]
    InvalidParam(String),
    /// Service is not ready to accept requests.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Returns the stable envelope error code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Service(error) => service_code(error),
            Self::BodyTooLarge {
                ..
            }
            | Self::InvalidParam(_) => CODE_PARAMS_INVALID,
            Self::MalformedBody(_) => CODE_JSON_UNMARSHAL_FAILED,
            Self::Unavailable(_) => CODE_DB_SELECT_FAILED,
        }
    }

    /// Returns the HTTP status for the failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge {
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service(_) | Self::MalformedBody(_) | Self::InvalidParam(_) => StatusCode::OK,
        }
    }
}

/// Maps a service failure to its envelope code.
#[must_use]
pub const fn service_code(error: &ServiceError) -> i64 {
    match error {
        ServiceError::Validation(ValidationError::PageLimit {
            ..
        }) => CODE_PAGE_LIMIT_EXCEEDED,
        ServiceError::Validation(ValidationError::OperatorMismatch {
            ..
        }) => CODE_UNEXPECTED_FIELD_TYPE,
        ServiceError::Validation(_) => CODE_PARAMS_INVALID,
        ServiceError::NotFound(_) => CODE_NOT_FOUND,
        ServiceError::Duplicate(_) => CODE_DUPLICATE_ITEM,
        ServiceError::UnsupportedTarget(_) => CODE_UNKNOWN_ERROR,
        ServiceError::Backend(_) => CODE_DB_SELECT_FAILED,
        ServiceError::Storage(_) => CODE_DB_INSERT_FAILED,
        ServiceError::Cancelled(_) => CODE_REQUEST_FAILED,
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// CMDB response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the call succeeded.
    pub result: bool,
    /// Stable error code (zero on success).
    pub bk_error_code: i64,
    /// Error message (`success` on success).
    pub bk_error_msg: String,
    /// Permission details; always null.
    pub permission: Option<Value>,
    /// Operation payload.
    pub data: Value,
}

impl Envelope {
    /// Wraps a successful payload.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            result: true,
            bk_error_code: CODE_SUCCESS,
            bk_error_msg: "success".to_string(),
            permission: None,
            data,
        }
    }

    /// Wraps a failure.
    #[must_use]
    pub fn failure(error: &ApiError) -> Self {
        Self {
            result: false,
            bk_error_code: error.code(),
            bk_error_msg: error.to_string(),
            permission: None,
            data: Value::Null,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
