// crates/dynamic-group-core/src/core/group.rs
// ============================================================================
// Module: Dynamic Group Records
// Description: Persisted dynamic group definitions and request/response shapes.
// Purpose: Provide typed request structs for every group operation.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! A [`DynamicGroup`] is a named, business-scoped filter definition over one
//! target object type. The request types in this module mirror the JSON
//! bodies accepted by the service for create, update, search, and execute.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::condition::ConditionScope;
use crate::core::condition::GroupInfo;
use crate::core::identifiers::AppId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::ObjectId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Instance record returned by an execute call.
pub type Record = Map<String, Value>;

/// Persisted dynamic group definition.
///
/// # Invariants
/// - `name` is unique within `app_id`.
/// - `info` has been validated against `obj_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Owning business.
    #[serde(rename = "bk_biz_id")]
    pub app_id: AppId,
    /// Target object type.
    #[serde(rename = "bk_obj_id")]
    pub obj_id: ObjectId,
    /// Group name.
    pub name: String,
    /// Filter definition.
    pub info: GroupInfo,
    /// User that created the group.
    pub create_user: String,
    /// User that last modified the group.
    pub modify_user: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
    /// Last modification time.
    #[serde(rename = "last_time", with = "time::serde::rfc3339")]
    pub update_time: OffsetDateTime,
}

/// Create request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    /// Owning business.
    #[serde(rename = "bk_biz_id")]
    pub app_id: u64,
    /// Target object type.
    #[serde(rename = "bk_obj_id")]
    pub obj_id: ObjectId,
    /// Group name.
    pub name: String,
    /// Filter definition.
    #[serde(default)]
    pub info: GroupInfo,
}

/// Update request body.
///
/// # Invariants
/// - When `info` is present, `obj_id` must be present too.
/// - When `info` is absent, `obj_id` must be absent and `name` present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGroupRequest {
    /// Replacement target object type (requires `info`).
    #[serde(rename = "bk_obj_id", default, skip_serializing_if = "Option::is_none")]
    pub obj_id: Option<ObjectId>,
    /// Replacement name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement filter definition (full replace).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<GroupInfo>,
}

// ============================================================================
// SECTION: Paging
// ============================================================================

/// Paging and sort options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasePage {
    /// Zero-based offset of the first row.
    #[serde(default)]
    pub start: u64,
    /// Maximum rows returned; must be in `1..=max_page_size`.
    #[serde(default)]
    pub limit: u64,
    /// Comma-separated sort fields; a leading `-` sorts descending.
    #[serde(default)]
    pub sort: String,
}

impl BasePage {
    /// Creates a page with the given window and sort.
    #[must_use]
    pub fn new(start: u64, limit: u64, sort: impl Into<String>) -> Self {
        Self {
            start,
            limit,
            sort: sort.into(),
        }
    }

    /// Parses the sort expression into ordered sort keys.
    #[must_use]
    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.sort
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty() && *item != "-")
            .map(|item| {
                item.strip_prefix('-').map_or_else(
                    || SortKey {
                        field: item.to_string(),
                        descending: false,
                    },
                    |field| SortKey {
                        field: field.to_string(),
                        descending: true,
                    },
                )
            })
            .collect()
    }

    /// Returns the `[start, end)` window clamped to `total` rows.
    #[must_use]
    pub fn window(&self, total: usize) -> (usize, usize) {
        let start = usize::try_from(self.start).unwrap_or(usize::MAX).min(total);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        (start, start.saturating_add(limit).min(total))
    }
}

/// Single sort key parsed from a page sort expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field to sort by.
    pub field: String,
    /// Whether the order is descending.
    pub descending: bool,
}

// ============================================================================
// SECTION: Search
// ============================================================================

/// Search request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchGroupRequest {
    /// Filter map over group fields.
    #[serde(default)]
    pub condition: BTreeMap<String, Value>,
    /// Paging and sort options.
    #[serde(default)]
    pub page: BasePage,
    /// Skip counting matches when true.
    #[serde(default)]
    pub disable_counter: bool,
}

/// Search response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchGroupResult {
    /// Total matches before paging (zero when counting is disabled).
    pub count: u64,
    /// Groups in the requested page.
    pub info: Vec<DynamicGroup>,
}

// ============================================================================
// SECTION: Execute
// ============================================================================

/// Execute request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Runtime refinement replacing the stored variable condition when non-empty.
    #[serde(default)]
    pub variable_condition: Vec<ConditionScope>,
    /// Paging and sort options.
    #[serde(default)]
    pub page: BasePage,
    /// Projected fields; empty returns full records.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Skip counting matches when true.
    #[serde(default)]
    pub disable_counter: bool,
}

/// Execute response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Total matches before paging (zero when counting is disabled).
    pub count: u64,
    /// Projected records in the requested page.
    pub info: Vec<Record>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only assertions."
    )]

    use super::*;

    #[test]
    fn sort_keys_parse_direction_and_skip_blanks() {
        let page = BasePage::new(0, 10, "-name, bk_host_id,,-");
        assert_eq!(
            page.sort_keys(),
            vec![
                SortKey {
                    field: "name".to_string(),
                    descending: true,
                },
                SortKey {
                    field: "bk_host_id".to_string(),
                    descending: false,
                },
            ]
        );
    }

    #[test]
    fn window_clamps_to_total() {
        assert_eq!(BasePage::new(0, 10, "").window(3), (0, 3));
        assert_eq!(BasePage::new(2, 10, "").window(3), (2, 3));
        assert_eq!(BasePage::new(5, 10, "").window(3), (3, 3));
        assert_eq!(BasePage::new(1, 1, "").window(3), (1, 2));
    }

    #[test]
    fn update_request_distinguishes_absent_fields() {
        let request: UpdateGroupRequest =
            serde_json::from_str(r#"{"name":"renamed"}"#).expect("parse update");
        assert_eq!(request.name.as_deref(), Some("renamed"));
        assert!(request.info.is_none());
        assert!(request.obj_id.is_none());
    }
}
