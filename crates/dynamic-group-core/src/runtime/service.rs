// crates/dynamic-group-core/src/runtime/service.rs
// ============================================================================
// Module: Dynamic Group Service
// Description: Create, update, delete, get, search, and execute operations.
// Purpose: Enforce business rules over the group store and inventory.
// Dependencies: crate::core, crate::interfaces, crate::runtime, serde_json, time
// ============================================================================

//! ## Overview
//! [`GroupService`] is the transport-independent entry point. Every mutation
//! validates the full request before touching the store, so failures leave
//! stored definitions unchanged. Operations are synchronous; async callers
//! shift them onto a blocking context. The service is cheap to clone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::AppId;
use crate::core::CreateGroupRequest;
use crate::core::DynamicGroup;
use crate::core::ExecuteRequest;
use crate::core::ExecuteResult;
use crate::core::GroupId;
use crate::core::ObjectModel;
use crate::core::Record;
use crate::core::SearchGroupRequest;
use crate::core::SearchGroupResult;
use crate::core::SortKey;
use crate::core::UpdateGroupRequest;
use crate::interfaces::GroupChange;
use crate::interfaces::GroupStore;
use crate::interfaces::ObjectMetadata;
use crate::interfaces::StoreError;
use crate::runtime::executor::ExecuteError;
use crate::runtime::executor::ExecutionContext;
use crate::runtime::executor::execute_group;
use crate::runtime::ids::GROUP_ID_PREFIX;
use crate::runtime::ids::IdGenerator;
use crate::runtime::inventory::SharedInventory;
use crate::runtime::ordering::compare_records;
use crate::runtime::store::SharedGroupStore;
use crate::runtime::validator::GroupLimits;
use crate::runtime::validator::ValidationError;
use crate::runtime::validator::validate_info;
use crate::runtime::validator::validate_name;
use crate::runtime::validator::validate_page;
use crate::runtime::validator::validate_target;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Search condition keys matched exactly.
const EXACT_SEARCH_KEYS: [&str; 4] = ["id", "bk_obj_id", "create_user", "modify_user"];
/// Search condition key matched as a substring.
const NAME_SEARCH_KEY: &str = "name";
/// Fields search results may be sorted by.
const SEARCH_SORT_FIELDS: [&str; 7] =
    ["id", "name", "bk_obj_id", "create_time", "last_time", "create_user", "modify_user"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Service operation failures.
///
/// # Invariants
/// - Variants are stable for error-code mapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Group does not exist in the business.
    #[error("dynamic group not found: {0}")]
    NotFound(String),
    /// Group name is already used in the business.
    #[error("duplicate dynamic group: {0}")]
    Duplicate(String),
    /// Group target cannot be executed.
    #[error("unsupported execute target: {0}")]
    UnsupportedTarget(String),
    /// Store or inventory read failed.
    #[error("backend read failed: {0}")]
    Backend(String),
    /// Store write failed.
    #[error("backend write failed: {0}")]
    Storage(String),
    /// Execution was cancelled or timed out.
    #[error("execution cancelled: {0}")]
    Cancelled(String),
}

impl From<ExecuteError> for ServiceError {
    fn from(error: ExecuteError) -> Self {
        match error {
            ExecuteError::Validation(err) => Self::Validation(err),
            ExecuteError::Inventory(message) => Self::Backend(message),
            ExecuteError::Cancelled(message) => Self::Cancelled(message),
        }
    }
}

/// Maps a store read failure.
fn read_error(error: StoreError) -> ServiceError {
    ServiceError::Backend(error.to_string())
}

/// Maps a store write failure.
fn write_error(error: StoreError) -> ServiceError {
    match error {
        StoreError::Duplicate(message) => ServiceError::Duplicate(message),
        other => ServiceError::Storage(other.to_string()),
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Dynamic group service over a store and an inventory.
#[derive(Clone)]
pub struct GroupService {
    /// Group definition store.
    store: SharedGroupStore,
    /// Inventory collaborator.
    inventory: SharedInventory,
    /// Group identifier generator.
    ids: Arc<IdGenerator>,
    /// Validation and execution limits.
    limits: GroupLimits,
}

impl GroupService {
    /// Creates a service.
    #[must_use]
    pub fn new(store: SharedGroupStore, inventory: SharedInventory, limits: GroupLimits) -> Self {
        Self {
            store,
            inventory,
            ids: Arc::new(IdGenerator::new(GROUP_ID_PREFIX)),
            limits,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn limits(&self) -> &GroupLimits {
        &self.limits
    }

    /// Returns the group store.
    #[must_use]
    pub const fn store(&self) -> &SharedGroupStore {
        &self.store
    }

    /// Creates a group owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when validation fails, the name is taken, or
    /// the store write fails.
    pub fn create(
        &self,
        user: &str,
        request: CreateGroupRequest,
    ) -> Result<DynamicGroup, ServiceError> {
        let app_id = AppId::from_raw(request.app_id).ok_or(ValidationError::InvalidApp)?;
        let name = validate_name(&request.name, &self.limits)?;
        let model = self.model()?;
        validate_target(&model, &request.obj_id, &self.limits)?;
        validate_info(&model, &request.obj_id, &request.info, &self.limits)?;
        let now = OffsetDateTime::now_utc();
        let group = DynamicGroup {
            id: GroupId::new(self.ids.issue()),
            app_id,
            obj_id: request.obj_id,
            name,
            info: request.info,
            create_user: user.to_string(),
            modify_user: user.to_string(),
            create_time: now,
            update_time: now,
        };
        self.store.insert(&group).map_err(write_error)?;
        Ok(group)
    }

    /// Applies a partial update to a group.
    ///
    /// `info` replaces the whole filter definition and must come with
    /// `bk_obj_id`; a request without `info` may only rename the group.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the request shape or content is invalid,
    /// the group does not exist, the new name is taken, or the write fails.
    pub fn update(
        &self,
        user: &str,
        app_id: AppId,
        id: &GroupId,
        request: UpdateGroupRequest,
    ) -> Result<GroupChange, ServiceError> {
        let replacement = match (request.obj_id, request.info) {
            (Some(obj_id), Some(info)) => {
                let model = self.model()?;
                validate_target(&model, &obj_id, &self.limits)?;
                validate_info(&model, &obj_id, &info, &self.limits)?;
                Some((obj_id, info))
            }
            (None, Some(_)) => {
                return Err(ValidationError::InvalidParam("bk_obj_id".to_string()).into());
            }
            (Some(_), None) => {
                return Err(ValidationError::InvalidParam("info.condition".to_string()).into());
            }
            (None, None) if request.name.is_none() => {
                return Err(ValidationError::InvalidParam("info.condition".to_string()).into());
            }
            (None, None) => None,
        };
        let name =
            request.name.as_deref().map(|name| validate_name(name, &self.limits)).transpose()?;

        let now = OffsetDateTime::now_utc();
        let mut patch = |group: &mut DynamicGroup| {
            if let Some((obj_id, info)) = &replacement {
                group.obj_id = obj_id.clone();
                group.info = info.clone();
            }
            if let Some(name) = &name {
                group.name.clone_from(name);
            }
            group.modify_user = user.to_string();
            group.update_time = now;
        };
        self.store
            .update(app_id, id, &mut patch)
            .map_err(write_error)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Deletes a group and returns the removed definition.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the group does not exist, or
    /// [`ServiceError::Storage`] when the delete fails.
    pub fn delete(&self, app_id: AppId, id: &GroupId) -> Result<DynamicGroup, ServiceError> {
        self.store
            .delete(app_id, id)
            .map_err(write_error)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Loads a group.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the group does not exist, or
    /// [`ServiceError::Backend`] when the read fails.
    pub fn get(&self, app_id: AppId, id: &GroupId) -> Result<DynamicGroup, ServiceError> {
        self.store
            .get(app_id, id)
            .map_err(read_error)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Searches the business's groups.
    ///
    /// `name` matches as a case-sensitive substring; `id`, `bk_obj_id`,
    /// `create_user`, and `modify_user` match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the condition, sort, or page is invalid,
    /// or the store read fails.
    pub fn search(
        &self,
        app_id: AppId,
        request: &SearchGroupRequest,
    ) -> Result<SearchGroupResult, ServiceError> {
        validate_page(&request.page, &self.limits)?;
        let filters = parse_search_condition(&request.condition)?;
        let sort_keys = request.page.sort_keys();
        if let Some(key) =
            sort_keys.iter().find(|key| !SEARCH_SORT_FIELDS.contains(&key.field.as_str()))
        {
            return Err(ValidationError::InvalidParam(format!("page.sort {}", key.field)).into());
        }

        let mut groups: Vec<DynamicGroup> = self
            .store
            .list(app_id)
            .map_err(read_error)?
            .into_iter()
            .filter(|group| filters.iter().all(|(key, value)| search_matches(group, key, value)))
            .collect();
        sort_groups(&mut groups, &sort_keys)?;
        let total = groups.len();
        let (start, end) = request.page.window(total);
        let info: Vec<DynamicGroup> = groups.drain(start .. end).collect();
        let count =
            if request.disable_counter { 0 } else { u64::try_from(total).unwrap_or(u64::MAX) };
        Ok(SearchGroupResult {
            count,
            info,
        })
    }

    /// Executes a group against the inventory.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the group does not exist, its target is
    /// not executable, the request is invalid, the inventory fails, or the
    /// context is cancelled.
    pub fn execute(
        &self,
        app_id: AppId,
        id: &GroupId,
        request: &ExecuteRequest,
        context: &ExecutionContext,
    ) -> Result<ExecuteResult, ServiceError> {
        let group = self.get(app_id, id)?;
        if !self.limits.is_executable(&group.obj_id) {
            return Err(ServiceError::UnsupportedTarget(group.obj_id.to_string()));
        }
        Ok(execute_group(&self.inventory, &group, request, &self.limits, context)?)
    }

    /// Reports store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Backend`] when the store is unavailable.
    pub fn readiness(&self) -> Result<(), ServiceError> {
        self.store.readiness().map_err(read_error)
    }

    /// Loads the current object model.
    fn model(&self) -> Result<Arc<ObjectModel>, ServiceError> {
        self.inventory.model().map_err(|err| ServiceError::Backend(err.to_string()))
    }
}

// ============================================================================
// SECTION: Search Helpers
// ============================================================================

/// Validates search condition keys and returns string filter values.
fn parse_search_condition(
    condition: &BTreeMap<String, Value>,
) -> Result<Vec<(&str, &str)>, ValidationError> {
    condition
        .iter()
        .map(|(key, value)| {
            if key != NAME_SEARCH_KEY && !EXACT_SEARCH_KEYS.contains(&key.as_str()) {
                return Err(ValidationError::InvalidParam(format!("condition.{key}")));
            }
            value
                .as_str()
                .map(|value| (key.as_str(), value))
                .ok_or_else(|| ValidationError::InvalidParam(format!("condition.{key}")))
        })
        .collect()
}

/// Returns true when a group satisfies one search filter.
fn search_matches(group: &DynamicGroup, key: &str, value: &str) -> bool {
    match key {
        NAME_SEARCH_KEY => group.name.contains(value),
        "id" => group.id.as_str() == value,
        "bk_obj_id" => group.obj_id.as_str() == value,
        "create_user" => group.create_user == value,
        "modify_user" => group.modify_user == value,
        _ => false,
    }
}

/// Sorts groups by serialized field values.
fn sort_groups(groups: &mut Vec<DynamicGroup>, keys: &[SortKey]) -> Result<(), ServiceError> {
    if keys.is_empty() {
        return Ok(());
    }
    let mut rows: Vec<(Record, DynamicGroup)> = groups
        .drain(..)
        .map(|group| {
            let record = match serde_json::to_value(&group) {
                Ok(Value::Object(record)) => record,
                Ok(_) => Record::new(),
                Err(err) => return Err(ServiceError::Backend(err.to_string())),
            };
            Ok((record, group))
        })
        .collect::<Result<_, _>>()?;
    rows.sort_by(|(left, _), (right, _)| compare_records(left, right, keys));
    groups.extend(rows.into_iter().map(|(_, group)| group));
    Ok(())
}
