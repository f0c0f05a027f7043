// crates/dynamic-group-core/src/interfaces/mod.rs
// ============================================================================
// Module: Dynamic Group Interfaces
// Description: Backend-agnostic interfaces for group storage and inventory.
// Purpose: Define the contract surfaces consumed by the dynamic group runtime.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the dynamic group runtime reaches its collaborators
//! without embedding backend-specific details: the group store that persists
//! definitions, and the inventory that answers object metadata, topology, and
//! instance queries. All interfaces are synchronous; callers on an async
//! runtime shift them onto a blocking context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::core::AppId;
use crate::core::Clause;
use crate::core::DynamicGroup;
use crate::core::GroupId;
use crate::core::InstanceId;
use crate::core::ObjectId;
use crate::core::ObjectModel;
use crate::core::Record;

// ============================================================================
// SECTION: Group Store
// ============================================================================

/// Group store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("group store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("group store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("group store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("group store invalid data: {0}")]
    Invalid(String),
    /// A group with the same business and name already exists.
    #[error("group store duplicate: {0}")]
    Duplicate(String),
    /// Store reported an error.
    #[error("group store error: {0}")]
    Store(String),
}

/// Before and after images of an updated group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChange {
    /// Definition before the update.
    pub before: DynamicGroup,
    /// Definition after the update.
    pub after: DynamicGroup,
}

/// In-place edit applied to a stored group during an update.
///
/// The patch must leave the business and identifier unchanged.
pub type GroupPatch<'a> = &'a mut dyn FnMut(&mut DynamicGroup);

/// Persistence for dynamic group definitions.
///
/// Implementations serialize writes so the `(app, name)` uniqueness check and
/// the write happen atomically. Updates read, patch, and write the stored
/// group inside one critical section, so concurrent updates of the same group
/// never overwrite each other with stale fields.
pub trait GroupStore {
    /// Inserts a new group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the name or identifier is taken
    /// within the business, or another [`StoreError`] when the write fails.
    fn insert(&self, group: &DynamicGroup) -> Result<(), StoreError>;

    /// Applies `patch` to the stored group and persists the result.
    ///
    /// Returns `None` when no such group exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the patched name is taken by
    /// another group, or another [`StoreError`] when the write fails.
    fn update(
        &self,
        app_id: AppId,
        id: &GroupId,
        patch: GroupPatch<'_>,
    ) -> Result<Option<GroupChange>, StoreError>;

    /// Deletes a group and returns the removed definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError>;

    /// Loads a group by business and identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError>;

    /// Lists all groups of a business in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self, app_id: AppId) -> Result<Vec<DynamicGroup>, StoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Inventory
// ============================================================================

/// Inventory collaborator errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Inventory data is invalid.
    #[error("inventory invalid data: {0}")]
    Invalid(String),
    /// Inventory backend is unavailable or failed.
    #[error("inventory backend error: {0}")]
    Backend(String),
}

/// Object and attribute metadata service.
pub trait ObjectMetadata {
    /// Returns the current object model.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the model cannot be loaded.
    fn model(&self) -> Result<Arc<ObjectModel>, InventoryError>;
}

/// Topology relationship service for mainline objects.
pub trait TopologyStore {
    /// Returns the `child_obj` instances beneath the given parent instances.
    ///
    /// `child_obj` must be the direct mainline child of `parent_obj`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the lookup fails.
    fn children(
        &self,
        app_id: AppId,
        parent_obj: &ObjectId,
        parent_ids: &BTreeSet<InstanceId>,
        child_obj: &ObjectId,
    ) -> Result<BTreeSet<InstanceId>, InventoryError>;
}

/// Filtered read against one object's instances.
#[derive(Debug, Clone, Copy)]
pub struct InstanceQuery<'a> {
    /// Business scope (ignored for objects that are not app scoped).
    pub app_id: AppId,
    /// Object type to read.
    pub obj_id: &'a ObjectId,
    /// Clauses ANDed against each record.
    pub clauses: &'a [Clause],
    /// Restricts results to these instance identifiers when present.
    pub within: Option<&'a BTreeSet<InstanceId>>,
}

/// Generic per-object instance store.
pub trait InstanceStore {
    /// Returns matching records in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the read fails or a clause cannot be
    /// evaluated.
    fn find(&self, query: &InstanceQuery<'_>) -> Result<Vec<Record>, InventoryError>;
}

/// Combined inventory collaborator used by the executor.
pub trait Inventory: ObjectMetadata + TopologyStore + InstanceStore {}

impl<T> Inventory for T where T: ObjectMetadata + TopologyStore + InstanceStore {}
