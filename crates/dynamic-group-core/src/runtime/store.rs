// crates/dynamic-group-core/src/runtime/store.rs
// ============================================================================
// Module: Dynamic Group In-Memory Store
// Description: In-memory group store and shared store wrapper.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryGroupStore`] keeps definitions in a mutex-guarded map and
//! remembers insertion order so listings come back in creation order. The
//! uniqueness check, the read-patch-write of an update, and the write itself
//! all happen under the same lock.
//! [`SharedGroupStore`] wraps any [`GroupStore`] behind an `Arc` so services
//! and request handlers can clone it freely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AppId;
use crate::core::DynamicGroup;
use crate::core::GroupId;
use crate::interfaces::GroupChange;
use crate::interfaces::GroupPatch;
use crate::interfaces::GroupStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Store key: business and group identifier.
type GroupKey = (AppId, GroupId);

/// Mutable state of the in-memory store.
#[derive(Debug, Default)]
struct StoreState {
    /// Next insertion sequence number.
    next_seq: u64,
    /// Groups with their insertion sequence.
    groups: BTreeMap<GroupKey, (u64, DynamicGroup)>,
}

impl StoreState {
    /// Returns true when another group in the business uses the name.
    fn name_taken(&self, group: &DynamicGroup) -> bool {
        self.groups.values().any(|(_, existing)| {
            existing.app_id == group.app_id
                && existing.name == group.name
                && existing.id != group.id
        })
    }
}

/// In-memory group store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGroupStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryGroupStore {
    /// Creates an empty in-memory group store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("group store mutex poisoned".to_string()))
    }
}

impl GroupStore for InMemoryGroupStore {
    fn insert(&self, group: &DynamicGroup) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let key = (group.app_id, group.id.clone());
        if state.groups.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("group id {}", group.id)));
        }
        if state.name_taken(group) {
            return Err(StoreError::Duplicate(format!("group name {}", group.name)));
        }
        let seq = state.next_seq;
        state.next_seq = seq.saturating_add(1);
        state.groups.insert(key, (seq, group.clone()));
        Ok(())
    }

    fn update(
        &self,
        app_id: AppId,
        id: &GroupId,
        patch: GroupPatch<'_>,
    ) -> Result<Option<GroupChange>, StoreError> {
        let mut state = self.lock()?;
        let key = (app_id, id.clone());
        let Some((_, before)) = state.groups.get(&key) else {
            return Ok(None);
        };
        let before = before.clone();
        let mut after = before.clone();
        patch(&mut after);
        after.app_id = app_id;
        after.id = id.clone();
        if state.name_taken(&after) {
            return Err(StoreError::Duplicate(format!("group name {}", after.name)));
        }
        if let Some((_, existing)) = state.groups.get_mut(&key) {
            existing.clone_from(&after);
        }
        Ok(Some(GroupChange {
            before,
            after,
        }))
    }

    fn delete(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        let mut state = self.lock()?;
        Ok(state.groups.remove(&(app_id, id.clone())).map(|(_, group)| group))
    }

    fn get(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        let state = self.lock()?;
        Ok(state.groups.get(&(app_id, id.clone())).map(|(_, group)| group.clone()))
    }

    fn list(&self, app_id: AppId) -> Result<Vec<DynamicGroup>, StoreError> {
        let state = self.lock()?;
        let mut groups: Vec<&(u64, DynamicGroup)> =
            state.groups.values().filter(|(_, group)| group.app_id == app_id).collect();
        groups.sort_by_key(|(seq, _)| *seq);
        Ok(groups.into_iter().map(|(_, group)| group.clone()).collect())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared group store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedGroupStore {
    /// Inner store implementation.
    inner: Arc<dyn GroupStore + Send + Sync>,
}

impl SharedGroupStore {
    /// Wraps a group store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl GroupStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn GroupStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl GroupStore for SharedGroupStore {
    fn insert(&self, group: &DynamicGroup) -> Result<(), StoreError> {
        self.inner.insert(group)
    }

    fn update(
        &self,
        app_id: AppId,
        id: &GroupId,
        patch: GroupPatch<'_>,
    ) -> Result<Option<GroupChange>, StoreError> {
        self.inner.update(app_id, id, patch)
    }

    fn delete(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        self.inner.delete(app_id, id)
    }

    fn get(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        self.inner.get(app_id, id)
    }

    fn list(&self, app_id: AppId) -> Result<Vec<DynamicGroup>, StoreError> {
        self.inner.list(app_id)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
