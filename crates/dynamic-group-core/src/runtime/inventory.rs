// crates/dynamic-group-core/src/runtime/inventory.rs
// ============================================================================
// Module: In-Memory Inventory
// Description: Fixture-backed object metadata, topology, and instance store.
// Purpose: Serve the resolver without a live CMDB backend.
// Dependencies: crate::core, crate::interfaces, crate::runtime::operator, serde
// ============================================================================

//! ## Overview
//! [`InMemoryInventory`] holds instance records per object type in insertion
//! order. Topology edges are read from each child record's parent link field
//! (for example `bk_module_id` on hosts), which may hold a single identifier
//! or an array of identifiers. Fixtures are JSON documents of the form
//! `{"objects": [...], "instances": {"host": [...], ...}}`; when `objects`
//! is omitted the built-in CMDB model is used.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::AppId;
use crate::core::InstanceId;
use crate::core::ObjectDefinition;
use crate::core::ObjectId;
use crate::core::ObjectModel;
use crate::core::Record;
use crate::core::metadata::BK_BIZ_ID;
use crate::interfaces::InstanceQuery;
use crate::interfaces::InstanceStore;
use crate::interfaces::Inventory;
use crate::interfaces::InventoryError;
use crate::interfaces::ObjectMetadata;
use crate::interfaces::TopologyStore;
use crate::runtime::operator::ClauseFilter;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Serialized inventory document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFixture {
    /// Object definitions; the built-in CMDB model is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectDefinition>>,
    /// Instance records keyed by object type.
    #[serde(default)]
    pub instances: BTreeMap<ObjectId, Vec<Record>>,
}

// ============================================================================
// SECTION: In-Memory Inventory
// ============================================================================

/// In-memory inventory for tests and fixture-backed deployments.
#[derive(Debug, Clone)]
pub struct InMemoryInventory {
    /// Object model snapshot.
    model: Arc<ObjectModel>,
    /// Instance records keyed by object type.
    instances: Arc<Mutex<BTreeMap<ObjectId, Vec<Record>>>>,
}

impl InMemoryInventory {
    /// Creates an empty inventory over the given model.
    #[must_use]
    pub fn new(model: ObjectModel) -> Self {
        Self {
            model: Arc::new(model),
            instances: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Builds an inventory from a fixture document.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Invalid`] when the model or any record is
    /// invalid.
    pub fn from_fixture(fixture: InventoryFixture) -> Result<Self, InventoryError> {
        let model = match fixture.objects {
            Some(objects) => {
                ObjectModel::new(objects).map_err(|err| InventoryError::Invalid(err.to_string()))?
            }
            None => ObjectModel::cmdb_default(),
        };
        let inventory = Self::new(model);
        for (obj_id, records) in fixture.instances {
            for record in records {
                inventory.insert(&obj_id, record)?;
            }
        }
        Ok(inventory)
    }

    /// Parses a JSON fixture document.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Invalid`] when the document does not parse
    /// or fails validation.
    pub fn from_json(bytes: &[u8]) -> Result<Self, InventoryError> {
        let fixture: InventoryFixture = serde_json::from_slice(bytes)
            .map_err(|err| InventoryError::Invalid(format!("inventory fixture: {err}")))?;
        Self::from_fixture(fixture)
    }

    /// Adds an instance record.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Invalid`] when the object is unknown, the
    /// record lacks a numeric identifier or business, or the identifier is
    /// already present.
    pub fn insert(&self, obj_id: &ObjectId, record: Record) -> Result<(), InventoryError> {
        let definition = self
            .model
            .object(obj_id)
            .ok_or_else(|| InventoryError::Invalid(format!("unknown object {obj_id}")))?;
        let Some(id) = record.get(&definition.id_field).and_then(Value::as_u64) else {
            return Err(InventoryError::Invalid(format!(
                "{obj_id} record is missing numeric {}",
                definition.id_field
            )));
        };
        if definition.app_scoped && record.get(BK_BIZ_ID).and_then(Value::as_u64).is_none() {
            return Err(InventoryError::Invalid(format!(
                "{obj_id} record {id} is missing numeric {BK_BIZ_ID}"
            )));
        }
        let mut instances = self.lock()?;
        let records = instances.entry(obj_id.clone()).or_default();
        let duplicate = records
            .iter()
            .any(|existing| existing.get(&definition.id_field).and_then(Value::as_u64) == Some(id));
        if duplicate {
            return Err(InventoryError::Invalid(format!("{obj_id} record {id} is duplicated")));
        }
        records.push(record);
        Ok(())
    }

    /// Locks the instance map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ObjectId, Vec<Record>>>, InventoryError> {
        self.instances
            .lock()
            .map_err(|_| InventoryError::Backend("inventory mutex poisoned".to_string()))
    }

    /// Returns the definition of an object or an invalid-data error.
    fn definition(&self, obj_id: &ObjectId) -> Result<&ObjectDefinition, InventoryError> {
        self.model
            .object(obj_id)
            .ok_or_else(|| InventoryError::Invalid(format!("unknown object {obj_id}")))
    }
}

/// Returns true when the record belongs to the business.
fn in_app(definition: &ObjectDefinition, record: &Record, app_id: AppId) -> bool {
    !definition.app_scoped || record.get(BK_BIZ_ID).and_then(Value::as_u64) == Some(app_id.get())
}

/// Returns the identifiers held by a link field (scalar or array).
fn linked_ids(value: Option<&Value>) -> Vec<InstanceId> {
    match value {
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_u64).map(InstanceId::new).collect()
        }
        Some(value) => value.as_u64().map(InstanceId::new).into_iter().collect(),
        None => Vec::new(),
    }
}

impl ObjectMetadata for InMemoryInventory {
    fn model(&self) -> Result<Arc<ObjectModel>, InventoryError> {
        Ok(Arc::clone(&self.model))
    }
}

impl TopologyStore for InMemoryInventory {
    fn children(
        &self,
        app_id: AppId,
        parent_obj: &ObjectId,
        parent_ids: &BTreeSet<InstanceId>,
        child_obj: &ObjectId,
    ) -> Result<BTreeSet<InstanceId>, InventoryError> {
        let child = self.definition(child_obj)?;
        if child.parent.as_ref() != Some(parent_obj) {
            return Err(InventoryError::Invalid(format!(
                "{child_obj} is not the mainline child of {parent_obj}"
            )));
        }
        let instances = self.lock()?;
        let Some(records) = instances.get(child_obj) else {
            return Ok(BTreeSet::new());
        };
        Ok(records
            .iter()
            .filter(|record| in_app(child, record, app_id))
            .filter(|record| {
                linked_ids(record.get(child.parent_link_field()))
                    .iter()
                    .any(|parent| parent_ids.contains(parent))
            })
            .filter_map(|record| record.get(&child.id_field).and_then(Value::as_u64))
            .map(InstanceId::new)
            .collect())
    }
}

impl InstanceStore for InMemoryInventory {
    fn find(&self, query: &InstanceQuery<'_>) -> Result<Vec<Record>, InventoryError> {
        let definition = self.definition(query.obj_id)?;
        let filter = ClauseFilter::compile(query.clauses)
            .map_err(|err| InventoryError::Invalid(err.to_string()))?;
        let instances = self.lock()?;
        let Some(records) = instances.get(query.obj_id) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|record| in_app(definition, record, query.app_id))
            .filter(|record| {
                query.within.is_none_or(|within| {
                    record
                        .get(&definition.id_field)
                        .and_then(Value::as_u64)
                        .is_some_and(|id| within.contains(&InstanceId::new(id)))
                })
            })
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Shared Inventory Wrapper
// ============================================================================

/// Shared inventory backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedInventory {
    /// Inner inventory implementation.
    inner: Arc<dyn Inventory + Send + Sync>,
}

impl SharedInventory {
    /// Wraps an inventory in a shared, clonable wrapper.
    #[must_use]
    pub fn from_inventory(inventory: impl Inventory + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(inventory),
        }
    }

    /// Wraps an existing shared inventory.
    #[must_use]
    pub const fn new(inventory: Arc<dyn Inventory + Send + Sync>) -> Self {
        Self {
            inner: inventory,
        }
    }
}

impl ObjectMetadata for SharedInventory {
    fn model(&self) -> Result<Arc<ObjectModel>, InventoryError> {
        self.inner.model()
    }
}

impl TopologyStore for SharedInventory {
    fn children(
        &self,
        app_id: AppId,
        parent_obj: &ObjectId,
        parent_ids: &BTreeSet<InstanceId>,
        child_obj: &ObjectId,
    ) -> Result<BTreeSet<InstanceId>, InventoryError> {
        self.inner.children(app_id, parent_obj, parent_ids, child_obj)
    }
}

impl InstanceStore for SharedInventory {
    fn find(&self, query: &InstanceQuery<'_>) -> Result<Vec<Record>, InventoryError> {
        self.inner.find(query)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
