// crates/dynamic-group-core/src/core/metadata.rs
// ============================================================================
// Module: Object Model Metadata
// Description: Object definitions, attribute types, and the mainline topology.
// Purpose: Answer which objects and fields exist and how objects are linked.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The object model describes business object types, their declared
//! attributes, and the mainline chain (business, optional custom levels, set,
//! module, host). Objects outside the mainline, such as cloud areas, are
//! reachable only through a link field on a mainline object.
//!
//! [`ObjectModel::new`] validates the structure once so later lookups can
//! assume a single linear mainline rooted at [`BIZ`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ObjectId;

// ============================================================================
// SECTION: Well-Known Names
// ============================================================================

/// Business object (mainline root).
pub const BIZ: &str = "biz";
/// Set object.
pub const SET: &str = "set";
/// Module object.
pub const MODULE: &str = "module";
/// Host object.
pub const HOST: &str = "host";
/// Cloud area object.
pub const PLAT: &str = "plat";

/// Business identifier field carried on every app-scoped record.
pub const BK_BIZ_ID: &str = "bk_biz_id";
/// Set identifier field.
pub const BK_SET_ID: &str = "bk_set_id";
/// Module identifier field.
pub const BK_MODULE_ID: &str = "bk_module_id";
/// Host identifier field.
pub const BK_HOST_ID: &str = "bk_host_id";
/// Cloud area identifier field.
pub const BK_CLOUD_ID: &str = "bk_cloud_id";
/// Generic parent link field for mainline records.
pub const BK_PARENT_ID: &str = "bk_parent_id";

// ============================================================================
// SECTION: Attribute Types
// ============================================================================

/// Declared property type of an object attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Short text.
    Singlechar,
    /// Long text.
    Longchar,
    /// Integer.
    Int,
    /// Floating-point number.
    Float,
    /// Enumerated option identifier.
    Enum,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Timestamp (RFC3339).
    Time,
    /// Time zone name.
    Timezone,
    /// Boolean flag.
    Bool,
    /// Comma-separated user names.
    User,
    /// List option value.
    List,
    /// Integer reference to another object instance.
    Foreignkey,
}

/// Value family used to check operator compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// String-valued fields.
    Text,
    /// Integer-valued fields.
    Integer,
    /// Numeric fields accepting fractions.
    Number,
    /// Date or timestamp strings.
    Temporal,
    /// Boolean fields.
    Boolean,
}

impl PropertyType {
    /// Returns the value family for this property type.
    #[must_use]
    pub const fn kind(self) -> ValueKind {
        match self {
            Self::Singlechar
            | Self::Longchar
            | Self::Enum
            | Self::Timezone
            | Self::User
            | Self::List => ValueKind::Text,
            Self::Int | Self::Foreignkey => ValueKind::Integer,
            Self::Float => ValueKind::Number,
            Self::Date | Self::Time => ValueKind::Temporal,
            Self::Bool => ValueKind::Boolean,
        }
    }
}

/// Declared attribute of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute field name.
    #[serde(rename = "bk_property_id")]
    pub field: String,
    /// Declared property type.
    #[serde(rename = "bk_property_type")]
    pub property_type: PropertyType,
}

impl Attribute {
    /// Creates a new attribute declaration.
    #[must_use]
    pub fn new(field: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            field: field.into(),
            property_type,
        }
    }
}

// ============================================================================
// SECTION: Object Definitions
// ============================================================================

/// Link from an object to a non-mainline object through a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLink {
    /// Linked object type.
    #[serde(rename = "bk_obj_id")]
    pub obj_id: ObjectId,
    /// Field on the owning object holding the linked instance id.
    pub field: String,
}

/// Definition of one object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// Object type identifier.
    #[serde(rename = "bk_obj_id")]
    pub obj_id: ObjectId,
    /// Field holding the instance identifier.
    pub id_field: String,
    /// Mainline parent object, absent for the root and non-mainline objects.
    #[serde(default)]
    pub parent: Option<ObjectId>,
    /// Record field linking to parent instances (defaults to `bk_parent_id`).
    #[serde(default)]
    pub parent_field: Option<String>,
    /// Whether instances belong to a single business.
    #[serde(default = "default_app_scoped")]
    pub app_scoped: bool,
    /// Links to non-mainline objects.
    #[serde(default)]
    pub links: Vec<ObjectLink>,
    /// Declared attributes.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl ObjectDefinition {
    /// Returns the field linking records to their mainline parent.
    #[must_use]
    pub fn parent_link_field(&self) -> &str {
        self.parent_field.as_deref().unwrap_or(BK_PARENT_ID)
    }

    /// Returns the declared attribute for a field.
    #[must_use]
    pub fn attribute(&self, field: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.field == field)
    }

    /// Returns the link to the given non-mainline object.
    #[must_use]
    pub fn link_to(&self, obj_id: &ObjectId) -> Option<&ObjectLink> {
        self.links.iter().find(|link| &link.obj_id == obj_id)
    }
}

/// Returns the default app scoping for object definitions.
const fn default_app_scoped() -> bool {
    true
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Object model construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectModelError {
    /// Object identifier declared more than once.
    #[error("object model duplicate object: {0}")]
    DuplicateObject(String),
    /// Mainline root is missing.
    #[error("object model missing mainline root: biz")]
    MissingRoot,
    /// Reference to an undeclared object.
    #[error("object model unknown object reference: {0}")]
    UnknownReference(String),
    /// Mainline is not a single linear chain.
    #[error("object model invalid mainline: {0}")]
    InvalidMainline(String),
    /// Link field is not a declared attribute.
    #[error("object model invalid link: {0}")]
    InvalidLink(String),
}

// ============================================================================
// SECTION: Object Model
// ============================================================================

/// Validated object model with a resolved mainline chain.
///
/// # Invariants
/// - `mainline` starts at [`BIZ`] and each entry is the single child of the
///   previous one.
/// - Every object with a parent appears in `mainline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectModel {
    /// Object definitions keyed by identifier.
    objects: BTreeMap<ObjectId, ObjectDefinition>,
    /// Mainline chain, root first.
    mainline: Vec<ObjectId>,
}

impl ObjectModel {
    /// Builds and validates an object model from definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectModelError`] when the definitions do not form a single
    /// mainline rooted at [`BIZ`] or reference unknown objects.
    pub fn new(definitions: Vec<ObjectDefinition>) -> Result<Self, ObjectModelError> {
        let mut objects = BTreeMap::new();
        for definition in definitions {
            let key = definition.obj_id.clone();
            if objects.insert(key.clone(), definition).is_some() {
                return Err(ObjectModelError::DuplicateObject(key.to_string()));
            }
        }
        let root = ObjectId::new(BIZ);
        match objects.get(&root) {
            Some(definition) if definition.parent.is_none() => {}
            Some(_) => {
                return Err(ObjectModelError::InvalidMainline(
                    "biz must not have a parent".to_string(),
                ));
            }
            None => return Err(ObjectModelError::MissingRoot),
        }
        let mut children: BTreeMap<&ObjectId, &ObjectId> = BTreeMap::new();
        for definition in objects.values() {
            let Some(parent) = &definition.parent else {
                continue;
            };
            if !objects.contains_key(parent) {
                return Err(ObjectModelError::UnknownReference(parent.to_string()));
            }
            if children.insert(parent, &definition.obj_id).is_some() {
                return Err(ObjectModelError::InvalidMainline(format!(
                    "{parent} has more than one mainline child"
                )));
            }
        }
        let mut mainline = vec![root.clone()];
        let mut visited = BTreeSet::from([root.clone()]);
        let mut current = root;
        while let Some(child) = children.get(&current) {
            let child = (*child).clone();
            if !visited.insert(child.clone()) {
                return Err(ObjectModelError::InvalidMainline(format!("cycle at {child}")));
            }
            mainline.push(child.clone());
            current = child;
        }
        let attached = objects.values().filter(|definition| definition.parent.is_some()).count();
        if attached + 1 != mainline.len() {
            return Err(ObjectModelError::InvalidMainline(
                "mainline objects are not connected to the root".to_string(),
            ));
        }
        for definition in objects.values() {
            for link in &definition.links {
                if !objects.contains_key(&link.obj_id) {
                    return Err(ObjectModelError::UnknownReference(link.obj_id.to_string()));
                }
                if mainline.contains(&link.obj_id) {
                    return Err(ObjectModelError::InvalidLink(format!(
                        "{} links to mainline object {}",
                        definition.obj_id, link.obj_id
                    )));
                }
                if definition.attribute(&link.field).is_none() {
                    return Err(ObjectModelError::InvalidLink(format!(
                        "{} link field {} is not declared",
                        definition.obj_id, link.field
                    )));
                }
            }
        }
        Ok(Self {
            objects,
            mainline,
        })
    }

    /// Returns the mainline chain, root first.
    #[must_use]
    pub fn mainline(&self) -> &[ObjectId] {
        &self.mainline
    }

    /// Returns the definition of an object.
    #[must_use]
    pub fn object(&self, obj_id: &ObjectId) -> Option<&ObjectDefinition> {
        self.objects.get(obj_id)
    }

    /// Returns the declared attribute of a field on an object.
    #[must_use]
    pub fn attribute(&self, obj_id: &ObjectId, field: &str) -> Option<&Attribute> {
        self.objects.get(obj_id).and_then(|definition| definition.attribute(field))
    }

    /// Returns the position of an object on the mainline.
    #[must_use]
    pub fn mainline_position(&self, obj_id: &ObjectId) -> Option<usize> {
        self.mainline.iter().position(|entry| entry == obj_id)
    }

    /// Returns the mainline ancestors of an object, root first.
    ///
    /// Returns `None` when the object is not on the mainline.
    #[must_use]
    pub fn ancestors(&self, obj_id: &ObjectId) -> Option<&[ObjectId]> {
        self.mainline_position(obj_id).map(|index| &self.mainline[.. index])
    }

    /// Iterates over all object definitions in identifier order.
    pub fn objects(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.objects.values()
    }

    /// Returns the built-in CMDB model (biz, set, module, host, plat).
    #[must_use]
    pub fn cmdb_default() -> Self {
        let definitions = cmdb_default_definitions();
        let mainline = vec![
            ObjectId::new(BIZ),
            ObjectId::new(SET),
            ObjectId::new(MODULE),
            ObjectId::new(HOST),
        ];
        Self {
            objects: definitions
                .into_iter()
                .map(|definition| (definition.obj_id.clone(), definition))
                .collect(),
            mainline,
        }
    }
}

// ============================================================================
// SECTION: Built-In Model
// ============================================================================

/// Returns the CMDB system object definitions.
#[must_use]
pub fn cmdb_default_definitions() -> Vec<ObjectDefinition> {
    use PropertyType::Bool;
    use PropertyType::Enum;
    use PropertyType::Float;
    use PropertyType::Foreignkey;
    use PropertyType::Int;
    use PropertyType::Longchar;
    use PropertyType::Singlechar;
    use PropertyType::Time;
    use PropertyType::User;

    /// Builds attribute declarations from `(field, type)` pairs.
    fn attrs(items: &[(&str, PropertyType)]) -> Vec<Attribute> {
        items.iter().map(|(field, kind)| Attribute::new(*field, *kind)).collect()
    }

    vec![
        ObjectDefinition {
            obj_id: ObjectId::new(BIZ),
            id_field: BK_BIZ_ID.to_string(),
            parent: None,
            parent_field: None,
            app_scoped: true,
            links: Vec::new(),
            attributes: attrs(&[
                (BK_BIZ_ID, Int),
                ("bk_biz_name", Singlechar),
                ("bk_biz_maintainer", User),
                ("bk_biz_productor", User),
                ("life_cycle", Enum),
                ("language", Enum),
            ]),
        },
        ObjectDefinition {
            obj_id: ObjectId::new(SET),
            id_field: BK_SET_ID.to_string(),
            parent: Some(ObjectId::new(BIZ)),
            parent_field: None,
            app_scoped: true,
            links: Vec::new(),
            attributes: attrs(&[
                (BK_SET_ID, Int),
                ("bk_set_name", Singlechar),
                ("bk_set_desc", Singlechar),
                ("bk_set_env", Enum),
                ("bk_service_status", Enum),
                ("bk_capacity", Int),
                ("description", Longchar),
                (BK_PARENT_ID, Int),
                (BK_BIZ_ID, Int),
            ]),
        },
        ObjectDefinition {
            obj_id: ObjectId::new(MODULE),
            id_field: BK_MODULE_ID.to_string(),
            parent: Some(ObjectId::new(SET)),
            parent_field: Some(BK_SET_ID.to_string()),
            app_scoped: true,
            links: Vec::new(),
            attributes: attrs(&[
                (BK_MODULE_ID, Int),
                ("bk_module_name", Singlechar),
                ("bk_module_type", Enum),
                ("operator", User),
                ("bk_bak_operator", User),
                ("default", Int),
                (BK_SET_ID, Int),
                (BK_PARENT_ID, Int),
                (BK_BIZ_ID, Int),
            ]),
        },
        ObjectDefinition {
            obj_id: ObjectId::new(HOST),
            id_field: BK_HOST_ID.to_string(),
            parent: Some(ObjectId::new(MODULE)),
            parent_field: Some(BK_MODULE_ID.to_string()),
            app_scoped: true,
            links: vec![ObjectLink {
                obj_id: ObjectId::new(PLAT),
                field: BK_CLOUD_ID.to_string(),
            }],
            attributes: attrs(&[
                (BK_HOST_ID, Int),
                ("bk_host_name", Singlechar),
                ("bk_host_innerip", Singlechar),
                ("bk_host_outerip", Singlechar),
                ("bk_os_type", Enum),
                ("bk_os_name", Singlechar),
                ("bk_os_version", Singlechar),
                ("bk_os_bit", Singlechar),
                ("bk_cpu", Int),
                ("bk_cpu_architecture", Enum),
                ("bk_cpu_module", Singlechar),
                ("bk_mem", Int),
                ("bk_disk", Int),
                ("bk_mac", Singlechar),
                ("bk_sla", Enum),
                ("bk_state", Enum),
                ("bk_isp_name", Enum),
                ("bk_province_name", Enum),
                (BK_CLOUD_ID, Foreignkey),
                ("operator", User),
                ("bk_bak_operator", User),
                ("import_from", Enum),
                ("create_time", Time),
                ("last_time", Time),
                ("bk_comment", Longchar),
                ("bk_host_load", Float),
                ("bk_agent_alive", Bool),
            ]),
        },
        ObjectDefinition {
            obj_id: ObjectId::new(PLAT),
            id_field: BK_CLOUD_ID.to_string(),
            parent: None,
            parent_field: None,
            app_scoped: false,
            links: Vec::new(),
            attributes: attrs(&[
                (BK_CLOUD_ID, Int),
                ("bk_cloud_name", Singlechar),
                ("bk_cloud_vendor", Enum),
                ("bk_status", Enum),
            ]),
        },
    ]
}

// ============================================================================
// SECTION: Tests
// ============================================================================
