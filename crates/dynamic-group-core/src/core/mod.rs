// crates/dynamic-group-core/src/core/mod.rs
// ============================================================================
// Module: Dynamic Group Core Types
// Description: Identifiers, conditions, group records, and the object model.
// Purpose: Define the data model shared by the runtime and its collaborators.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types are plain serializable data. They carry no behavior beyond
//! construction helpers and lookups; evaluation lives in [`crate::runtime`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod condition;
pub mod group;
pub mod identifiers;
pub mod metadata;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use condition::Clause;
pub use condition::ConditionScope;
pub use condition::GroupInfo;
pub use condition::Operator;
pub use group::BasePage;
pub use group::CreateGroupRequest;
pub use group::DynamicGroup;
pub use group::ExecuteRequest;
pub use group::ExecuteResult;
pub use group::Record;
pub use group::SearchGroupRequest;
pub use group::SearchGroupResult;
pub use group::SortKey;
pub use group::UpdateGroupRequest;
pub use identifiers::AppId;
pub use identifiers::GroupId;
pub use identifiers::InstanceId;
pub use identifiers::ObjectId;
pub use metadata::Attribute;
pub use metadata::ObjectDefinition;
pub use metadata::ObjectLink;
pub use metadata::ObjectModel;
pub use metadata::ObjectModelError;
pub use metadata::PropertyType;
pub use metadata::ValueKind;
