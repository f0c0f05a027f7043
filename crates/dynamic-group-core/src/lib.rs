// crates/dynamic-group-core/src/lib.rs
// ============================================================================
// Module: Dynamic Group Core Library
// Description: Public API surface for the dynamic group evaluator.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Dynamic group core stores named, business-scoped filter definitions over
//! CMDB objects and executes them against a live inventory. Conditions on a
//! target object, its mainline ancestors, and linked objects are resolved
//! through the topology into a deduplicated, sorted, paged result set. The
//! crate is backend-agnostic and reaches storage and inventory through
//! explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::GroupChange;
pub use interfaces::GroupPatch;
pub use interfaces::GroupStore;
pub use interfaces::InstanceQuery;
pub use interfaces::InstanceStore;
pub use interfaces::Inventory;
pub use interfaces::InventoryError;
pub use interfaces::ObjectMetadata;
pub use interfaces::StoreError;
pub use interfaces::TopologyStore;
pub use runtime::ExecuteError;
pub use runtime::ExecutionContext;
pub use runtime::GroupLimits;
pub use runtime::GroupService;
pub use runtime::InMemoryGroupStore;
pub use runtime::InMemoryInventory;
pub use runtime::InventoryFixture;
pub use runtime::ServiceError;
pub use runtime::SharedGroupStore;
pub use runtime::SharedInventory;
pub use runtime::ValidationError;
