// crates/dynamic-group-core/src/runtime/mod.rs
// ============================================================================
// Module: Dynamic Group Runtime
// Description: Validation, merging, resolution, execution, and group service.
// Purpose: Evaluate dynamic groups against stores and inventories.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the dynamic group lifecycle. Transports call
//! into [`GroupService`], which validates requests, persists definitions, and
//! runs [`execute_group`] for execute calls.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod executor;
pub mod ids;
pub mod inventory;
pub mod merger;
pub mod operator;
pub mod ordering;
pub mod resolver;
pub mod service;
pub mod store;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::ExecuteError;
pub use executor::ExecutionContext;
pub use executor::execute_group;
pub use ids::IdGenerator;
pub use inventory::InMemoryInventory;
pub use inventory::InventoryFixture;
pub use inventory::SharedInventory;
pub use merger::merge_conditions;
pub use merger::select_variable;
pub use operator::ClauseError;
pub use operator::ClauseFilter;
pub use resolver::AncestorSets;
pub use resolver::Resolution;
pub use resolver::TopologyResolver;
pub use service::GroupService;
pub use service::ServiceError;
pub use store::InMemoryGroupStore;
pub use store::SharedGroupStore;
pub use validator::GroupLimits;
pub use validator::ValidationError;
