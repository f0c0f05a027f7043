// crates/dynamic-group-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Group Store
// Description: Durable GroupStore backend using SQLite.
// Purpose: Persist dynamic group definitions across restarts.
// Dependencies: dynamic-group-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`GroupStore`] implementation. Each
//! group is stored as a JSON document keyed by business and identifier, with
//! a unique index on business and name so the uniqueness rule holds across
//! processes sharing the database file.
//!
//! [`GroupStore`]: dynamic_group_core::GroupStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_GROUP_BYTES;
pub use store::SqliteGroupStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
