// crates/dynamic-group-config/src/lib.rs
// ============================================================================
// Module: Dynamic Group Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for dynamic-group.toml semantics.
// Dependencies: dynamic-group-core, dynamic-group-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `dynamic-group-config` defines the configuration model for the dynamic
//! group service. Loading is strict and fails closed: oversized files,
//! non-UTF-8 content, unknown store types, and out-of-range limits are all
//! rejected before the server starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
