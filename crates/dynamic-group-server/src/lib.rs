// crates/dynamic-group-server/src/lib.rs
// ============================================================================
// Module: Dynamic Group Server
// Description: HTTP front end for the dynamic group service.
// Purpose: Serve CMDB-compatible dynamic group routes with audit logging.
// Dependencies: dynamic-group-core, dynamic-group-config, axum, tokio
// ============================================================================

//! ## Overview
//! This crate wires the configured group store and inventory into a
//! [`GroupService`] and exposes it over HTTP. Responses use the CMDB envelope
//! and every request emits a JSON-line audit event.
//!
//! [`GroupService`]: dynamic_group_core::GroupService

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod envelope;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::ChangeAction;
pub use audit::FileAuditSink;
pub use audit::GroupAuditSink;
pub use audit::GroupChangeEvent;
pub use audit::GroupRequestEvent;
pub use audit::NoopAuditSink;
pub use audit::RequestOutcome;
pub use audit::StderrAuditSink;
pub use envelope::ApiError;
pub use envelope::Envelope;
pub use server::GroupServer;
pub use server::MAX_INVENTORY_BYTES;
pub use server::ServerError;
