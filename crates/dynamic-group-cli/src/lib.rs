// crates/dynamic-group-cli/src/lib.rs
// ============================================================================
// Module: Dynamic Group CLI Library
// Description: Shared helpers for the dynamic group command-line interface.
// Purpose: Keep bind policy checks testable outside the binary.
// Dependencies: dynamic-group-config, thiserror
// ============================================================================

//! ## Overview
//! The binary entry point (`src/main.rs`) loads configuration and starts the
//! HTTP server. Bind safety rules live here so they can be unit tested.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Network exposure policy for the `serve` command.
pub mod serve_policy;

#[cfg(test)]
mod tests;
