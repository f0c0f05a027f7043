// crates/dynamic-group-cli/src/tests.rs
// ============================================================================
// Module: CLI Library Unit Tests
// Description: Test module registry for CLI library helpers.
// Purpose: Group unit tests for CLI library modules.
// Dependencies: dynamic-group-cli
// ============================================================================

//! ## Overview
//! Registers unit tests for CLI helpers.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]
