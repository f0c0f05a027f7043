// crates/dynamic-group-core/src/runtime/ids.rs
// ============================================================================
// Module: Identifier Generation
// Description: Boot-scoped identifiers for groups and requests.
// Purpose: Issue process-unique identifiers without a central sequence.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Identifiers combine a random boot seed with a monotonic counter, so ids
//! issued by separate processes do not collide and ids within one process are
//! ordered by issue time. Client-supplied request identifiers are untrusted
//! and pass through [`sanitize_client_id`] before they reach logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix for group identifiers.
pub const GROUP_ID_PREFIX: &str = "dg";
/// Prefix for server-issued request identifiers.
pub const REQUEST_ID_PREFIX: &str = "dg-req";
/// Maximum accepted length of a client request identifier.
pub const MAX_CLIENT_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Boot-scoped identifier generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct IdGenerator {
    /// Prefix included in every identifier.
    prefix: &'static str,
    /// Boot-scoped random seed.
    boot_id: u64,
    /// Monotonic counter for identifiers issued in this process.
    counter: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            prefix,
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a new identifier.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016x}-{:016x}", self.prefix, self.boot_id, seq)
    }
}

// ============================================================================
// SECTION: Client Identifiers
// ============================================================================

/// Returns a trimmed client identifier when it is a safe header token.
///
/// Empty, oversized, and non-token values are dropped.
#[must_use]
pub fn sanitize_client_id(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_CLIENT_ID_LENGTH {
        return None;
    }
    trimmed.chars().all(is_token_char).then(|| trimmed.to_string())
}

/// Returns true for HTTP token characters.
const fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':' | '~' | '+')
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only assertions."
    )]

    use super::*;

    #[test]
    fn issued_ids_are_unique_and_prefixed() {
        let generator = IdGenerator::new(GROUP_ID_PREFIX);
        let first = generator.issue();
        let second = generator.issue();
        assert_ne!(first, second);
        assert!(first.starts_with("dg-"));
        assert_eq!(first.len(), "dg-".len() + 16 + 1 + 16);
    }

    #[test]
    fn client_ids_are_sanitized() {
        assert_eq!(sanitize_client_id(Some(" abc-123 ")), Some("abc-123".to_string()));
        assert_eq!(sanitize_client_id(Some("a b")), None);
        assert_eq!(sanitize_client_id(Some("")), None);
        assert_eq!(sanitize_client_id(Some(&"x".repeat(129))), None);
        assert_eq!(sanitize_client_id(None), None);
    }
}
