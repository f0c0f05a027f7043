// crates/dynamic-group-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the server launcher.
// Purpose: Keep the unauthenticated API on loopback unless explicitly allowed.
// Dependencies: dynamic-group-config, thiserror
// ============================================================================

//! ## Overview
//! The dynamic group API trusts the user header and carries no
//! authentication of its own. Binding to a non-loopback address therefore
//! requires an explicit opt-in, and audit logging must stay enabled when the
//! listener is exposed.

use std::env;
use std::net::SocketAddr;

use dynamic_group_config::ServerConfig;
use thiserror::Error;

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "DYNAMIC_GROUP_ALLOW_NON_LOOPBACK";

/// Bind outcome metadata for startup warnings.
#[derive(Debug, Clone)]
pub struct BindOutcome {
    /// Parsed listener address.
    pub bind_addr: SocketAddr,
    /// True when the server is bound to a non-loopback address.
    pub network_exposed: bool,
    /// Whether audit logging is enabled.
    pub audit_enabled: bool,
}

/// Serve policy failures for bind safety.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServePolicyError {
    /// Environment variable was set to an invalid value.
    #[error("{} has invalid value {value:?}", ALLOW_NON_LOOPBACK_ENV)]
    InvalidEnv {
        /// Raw environment value.
        value: String,
    },
    /// Bind string failed to parse.
    #[error("invalid bind address {bind}: {error}")]
    InvalidBind {
        /// Raw bind value.
        bind: String,
        /// Parse error message.
        error: String,
    },
    /// Non-loopback binding requires explicit opt-in.
    #[error(
        "refusing to bind {bind}: pass --allow-non-loopback or set {}=true",
        ALLOW_NON_LOOPBACK_ENV
    )]
    NonLoopbackOptInRequired {
        /// Bind address.
        bind: String,
    },
    /// Non-loopback binding requires audit logging.
    #[error("refusing to bind {bind}: server.audit.enabled must be true for network binds")]
    NonLoopbackAuditRequired {
        /// Bind address.
        bind: String,
    },
}

/// Resolves the non-loopback opt-in flag from CLI and environment.
///
/// # Errors
/// Returns [`ServePolicyError::InvalidEnv`] when the environment value is invalid.
pub fn resolve_allow_non_loopback(flag: bool) -> Result<bool, ServePolicyError> {
    if flag {
        return Ok(true);
    }
    let Some(value) = env::var_os(ALLOW_NON_LOOPBACK_ENV) else {
        return Ok(false);
    };
    let value = value.to_string_lossy().to_string();
    parse_allow_non_loopback_value(&value)
}

/// Enforces local-only bind restrictions for the HTTP server.
///
/// # Errors
/// Returns [`ServePolicyError`] when the bind address is unsafe for the
/// configuration.
pub fn enforce_local_only(
    config: &ServerConfig,
    allow_non_loopback: bool,
) -> Result<BindOutcome, ServePolicyError> {
    let bind = config.bind.trim();
    let addr: SocketAddr =
        bind.parse().map_err(|err: std::net::AddrParseError| ServePolicyError::InvalidBind {
            bind: bind.to_string(),
            error: err.to_string(),
        })?;
    let audit_enabled = config.audit.enabled;
    if addr.ip().is_loopback() {
        return Ok(BindOutcome {
            bind_addr: addr,
            network_exposed: false,
            audit_enabled,
        });
    }
    if !allow_non_loopback {
        return Err(ServePolicyError::NonLoopbackOptInRequired {
            bind: bind.to_string(),
        });
    }
    if !audit_enabled {
        return Err(ServePolicyError::NonLoopbackAuditRequired {
            bind: bind.to_string(),
        });
    }
    Ok(BindOutcome {
        bind_addr: addr,
        network_exposed: true,
        audit_enabled,
    })
}

/// Parses a bool-ish string (true/false/1/0/yes/no/on/off).
fn parse_boolish(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an env value for allow-non-loopback.
pub(crate) fn parse_allow_non_loopback_value(value: &str) -> Result<bool, ServePolicyError> {
    parse_boolish(value).ok_or_else(|| ServePolicyError::InvalidEnv {
        value: value.to_string(),
    })
}
