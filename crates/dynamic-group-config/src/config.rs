// crates/dynamic-group-config/src/config.rs
// ============================================================================
// Module: Dynamic Group Configuration
// Description: Configuration loading and validation for the group service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: dynamic-group-core, dynamic-group-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to defaults; whatever is present
//! must validate or the load fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use dynamic_group_core::GroupLimits;
use dynamic_group_core::ObjectId;
use dynamic_group_core::runtime::validator::DEFAULT_MAX_CLAUSES_PER_SCOPE;
use dynamic_group_core::runtime::validator::DEFAULT_MAX_CONDITION_SCOPES;
use dynamic_group_core::runtime::validator::DEFAULT_MAX_NAME_LENGTH;
use dynamic_group_core::runtime::validator::DEFAULT_MAX_PAGE_SIZE;
use dynamic_group_store_sqlite::SqliteStoreConfig;
use dynamic_group_store_sqlite::SqliteStoreMode;
use dynamic_group_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "dynamic-group.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "DYNAMIC_GROUP_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address for the HTTP server.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default maximum request body size in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Maximum allowed request body size in bytes.
const MAX_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Default execute deadline in milliseconds.
const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 30_000;
/// Minimum execute deadline in milliseconds.
const MIN_EXECUTE_TIMEOUT_MS: u64 = 10;
/// Maximum execute deadline in milliseconds.
const MAX_EXECUTE_TIMEOUT_MS: u64 = 600_000;
/// Default header carrying the calling user.
const DEFAULT_USER_HEADER: &str = "bk_user";
/// Maximum length of the user header name.
const MAX_USER_HEADER_LENGTH: usize = 64;
/// Upper bound for the configurable page size.
const MAX_PAGE_SIZE_CEILING: u64 = 10_000;
/// Upper bound for the configurable name length.
const MAX_NAME_LENGTH_CEILING: usize = 1024;
/// Upper bound for configurable scopes per condition list.
const MAX_CONDITION_SCOPES_CEILING: usize = 256;
/// Upper bound for configurable clauses per scope.
const MAX_CLAUSES_PER_SCOPE_CEILING: usize = 1024;
/// Default busy timeout for the sqlite group store.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Dynamic group service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DynamicGroupConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Group definition store configuration.
    #[serde(default)]
    pub group_store: GroupStoreConfig,
    /// Inventory fixture configuration.
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// Validation and paging limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl DynamicGroupConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order is the explicit path, then [`CONFIG_ENV_VAR`], then
    /// `dynamic-group.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.group_store.validate()?;
        self.inventory.validate()?;
        self.limits.validate()?;
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Deadline applied to each execute call in milliseconds.
    #[serde(default = "default_execute_timeout_ms")]
    pub execute_timeout_ms: u64,
    /// Header carrying the calling user.
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            execute_timeout_ms: default_execute_timeout_ms(),
            user_header: default_user_header(),
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_MAX_BODY_BYTES}"
            )));
        }
        if !(MIN_EXECUTE_TIMEOUT_MS ..= MAX_EXECUTE_TIMEOUT_MS).contains(&self.execute_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "server.execute_timeout_ms must be between {MIN_EXECUTE_TIMEOUT_MS} and \
                 {MAX_EXECUTE_TIMEOUT_MS}"
            )));
        }
        let header = self.user_header.trim();
        if header.is_empty()
            || header.len() > MAX_USER_HEADER_LENGTH
            || !header.bytes().all(|byte| {
                byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
            })
        {
            return Err(ConfigError::Invalid(
                "server.user_header must be a non-empty header token".to_string(),
            ));
        }
        self.audit.validate()
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional JSONL audit log path (stderr when unset).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Group store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStoreType {
    /// In-memory store; groups are lost on restart.
    #[default]
    Memory,
    /// `SQLite`-backed durable store.
    Sqlite,
}

/// Group store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupStoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: GroupStoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for GroupStoreConfig {
    fn default() -> Self {
        Self {
            store_type: GroupStoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl GroupStoreConfig {
    /// Returns the sqlite store configuration when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (GroupStoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates group store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            GroupStoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory group_store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            GroupStoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite group_store requires path".to_string())
                })?;
                validate_path_string("group_store.path", &path.to_string_lossy())
            }
        }
    }
}

/// Inventory fixture configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryConfig {
    /// Optional JSON inventory fixture path (empty inventory when unset).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl InventoryConfig {
    /// Validates inventory configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("inventory.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Validation and paging limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum page size for search and execute.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
    /// Maximum group name length in characters.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Maximum scopes per condition list.
    #[serde(default = "default_max_condition_scopes")]
    pub max_condition_scopes: usize,
    /// Maximum clauses per scope.
    #[serde(default = "default_max_clauses_per_scope")]
    pub max_clauses_per_scope: usize,
    /// Objects groups may target.
    #[serde(default = "default_executable_targets")]
    pub executable_targets: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            max_name_length: default_max_name_length(),
            max_condition_scopes: default_max_condition_scopes(),
            max_clauses_per_scope: default_max_clauses_per_scope(),
            executable_targets: default_executable_targets(),
        }
    }
}

impl LimitsConfig {
    /// Converts the limits into the runtime representation.
    #[must_use]
    pub fn group_limits(&self) -> GroupLimits {
        GroupLimits {
            max_page_size: self.max_page_size,
            max_name_length: self.max_name_length,
            max_condition_scopes: self.max_condition_scopes,
            max_clauses_per_scope: self.max_clauses_per_scope,
            executable_targets: self
                .executable_targets
                .iter()
                .map(|target| ObjectId::new(target.trim()))
                .collect(),
        }
    }

    /// Validates limit ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("limits.max_page_size", self.max_page_size, MAX_PAGE_SIZE_CEILING)?;
        check_range("limits.max_name_length", self.max_name_length, MAX_NAME_LENGTH_CEILING)?;
        check_range(
            "limits.max_condition_scopes",
            self.max_condition_scopes,
            MAX_CONDITION_SCOPES_CEILING,
        )?;
        check_range(
            "limits.max_clauses_per_scope",
            self.max_clauses_per_scope,
            MAX_CLAUSES_PER_SCOPE_CEILING,
        )?;
        if self.executable_targets.is_empty() {
            return Err(ConfigError::Invalid(
                "limits.executable_targets must not be empty".to_string(),
            ));
        }
        for target in &self.executable_targets {
            let trimmed = target.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::Invalid(
                    "limits.executable_targets entries must be non-empty".to_string(),
                ));
            }
            if trimmed == "biz" {
                return Err(ConfigError::Invalid(
                    "limits.executable_targets must not include biz".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Checks that a limit lies in `1..=max`.
fn check_range<T>(field: &str, value: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + From<u8> + std::fmt::Display,
{
    if value < T::from(1) || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between 1 and {max}")));
    }
    Ok(())
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default execute deadline.
const fn default_execute_timeout_ms() -> u64 {
    DEFAULT_EXECUTE_TIMEOUT_MS
}

/// Default user header.
fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}

/// Default sqlite busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Default page size ceiling.
const fn default_max_page_size() -> u64 {
    DEFAULT_MAX_PAGE_SIZE
}

/// Default name length.
const fn default_max_name_length() -> usize {
    DEFAULT_MAX_NAME_LENGTH
}

/// Default scopes per condition list.
const fn default_max_condition_scopes() -> usize {
    DEFAULT_MAX_CONDITION_SCOPES
}

/// Default clauses per scope.
const fn default_max_clauses_per_scope() -> usize {
    DEFAULT_MAX_CLAUSES_PER_SCOPE
}

/// Default executable targets.
fn default_executable_targets() -> Vec<String> {
    GroupLimits::default().executable_targets.iter().map(ToString::to_string).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
