// crates/dynamic-group-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Group Store
// Description: Durable GroupStore backed by SQLite WAL.
// Purpose: Persist group definitions with atomic uniqueness checks.
// Dependencies: dynamic-group-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`GroupStore`] using `SQLite`. Groups are
//! stored as JSON documents alongside their key columns; a unique index on
//! `(app_id, name)` backs the name rule and every write runs in a single
//! transaction. Updates read, patch, and rewrite the row inside one immediate
//! transaction so concurrent writers serialize. Loads verify that the stored
//! document matches its key and fail closed on mismatches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use dynamic_group_core::AppId;
use dynamic_group_core::DynamicGroup;
use dynamic_group_core::GroupChange;
use dynamic_group_core::GroupId;
use dynamic_group_core::GroupPatch;
use dynamic_group_core::GroupStore;
use dynamic_group_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized group size accepted by the store.
pub const MAX_GROUP_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` group store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Name or identifier already used in the business.
    #[error("sqlite store duplicate: {0}")]
    Duplicate(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Duplicate(message) => Self::Duplicate(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "group_json exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error, surfacing unique constraint violations as duplicates.
fn db_error(error: rusqlite::Error) -> SqliteStoreError {
    match error.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => SqliteStoreError::Duplicate(error.to_string()),
        _ => SqliteStoreError::Db(error.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed group store with WAL support.
#[derive(Clone)]
pub struct SqliteGroupStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGroupStore {
    /// Opens an `SQLite`-backed group store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Inserts a new group row.
    fn insert_group(&self, group: &DynamicGroup) -> Result<(), SqliteStoreError> {
        let payload = encode_group(group)?;
        let app_id = app_key(group.app_id)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT group_id FROM dynamic_groups WHERE app_id = ?1 AND (group_id = ?2 OR \
                 name = ?3)",
                params![app_id, group.id.as_str(), group.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        if let Some(existing) = existing {
            let message = if existing == group.id.as_str() {
                format!("group id {}", group.id)
            } else {
                format!("group name {}", group.name)
            };
            return Err(SqliteStoreError::Duplicate(message));
        }
        tx.execute(
            "INSERT INTO dynamic_groups (app_id, group_id, name, group_json, saved_at) VALUES \
             (?1, ?2, ?3, ?4, ?5)",
            params![app_id, group.id.as_str(), group.name, payload, unix_millis()],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Patches an existing group row within one write transaction.
    fn update_group(
        &self,
        app_id: AppId,
        id: &GroupId,
        patch: GroupPatch<'_>,
    ) -> Result<Option<GroupChange>, SqliteStoreError> {
        let key = app_key(app_id)?;
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let bytes: Option<Vec<u8>> = tx
            .query_row(
                "SELECT group_json FROM dynamic_groups WHERE app_id = ?1 AND group_id = ?2",
                params![key, id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let before = decode_group(&bytes, app_id, id)?;
        let mut after = before.clone();
        patch(&mut after);
        after.app_id = app_id;
        after.id = id.clone();
        let conflict: Option<String> = tx
            .query_row(
                "SELECT group_id FROM dynamic_groups WHERE app_id = ?1 AND name = ?2 AND \
                 group_id != ?3",
                params![key, after.name, id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        if conflict.is_some() {
            return Err(SqliteStoreError::Duplicate(format!("group name {}", after.name)));
        }
        let payload = encode_group(&after)?;
        tx.execute(
            "UPDATE dynamic_groups SET name = ?3, group_json = ?4, saved_at = ?5 WHERE app_id = \
             ?1 AND group_id = ?2",
            params![key, id.as_str(), after.name, payload, unix_millis()],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(Some(GroupChange {
            before,
            after,
        }))
    }

    /// Deletes a group row and returns the removed definition.
    fn delete_group(
        &self,
        app_id: AppId,
        id: &GroupId,
    ) -> Result<Option<DynamicGroup>, SqliteStoreError> {
        let key = app_key(app_id)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let bytes: Option<Vec<u8>> = tx
            .query_row(
                "SELECT group_json FROM dynamic_groups WHERE app_id = ?1 AND group_id = ?2",
                params![key, id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        tx.execute(
            "DELETE FROM dynamic_groups WHERE app_id = ?1 AND group_id = ?2",
            params![key, id.as_str()],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        decode_group(&bytes, app_id, id).map(Some)
    }

    /// Loads one group row.
    fn load_group(
        &self,
        app_id: AppId,
        id: &GroupId,
    ) -> Result<Option<DynamicGroup>, SqliteStoreError> {
        let key = app_key(app_id)?;
        let bytes: Option<Vec<u8>> = {
            let guard = self.lock()?;
            guard
                .query_row(
                    "SELECT group_json FROM dynamic_groups WHERE app_id = ?1 AND group_id = ?2",
                    params![key, id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)?
        };
        bytes.map(|bytes| decode_group(&bytes, app_id, id)).transpose()
    }

    /// Lists the business's groups in creation order.
    fn list_groups(&self, app_id: AppId) -> Result<Vec<DynamicGroup>, SqliteStoreError> {
        let key = app_key(app_id)?;
        let rows: Vec<(String, Vec<u8>)> = {
            let guard = self.lock()?;
            let mut statement = guard
                .prepare(
                    "SELECT group_id, group_json FROM dynamic_groups WHERE app_id = ?1 ORDER BY \
                     seq ASC",
                )
                .map_err(db_error)?;
            let mapped = statement
                .query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_error)?;
            mapped.collect::<Result<_, _>>().map_err(db_error)?
        };
        rows.into_iter()
            .map(|(group_id, bytes)| decode_group(&bytes, app_id, &GroupId::new(group_id)))
            .collect()
    }
}

impl GroupStore for SqliteGroupStore {
    fn insert(&self, group: &DynamicGroup) -> Result<(), StoreError> {
        self.insert_group(group).map_err(StoreError::from)
    }

    fn update(
        &self,
        app_id: AppId,
        id: &GroupId,
        patch: GroupPatch<'_>,
    ) -> Result<Option<GroupChange>, StoreError> {
        self.update_group(app_id, id, patch).map_err(StoreError::from)
    }

    fn delete(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        self.delete_group(app_id, id).map_err(StoreError::from)
    }

    fn get(&self, app_id: AppId, id: &GroupId) -> Result<Option<DynamicGroup>, StoreError> {
        self.load_group(app_id, id).map_err(StoreError::from)
    }

    fn list(&self, app_id: AppId) -> Result<Vec<DynamicGroup>, StoreError> {
        self.list_groups(app_id).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|err| StoreError::Store(err.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a group and enforces the size limit.
fn encode_group(group: &DynamicGroup) -> Result<Vec<u8>, SqliteStoreError> {
    let bytes =
        serde_json::to_vec(group).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_GROUP_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_GROUP_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Deserializes a stored group and checks it against its key.
fn decode_group(
    bytes: &[u8],
    app_id: AppId,
    id: &GroupId,
) -> Result<DynamicGroup, SqliteStoreError> {
    if bytes.len() > MAX_GROUP_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_GROUP_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let group: DynamicGroup =
        serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    if group.app_id != app_id || &group.id != id {
        return Err(SqliteStoreError::Corrupt(format!(
            "group {id} payload does not match its key"
        )));
    }
    Ok(group)
}

/// Converts a business identifier to its column value.
fn app_key(app_id: AppId) -> Result<i64, SqliteStoreError> {
    i64::try_from(app_id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("bk_biz_id {app_id} out of range")))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS dynamic_groups (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    app_id INTEGER NOT NULL,
                    group_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    group_json BLOB NOT NULL,
                    saved_at INTEGER NOT NULL,
                    UNIQUE (app_id, group_id),
                    UNIQUE (app_id, name)
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
