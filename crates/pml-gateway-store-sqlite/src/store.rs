// crates/pml-gateway-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store Core
// Description: Connection management, schema, and shared row helpers.
// Purpose: Open the gateway database with WAL and a schema version stamp.
// Dependencies: pml-gateway-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! The store opens one SQLite connection configured for WAL journaling and a
//! busy timeout, stamps `PRAGMA user_version` with the schema version, and
//! creates every gateway table on first open. A version mismatch fails
//! closed rather than migrating silently. Sub-stores (registry, traces,
//! tracer, keys) share the connection behind one mutex; SQLite serializes
//! writers anyway, and the mutex keeps statement use race-free.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;

use pml_gateway_core::error::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the gateway database.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the gateway `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config with default tuning for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
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

/// Gateway store errors.
///
/// # Invariants
/// - Error messages avoid embedding row payloads.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` engine error.
    #[error("sqlite error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("store schema version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version found in the database.
        found: i64,
        /// Version this build expects.
        expected: i64,
    },
    /// Row failed to decode.
    #[error("corrupt store row: {0}")]
    Corrupt(String),
    /// Referenced entity is missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Write violates an integrity rule.
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// Invalid input to a store operation.
    #[error("invalid store input: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Integrity(message) => Self::Integrity(message),
            StoreError::Invalid(message) => Self::Validation(message),
            StoreError::Db(_) | StoreError::VersionMismatch { .. } | StoreError::Corrupt(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Shared handle to the gateway database.
#[derive(Clone)]
pub struct SqliteStore {
    /// The connection, serialized behind one lock.
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (and initializes) the gateway database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or schema version mismatch.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        let connection = Connection::open(&config.path)?;
        configure_connection(&connection, config.busy_timeout_ms)?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory database (tests and ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, recovering from poisoning.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Applies connection pragmas.
fn configure_connection(connection: &Connection, busy_timeout_ms: u64) -> Result<(), StoreError> {
    connection.pragma_update(None, "journal_mode", "wal")?;
    connection.pragma_update(None, "synchronous", "full")?;
    connection.pragma_update(None, "busy_timeout", busy_timeout_ms as i64)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Creates tables on first open and verifies the schema version.
fn initialize_schema(connection: &Connection) -> Result<(), StoreError> {
    let found: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found == 0 {
        connection.execute_batch(SCHEMA_SQL)?;
        connection.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        return Ok(());
    }
    if found != SCHEMA_VERSION {
        return Err(StoreError::VersionMismatch {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Gateway schema: all persisted tables of §6.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tool_schema (
    id            TEXT PRIMARY KEY,
    kind          TEXT NOT NULL,
    name          TEXT NOT NULL,
    server_id     TEXT,
    success_rate  REAL,
    category      TEXT,
    pure          INTEGER
);
CREATE TABLE IF NOT EXISTS tool_embedding (
    node_id    TEXT PRIMARY KEY,
    embedding  BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS tool_dependency (
    from_node    TEXT NOT NULL,
    to_node      TEXT NOT NULL,
    edge_type    TEXT NOT NULL,
    edge_source  TEXT NOT NULL,
    count        INTEGER NOT NULL,
    confidence   REAL NOT NULL,
    PRIMARY KEY (from_node, to_node, edge_type)
);
CREATE TABLE IF NOT EXISTS workflow_pattern (
    id          TEXT PRIMARY KEY,
    code_hash   TEXT NOT NULL UNIQUE,
    code        TEXT NOT NULL,
    intent      TEXT NOT NULL,
    embedding   BLOB,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS capability_records (
    id                     TEXT PRIMARY KEY,
    org                    TEXT NOT NULL,
    project                TEXT NOT NULL,
    namespace              TEXT NOT NULL,
    action                 TEXT NOT NULL,
    hash                   TEXT NOT NULL,
    workflow_pattern_id    TEXT NOT NULL REFERENCES workflow_pattern(id),
    visibility             TEXT NOT NULL,
    routing                TEXT NOT NULL,
    version                INTEGER NOT NULL,
    verified               INTEGER NOT NULL,
    usage_count            INTEGER NOT NULL,
    success_count          INTEGER NOT NULL,
    total_latency_ms       INTEGER NOT NULL,
    permission_set         TEXT NOT NULL,
    permission_source      TEXT NOT NULL,
    permission_confidence  REAL NOT NULL,
    created_at             INTEGER NOT NULL,
    updated_at             INTEGER NOT NULL,
    UNIQUE (org, project, namespace, action, hash)
);
CREATE TABLE IF NOT EXISTS execution_trace (
    id               TEXT PRIMARY KEY,
    capability_id    TEXT,
    intent_text      TEXT,
    initial_context  TEXT NOT NULL,
    executed_at      INTEGER NOT NULL,
    success          INTEGER NOT NULL,
    duration_ms      INTEGER NOT NULL,
    error_message    TEXT,
    executed_path    TEXT NOT NULL,
    decisions        TEXT NOT NULL,
    task_results     TEXT NOT NULL,
    priority         REAL NOT NULL,
    parent_trace_id  TEXT,
    user_id          TEXT NOT NULL,
    created_by       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_execution_trace_executed_at
    ON execution_trace (executed_at DESC);
CREATE TABLE IF NOT EXISTS algorithm_traces (
    trace_id        TEXT PRIMARY KEY,
    timestamp       INTEGER NOT NULL,
    algorithm_mode  TEXT NOT NULL,
    target_type     TEXT NOT NULL,
    intent          TEXT,
    signals         TEXT NOT NULL,
    params          TEXT NOT NULL,
    final_score     REAL NOT NULL,
    threshold_used  REAL NOT NULL,
    decision        TEXT NOT NULL,
    outcome         TEXT
);
CREATE TABLE IF NOT EXISTS api_keys (
    key         TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    revoked     INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS users (
    id        TEXT PRIMARY KEY,
    username  TEXT NOT NULL UNIQUE,
    is_admin  INTEGER NOT NULL DEFAULT 0
);
";

#[cfg(test)]
mod tests;
