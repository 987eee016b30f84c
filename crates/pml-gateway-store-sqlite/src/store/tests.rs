// crates/pml-gateway-store-sqlite/src/store/tests.rs
// ============================================================================
// Module: Store Core Tests
// Description: Unit tests for open, schema stamping, and version checks.
// Purpose: Validate idempotent initialization and fail-closed versioning.
// Dependencies: pml-gateway-store-sqlite, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Validates that opening twice is idempotent, the schema version is
//! stamped, and a version mismatch fails closed.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use tempfile::TempDir;

use super::SCHEMA_VERSION;
use super::SqliteStore;
use super::SqliteStoreConfig;
use super::StoreError;

// ============================================================================
// SECTION: Open Tests
// ============================================================================

#[test]
fn open_twice_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let config = SqliteStoreConfig::new(dir.path().join("gateway.db"));
    let first = SqliteStore::open(&config).expect("first open");
    drop(first);
    SqliteStore::open(&config).expect("second open");
}

#[test]
fn open_stamps_the_schema_version() {
    let dir = TempDir::new().expect("tempdir");
    let config = SqliteStoreConfig::new(dir.path().join("gateway.db"));
    let store = SqliteStore::open(&config).expect("open");
    let version: i64 = store
        .lock()
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .expect("user_version");
    assert_eq!(version, SCHEMA_VERSION);
}

#[test]
fn version_mismatch_fails_closed() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("gateway.db");
    let config = SqliteStoreConfig::new(&path);
    let store = SqliteStore::open(&config).expect("open");
    store
        .lock()
        .pragma_update(None, "user_version", SCHEMA_VERSION + 7)
        .expect("bump version");
    drop(store);
    let err = SqliteStore::open(&config).expect_err("mismatch");
    assert!(matches!(err, StoreError::VersionMismatch { .. }));
}

#[test]
fn tables_exist_after_open() {
    let store = SqliteStore::open_in_memory().expect("open");
    for table in [
        "tool_schema",
        "tool_embedding",
        "tool_dependency",
        "workflow_pattern",
        "capability_records",
        "execution_trace",
        "algorithm_traces",
        "api_keys",
        "users",
    ] {
        let count: i64 = store
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .expect("table query");
        assert_eq!(count, 1, "missing table {table}");
    }
}
