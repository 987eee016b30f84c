// crates/pml-gateway-store-sqlite/src/api_keys.rs
// ============================================================================
// Module: API Key Store
// Description: Live-key validation backing the cloud-mode auth gate.
// Purpose: Store keys and answer liveness checks in constant time.
// Dependencies: pml-gateway-core, rusqlite, subtle
// ============================================================================

//! ## Overview
//! The key store backs the cloud-mode auth gate: a presented key is live
//! when a non-revoked row matches it. Key comparison runs in constant time
//! over the stored candidates so timing cannot distinguish near-miss keys.
//!
//! Security posture: API keys are credentials; they never appear in logs or
//! error messages; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use subtle::ConstantTimeEq;

use pml_gateway_core::types::time::Timestamp;

use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Key Store
// ============================================================================

/// Store over the `api_keys` table.
#[derive(Clone)]
pub struct ApiKeyStore {
    /// Shared database handle.
    store: SqliteStore,
}

impl ApiKeyStore {
    /// Creates a key store.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }

    /// Inserts a key for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Integrity`] when the key already exists.
    pub fn insert(&self, key: &str, user_id: &str) -> Result<(), StoreError> {
        let result = self.store.lock().execute(
            "INSERT INTO api_keys (key, user_id, created_at, revoked) VALUES (?1, ?2, ?3, 0)",
            params![key, user_id, Timestamp::now().as_unix_millis()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Integrity("api key already exists".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Revokes a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the key is absent.
    pub fn revoke(&self, key: &str) -> Result<(), StoreError> {
        let updated = self
            .store
            .lock()
            .execute("UPDATE api_keys SET revoked = 1 WHERE key = ?1", params![key])?;
        if updated == 0 {
            return Err(StoreError::NotFound("api key".to_string()));
        }
        Ok(())
    }

    /// Returns the owning user of a live key, comparing in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn lookup_live(&self, presented: &str) -> Result<Option<String>, StoreError> {
        let connection = self.store.lock();
        let mut statement =
            connection.prepare("SELECT key, user_id FROM api_keys WHERE revoked = 0")?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut matched: Option<String> = None;
        for (stored, user_id) in rows {
            // Constant-time equality over every candidate; no early exit on
            // the first match.
            let equal = stored.as_bytes().ct_eq(presented.as_bytes());
            if bool::from(equal) && matched.is_none() {
                matched = Some(user_id);
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests;
