// crates/pml-gateway-mcp/src/auth.rs
// ============================================================================
// Module: Auth Gate
// Description: Local/cloud request authentication over API keys.
// Purpose: Gate protected routes with live-key validation in cloud mode.
// Dependencies: pml-gateway-core, pml-gateway-store-sqlite, regex
// ============================================================================

//! ## Overview
//! Runtime mode splits the gate: local mode bypasses auth for every route,
//! while cloud mode requires an `x-api-key` header whose value matches the
//! key pattern and is live in the key table. Public routes (`/health`,
//! preflights) always bypass. Admin status derives from the configured
//! username list, compared case-insensitively.
//!
//! Security posture: this gate is a trust boundary; it fails closed on any
//! missing or invalid credential; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use pml_gateway_core::error::GatewayError;
use pml_gateway_store_sqlite::ApiKeyStore;

use crate::config::GatewayMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pattern every cloud API key must match before the table lookup.
pub const API_KEY_PATTERN: &str = "^ac_[A-Za-z0-9]{24}$";

/// Routes served without authentication.
const PUBLIC_PATHS: &[&str] = &["/health"];

// ============================================================================
// SECTION: Key Validation Seam
// ============================================================================

/// Live-key lookup seam; the SQLite key store is the production
/// implementation.
pub trait KeyValidator: Send + Sync {
    /// Returns the owning user of a live key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the lookup backend fails.
    fn validate_key(&self, key: &str) -> Result<Option<String>, GatewayError>;
}

impl KeyValidator for ApiKeyStore {
    fn validate_key(&self, key: &str) -> Result<Option<String>, GatewayError> {
        self.lookup_live(key).map_err(Into::into)
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authenticated request context.
///
/// # Invariants
/// - `user_id` is present exactly when a key validated in cloud mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated user, when known.
    pub user_id: Option<String>,
    /// Whether the user is in the admin list (always true in local mode).
    pub is_admin: bool,
}

// ============================================================================
// SECTION: Auth Gate
// ============================================================================

/// Local/cloud authentication gate.
pub struct AuthGate {
    /// Runtime mode.
    mode: GatewayMode,
    /// Live-key backend.
    validator: Arc<dyn KeyValidator>,
    /// Lowercased admin usernames.
    admins: HashSet<String>,
    /// Compiled key pattern.
    key_pattern: Regex,
}

impl AuthGate {
    /// Creates a gate.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the key pattern fails to
    /// compile (a build defect, not runtime input).
    pub fn new(
        mode: GatewayMode,
        validator: Arc<dyn KeyValidator>,
        admin_usernames: &[String],
    ) -> Result<Self, GatewayError> {
        let key_pattern = Regex::new(API_KEY_PATTERN)
            .map_err(|err| GatewayError::Internal(format!("key pattern: {err}")))?;
        Ok(Self {
            mode,
            validator,
            admins: admin_usernames.iter().map(|name| name.to_ascii_lowercase()).collect(),
            key_pattern,
        })
    }

    /// Authenticates one request.
    ///
    /// Public routes and preflights bypass; local mode bypasses everything;
    /// cloud mode requires a live `x-api-key`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] on a missing or invalid key.
    pub fn authenticate(
        &self,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Result<AuthContext, GatewayError> {
        if method.eq_ignore_ascii_case("OPTIONS") || PUBLIC_PATHS.contains(&path) {
            return Ok(AuthContext {
                user_id: None,
                is_admin: false,
            });
        }
        match self.mode {
            GatewayMode::Local => Ok(AuthContext {
                user_id: None,
                is_admin: true,
            }),
            GatewayMode::Cloud => {
                let presented = headers
                    .get("x-api-key")
                    .ok_or_else(|| GatewayError::Unauthorized("missing api key".to_string()))?;
                if !self.key_pattern.is_match(presented) {
                    return Err(GatewayError::Unauthorized("malformed api key".to_string()));
                }
                let user_id = self
                    .validator
                    .validate_key(presented)?
                    .ok_or_else(|| GatewayError::Unauthorized("unknown api key".to_string()))?;
                let is_admin = self.admins.contains(&user_id.to_ascii_lowercase());
                Ok(AuthContext {
                    user_id: Some(user_id),
                    is_admin,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests;
