// crates/pml-gateway-core/src/types/capability.rs
// ============================================================================
// Module: Capability Records
// Description: FQDN-addressed capability records and scopes.
// Purpose: Define the registry's row model and naming invariants.
// Dependencies: serde, thiserror, uuid
// ============================================================================

//! ## Overview
//! A capability is uniquely identified inside a scope by its FQDN components
//! `(org, project, namespace, action, hash)`; re-creating a capability with
//! identical components is an idempotent update that increments `version`.
//! The display name is `namespace:action`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::types::identifiers::CapabilityId;
use crate::types::permission::PermissionSet;
use crate::types::permission::PermissionSource;
use crate::types::time::Timestamp;

// ============================================================================
// SECTION: FQDN
// ============================================================================

/// Length of the FQDN disambiguation hash.
pub const FQDN_HASH_LENGTH: usize = 4;

/// Errors raised when FQDN components fail validation.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FqdnError {
    /// A component was empty.
    #[error("fqdn component `{0}` must not be empty")]
    EmptyComponent(&'static str),
    /// A component contained the `.` separator.
    #[error("fqdn component `{0}` must not contain `.`")]
    SeparatorInComponent(&'static str),
    /// The hash was not exactly four lowercase hex characters.
    #[error("fqdn hash must be {FQDN_HASH_LENGTH} lowercase hex characters")]
    MalformedHash,
}

/// Fully qualified capability name: `org.project.namespace.action.hash`.
///
/// # Invariants
/// - Components are non-empty and free of the `.` separator.
/// - `hash` is exactly four lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fqdn {
    /// Owning organization.
    pub org: String,
    /// Owning project.
    pub project: String,
    /// Capability namespace.
    pub namespace: String,
    /// Capability action.
    pub action: String,
    /// Four-character disambiguation hash.
    pub hash: String,
}

impl Fqdn {
    /// Creates an FQDN from validated components.
    ///
    /// # Errors
    ///
    /// Returns [`FqdnError`] when any component is empty, contains `.`, or
    /// the hash is malformed.
    pub fn new(
        org: impl Into<String>,
        project: impl Into<String>,
        namespace: impl Into<String>,
        action: impl Into<String>,
        hash: impl Into<String>,
    ) -> Result<Self, FqdnError> {
        let fqdn = Self {
            org: org.into(),
            project: project.into(),
            namespace: namespace.into(),
            action: action.into(),
            hash: hash.into(),
        };
        for (label, value) in [
            ("org", &fqdn.org),
            ("project", &fqdn.project),
            ("namespace", &fqdn.namespace),
            ("action", &fqdn.action),
        ] {
            if value.is_empty() {
                return Err(FqdnError::EmptyComponent(label));
            }
            if value.contains('.') {
                return Err(FqdnError::SeparatorInComponent(label));
            }
        }
        let hash_ok = fqdn.hash.len() == FQDN_HASH_LENGTH
            && fqdn.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        if !hash_ok {
            return Err(FqdnError::MalformedHash);
        }
        Ok(fqdn)
    }

    /// Returns the display name `namespace:action`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.namespace, self.action)
    }

    /// Returns the scope (org, project) of this FQDN.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope {
            org: self.org.clone(),
            project: self.project.clone(),
        }
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}.{}", self.org, self.project, self.namespace, self.action, self.hash)
    }
}

/// Org/project scope used for capability resolution.
///
/// # Invariants
/// - Components match the FQDN component rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Owning organization.
    pub org: String,
    /// Owning project.
    pub project: String,
}

// ============================================================================
// SECTION: Capability Record
// ============================================================================

/// Visibility of a capability outside its own scope.
///
/// # Invariants
/// - Variants are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Resolvable from any scope.
    Public,
    /// Resolvable only inside the owning scope.
    #[default]
    Private,
}

/// Execution routing of a capability.
///
/// # Invariants
/// - Variants are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// Executes in the local sandbox.
    #[default]
    Local,
    /// Executes on a remote runner.
    Remote,
}

/// Registry row for a learned capability.
///
/// # Invariants
/// - `(org, project, namespace, action, hash)` is unique per registry.
/// - `version >= 1` and increments on idempotent re-creation.
/// - `success_count <= usage_count`.
/// - `permission_confidence` stays within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Primary key.
    pub id: CapabilityId,
    /// Unique naming key inside the scope.
    pub fqdn: Fqdn,
    /// Workflow pattern owning the code snippet and embedding.
    pub workflow_pattern_id: String,
    /// Visibility outside the owning scope.
    pub visibility: Visibility,
    /// Execution routing.
    pub routing: Routing,
    /// Monotonic version, starting at 1.
    pub version: u64,
    /// Whether the capability passed verification.
    pub verified: bool,
    /// Total number of recorded executions.
    pub usage_count: u64,
    /// Number of successful executions.
    pub success_count: u64,
    /// Cumulative execution latency in milliseconds.
    pub total_latency_ms: u64,
    /// Stored permission set.
    pub permission_set: PermissionSet,
    /// Provenance of the stored permission set.
    pub permission_source: PermissionSource,
    /// Confidence of the permission inference, in `[0, 1]`.
    pub permission_confidence: f64,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last-update timestamp.
    pub updated_at: Timestamp,
}

impl CapabilityRecord {
    /// Returns the display name `namespace:action`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.fqdn.display_name()
    }

    /// Returns the observed success rate, when any usage was recorded.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.usage_count == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.usage_count as f64)
        }
    }
}
