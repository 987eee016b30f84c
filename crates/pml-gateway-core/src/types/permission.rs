// crates/pml-gateway-core/src/types/permission.rs
// ============================================================================
// Module: Permission Sets
// Description: Named host-capability bundles granted to sandboxed code.
// Purpose: Define the escalation lattice and the effective-value rule.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Six named permission sets bound what sandboxed capability code may reach.
//! Escalation follows a fixed lattice; de-escalation is always forbidden and
//! `trusted` is unreachable by escalation. The effective set applied at
//! execution time discounts low-confidence emergent inferences to `minimal`.
//!
//! Security posture: permission decisions are a trust boundary and fail
//! closed; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Confidence floor below which emergent permission inferences collapse to
/// [`PermissionSet::Minimal`].
pub const EMERGENT_CONFIDENCE_FLOOR: f64 = 0.7;

// ============================================================================
// SECTION: Permission Set
// ============================================================================

/// Named bundle of host capabilities granted to sandboxed code.
///
/// # Invariants
/// - Variants are stable for persistence; labels appear literally in the
///   trace store, capability records, and sandbox flag mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionSet {
    /// No host access at all.
    #[default]
    Minimal,
    /// Read-only access scoped to data directories.
    Readonly,
    /// Unrestricted reads, writes confined to temp.
    Filesystem,
    /// Unrestricted network access.
    NetworkApi,
    /// Read plus network, scoped writes, restricted environment.
    McpStandard,
    /// All access except subprocess and FFI.
    Trusted,
}

impl PermissionSet {
    /// Returns a stable label for persistence and flag mapping.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Readonly => "readonly",
            Self::Filesystem => "filesystem",
            Self::NetworkApi => "network-api",
            Self::McpStandard => "mcp-standard",
            Self::Trusted => "trusted",
        }
    }

    /// Parses a persisted permission-set label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "minimal" => Some(Self::Minimal),
            "readonly" => Some(Self::Readonly),
            "filesystem" => Some(Self::Filesystem),
            "network-api" => Some(Self::NetworkApi),
            "mcp-standard" => Some(Self::McpStandard),
            "trusted" => Some(Self::Trusted),
            _ => None,
        }
    }

    /// Returns true when escalating from `self` to `to` is permitted.
    ///
    /// De-escalation is always forbidden and `trusted` is unreachable. The
    /// identity transition is not an escalation and returns false here;
    /// callers treat same-set updates as no-ops.
    #[must_use]
    pub const fn may_escalate(self, to: Self) -> bool {
        matches!(
            (self, to),
            (
                Self::Minimal,
                Self::Readonly | Self::Filesystem | Self::NetworkApi | Self::McpStandard,
            ) | (Self::Readonly, Self::Filesystem | Self::McpStandard)
                | (Self::Filesystem | Self::NetworkApi, Self::McpStandard)
        )
    }
}

// ============================================================================
// SECTION: Permission Provenance
// ============================================================================

/// Provenance of a capability's stored permission set.
///
/// # Invariants
/// - Variants are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    /// Assigned by an operator; applied regardless of confidence.
    Manual,
    /// Inferred from observed behavior; applied only above the confidence
    /// floor.
    #[default]
    Emergent,
}

/// Returns the permission set effectively applied at execution time.
///
/// Manual assignments are authoritative. Emergent inferences apply only when
/// `confidence >= EMERGENT_CONFIDENCE_FLOOR`; anything less collapses to
/// [`PermissionSet::Minimal`].
#[must_use]
pub fn effective_permission_set(
    stored: PermissionSet,
    source: PermissionSource,
    confidence: f64,
) -> PermissionSet {
    match source {
        PermissionSource::Manual => stored,
        PermissionSource::Emergent if confidence >= EMERGENT_CONFIDENCE_FLOOR => stored,
        PermissionSource::Emergent => PermissionSet::Minimal,
    }
}

#[cfg(test)]
mod tests;
