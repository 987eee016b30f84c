// crates/pml-gateway-core/src/types/permission/tests.rs
// ============================================================================
// Module: Permission Set Tests
// Description: Unit tests for the escalation lattice and effective rule.
// Purpose: Validate every cell of the escalation table and the confidence
//          floor behavior.
// Dependencies: pml-gateway-core
// ============================================================================

//! ## Overview
//! Exercises the full escalation table cell by cell and the emergent
//! confidence-floor collapse to `minimal`.

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

use super::EMERGENT_CONFIDENCE_FLOOR;
use super::PermissionSet;
use super::PermissionSource;
use super::effective_permission_set;

const ALL: [PermissionSet; 6] = [
    PermissionSet::Minimal,
    PermissionSet::Readonly,
    PermissionSet::Filesystem,
    PermissionSet::NetworkApi,
    PermissionSet::McpStandard,
    PermissionSet::Trusted,
];

// ============================================================================
// SECTION: Escalation Table Tests
// ============================================================================

#[test]
fn escalation_table_matches_the_lattice() {
    use PermissionSet::{Filesystem, McpStandard, Minimal, NetworkApi, Readonly};
    let allowed = [
        (Minimal, Readonly),
        (Minimal, Filesystem),
        (Minimal, NetworkApi),
        (Minimal, McpStandard),
        (Readonly, Filesystem),
        (Readonly, McpStandard),
        (Filesystem, McpStandard),
        (NetworkApi, McpStandard),
    ];
    for from in ALL {
        for to in ALL {
            let expected = allowed.contains(&(from, to));
            assert_eq!(
                from.may_escalate(to),
                expected,
                "escalation {} -> {} should be {}",
                from.as_str(),
                to.as_str(),
                expected
            );
        }
    }
}

#[test]
fn trusted_is_unreachable_by_escalation() {
    for from in ALL {
        assert!(!from.may_escalate(PermissionSet::Trusted));
    }
}

#[test]
fn de_escalation_is_always_forbidden() {
    assert!(!PermissionSet::McpStandard.may_escalate(PermissionSet::Minimal));
    assert!(!PermissionSet::Filesystem.may_escalate(PermissionSet::Readonly));
    assert!(!PermissionSet::Trusted.may_escalate(PermissionSet::McpStandard));
}

#[test]
fn labels_round_trip() {
    for set in ALL {
        assert_eq!(PermissionSet::parse(set.as_str()), Some(set));
    }
    assert_eq!(PermissionSet::parse("root"), None);
}

// ============================================================================
// SECTION: Effective Rule Tests
// ============================================================================

#[test]
fn manual_source_ignores_confidence() {
    let effective =
        effective_permission_set(PermissionSet::Trusted, PermissionSource::Manual, 0.0);
    assert_eq!(effective, PermissionSet::Trusted);
}

#[test]
fn emergent_above_floor_applies_stored_set() {
    let effective = effective_permission_set(
        PermissionSet::NetworkApi,
        PermissionSource::Emergent,
        EMERGENT_CONFIDENCE_FLOOR,
    );
    assert_eq!(effective, PermissionSet::NetworkApi);
}

#[test]
fn emergent_below_floor_collapses_to_minimal() {
    let effective =
        effective_permission_set(PermissionSet::NetworkApi, PermissionSource::Emergent, 0.69);
    assert_eq!(effective, PermissionSet::Minimal);
}
