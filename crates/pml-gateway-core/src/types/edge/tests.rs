// crates/pml-gateway-core/src/types/edge/tests.rs
// ============================================================================
// Module: Graph Edge Tests
// Description: Unit tests for edge weights and observation upgrades.
// Purpose: Validate the confidence formula and the observed-source upgrade.
// Dependencies: pml-gateway-core
// ============================================================================

//! ## Overview
//! Validates that `confidence = type_weight × source_modifier` holds across
//! observations and that the inferred-to-observed upgrade happens exactly at
//! the threshold.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    reason = "Test-only assertions compare exact constant products."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::EdgeKind;
use super::EdgeSource;
use super::GraphEdge;
use super::OBSERVED_COUNT_THRESHOLD;
use super::edge_weight;
use crate::types::identifiers::NodeId;

fn edge(kind: EdgeKind, source: EdgeSource) -> GraphEdge {
    let from = NodeId::parse("fs:read").expect("from id");
    let to = NodeId::parse("fs:write").expect("to id");
    GraphEdge::new(from, to, kind, source)
}

// ============================================================================
// SECTION: Weight Formula Tests
// ============================================================================

#[test]
fn dependency_observed_weight_is_full() {
    assert_eq!(edge_weight(EdgeKind::Dependency, EdgeSource::Observed), 1.0);
}

#[test]
fn sequence_inferred_weight_is_discounted() {
    assert_eq!(edge_weight(EdgeKind::Sequence, EdgeSource::Inferred), 0.5 * 0.7);
}

#[test]
fn declared_modifier_matches_observed() {
    assert_eq!(
        edge_weight(EdgeKind::Contains, EdgeSource::Declared),
        edge_weight(EdgeKind::Contains, EdgeSource::Observed)
    );
}

#[test]
fn confidence_matches_formula_for_all_pairs() {
    let kinds =
        [EdgeKind::Dependency, EdgeKind::Sequence, EdgeKind::Contains, EdgeKind::Similarity];
    let sources = [EdgeSource::Inferred, EdgeSource::Observed, EdgeSource::Declared];
    for kind in kinds {
        for source in sources {
            let e = edge(kind, source);
            assert_eq!(e.confidence, edge_weight(kind, source));
        }
    }
}

// ============================================================================
// SECTION: Observation Upgrade Tests
// ============================================================================

#[test]
fn inferred_upgrades_to_observed_at_threshold() {
    let mut e = edge(EdgeKind::Dependency, EdgeSource::Inferred);
    assert_eq!(e.count, 1);
    e.observe();
    assert_eq!(e.source, EdgeSource::Inferred);
    e.observe();
    assert_eq!(e.count, OBSERVED_COUNT_THRESHOLD);
    assert_eq!(e.source, EdgeSource::Observed);
    assert_eq!(e.confidence, edge_weight(EdgeKind::Dependency, EdgeSource::Observed));
}

#[test]
fn declared_source_never_downgrades() {
    let mut e = edge(EdgeKind::Sequence, EdgeSource::Declared);
    for _ in 0..5 {
        e.observe();
    }
    assert_eq!(e.source, EdgeSource::Declared);
    assert_eq!(e.count, 6);
}

#[test]
fn labels_round_trip() {
    for kind in
        [EdgeKind::Dependency, EdgeKind::Sequence, EdgeKind::Contains, EdgeKind::Similarity]
    {
        assert_eq!(EdgeKind::parse(kind.as_str()), Some(kind));
    }
    for source in [EdgeSource::Inferred, EdgeSource::Observed, EdgeSource::Declared] {
        assert_eq!(EdgeSource::parse(source.as_str()), Some(source));
    }
}
