// crates/pml-gateway-graph/src/vector/tests.rs
// ============================================================================
// Module: Vector Index Tests
// Description: Unit tests for cosine similarity and the exact-scan index.
// Purpose: Validate ranking order and degenerate-input handling.
// Dependencies: pml-gateway-core, pml-gateway-graph, tokio
// ============================================================================

//! ## Overview
//! Validates cosine-similarity edge cases and that index searches rank by
//! descending similarity under the requested limit.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::InMemoryVectorIndex;
use super::cosine_similarity;
use pml_gateway_core::interfaces::VectorIndex;
use pml_gateway_core::types::identifiers::NodeId;

fn node(raw: &str) -> NodeId {
    NodeId::parse(raw).expect("node id")
}

// ============================================================================
// SECTION: Cosine Tests
// ============================================================================

#[test]
fn identical_vectors_have_unit_similarity() {
    let similarity = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
    assert!((similarity - 1.0).abs() < 1e-9);
}

#[test]
fn orthogonal_vectors_have_zero_similarity() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
}

#[test]
fn degenerate_inputs_score_zero() {
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
}

// ============================================================================
// SECTION: Index Tests
// ============================================================================

#[tokio::test]
async fn search_ranks_by_descending_similarity() {
    let index = InMemoryVectorIndex::new();
    index.upsert(node("s:close"), vec![1.0, 0.1]).await.expect("upsert");
    index.upsert(node("s:far"), vec![0.0, 1.0]).await.expect("upsert");
    index.upsert(node("s:middle"), vec![0.7, 0.7]).await.expect("upsert");
    let hits = index.search(&[1.0, 0.0], 2).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].node_id, node("s:close"));
    assert_eq!(hits[1].node_id, node("s:middle"));
    assert!(hits[0].similarity > hits[1].similarity);
}

#[tokio::test]
async fn contains_reflects_upserts() {
    let index = InMemoryVectorIndex::new();
    assert!(!index.contains(&node("s:a")).await);
    index.upsert(node("s:a"), vec![0.5; 4]).await.expect("upsert");
    assert!(index.contains(&node("s:a")).await);
}
