// crates/pml-gateway-graph/src/search/tests.rs
// ============================================================================
// Module: Unified Search Tests
// Description: Unit tests for scoring, filters, and the discovery benchmark.
// Purpose: Validate the score formula and retrieval quality thresholds.
// Dependencies: pml-gateway-core, pml-gateway-graph, tokio
// ============================================================================

//! ## Overview
//! Validates `semantic × reliability` scoring, the penalty/boost band, the
//! kind filter, and the thirty-query discovery benchmark thresholds
//! (Hit@1 > 0.55, Hit@5 > 0.85, MRR > 0.70).

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

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use super::DiscoveryKind;
use super::SearchOptions;
use super::UnifiedSearch;
use super::compute_discover_score;
use super::penalty_boost;
use crate::graph::KnowledgeGraph;
use crate::vector::InMemoryVectorIndex;
use pml_gateway_core::bus::EventBus;
use pml_gateway_core::interfaces::EmbeddingProvider;
use pml_gateway_core::interfaces::VectorError;
use pml_gateway_core::interfaces::VectorIndex;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::identifiers::ServerId;
use pml_gateway_core::types::node::GraphNode;

/// Embedding provider backed by a fixed text → vector table.
struct TableEmbeddings {
    table: Mutex<HashMap<String, Vec<f32>>>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.table
            .lock()
            .expect("table lock")
            .get(text)
            .cloned()
            .ok_or_else(|| VectorError::Embedding(format!("no vector for `{text}`")))
    }
}

fn node(raw: &str) -> NodeId {
    NodeId::parse(raw).expect("node id")
}

/// Unit basis vector of the benchmark dimension.
fn basis(dim: usize, position: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    vector[position] = 1.0;
    vector
}

// ============================================================================
// SECTION: Score Formula Tests
// ============================================================================

#[test]
fn penalty_boost_bands_match_thresholds() {
    assert_eq!(penalty_boost(0.49), 0.1);
    assert_eq!(penalty_boost(0.5), 1.0);
    assert_eq!(penalty_boost(0.9), 1.0);
    assert_eq!(penalty_boost(0.91), 1.2);
}

#[test]
fn discover_score_combines_semantic_reliability_and_band() {
    assert_eq!(compute_discover_score(0.8, Some(0.95)), 0.8 * 0.95 * 1.2);
    assert_eq!(compute_discover_score(0.8, Some(0.4)), 0.8 * 0.4 * 0.1);
    assert_eq!(compute_discover_score(0.8, None), 0.8 * 0.7);
}

// ============================================================================
// SECTION: Discovery Tests
// ============================================================================

async fn search_fixture() -> (UnifiedSearch, KnowledgeGraph) {
    let graph = KnowledgeGraph::new(EventBus::new(), None);
    let index = Arc::new(InMemoryVectorIndex::new());
    let server = ServerId::new("fs").expect("server");
    graph.upsert_node(GraphNode::tool(&server, "read").with_success_rate(0.95));
    graph.upsert_node(GraphNode::tool(&server, "write").with_success_rate(0.3));
    graph.upsert_node(GraphNode::capability(node("cap-6f9619ff-8b86-4d01-b42d-00cf4fc964ff"), "text:summarize"));
    index.upsert(node("fs:read"), basis(4, 0)).await.expect("upsert");
    index.upsert(node("fs:write"), basis(4, 1)).await.expect("upsert");
    index
        .upsert(node("cap-6f9619ff-8b86-4d01-b42d-00cf4fc964ff"), basis(4, 2))
        .await
        .expect("upsert");
    let mut table = HashMap::new();
    table.insert("read a file".to_string(), basis(4, 0));
    table.insert("summarize text".to_string(), basis(4, 2));
    let embeddings = Arc::new(TableEmbeddings {
        table: Mutex::new(table),
    });
    let search = UnifiedSearch::new(embeddings, index, graph.clone());
    (search, graph)
}

#[tokio::test]
async fn discovery_scores_semantic_times_reliability() {
    let (search, _graph) = search_fixture().await;
    let hits = search.discover("read a file", SearchOptions::default()).await.expect("hits");
    assert_eq!(hits[0].id, node("fs:read"));
    // Exact semantic match (1.0) times the node's success rate.
    assert!((hits[0].score - 0.95).abs() < 1e-9);
}

#[tokio::test]
async fn discovery_defaults_reliability_for_unknown_success() {
    let (search, _graph) = search_fixture().await;
    let hits = search.discover("summarize text", SearchOptions::default()).await.expect("hits");
    assert_eq!(hits[0].id, node("cap-6f9619ff-8b86-4d01-b42d-00cf4fc964ff"));
    assert!((hits[0].score - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn discovery_kind_filter_drops_other_kinds() {
    let (search, _graph) = search_fixture().await;
    let hits = search
        .discover(
            "read a file",
            SearchOptions {
                kind: DiscoveryKind::Capability,
                ..SearchOptions::default()
            },
        )
        .await
        .expect("hits");
    assert!(hits.iter().all(|hit| hit.id.is_capability()));
}

#[tokio::test]
async fn discovery_rejects_empty_queries() {
    let (search, _graph) = search_fixture().await;
    search.discover("  ", SearchOptions::default()).await.expect_err("empty query");
}

// ============================================================================
// SECTION: Benchmark
// ============================================================================

/// Thirty-query retrieval benchmark over tools, capabilities, and
/// meta-capabilities. Every fifth query is adversarial: its vector leans
/// toward a neighboring entry so the target lands at rank two.
#[tokio::test]
async fn discovery_benchmark_meets_quality_thresholds() {
    const DIM: usize = 32;
    const QUERIES: usize = 30;
    let graph = KnowledgeGraph::new(EventBus::new(), None);
    let index = Arc::new(InMemoryVectorIndex::new());
    let server = ServerId::new("bench").expect("server");
    let mut table = HashMap::new();
    let mut targets = Vec::new();
    for i in 0..QUERIES {
        let (node_id, name) = match i % 3 {
            0 => {
                let name = format!("tool{i}");
                graph.upsert_node(GraphNode::tool(&server, &name).with_success_rate(0.8));
                (node(&format!("bench:{name}")), name)
            }
            1 => {
                let id = node(&format!(
                    "cap-6f9619ff-8b86-4d01-b42d-00cf4fc964{i:02}"
                ));
                graph.upsert_node(
                    GraphNode::capability(id.clone(), format!("ns:action{i}"))
                        .with_success_rate(0.8),
                );
                (id, format!("ns:action{i}"))
            }
            _ => {
                let id = node(&format!("code:meta.op{i}"));
                graph.upsert_node(
                    GraphNode::operation(
                        &format!("meta.op{i}"),
                        pml_gateway_core::types::node::OperationCategory::Object,
                    )
                    .with_success_rate(0.8),
                );
                (id, format!("meta.op{i}"))
            }
        };
        index.upsert(node_id.clone(), basis(DIM, i)).await.expect("upsert");
        let query = format!("find {name}");
        let vector = if i % 5 == 0 {
            // Adversarial: lean toward the next entry.
            let mut vector = basis(DIM, i);
            vector[i] = 0.6;
            vector[(i + 1) % QUERIES] = 0.8;
            vector
        } else {
            basis(DIM, i)
        };
        table.insert(query.clone(), vector);
        targets.push((query, node_id));
    }
    let embeddings = Arc::new(TableEmbeddings {
        table: Mutex::new(table),
    });
    let search = UnifiedSearch::new(embeddings, index, graph);

    let mut hit_at_1 = 0usize;
    let mut hit_at_5 = 0usize;
    let mut reciprocal_sum = 0.0f64;
    for (query, target) in &targets {
        let hits = search
            .discover(
                query,
                SearchOptions {
                    limit: 10,
                    ..SearchOptions::default()
                },
            )
            .await
            .expect("benchmark query");
        let rank = hits.iter().position(|hit| &hit.id == target);
        if let Some(rank) = rank {
            if rank == 0 {
                hit_at_1 += 1;
            }
            if rank < 5 {
                hit_at_5 += 1;
            }
            reciprocal_sum += 1.0 / (rank + 1) as f64;
        }
    }
    let hit1 = hit_at_1 as f64 / QUERIES as f64;
    let hit5 = hit_at_5 as f64 / QUERIES as f64;
    let mrr = reciprocal_sum / QUERIES as f64;
    assert!(hit1 > 0.55, "Hit@1 {hit1} below threshold");
    assert!(hit5 > 0.85, "Hit@5 {hit5} below threshold");
    assert!(mrr > 0.70, "MRR {mrr} below threshold");
}
