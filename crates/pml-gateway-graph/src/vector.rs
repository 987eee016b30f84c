// crates/pml-gateway-graph/src/vector.rs
// ============================================================================
// Module: In-Memory Vector Index
// Description: Cosine-similarity nearest-neighbor index over node vectors.
// Purpose: Back semantic discovery in tests and local mode.
// Dependencies: async-trait, pml-gateway-core
// ============================================================================

//! ## Overview
//! A small exact-scan vector index: embeddings are stored per node and
//! queries rank every stored vector by cosine similarity. Production
//! deployments replace this with a relational vector column behind the same
//! [`VectorIndex`] interface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use pml_gateway_core::interfaces::SemanticHit;
use pml_gateway_core::interfaces::VectorError;
use pml_gateway_core::interfaces::VectorIndex;
use pml_gateway_core::types::identifiers::NodeId;

// ============================================================================
// SECTION: Cosine Similarity
// ============================================================================

/// Cosine similarity between two vectors.
///
/// Returns zero for mismatched dimensions or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// SECTION: In-Memory Index
// ============================================================================

/// Exact-scan vector index for tests and local mode.
///
/// # Invariants
/// - Search results are ordered by descending similarity.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    /// Stored embeddings per node.
    vectors: RwLock<HashMap<NodeId, Vec<f32>>>,
}

impl InMemoryVectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SemanticHit>, VectorError> {
        let vectors = match self.vectors.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut hits: Vec<SemanticHit> = vectors
            .iter()
            .map(|(node_id, stored)| SemanticHit {
                node_id: node_id.clone(),
                similarity: cosine_similarity(embedding, stored),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, node_id: NodeId, embedding: Vec<f32>) -> Result<(), VectorError> {
        let mut vectors = match self.vectors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        vectors.insert(node_id, embedding);
        Ok(())
    }

    async fn contains(&self, node_id: &NodeId) -> bool {
        match self.vectors.read() {
            Ok(guard) => guard.contains_key(node_id),
            Err(poisoned) => poisoned.into_inner().contains_key(node_id),
        }
    }
}

#[cfg(test)]
mod tests;
