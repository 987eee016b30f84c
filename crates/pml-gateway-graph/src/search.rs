// crates/pml-gateway-graph/src/search.rs
// ============================================================================
// Module: Unified Search
// Description: Semantic discovery over graph nodes with reliability scoring.
// Purpose: Serve `pml:discover` with the semantic × reliability formula.
// Dependencies: pml-gateway-core, pml-gateway-graph::graph
// ============================================================================

//! ## Overview
//! Unified search embeds the query, retrieves top candidates from the vector
//! index, and scores each as `semantic × reliability`, where reliability is
//! the node's observed success rate (default 0.7 when unknown). Discovery
//! filters by node kind and ranks descending. The auxiliary discover score
//! additionally applies a penalty/boost band around the success rate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::interfaces::EmbeddingProvider;
use pml_gateway_core::interfaces::VectorIndex;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::node::NodeKind;

use crate::graph::KnowledgeGraph;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reliability assumed for nodes without an observed success rate.
pub const DEFAULT_RELIABILITY: f64 = 0.7;

/// Oversampling factor applied to the vector retrieval before filtering.
const RETRIEVAL_OVERSAMPLE: usize = 4;

// ============================================================================
// SECTION: Options and Hits
// ============================================================================

/// Node kind filter for discovery.
///
/// # Invariants
/// - Variants are stable for request parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    /// Tools only.
    Tool,
    /// Capabilities only.
    Capability,
    /// Every node kind.
    #[default]
    All,
}

impl DiscoveryKind {
    /// Returns true when a node kind passes this filter.
    #[must_use]
    pub const fn accepts(self, kind: NodeKind) -> bool {
        match self {
            Self::Tool => matches!(kind, NodeKind::Tool),
            Self::Capability => matches!(kind, NodeKind::Capability),
            Self::All => true,
        }
    }
}

/// Discovery query options.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Maximum hits returned.
    pub limit: usize,
    /// Minimum score; lower-scoring hits are dropped.
    pub min_score: Option<f64>,
    /// Node kind filter.
    pub kind: DiscoveryKind,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: None,
            kind: DiscoveryKind::All,
        }
    }
}

/// One ranked discovery hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryHit {
    /// Node identifier.
    pub id: NodeId,
    /// Node kind.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Display name.
    pub name: String,
    /// Final score (`semantic × reliability`).
    pub score: f64,
}

// ============================================================================
// SECTION: Scores
// ============================================================================

/// Returns the penalty/boost multiplier for a success rate.
///
/// Below 0.5 the multiplier collapses to 0.1; above 0.9 it boosts to 1.2;
/// otherwise it is neutral.
#[must_use]
pub fn penalty_boost(success_rate: f64) -> f64 {
    if success_rate < 0.5 {
        0.1
    } else if success_rate > 0.9 {
        1.2
    } else {
        1.0
    }
}

/// Discover score: `semantic × reliability × penalty_boost(success_rate)`.
///
/// With no observed success rate the reliability defaults and the band
/// multiplier stays neutral.
#[must_use]
pub fn compute_discover_score(semantic: f64, success_rate: Option<f64>) -> f64 {
    match success_rate {
        Some(rate) => semantic * rate * penalty_boost(rate),
        None => semantic * DEFAULT_RELIABILITY,
    }
}

// ============================================================================
// SECTION: Unified Search
// ============================================================================

/// Semantic discovery over graph nodes.
pub struct UnifiedSearch {
    /// Embedding model for queries.
    embeddings: Arc<dyn EmbeddingProvider>,
    /// Vector index over node embeddings.
    index: Arc<dyn VectorIndex>,
    /// Knowledge graph supplying kinds, names, and success rates.
    graph: KnowledgeGraph,
}

impl UnifiedSearch {
    /// Creates a search over the given collaborators.
    #[must_use]
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        graph: KnowledgeGraph,
    ) -> Self {
        Self {
            embeddings,
            index,
            graph,
        }
    }

    /// Runs a discovery query and returns ranked hits.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when embedding or the index query fails.
    pub async fn discover(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<DiscoveryHit>, GatewayError> {
        if query.trim().is_empty() {
            return Err(GatewayError::Validation("query must not be empty".to_string()));
        }
        let embedding = self
            .embeddings
            .embed(query)
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        let candidates = self
            .index
            .search(&embedding, options.limit.saturating_mul(RETRIEVAL_OVERSAMPLE).max(1))
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        let mut hits: Vec<DiscoveryHit> = Vec::new();
        for candidate in candidates {
            let Some(node) = self.graph.node(&candidate.node_id) else {
                continue;
            };
            if !options.kind.accepts(node.kind) {
                continue;
            }
            let reliability = node.success_rate.unwrap_or(DEFAULT_RELIABILITY);
            let score = candidate.similarity.max(0.0) * reliability;
            if options.min_score.is_some_and(|min| score < min) {
                continue;
            }
            hits.push(DiscoveryHit {
                id: node.id,
                kind: node.kind,
                name: node.name,
                score,
            });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests;
