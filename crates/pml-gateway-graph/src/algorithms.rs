// crates/pml-gateway-graph/src/algorithms.rs
// ============================================================================
// Module: Graph Algorithms
// Description: PageRank and community detection over the knowledge graph.
// Purpose: Provide ranking and cluster structure recomputed on write.
// Dependencies: petgraph
// ============================================================================

//! ## Overview
//! PageRank runs a damped random walk (damping 0.85) until convergence
//! (`epsilon < 1e-6`) or fifty iterations. Communities come from greedy
//! label propagation over edge confidences, a modularity-flavored heuristic
//! that is deterministic for a given insertion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;

use pml_gateway_core::types::edge::GraphEdge;
use pml_gateway_core::types::node::GraphNode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// PageRank damping factor.
pub const PAGERANK_DAMPING: f64 = 0.85;

/// PageRank iteration cap.
pub const PAGERANK_MAX_ITERATIONS: usize = 50;

/// PageRank convergence threshold (L1 delta).
pub const PAGERANK_EPSILON: f64 = 1e-6;

/// Label-propagation sweep cap.
const COMMUNITY_MAX_SWEEPS: usize = 20;

// ============================================================================
// SECTION: PageRank
// ============================================================================

/// Computes PageRank scores for every node.
///
/// Dangling nodes distribute their rank uniformly; the walk runs until the
/// L1 delta drops below [`PAGERANK_EPSILON`] or the iteration cap is hit.
#[must_use]
pub fn page_rank(graph: &StableDiGraph<GraphNode, GraphEdge>) -> HashMap<NodeIndex, f64> {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    let n = nodes.len();
    if n == 0 {
        return HashMap::new();
    }
    let uniform = 1.0 / n as f64;
    let mut ranks: HashMap<NodeIndex, f64> = nodes.iter().map(|&ix| (ix, uniform)).collect();
    for _ in 0..PAGERANK_MAX_ITERATIONS {
        let mut next: HashMap<NodeIndex, f64> =
            nodes.iter().map(|&ix| (ix, (1.0 - PAGERANK_DAMPING) / n as f64)).collect();
        let mut dangling = 0.0;
        for &ix in &nodes {
            let rank = ranks[&ix];
            let out_weight: f64 =
                graph.edges_directed(ix, Direction::Outgoing).map(|e| e.weight().confidence).sum();
            if out_weight <= f64::EPSILON {
                dangling += rank;
                continue;
            }
            for edge in graph.edges_directed(ix, Direction::Outgoing) {
                let share = rank * edge.weight().confidence / out_weight;
                if let Some(entry) = next.get_mut(&edge.target()) {
                    *entry += PAGERANK_DAMPING * share;
                }
            }
        }
        if dangling > 0.0 {
            let share = PAGERANK_DAMPING * dangling / n as f64;
            for value in next.values_mut() {
                *value += share;
            }
        }
        let delta: f64 = nodes.iter().map(|ix| (next[ix] - ranks[ix]).abs()).sum();
        ranks = next;
        if delta < PAGERANK_EPSILON {
            break;
        }
    }
    ranks
}

// ============================================================================
// SECTION: Communities
// ============================================================================

/// Assigns a community label to every node via greedy label propagation.
///
/// Each sweep moves a node to the label with the highest incident edge
/// confidence among its neighbors; ties resolve to the smaller label, which
/// keeps the assignment deterministic. Sweeps stop at a fixed point or the
/// sweep cap.
#[must_use]
pub fn communities(graph: &StableDiGraph<GraphNode, GraphEdge>) -> HashMap<NodeIndex, usize> {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    let mut labels: HashMap<NodeIndex, usize> =
        nodes.iter().map(|&ix| (ix, ix.index())).collect();
    for _ in 0..COMMUNITY_MAX_SWEEPS {
        let mut changed = false;
        for &ix in &nodes {
            let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
            for edge in graph.edges_directed(ix, Direction::Outgoing) {
                if let Some(&label) = labels.get(&edge.target()) {
                    *weights.entry(label).or_insert(0.0) += edge.weight().confidence;
                }
            }
            for edge in graph.edges_directed(ix, Direction::Incoming) {
                if let Some(&label) = labels.get(&edge.source()) {
                    *weights.entry(label).or_insert(0.0) += edge.weight().confidence;
                }
            }
            if weights.is_empty() {
                continue;
            }
            let mut best_label = labels[&ix];
            let mut best_weight = f64::MIN;
            for (&label, &weight) in &weights {
                if weight > best_weight + f64::EPSILON {
                    best_label = label;
                    best_weight = weight;
                }
            }
            if labels[&ix] != best_label {
                labels.insert(ix, best_label);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    normalize_labels(&labels)
}

/// Renumbers community labels to a dense `0..k` range by first appearance.
fn normalize_labels(labels: &HashMap<NodeIndex, usize>) -> HashMap<NodeIndex, usize> {
    let mut ordered: Vec<(&NodeIndex, &usize)> = labels.iter().collect();
    ordered.sort_by_key(|(ix, _)| ix.index());
    let mut dense: BTreeMap<usize, usize> = BTreeMap::new();
    let mut next = 0usize;
    let mut result = HashMap::new();
    for (ix, label) in ordered {
        let entry = *dense.entry(*label).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        result.insert(*ix, entry);
    }
    result
}
