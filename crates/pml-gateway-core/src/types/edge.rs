// crates/pml-gateway-core/src/types/edge.rs
// ============================================================================
// Module: Graph Edge Model
// Description: Typed, directed edges with provenance-weighted confidence.
// Purpose: Define the edge-weight formula shared by persistence and queries.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Edges carry a type weight multiplied by a source modifier; the product is
//! the edge confidence used for persistence and query weighting alike.
//! Invariants:
//! - `confidence = type_weight(kind) × source_modifier(source)`.
//! - Edge source upgrades `inferred → observed` once `count >= 3`.
//! - The same constants drive writes and reads; there is no second formula.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::types::identifiers::NodeId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Observation count at which an inferred edge becomes observed.
pub const OBSERVED_COUNT_THRESHOLD: u64 = 3;

// ============================================================================
// SECTION: Edge Kinds
// ============================================================================

/// Kind of a directed graph edge.
///
/// # Invariants
/// - Variants are stable for persistence.
/// - Type weights are fixed constants applied identically on read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Data dependency between tasks.
    Dependency,
    /// Consecutive execution within a layer or trace.
    Sequence,
    /// Parent capability contains a child call.
    Contains,
    /// Semantic similarity between nodes.
    Similarity,
}

impl EdgeKind {
    /// Returns the multiplicative type weight for this edge kind.
    #[must_use]
    pub const fn type_weight(self) -> f64 {
        match self {
            Self::Dependency => 1.0,
            Self::Sequence => 0.5,
            Self::Contains => 0.8,
            Self::Similarity => 0.3,
        }
    }

    /// Returns a stable label for persistence and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dependency => "dependency",
            Self::Sequence => "sequence",
            Self::Contains => "contains",
            Self::Similarity => "similarity",
        }
    }

    /// Parses a persisted edge-kind label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "dependency" => Some(Self::Dependency),
            "sequence" => Some(Self::Sequence),
            "contains" => Some(Self::Contains),
            "similarity" => Some(Self::Similarity),
            _ => None,
        }
    }
}

/// Provenance of a graph edge.
///
/// # Invariants
/// - Variants are stable for persistence.
/// - Modifiers are fixed constants applied identically on read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSource {
    /// Inferred from co-occurrence; discounted until observed repeatedly.
    Inferred,
    /// Observed directly in execution.
    Observed,
    /// Declared explicitly by a capability author.
    Declared,
}

impl EdgeSource {
    /// Returns the multiplicative source modifier.
    #[must_use]
    pub const fn modifier(self) -> f64 {
        match self {
            Self::Inferred => 0.7,
            Self::Observed | Self::Declared => 1.0,
        }
    }

    /// Returns a stable label for persistence and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inferred => "inferred",
            Self::Observed => "observed",
            Self::Declared => "declared",
        }
    }

    /// Parses a persisted edge-source label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "inferred" => Some(Self::Inferred),
            "observed" => Some(Self::Observed),
            "declared" => Some(Self::Declared),
            _ => None,
        }
    }
}

/// Returns the edge weight for a kind/source pair.
///
/// This is the single formula used for persistence and query weighting.
#[must_use]
pub const fn edge_weight(kind: EdgeKind, source: EdgeSource) -> f64 {
    kind.type_weight() * source.modifier()
}

// ============================================================================
// SECTION: Graph Edge
// ============================================================================

/// A directed, typed edge of the knowledge graph.
///
/// # Invariants
/// - `confidence == edge_weight(kind, source)` at all times.
/// - `source` is `Observed` whenever `count >= OBSERVED_COUNT_THRESHOLD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Origin node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Edge kind.
    pub kind: EdgeKind,
    /// Edge provenance.
    pub source: EdgeSource,
    /// Number of observations.
    pub count: u64,
    /// Derived confidence; always `edge_weight(kind, source)`.
    pub confidence: f64,
}

impl GraphEdge {
    /// Creates a first-observation edge.
    #[must_use]
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind, source: EdgeSource) -> Self {
        Self {
            from,
            to,
            kind,
            source,
            count: 1,
            confidence: edge_weight(kind, source),
        }
    }

    /// Records one more observation, upgrading the source when the count
    /// crosses [`OBSERVED_COUNT_THRESHOLD`].
    pub fn observe(&mut self) {
        self.count = self.count.saturating_add(1);
        if self.source == EdgeSource::Inferred && self.count >= OBSERVED_COUNT_THRESHOLD {
            self.source = EdgeSource::Observed;
        }
        self.confidence = edge_weight(self.kind, self.source);
    }
}

#[cfg(test)]
mod tests;
