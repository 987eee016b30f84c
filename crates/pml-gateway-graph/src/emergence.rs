// crates/pml-gateway-graph/src/emergence.rs
// ============================================================================
// Module: Emergence Metrics
// Description: Rolling graph-health metrics and recommendations.
// Purpose: Derive entropy, cluster stability, trends, and phase transitions
//          from graph snapshots.
// Dependencies: pml-gateway-core, pml-gateway-graph::graph, serde
// ============================================================================

//! ## Overview
//! Emergence metrics summarize how the knowledge graph evolves: Shannon
//! entropy over edge weights (normalized to `[0, 1]`), community stability
//! as the Jaccard overlap of co-membership against the previous snapshot,
//! trend classification on a five-percent band, and phase-transition
//! detection once ten samples accumulate. Recommendations flag entropy and
//! stability excursions and surface successes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;

use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::time::Timestamp;

use crate::graph::KnowledgeGraph;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rolling window size.
pub const WINDOW_SIZE: usize = 100;

/// Relative delta above which a trend counts as rising or falling.
const TREND_BAND: f64 = 0.05;

/// Minimum samples before phase transitions are evaluated.
const PHASE_MIN_SAMPLES: usize = 10;

/// Mean-entropy delta that signals a phase transition.
const PHASE_DELTA: f64 = 0.2;

/// Low-entropy warning bound.
const ENTROPY_LOW: f64 = 0.3;

/// High-entropy warning bound.
const ENTROPY_HIGH: f64 = 0.7;

/// Cluster-stability warning bound.
const STABILITY_LOW: f64 = 0.8;

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// One recorded metrics sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergenceSnapshot {
    /// Sample timestamp.
    pub timestamp: Timestamp,
    /// Normalized edge-weight entropy in `[0, 1]`.
    pub entropy: f64,
    /// Community stability against the previous sample in `[0, 1]`.
    pub stability: f64,
    /// Node count at sample time.
    pub node_count: usize,
    /// Edge count at sample time.
    pub edge_count: usize,
}

/// Trend of a metric across the two latest samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Latest value grew beyond the band.
    Rising,
    /// Latest value fell beyond the band.
    Falling,
    /// Within the band.
    Stable,
}

/// Detected phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Transition direction.
    pub phase: Phase,
    /// Detection confidence, capped at 1.0.
    pub confidence: f64,
}

/// Phase-transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Entropy is rising sharply; the graph is expanding.
    Expansion,
    /// Entropy is falling sharply; the graph is consolidating.
    Consolidation,
}

/// Severity of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Attention required.
    Warning,
    /// Healthy signal worth surfacing.
    Success,
}

/// One metrics recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Severity level.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

/// Auxiliary signals feeding recommendations.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSignals {
    /// Accuracy of speculative pre-planning, when measured.
    pub speculation_accuracy: Option<f64>,
    /// Diversity of learned capabilities, when measured.
    pub capability_diversity: Option<f64>,
}

// ============================================================================
// SECTION: Metrics Engine
// ============================================================================

/// Rolling emergence-metrics accumulator.
///
/// # Invariants
/// - The window never exceeds [`WINDOW_SIZE`] samples.
/// - Stability is 1.0 for the first sample (no previous communities).
pub struct EmergenceMetrics {
    /// Rolling sample window.
    window: VecDeque<EmergenceSnapshot>,
    /// Community assignment of the previous sample.
    previous_communities: HashMap<NodeId, usize>,
}

impl EmergenceMetrics {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: VecDeque::new(),
            previous_communities: HashMap::new(),
        }
    }

    /// Samples the graph and appends to the window.
    pub fn record(&mut self, graph: &KnowledgeGraph) -> EmergenceSnapshot {
        let snapshot = graph.snapshot();
        let weights: Vec<f64> = snapshot.edges.iter().map(|edge| edge.confidence).collect();
        let communities = graph.communities();
        let stability = jaccard_stability(&self.previous_communities, &communities);
        let sample = EmergenceSnapshot {
            timestamp: Timestamp::now(),
            entropy: normalized_entropy(&weights),
            stability,
            node_count: snapshot.nodes.len(),
            edge_count: snapshot.edges.len(),
        };
        self.previous_communities = communities;
        self.window.push_back(sample.clone());
        while self.window.len() > WINDOW_SIZE {
            self.window.pop_front();
        }
        sample
    }

    /// Returns the recorded window.
    #[must_use]
    pub fn window(&self) -> &VecDeque<EmergenceSnapshot> {
        &self.window
    }

    /// Classifies the entropy trend across the two latest samples.
    #[must_use]
    pub fn entropy_trend(&self) -> Trend {
        let mut iter = self.window.iter().rev();
        let (Some(latest), Some(previous)) = (iter.next(), iter.next()) else {
            return Trend::Stable;
        };
        classify_trend(previous.entropy, latest.entropy)
    }

    /// Detects a phase transition across the window.
    ///
    /// Requires at least [`PHASE_MIN_SAMPLES`] samples; compares the mean
    /// entropy of the five most recent samples against the rest.
    #[must_use]
    pub fn phase_transition(&self) -> Option<PhaseTransition> {
        if self.window.len() < PHASE_MIN_SAMPLES {
            return None;
        }
        let samples: Vec<f64> = self.window.iter().map(|sample| sample.entropy).collect();
        let split = samples.len().saturating_sub(5);
        let older = mean(&samples[..split]);
        let recent = mean(&samples[split..]);
        let delta = recent - older;
        if delta.abs() <= PHASE_DELTA {
            return None;
        }
        Some(PhaseTransition {
            phase: if delta > 0.0 { Phase::Expansion } else { Phase::Consolidation },
            confidence: (delta.abs() / PHASE_DELTA / 2.0).min(1.0),
        })
    }

    /// Builds recommendations from the latest sample and health signals.
    #[must_use]
    pub fn recommendations(&self, signals: HealthSignals) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        if let Some(latest) = self.window.back() {
            if latest.entropy < ENTROPY_LOW {
                recommendations.push(Recommendation {
                    severity: Severity::Warning,
                    message: format!(
                        "graph entropy {:.2} is low; the graph may be over-consolidated",
                        latest.entropy
                    ),
                });
            }
            if latest.entropy > ENTROPY_HIGH {
                recommendations.push(Recommendation {
                    severity: Severity::Warning,
                    message: format!(
                        "graph entropy {:.2} is high; edge weights are near-uniform",
                        latest.entropy
                    ),
                });
            }
            if latest.stability < STABILITY_LOW {
                recommendations.push(Recommendation {
                    severity: Severity::Warning,
                    message: format!(
                        "cluster stability {:.2} below {STABILITY_LOW}; communities are churning",
                        latest.stability
                    ),
                });
            }
        }
        if signals.speculation_accuracy.is_some_and(|accuracy| accuracy > 0.8) {
            recommendations.push(Recommendation {
                severity: Severity::Success,
                message: "speculation accuracy above 0.8".to_string(),
            });
        }
        if signals.capability_diversity.is_some_and(|diversity| diversity > 0.7) {
            recommendations.push(Recommendation {
                severity: Severity::Success,
                message: "capability diversity above 0.7".to_string(),
            });
        }
        recommendations
    }
}

impl Default for EmergenceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Pure Math
// ============================================================================

/// Shannon entropy over weights, normalized to `[0, 1]`.
///
/// Returns zero for fewer than two weights.
#[must_use]
pub fn normalized_entropy(weights: &[f64]) -> f64 {
    let positive: Vec<f64> = weights.iter().copied().filter(|w| *w > 0.0).collect();
    if positive.len() < 2 {
        return 0.0;
    }
    let total: f64 = positive.iter().sum();
    let entropy: f64 = positive
        .iter()
        .map(|weight| {
            let p = weight / total;
            -p * p.ln()
        })
        .sum();
    entropy / (positive.len() as f64).ln()
}

/// Jaccard overlap of community co-membership pairs.
///
/// Returns 1.0 when the previous assignment is empty.
#[must_use]
pub fn jaccard_stability(
    previous: &HashMap<NodeId, usize>,
    current: &HashMap<NodeId, usize>,
) -> f64 {
    if previous.is_empty() {
        return 1.0;
    }
    let previous_pairs = co_membership_pairs(previous);
    let current_pairs = co_membership_pairs(current);
    if previous_pairs.is_empty() && current_pairs.is_empty() {
        return 1.0;
    }
    let intersection = previous_pairs.intersection(&current_pairs).count();
    let union = previous_pairs.union(&current_pairs).count();
    intersection as f64 / union as f64
}

/// Builds the set of unordered same-community node pairs.
fn co_membership_pairs(assignment: &HashMap<NodeId, usize>) -> BTreeSet<(NodeId, NodeId)> {
    let mut by_label: HashMap<usize, Vec<&NodeId>> = HashMap::new();
    for (node, label) in assignment {
        by_label.entry(*label).or_default().push(node);
    }
    let mut pairs = BTreeSet::new();
    for members in by_label.values_mut() {
        members.sort();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                pairs.insert((members[i].clone(), members[j].clone()));
            }
        }
    }
    pairs
}

/// Classifies the relative change between two values.
fn classify_trend(previous: f64, latest: f64) -> Trend {
    let base = previous.abs().max(f64::EPSILON);
    let delta = (latest - previous) / base;
    if delta > TREND_BAND {
        Trend::Rising
    } else if delta < -TREND_BAND {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Arithmetic mean; zero for an empty slice.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
