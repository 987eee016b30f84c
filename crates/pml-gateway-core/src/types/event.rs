// crates/pml-gateway-core/src/types/event.rs
// ============================================================================
// Module: Gateway Events
// Description: Process-wide event envelope and well-known event types.
// Purpose: Define the wire form shared by the bus, SSE fan-out, and sync.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Events carry a dotted type string, a source label, a millisecond
//! timestamp, and a free-form payload. The bus fills in the timestamp at
//! emit time when absent. Glob-prefix filters (`graph.*`) select event
//! families for SSE subscribers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::types::time::Timestamp;

// ============================================================================
// SECTION: Well-Known Event Types
// ============================================================================

/// Well-known event type strings.
pub mod event_types {
    /// A tool call started.
    pub const TOOL_START: &str = "tool.start";
    /// A tool call finished.
    pub const TOOL_END: &str = "tool.end";
    /// A DAG task completed.
    pub const DAG_TASK_COMPLETED: &str = "dag.task.completed";
    /// A DAG layer checkpoint was persisted.
    pub const DAG_CHECKPOINT: &str = "dag.checkpoint";
    /// A decision gate is waiting for a command.
    pub const DAG_DECISION_REQUIRED: &str = "dag.decision.required";
    /// A workflow finished.
    pub const DAG_WORKFLOW_COMPLETE: &str = "dag.workflow.complete";
    /// A capability was learned.
    pub const CAPABILITY_LEARNED: &str = "capability.learned";
    /// A capability zone was created.
    pub const CAPABILITY_ZONE_CREATED: &str = "capability.zone.created";
    /// A capability zone was updated.
    pub const CAPABILITY_ZONE_UPDATED: &str = "capability.zone.updated";
    /// Two capabilities were merged.
    pub const CAPABILITY_MERGED: &str = "capability.merged";
    /// A graph edge was created.
    pub const GRAPH_EDGE_CREATED: &str = "graph.edge.created";
    /// A graph edge was updated.
    pub const GRAPH_EDGE_UPDATED: &str = "graph.edge.updated";
    /// The graph finished a full sync from the database.
    pub const GRAPH_SYNCED: &str = "graph.synced";
    /// Periodic liveness event.
    pub const HEARTBEAT: &str = "heartbeat";
    /// The gateway finished wiring its subsystems.
    pub const SYSTEM_STARTUP: &str = "system.startup";
}

/// Wildcard subscription type receiving every event.
pub const WILDCARD: &str = "*";

// ============================================================================
// SECTION: Event Envelope
// ============================================================================

/// Process-wide event envelope.
///
/// # Invariants
/// - `event_type` is a non-empty dotted string.
/// - `timestamp` is filled by the bus at emit time when zero-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Dotted event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emitting component label.
    pub source: String,
    /// Event timestamp (epoch milliseconds).
    pub timestamp: Timestamp,
    /// Free-form payload, shaped per event type.
    pub payload: Value,
}

impl GatewayEvent {
    /// Creates an event with an unset timestamp; the bus stamps it on emit.
    #[must_use]
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Timestamp::default(),
            payload,
        }
    }

    /// Creates an event with an explicit timestamp, preserved by the bus.
    #[must_use]
    pub fn at(
        event_type: impl Into<String>,
        source: impl Into<String>,
        timestamp: Timestamp,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            timestamp,
            payload,
        }
    }
}

// ============================================================================
// SECTION: Filter Matching
// ============================================================================

/// Returns true when an event type matches a glob-prefix filter.
///
/// A filter of `a.*` matches `a.b` and `a.b.c`; a filter without a trailing
/// `.*` matches exactly; the bare wildcard `*` matches everything.
#[must_use]
pub fn matches_filter(event_type: &str, filter: &str) -> bool {
    if filter == WILDCARD {
        return true;
    }
    if let Some(prefix) = filter.strip_suffix(".*") {
        return event_type == prefix
            || event_type.len() > prefix.len()
                && event_type.starts_with(prefix)
                && event_type.as_bytes()[prefix.len()] == b'.';
    }
    event_type == filter
}
