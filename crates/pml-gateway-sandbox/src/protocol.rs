// crates/pml-gateway-sandbox/src/protocol.rs
// ============================================================================
// Module: Worker Protocol
// Description: RPC frames and trace timeline entries for sandbox workers.
// Purpose: Define the single message channel between host and worker and
//          the JSON sanitization applied to results.
// Dependencies: serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Host and worker communicate over one bidirectional channel of JSON
//! frames: the host opens a run, the worker calls back for tool and
//! capability invocations, and the run ends with a final result frame. The
//! bridge synthesizes start/end trace entries around each arbitrated call.
//! Results are JSON-sanitized: serializable values are captured verbatim,
//! non-serializable values are represented by a typed marker, and depth is
//! capped so hostile nesting cannot exhaust the host.
//!
//! Security posture: every frame from the worker is untrusted input; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum JSON nesting depth preserved by sanitization.
pub const MAX_SANITIZE_DEPTH: usize = 64;

// ============================================================================
// SECTION: Frames
// ============================================================================

/// One frame of the host ↔ worker channel.
///
/// # Invariants
/// - `call_id` correlates a call frame with exactly one result frame.
/// - Frames serialize with a `type` tag in snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    /// Worker finished booting and accepts a run.
    Ready,
    /// Host opens a run.
    Run {
        /// Code snippet to evaluate.
        code: String,
        /// Execution context exposed to the code.
        context: Value,
        /// Tool dispatch table: server id to tool names.
        tools: Map<String, Value>,
        /// Capability dispatch table: callable names.
        capabilities: Vec<String>,
    },
    /// Worker requests a tool invocation.
    ToolCall {
        /// Correlation id.
        call_id: u64,
        /// Server identifier.
        server: String,
        /// Tool name on that server.
        tool: String,
        /// Call arguments.
        args: Value,
    },
    /// Host answers a tool invocation.
    ToolResult {
        /// Correlation id.
        call_id: u64,
        /// Whether the call succeeded.
        success: bool,
        /// Sanitized result on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error message on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Worker requests a capability invocation.
    CapabilityCall {
        /// Correlation id.
        call_id: u64,
        /// Capability display name.
        capability: String,
        /// Call arguments.
        args: Value,
    },
    /// Host answers a capability invocation.
    CapabilityResult {
        /// Correlation id.
        call_id: u64,
        /// Whether the call succeeded.
        success: bool,
        /// Sanitized result on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error message on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Worker reports the final run outcome.
    RunResult {
        /// Whether the run succeeded.
        success: bool,
        /// Sanitized return value on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error message on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

// ============================================================================
// SECTION: Trace Timeline
// ============================================================================

/// Kind of a trace timeline entry.
///
/// # Invariants
/// - Labels appear literally in persisted traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEntryKind {
    /// Tool call started.
    ToolStart,
    /// Tool call finished.
    ToolEnd,
    /// Capability call started.
    CapabilityStart,
    /// Capability call finished.
    CapabilityEnd,
}

/// One entry of the ordered trace timeline.
///
/// # Invariants
/// - `end` entries carry `success` and `duration_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: TraceEntryKind,
    /// Entry timestamp.
    pub ts: Timestamp,
    /// Trace identifier of this call.
    pub trace_id: TraceId,
    /// Parent trace for re-entrant calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_trace_id: Option<TraceId>,
    /// Tool identifier (`server:tool`) for tool entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Capability name for capability entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Call arguments (start entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Whether the call succeeded (end entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Call duration in milliseconds (end entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Sanitized result (successful end entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (failed end entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Builds the marker substituted for a non-serializable value.
#[must_use]
pub fn non_serializable_marker(type_of: &str, display: &str) -> Value {
    json!({
        "__type": "non-serializable",
        "typeof": type_of,
        "toString": display,
    })
}

/// Sanitizes a result value for capture.
///
/// JSON-serializable content is preserved verbatim; nesting beyond
/// [`MAX_SANITIZE_DEPTH`] is replaced by a non-serializable marker so
/// hostile structures cannot exhaust the host. Values already containing
/// markers pass through unchanged. Circular references cannot occur in
/// decoded JSON; the depth cap covers the equivalent hostile case.
#[must_use]
pub fn sanitize_result(value: &Value) -> Value {
    sanitize_at_depth(value, 0)
}

/// Depth-bounded recursive sanitization.
fn sanitize_at_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_SANITIZE_DEPTH {
        return non_serializable_marker("object", "[max depth exceeded]");
    }
    match value {
        Value::Object(map) => {
            let mut sanitized = Map::with_capacity(map.len());
            for (key, entry) in map {
                sanitized.insert(key.clone(), sanitize_at_depth(entry, depth + 1));
            }
            Value::Object(sanitized)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| sanitize_at_depth(item, depth + 1)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests;
