// crates/pml-gateway-core/src/types/trace.rs
// ============================================================================
// Module: Execution Traces
// Description: Sanitized records of workflow and capability executions.
// Purpose: Define the trace row model, redaction, and replay priorities.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Execution traces capture what a workflow actually did: the executed path,
//! per-task results, decision outcomes, and timing. Traces are sanitized
//! before persistence (secret-bearing keys are replaced with a literal
//! marker) and carry a mutable replay priority clamped to `[0, 1]` used for
//! prioritized experience replay.
//!
//! Security posture: trace arguments and contexts originate from untrusted
//! callers and may embed credentials; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::types::identifiers::CapabilityId;
use crate::types::identifiers::NodeId;
use crate::types::identifiers::TaskId;
use crate::types::identifiers::TraceId;
use crate::types::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Literal substituted for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments that trigger redaction (case-insensitive substring match).
pub const REDACTION_PATTERNS: &[&str] =
    &["api_key", "apikey", "token", "password", "secret", "authorization", "credential"];

/// Replacement user identifier applied by anonymization.
pub const ANONYMIZED_USER: &str = "anonymized";

/// Global prioritized-experience-replay exponent.
pub const PER_ALPHA: f64 = 0.6;

// ============================================================================
// SECTION: Trace Rows
// ============================================================================

/// Outcome of a single decision point along an executed path.
///
/// # Invariants
/// - `node_id` names a node on the executed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Node at which the decision was taken.
    pub node_id: NodeId,
    /// Outcome label.
    pub outcome: String,
    /// Condition evaluated, when any.
    pub condition: Option<String>,
}

/// Result of one task execution inside a trace.
///
/// # Invariants
/// - `args` and `result` are sanitized before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTaskResult {
    /// Task identifier within the workflow.
    pub task_id: TaskId,
    /// Tool invoked by the task.
    pub tool: String,
    /// Arguments passed to the tool.
    pub args: Value,
    /// Result returned by the tool, when captured.
    pub result: Option<Value>,
    /// Whether the task succeeded.
    pub success: bool,
    /// Task duration in milliseconds.
    pub duration_ms: u64,
}

/// Persisted execution trace.
///
/// # Invariants
/// - `priority` stays within `[0, 1]`.
/// - `initial_context` and all task args/results are sanitized on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Trace identifier.
    pub id: TraceId,
    /// Capability that produced this trace, when any.
    pub capability_id: Option<CapabilityId>,
    /// Natural-language intent that triggered the execution.
    pub intent_text: Option<String>,
    /// Initial execution context (sanitized JSON).
    pub initial_context: Value,
    /// Execution timestamp.
    pub executed_at: Timestamp,
    /// Whether the workflow succeeded.
    pub success: bool,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Error message, when the workflow failed.
    pub error_message: Option<String>,
    /// Ordered node identifiers along the executed path.
    pub executed_path: Vec<NodeId>,
    /// Decision outcomes along the path.
    pub decisions: Vec<DecisionRecord>,
    /// Per-task results.
    pub task_results: Vec<TraceTaskResult>,
    /// Replay priority in `[0, 1]`.
    pub priority: f64,
    /// Parent trace for re-entrant executions.
    pub parent_trace_id: Option<TraceId>,
    /// Identifier of the user who triggered the execution.
    pub user_id: String,
    /// Component that created the trace.
    pub created_by: String,
}

impl ExecutionTrace {
    /// Sanitizes the trace in place: redacts secret-bearing keys in the
    /// initial context and every task's args and result.
    pub fn sanitize(&mut self) {
        sanitize_value(&mut self.initial_context);
        for task in &mut self.task_results {
            sanitize_value(&mut task.args);
            if let Some(result) = &mut task.result {
                sanitize_value(result);
            }
        }
    }

    /// Anonymizes the trace: replaces the user identifier and clears the
    /// intent text and initial context.
    pub fn anonymize(&mut self) {
        self.user_id = ANONYMIZED_USER.to_string();
        self.intent_text = None;
        self.initial_context = Value::Null;
    }

    /// Clamps and stores a replay priority.
    pub fn set_priority(&mut self, priority: f64) {
        self.priority = clamp_priority(priority);
    }
}

/// Clamps a replay priority to `[0, 1]`.
///
/// Non-finite inputs clamp to zero.
#[must_use]
pub fn clamp_priority(priority: f64) -> f64 {
    if priority.is_nan() { 0.0 } else { priority.clamp(0.0, 1.0) }
}

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Returns true when a key must be redacted.
#[must_use]
pub fn is_redacted_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    REDACTION_PATTERNS.iter().any(|pattern| key.contains(pattern))
}

/// Recursively replaces values under secret-bearing keys with [`REDACTED`].
///
/// Arrays are traversed element-wise; non-container values are untouched.
pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_redacted_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    sanitize_value(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                sanitize_value(item);
            }
        }
        _ => {}
    }
}
