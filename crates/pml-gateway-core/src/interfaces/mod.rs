// crates/pml-gateway-core/src/interfaces/mod.rs
// ============================================================================
// Module: Gateway Interfaces
// Description: Backend-agnostic interfaces for tools, vectors, and metrics.
// Purpose: Define the contract surfaces between the core and its external
//          collaborators.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the gateway integrates with external systems
//! (per-server tool clients, the embedding model, the vector index, and the
//! metrics sink) without embedding backend-specific details.
//! Implementations must be deterministic where the contract says so and fail
//! closed on missing or invalid data.
//!
//! Security posture: interface implementations consume untrusted inputs; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::GatewayError;
use crate::types::identifiers::CapabilityId;
use crate::types::identifiers::NodeId;
use crate::types::identifiers::TraceId;
use crate::types::permission::PermissionSet;
use crate::types::workflow::TaskSpec;

// ============================================================================
// SECTION: Tool Client
// ============================================================================

/// Errors returned by tool clients and executors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The named server is not configured.
    #[error("unknown server: {0}")]
    UnknownServer(String),
    /// The named tool does not exist on its server.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The call failed on the backing server.
    #[error("tool call failed: {0}")]
    CallFailed(String),
    /// The call exceeded its deadline.
    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ToolError> for GatewayError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownServer(name) | ToolError::UnknownTool(name) => Self::NotFound(name),
            ToolError::CallFailed(message) => Self::Internal(message),
            ToolError::Timeout(duration) => Self::Timeout {
                timeout_ms: duration.as_millis() as u64,
                context: "tool call".to_string(),
            },
        }
    }
}

/// Connection to one backing tool server.
///
/// Implementations wrap a per-server MCP protocol client; the pool owns
/// their lifecycle.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Invokes a tool on the backing server.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool is unknown or the call fails.
    async fn call_tool(&self, tool_name: &str, args: Value) -> Result<Value, ToolError>;

    /// Releases the connection; must be idempotent.
    async fn disconnect(&self);
}

impl std::fmt::Debug for dyn ToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ToolClient")
    }
}

/// Executes one DAG task against its backing tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes the task with fully resolved arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when resolution of the backing server or the
    /// call itself fails.
    async fn execute(&self, task: &TaskSpec, args: Value) -> Result<Value, ToolError>;
}

// ============================================================================
// SECTION: Capability Runner
// ============================================================================

/// Request to execute inline capability code.
///
/// # Invariants
/// - `code` is non-empty; `context` is sanitized by the trace layer, not
///   here.
#[derive(Debug, Clone)]
pub struct CodeRunRequest {
    /// Inline code snippet.
    pub code: String,
    /// Execution context (dependency outputs, parameters).
    pub context: Value,
    /// Capability backing the snippet, when known.
    pub capability_id: Option<CapabilityId>,
    /// Parent trace for re-entrant runs.
    pub parent_trace_id: Option<TraceId>,
    /// Permission set applied to the run.
    pub permission_set: PermissionSet,
}

/// Outcome of an inline code run.
#[derive(Debug, Clone)]
pub struct CodeRunOutcome {
    /// Whether the run succeeded.
    pub success: bool,
    /// Value returned by the code, when successful.
    pub result: Option<Value>,
    /// Error message, when failed.
    pub error: Option<String>,
    /// Trace timeline entries captured during the run, as JSON.
    pub traces: Vec<Value>,
}

/// Executes capability code inside the sandbox.
#[async_trait]
pub trait CapabilityRunner: Send + Sync {
    /// Runs the snippet and returns its outcome.
    ///
    /// User-code faults are reported inside the outcome; only host-side
    /// faults surface as errors.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the sandbox itself fails.
    async fn run_code(&self, request: CodeRunRequest) -> Result<CodeRunOutcome, GatewayError>;
}

// ============================================================================
// SECTION: Embeddings and Vector Index
// ============================================================================

/// Errors returned by embedding providers and vector indexes.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum VectorError {
    /// The embedding model failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// The index query failed.
    #[error("vector index failure: {0}")]
    Index(String),
}

/// Produces dense embeddings for natural-language text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text into a dense vector.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError`] when the model fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError>;
}

/// Semantic hit returned by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    /// Matching node.
    pub node_id: NodeId,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f64,
}

/// Nearest-neighbor index over node embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns the top-k nodes by cosine similarity.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError`] when the query fails.
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SemanticHit>, VectorError>;

    /// Inserts or replaces a node embedding.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError`] when the write fails.
    async fn upsert(&self, node_id: NodeId, embedding: Vec<f32>) -> Result<(), VectorError>;

    /// Returns true when the node has a stored embedding.
    async fn contains(&self, node_id: &NodeId) -> bool;
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Default latency buckets in milliseconds for gateway request histograms.
pub const REQUEST_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

/// Gateway request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RequestOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

impl RequestOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Gateway request metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone)]
pub struct RequestMetricEvent {
    /// Surface handling the request (`http`, `stdio`, `sse`).
    pub surface: &'static str,
    /// Operation label (route pattern or JSON-RPC method).
    pub operation: String,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

/// Metrics sink for gateway requests and latencies.
pub trait GatewayMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: RequestMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: RequestMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _event: RequestMetricEvent) {}

    fn record_latency(&self, _event: RequestMetricEvent, _latency: Duration) {}
}
