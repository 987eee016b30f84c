// crates/pml-gateway-core/src/types/node.rs
// ============================================================================
// Module: Graph Node Model
// Description: Typed nodes of the tool/capability knowledge graph.
// Purpose: Represent tools, capabilities, and learned operations uniformly.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Graph nodes are created on first ingest from the tool-schema store, from
//! capability creation, or from observation of a pure operation in an
//! execution trace. Nodes are never deleted while referenced by an edge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::types::identifiers::NodeId;
use crate::types::identifiers::ServerId;

// ============================================================================
// SECTION: Node Kinds
// ============================================================================

/// Kind of a knowledge-graph node.
///
/// # Invariants
/// - Variants are stable for persistence and telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Tool exposed by a backing MCP server.
    Tool,
    /// Learned capability addressed by FQDN.
    Capability,
    /// Pure code operation learned from execution traces.
    Operation,
}

impl NodeKind {
    /// Returns a stable label for persistence and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Capability => "capability",
            Self::Operation => "operation",
        }
    }
}

/// Category of a learned pure operation.
///
/// # Invariants
/// - Variants are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Array transforms (map, filter, reduce).
    Array,
    /// String transforms.
    String,
    /// Object shaping and key manipulation.
    Object,
    /// Arithmetic operations.
    Math,
    /// JSON encode/decode operations.
    Json,
    /// Binary and byte-level operations.
    Binary,
    /// Boolean logic operations.
    Logical,
    /// Bitwise operations.
    Bitwise,
}

impl OperationCategory {
    /// Returns a stable label for persistence and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::String => "string",
            Self::Object => "object",
            Self::Math => "math",
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Logical => "logical",
            Self::Bitwise => "bitwise",
        }
    }
}

// ============================================================================
// SECTION: Graph Node
// ============================================================================

/// A node of the knowledge graph.
///
/// # Invariants
/// - `id` matches `kind` (tool ids for tools, `cap-` ids for capabilities,
///   `code:` ids for operations).
/// - `success_rate` stays within `[0, 1]`.
/// - `category` and `pure` are populated only for operation nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node identifier.
    pub id: NodeId,
    /// Node kind.
    pub kind: NodeKind,
    /// Display name (tool name, `namespace:action`, or operation name).
    pub name: String,
    /// Owning server for tool nodes.
    pub server_id: Option<ServerId>,
    /// Observed success rate in `[0, 1]`, when known.
    pub success_rate: Option<f64>,
    /// Operation category for operation nodes.
    pub category: Option<OperationCategory>,
    /// Whether the operation is pure (operation nodes only).
    pub pure: Option<bool>,
}

impl GraphNode {
    /// Creates a tool node.
    #[must_use]
    pub fn tool(server: &ServerId, tool_name: &str) -> Self {
        Self {
            id: NodeId::tool(server, tool_name),
            kind: NodeKind::Tool,
            name: tool_name.to_string(),
            server_id: Some(server.clone()),
            success_rate: None,
            category: None,
            pure: None,
        }
    }

    /// Creates a capability node.
    #[must_use]
    pub fn capability(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: NodeKind::Capability,
            name: name.into(),
            server_id: None,
            success_rate: None,
            category: None,
            pure: None,
        }
    }

    /// Creates a learned pure-operation node.
    #[must_use]
    pub fn operation(op: &str, category: OperationCategory) -> Self {
        Self {
            id: NodeId::operation(op),
            kind: NodeKind::Operation,
            name: op.to_string(),
            server_id: None,
            success_rate: None,
            category: Some(category),
            pure: Some(true),
        }
    }

    /// Sets the observed success rate, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = Some(rate.clamp(0.0, 1.0));
        self
    }
}
