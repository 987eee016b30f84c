// crates/pml-gateway-core/src/types/identifiers.rs
// ============================================================================
// Module: Gateway Identifiers
// Description: Canonical opaque identifiers for graph nodes, capabilities,
//              traces, and workflows.
// Purpose: Provide strongly typed, serializable identifiers with stable wire
//          forms.
// Dependencies: serde, thiserror, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout the gateway.
//! Node identifiers carry structure (`serverId:toolName` for tools,
//! `cap-<uuid>` for capabilities, `code:<op>` for learned operations) and
//! validate it at construction boundaries. All other identifiers are opaque
//! strings or UUIDs with transparent serde forms.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Errors
// ============================================================================

/// Errors raised when an identifier fails structural validation.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier was empty or whitespace-only.
    #[error("identifier must not be empty")]
    Empty,
    /// Node identifier did not match any of the three canonical forms.
    #[error("malformed node identifier: {0}")]
    MalformedNodeId(String),
    /// Capability identifier was not a `cap-<uuid>` value.
    #[error("malformed capability identifier: {0}")]
    MalformedCapabilityId(String),
}

// ============================================================================
// SECTION: Server Identifier
// ============================================================================

/// Identifier of a backing tool server.
///
/// # Invariants
/// - Non-empty; never contains a `:` separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server identifier from a raw string.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty or contains `:`.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdentifierError::Empty);
        }
        if id.contains(':') {
            return Err(IdentifierError::MalformedNodeId(id));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Node Identifier
// ============================================================================

/// Identifier of a knowledge-graph node.
///
/// # Invariants
/// - Exactly one of the three canonical forms: `serverId:toolName` (tool),
///   `cap-<uuid>` (capability), or `code:<op>` (learned pure operation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Parses a node identifier, accepting any of the canonical forms.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value matches no canonical form.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentifierError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(IdentifierError::Empty);
        }
        if let Some(suffix) = raw.strip_prefix("cap-") {
            return if Uuid::parse_str(suffix).is_ok() {
                Ok(Self(raw))
            } else {
                Err(IdentifierError::MalformedNodeId(raw))
            };
        }
        if let Some(op) = raw.strip_prefix("code:") {
            return if op.is_empty() {
                Err(IdentifierError::MalformedNodeId(raw))
            } else {
                Ok(Self(raw))
            };
        }
        match raw.split_once(':') {
            Some((server, tool)) if !server.is_empty() && !tool.is_empty() => Ok(Self(raw)),
            _ => Err(IdentifierError::MalformedNodeId(raw)),
        }
    }

    /// Builds a tool node identifier from its server and tool name.
    #[must_use]
    pub fn tool(server: &ServerId, tool_name: &str) -> Self {
        Self(format!("{}:{tool_name}", server.as_str()))
    }

    /// Builds a capability node identifier from a capability identifier.
    #[must_use]
    pub fn capability(capability: &CapabilityId) -> Self {
        Self(capability.to_string())
    }

    /// Builds an operation node identifier from a pure operation name.
    #[must_use]
    pub fn operation(op: &str) -> Self {
        Self(format!("code:{op}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when this identifier names a capability node.
    #[must_use]
    pub fn is_capability(&self) -> bool {
        self.0.starts_with("cap-")
    }

    /// Returns true when this identifier names a learned operation node.
    #[must_use]
    pub fn is_operation(&self) -> bool {
        self.0.starts_with("code:")
    }

    /// Splits a tool node identifier into server and tool name.
    #[must_use]
    pub fn as_tool(&self) -> Option<(&str, &str)> {
        if self.is_capability() || self.is_operation() {
            return None;
        }
        self.0.split_once(':')
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Capability Identifier
// ============================================================================

/// UUID-backed capability identifier with the `cap-` wire prefix.
///
/// # Invariants
/// - Serializes as `cap-<uuid>`; the UUID component is canonical lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(Uuid);

impl CapabilityId {
    /// Generates a fresh capability identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a capability identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a `cap-<uuid>` wire value.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the prefix or UUID is malformed.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let suffix = raw
            .strip_prefix("cap-")
            .ok_or_else(|| IdentifierError::MalformedCapabilityId(raw.to_string()))?;
        Uuid::parse_str(suffix)
            .map(Self)
            .map_err(|_| IdentifierError::MalformedCapabilityId(raw.to_string()))
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap-{}", self.0)
    }
}

impl Serialize for CapabilityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CapabilityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Trace and Workflow Identifiers
// ============================================================================

/// Identifier of an execution trace.
///
/// # Invariants
/// - Canonical lowercase UUID wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generates a fresh trace identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a trace identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a UUID wire value.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| IdentifierError::MalformedNodeId(raw.to_string()))
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a running or checkpointed workflow.
///
/// # Invariants
/// - Opaque UTF-8 string; uniqueness is a caller responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Creates a workflow identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh UUID-backed workflow identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a task within a workflow DAG.
///
/// # Invariants
/// - Opaque UTF-8 string; unique within one DAG (enforced by DAG validation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `task_<id>` key used for prior-result lookups.
    #[must_use]
    pub fn result_key(&self) -> String {
        format!("task_{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests;
