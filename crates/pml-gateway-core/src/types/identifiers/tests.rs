// crates/pml-gateway-core/src/types/identifiers/tests.rs
// ============================================================================
// Module: Identifier Tests
// Description: Unit tests for node, capability, and trace identifiers.
// Purpose: Validate canonical wire forms and rejection of malformed input.
// Dependencies: pml-gateway-core
// ============================================================================

//! ## Overview
//! Validates that identifiers accept exactly their canonical forms and fail
//! closed on malformed input.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::CapabilityId;
use super::IdentifierError;
use super::NodeId;
use super::ServerId;
use super::TaskId;
use super::TraceId;

// ============================================================================
// SECTION: Node Identifier Tests
// ============================================================================

#[test]
fn node_id_accepts_tool_form() {
    let id = NodeId::parse("fs:read").expect("tool form");
    assert_eq!(id.as_tool(), Some(("fs", "read")));
    assert!(!id.is_capability());
    assert!(!id.is_operation());
}

#[test]
fn node_id_accepts_capability_form() {
    let cap = CapabilityId::generate();
    let id = NodeId::parse(cap.to_string()).expect("capability form");
    assert!(id.is_capability());
    assert_eq!(id.as_tool(), None);
}

#[test]
fn node_id_accepts_operation_form() {
    let id = NodeId::parse("code:array.map").expect("operation form");
    assert!(id.is_operation());
    assert_eq!(id.as_str(), "code:array.map");
}

#[test]
fn node_id_rejects_empty() {
    let err = NodeId::parse("  ").expect_err("expected empty rejection");
    assert_eq!(err, IdentifierError::Empty);
}

#[test]
fn node_id_rejects_missing_separator() {
    NodeId::parse("justaname").expect_err("expected malformed rejection");
}

#[test]
fn node_id_rejects_cap_prefix_without_uuid() {
    NodeId::parse("cap-notauuid").expect_err("expected malformed capability");
}

#[test]
fn node_id_rejects_bare_code_prefix() {
    NodeId::parse("code:").expect_err("expected malformed operation");
}

#[test]
fn node_id_tool_constructor_round_trips() {
    let server = ServerId::new("fs").expect("server id");
    let id = NodeId::tool(&server, "read");
    assert_eq!(id.as_str(), "fs:read");
    NodeId::parse(id.as_str()).expect("constructed id re-parses");
}

// ============================================================================
// SECTION: Capability Identifier Tests
// ============================================================================

#[test]
fn capability_id_wire_form_round_trips() {
    let id = CapabilityId::generate();
    let wire = id.to_string();
    assert!(wire.starts_with("cap-"));
    let parsed = CapabilityId::parse(&wire).expect("wire form re-parses");
    assert_eq!(parsed, id);
}

#[test]
fn capability_id_serde_round_trips() {
    let id = CapabilityId::generate();
    let json = serde_json::to_string(&id).expect("serialize");
    let back: CapabilityId = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, id);
}

#[test]
fn capability_id_rejects_missing_prefix() {
    let uuid = uuid::Uuid::new_v4().to_string();
    CapabilityId::parse(&uuid).expect_err("expected prefix rejection");
}

// ============================================================================
// SECTION: Server and Task Identifier Tests
// ============================================================================

#[test]
fn server_id_rejects_colon() {
    ServerId::new("a:b").expect_err("expected separator rejection");
}

#[test]
fn task_id_result_key_is_prefixed() {
    let id = TaskId::new("n1");
    assert_eq!(id.result_key(), "task_n1");
}

#[test]
fn trace_id_parses_uuid() {
    let id = TraceId::generate();
    let parsed = TraceId::parse(&id.to_string()).expect("uuid re-parses");
    assert_eq!(parsed, id);
}
