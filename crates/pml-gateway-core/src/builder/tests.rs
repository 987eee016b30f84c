// crates/pml-gateway-core/src/builder/tests.rs
// ============================================================================
// Module: Structure Builder Tests
// Description: Unit tests for structure validity and DAG conversion.
// Purpose: Validate prefixing, edge-to-dependency mapping, and decisions.
// Dependencies: pml-gateway-core, serde_json
// ============================================================================

//! ## Overview
//! Validates structure validity checks, prefix application, dependency
//! wiring from edges, cycle rejection during conversion, and decision
//! materialization under its flag.

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

use serde_json::Map;

use super::BuildOptions;
use super::CodeStructure;
use super::StructureDecision;
use super::StructureEdge;
use super::StructureNode;
use super::dag_from_structure;
use super::is_valid_for_dag_conversion;
use crate::types::identifiers::TaskId;
use crate::types::workflow::TaskKind;
use crate::types::workflow::WorkflowError;

fn node(id: &str, tool: &str) -> StructureNode {
    StructureNode {
        id: id.to_string(),
        tool: tool.to_string(),
        args: Map::new(),
        kind: TaskKind::McpTool,
        code: None,
        capability_id: None,
        pure: false,
    }
}

fn edge(from: &str, to: &str) -> StructureEdge {
    StructureEdge {
        from: from.to_string(),
        to: to.to_string(),
    }
}

// ============================================================================
// SECTION: Validity Tests
// ============================================================================

#[test]
fn empty_structure_is_not_convertible() {
    assert!(!is_valid_for_dag_conversion(&CodeStructure::default()));
}

#[test]
fn duplicate_node_ids_invalidate_structure() {
    let structure = CodeStructure {
        nodes: vec![node("a", "fs:read"), node("a", "fs:write")],
        ..CodeStructure::default()
    };
    assert!(!is_valid_for_dag_conversion(&structure));
}

#[test]
fn edges_to_unknown_nodes_invalidate_structure() {
    let structure = CodeStructure {
        nodes: vec![node("a", "fs:read")],
        edges: vec![edge("a", "ghost")],
        ..CodeStructure::default()
    };
    assert!(!is_valid_for_dag_conversion(&structure));
}

#[test]
fn code_node_without_snippet_invalidates_structure() {
    let mut bad = node("a", "code:transform");
    bad.kind = TaskKind::CodeExecution;
    let structure = CodeStructure {
        nodes: vec![bad],
        ..CodeStructure::default()
    };
    assert!(!is_valid_for_dag_conversion(&structure));
}

// ============================================================================
// SECTION: Conversion Tests
// ============================================================================

#[test]
fn conversion_prefixes_ids_and_wires_dependencies() {
    let structure = CodeStructure {
        nodes: vec![node("read", "fs:read"), node("write", "fs:write")],
        edges: vec![edge("read", "write")],
        ..CodeStructure::default()
    };
    let dag = dag_from_structure(&structure, &BuildOptions::default()).expect("convertible");
    let write = dag.task(&TaskId::new("node_write")).expect("prefixed task");
    assert_eq!(write.depends_on, vec![TaskId::new("node_read")]);
}

#[test]
fn cyclic_structure_fails_conversion() {
    let structure = CodeStructure {
        nodes: vec![node("a", "fs:read"), node("b", "fs:write")],
        edges: vec![edge("a", "b"), edge("b", "a")],
        ..CodeStructure::default()
    };
    let err = dag_from_structure(&structure, &BuildOptions::default()).expect_err("cycle");
    assert!(matches!(err, WorkflowError::Cycle(_)));
}

#[test]
fn decisions_materialize_only_under_flag() {
    let structure = CodeStructure {
        nodes: vec![node("a", "fs:read")],
        edges: Vec::new(),
        decisions: vec![StructureDecision {
            id: "d1".to_string(),
            condition: "result.ok".to_string(),
            after: "a".to_string(),
        }],
    };
    let without = dag_from_structure(&structure, &BuildOptions::default()).expect("valid");
    assert_eq!(without.tasks().len(), 1);
    let with = dag_from_structure(
        &structure,
        &BuildOptions {
            materialize_decisions: true,
            ..BuildOptions::default()
        },
    )
    .expect("valid");
    assert_eq!(with.tasks().len(), 2);
    let decision = with.task(&TaskId::new("decision_d1")).expect("decision task");
    assert!(decision.metadata.pure);
    assert_eq!(decision.depends_on, vec![TaskId::new("node_a")]);
}
