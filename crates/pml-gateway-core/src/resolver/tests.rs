// crates/pml-gateway-core/src/resolver/tests.rs
// ============================================================================
// Module: Argument Resolver Tests
// Description: Unit tests for argument resolution, merge, and summaries.
// Purpose: Validate totality, silent omission, and explicit override rules.
// Dependencies: pml-gateway-core, serde_json
// ============================================================================

//! ## Overview
//! Validates the three argument kinds, reference-path resolution with array
//! indexing and the transparent `output` wrapper, silent omission of failed
//! references, merge precedence, and required-argument validation.

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
use serde_json::Value;
use serde_json::json;

use super::merge_arguments;
use super::resolve_arguments;
use super::resolve_reference;
use super::resolve_with_summary;
use super::validate_required_arguments;

fn schema(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("schema fixture must be an object, got {other}"),
    }
}

// ============================================================================
// SECTION: Reference Resolution Tests
// ============================================================================

#[test]
fn reference_resolves_nested_fields_through_output() {
    let prior = json!({
        "task_n1": {"output": {"content": "Hello World", "metadata": {"status": "ok"}}}
    });
    let resolved = resolve_arguments(
        &schema(json!({
            "content": {"type": "reference", "expression": "n1.content"},
            "status": {"type": "reference", "expression": "n1.metadata.status"}
        })),
        &json!({}),
        &prior,
    );
    assert_eq!(resolved.get("content"), Some(&json!("Hello World")));
    assert_eq!(resolved.get("status"), Some(&json!("ok")));
}

#[test]
fn reference_resolves_explicit_output_segment() {
    let prior = json!({"task_n1": {"output": {"content": "x"}}});
    assert_eq!(resolve_reference("n1.output.content", &prior), Some(json!("x")));
}

#[test]
fn reference_resolves_array_indexing() {
    let prior = json!({"task_n1": {"output": {"items": [10, 20, 30]}}});
    assert_eq!(resolve_reference("n1.items[1]", &prior), Some(json!(20)));
    assert_eq!(resolve_reference("n1.items[9]", &prior), None);
}

#[test]
fn malformed_expressions_fail_to_resolve() {
    let prior = json!({"task_n1": {"output": {"a": 1}}});
    assert_eq!(resolve_reference("", &prior), None);
    assert_eq!(resolve_reference("n1..a", &prior), None);
    assert_eq!(resolve_reference("n1.items[x]", &prior), None);
    assert_eq!(resolve_reference("unknown.a", &prior), None);
}

// ============================================================================
// SECTION: Resolution Totality Tests
// ============================================================================

#[test]
fn failed_references_are_silently_omitted() {
    let prior = json!({"task_n1": {"output": {"value": 42}}});
    let (resolved, summary) = resolve_with_summary(
        &schema(json!({
            "good": {"type": "reference", "expression": "n1.value"},
            "bad": {"type": "reference", "expression": "n1.missing.deep"},
            "fixed": {"type": "literal", "value": 7}
        })),
        &json!({}),
        &prior,
    );
    assert_eq!(resolved.get("good"), Some(&json!(42)));
    assert!(!resolved.contains_key("bad"));
    assert_eq!(resolved.get("fixed"), Some(&json!(7)));
    assert_eq!(summary.total, 3);
    assert_eq!(summary.references, 2);
    assert_eq!(summary.literals, 1);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.failed, 1);
}

#[test]
fn parameters_read_from_context() {
    let context = json!({"parameters": {"limit": 5}});
    let (resolved, summary) = resolve_with_summary(
        &schema(json!({
            "limit": {"type": "parameter", "parameterName": "limit"},
            "missing": {"type": "parameter", "parameterName": "absent"}
        })),
        &context,
        &json!({}),
    );
    assert_eq!(resolved.get("limit"), Some(&json!(5)));
    assert!(!resolved.contains_key("missing"));
    assert_eq!(summary.parameters, 2);
    assert_eq!(summary.failed, 1);
}

#[test]
fn untagged_values_pass_through_as_literals() {
    let resolved = resolve_arguments(
        &schema(json!({"path": "/tmp/x", "depth": 3, "flags": {"recursive": true}})),
        &json!({}),
        &json!({}),
    );
    assert_eq!(resolved.get("path"), Some(&json!("/tmp/x")));
    assert_eq!(resolved.get("depth"), Some(&json!(3)));
    assert_eq!(resolved.get("flags"), Some(&json!({"recursive": true})));
}

// ============================================================================
// SECTION: Merge and Validation Tests
// ============================================================================

#[test]
fn explicit_arguments_override_resolved() {
    let resolved = schema(json!({"a": 1, "b": 2}));
    let explicit = schema(json!({"b": 20, "c": 30}));
    let merged = merge_arguments(resolved, &explicit);
    assert_eq!(merged.get("a"), Some(&json!(1)));
    assert_eq!(merged.get("b"), Some(&json!(20)));
    assert_eq!(merged.get("c"), Some(&json!(30)));
}

#[test]
fn missing_required_arguments_are_reported() {
    let resolved = schema(json!({"a": 1}));
    let required = vec!["a".to_string(), "b".to_string()];
    assert_eq!(validate_required_arguments(&resolved, &required), vec!["b".to_string()]);
}
