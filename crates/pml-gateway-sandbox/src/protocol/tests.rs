// crates/pml-gateway-sandbox/src/protocol/tests.rs
// ============================================================================
// Module: Worker Protocol Tests
// Description: Unit tests for frame wire forms and result sanitization.
// Purpose: Validate tagged frame round-trips and the depth cap.
// Dependencies: pml-gateway-sandbox, serde_json
// ============================================================================

//! ## Overview
//! Validates the snake_case `type` tag on frames, call correlation fields,
//! and sanitization behavior for deep nesting and markers.

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

use serde_json::Value;
use serde_json::json;

use super::MAX_SANITIZE_DEPTH;
use super::WorkerFrame;
use super::non_serializable_marker;
use super::sanitize_result;

// ============================================================================
// SECTION: Frame Tests
// ============================================================================

#[test]
fn tool_call_frame_round_trips() {
    let frame = WorkerFrame::ToolCall {
        call_id: 7,
        server: "fs".to_string(),
        tool: "read".to_string(),
        args: json!({"path": "/tmp/x"}),
    };
    let wire = serde_json::to_value(&frame).expect("serialize");
    assert_eq!(wire["type"], "tool_call");
    assert_eq!(wire["call_id"], 7);
    let back: WorkerFrame = serde_json::from_value(wire).expect("deserialize");
    assert_eq!(back, frame);
}

#[test]
fn result_frames_omit_absent_fields() {
    let frame = WorkerFrame::ToolResult {
        call_id: 1,
        success: true,
        result: Some(json!(42)),
        error: None,
    };
    let wire = serde_json::to_value(&frame).expect("serialize");
    assert!(wire.get("error").is_none());
    assert_eq!(wire["result"], 42);
}

#[test]
fn ready_frame_is_a_bare_tag() {
    let wire = serde_json::to_value(WorkerFrame::Ready).expect("serialize");
    assert_eq!(wire, json!({"type": "ready"}));
}

// ============================================================================
// SECTION: Sanitization Tests
// ============================================================================

#[test]
fn serializable_values_pass_verbatim() {
    let value = json!({"a": [1, 2, {"b": "text"}], "c": null});
    assert_eq!(sanitize_result(&value), value);
}

#[test]
fn depth_overflow_becomes_a_marker() {
    let mut value = json!("leaf");
    for _ in 0..(MAX_SANITIZE_DEPTH + 5) {
        value = json!({ "next": value });
    }
    let sanitized = sanitize_result(&value);
    // Walk to the cap and confirm the marker replaced the deeper content.
    let mut cursor = &sanitized;
    for _ in 0..(MAX_SANITIZE_DEPTH - 1) {
        cursor = cursor.get("next").expect("nested object");
    }
    let marker = cursor.get("next").expect("capped entry");
    assert_eq!(marker.get("__type"), Some(&Value::String("non-serializable".to_string())));
}

#[test]
fn marker_shape_matches_contract() {
    let marker = non_serializable_marker("function", "[Function: fetch]");
    assert_eq!(marker["__type"], "non-serializable");
    assert_eq!(marker["typeof"], "function");
    assert_eq!(marker["toString"], "[Function: fetch]");
}
