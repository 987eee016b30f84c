// crates/pml-gateway-store-sqlite/src/trace_store/tests.rs
// ============================================================================
// Module: Trace Store Tests
// Description: Unit tests for sanitized persistence and PER sampling.
// Purpose: Validate redaction on write, ordering, clamps, anonymization,
//          and priority-biased sampling.
// Dependencies: pml-gateway-core, pml-gateway-store-sqlite
// ============================================================================

//! ## Overview
//! Validates that secrets never reach disk, reads return descending
//! execution time, priorities clamp on write, anonymization strips
//! identifying fields, and PER samples are measurably biased toward
//! high-priority traces.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use super::TraceFilter;
use super::TraceStore;
use crate::store::SqliteStore;
use pml_gateway_core::types::identifiers::TaskId;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::time::Timestamp;
use pml_gateway_core::types::trace::ANONYMIZED_USER;
use pml_gateway_core::types::trace::ExecutionTrace;
use pml_gateway_core::types::trace::REDACTED;
use pml_gateway_core::types::trace::TraceTaskResult;

fn trace_store() -> TraceStore {
    TraceStore::new(SqliteStore::open_in_memory().expect("store"))
}

fn trace(executed_at: i64, priority: f64) -> ExecutionTrace {
    ExecutionTrace {
        id: TraceId::generate(),
        capability_id: None,
        intent_text: Some("run the workflow".to_string()),
        initial_context: json!({"query": "x"}),
        executed_at: Timestamp::from_unix_millis(executed_at),
        success: true,
        duration_ms: 10,
        error_message: None,
        executed_path: Vec::new(),
        decisions: Vec::new(),
        task_results: Vec::new(),
        priority,
        parent_trace_id: None,
        user_id: "user-1".to_string(),
        created_by: "executor".to_string(),
    }
}

// ============================================================================
// SECTION: Sanitization Tests
// ============================================================================

#[test]
fn secrets_are_redacted_before_persistence() {
    let store = trace_store();
    let mut dirty = trace(1_000, 0.5);
    dirty.initial_context = json!({"api_key": "sk-live-123", "query": "x"});
    dirty.task_results.push(TraceTaskResult {
        task_id: TaskId::new("t1"),
        tool: "net:post".to_string(),
        args: json!({"authorization": "Bearer abc", "url": "https://x"}),
        result: Some(json!({"nested": {"password": "hunter2"}})),
        success: true,
        duration_ms: 3,
    });
    store.insert(&dirty).expect("insert");
    let stored = store.get(&dirty.id).expect("get");
    assert_eq!(stored.initial_context["api_key"], REDACTED);
    assert_eq!(stored.initial_context["query"], "x");
    assert_eq!(stored.task_results[0].args["authorization"], REDACTED);
    let result = stored.task_results[0].result.as_ref().expect("result");
    assert_eq!(result["nested"]["password"], REDACTED);
}

// ============================================================================
// SECTION: Ordering and Filter Tests
// ============================================================================

#[test]
fn listing_returns_descending_executed_at() {
    let store = trace_store();
    for (at, priority) in [(1_000, 0.1), (3_000, 0.2), (2_000, 0.3)] {
        store.insert(&trace(at, priority)).expect("insert");
    }
    let listed = store.list(&TraceFilter::default()).expect("list");
    let times: Vec<i64> = listed.iter().map(|t| t.executed_at.as_unix_millis()).collect();
    assert_eq!(times, vec![3_000, 2_000, 1_000]);
}

#[test]
fn filters_restrict_by_user() {
    let store = trace_store();
    let mut mine = trace(1_000, 0.5);
    mine.user_id = "alice".to_string();
    let theirs = trace(2_000, 0.5);
    store.insert(&mine).expect("insert");
    store.insert(&theirs).expect("insert");
    let listed = store
        .list(&TraceFilter {
            user_id: Some("alice".to_string()),
            ..TraceFilter::default()
        })
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);
}

// ============================================================================
// SECTION: Priority Tests
// ============================================================================

#[test]
fn priority_updates_clamp_to_unit_interval() {
    let store = trace_store();
    let t = trace(1_000, 0.5);
    store.insert(&t).expect("insert");
    store.update_priority(&t.id, 2.5).expect("update");
    assert_eq!(store.get(&t.id).expect("get").priority, 1.0);
    store.update_priority(&t.id, -3.0).expect("update");
    assert_eq!(store.get(&t.id).expect("get").priority, 0.0);
}

#[test]
fn insert_clamps_out_of_range_priorities() {
    let store = trace_store();
    let t = trace(1_000, 7.0);
    store.insert(&t).expect("insert");
    assert_eq!(store.get(&t.id).expect("get").priority, 1.0);
}

#[test]
fn high_priority_listing_is_descending() {
    let store = trace_store();
    for priority in [0.2, 0.9, 0.5] {
        store.insert(&trace(1_000, priority)).expect("insert");
    }
    let top = store.get_high_priority(2).expect("top");
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].priority, 0.9);
    assert_eq!(top[1].priority, 0.5);
}

#[test]
fn per_sampling_is_biased_toward_high_priority() {
    let store = trace_store();
    let high = trace(1_000, 0.9);
    store.insert(&high).expect("insert");
    for i in 0..9 {
        store.insert(&trace(2_000 + i, 0.01)).expect("insert");
    }
    let mut high_draws = 0u32;
    for _ in 0..200 {
        let sample = store.sample_by_priority(1, 0.0).expect("sample");
        if sample[0].id == high.id {
            high_draws += 1;
        }
    }
    // Uniform sampling would draw the high-priority trace ~20 times; the
    // priority^alpha weighting concentrates most of the mass on it.
    assert!(high_draws > 60, "high-priority draws: {high_draws}");
}

#[test]
fn sampling_respects_the_priority_floor() {
    let store = trace_store();
    store.insert(&trace(1_000, 0.9)).expect("insert");
    store.insert(&trace(2_000, 0.1)).expect("insert");
    let sample = store.sample_by_priority(10, 0.5).expect("sample");
    assert_eq!(sample.len(), 1);
    assert_eq!(sample[0].priority, 0.9);
}

// ============================================================================
// SECTION: Anonymization Tests
// ============================================================================

#[test]
fn anonymize_strips_identifying_fields_in_place() {
    let store = trace_store();
    let t = trace(1_000, 0.5);
    store.insert(&t).expect("insert");
    store.anonymize(&t.id).expect("anonymize");
    let stored = store.get(&t.id).expect("get");
    assert_eq!(stored.user_id, ANONYMIZED_USER);
    assert_eq!(stored.intent_text, None);
    assert_eq!(stored.initial_context, Value::Null);
}
