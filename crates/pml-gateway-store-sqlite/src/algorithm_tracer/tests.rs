// crates/pml-gateway-store-sqlite/src/algorithm_tracer/tests.rs
// ============================================================================
// Module: Algorithm Tracer Tests
// Description: Unit tests for buffered appends, outcome patching, cleanup.
// Purpose: Validate flush semantics and retention arithmetic.
// Dependencies: pml-gateway-core, pml-gateway-store-sqlite
// ============================================================================

//! ## Overview
//! Validates that appends buffer until flush, outcomes patch persisted rows
//! in place, and cleanup deletes only rows older than the retention window.

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

use serde_json::json;

use super::AlgorithmDecision;
use super::AlgorithmMode;
use super::AlgorithmOutcome;
use super::AlgorithmTrace;
use super::AlgorithmTracer;
use super::TargetType;
use crate::store::SqliteStore;
use crate::store::StoreError;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::time::Timestamp;

fn tracer() -> (AlgorithmTracer, SqliteStore) {
    let store = SqliteStore::open_in_memory().expect("store");
    (AlgorithmTracer::new(store.clone()), store)
}

fn decision_trace(timestamp: i64) -> AlgorithmTrace {
    AlgorithmTrace {
        trace_id: TraceId::generate(),
        timestamp: Timestamp::from_unix_millis(timestamp),
        algorithm_mode: AlgorithmMode::ActiveSearch,
        target_type: TargetType::Capability,
        intent: Some("summarize text".to_string()),
        signals: json!({"graphDensity": 0.4, "spectralClusterMatch": 0.7}),
        params: json!({"alpha": 0.6, "reliabilityFactor": 0.7, "structuralBoost": 1.1}),
        final_score: 0.62,
        threshold_used: 0.5,
        decision: AlgorithmDecision::Accepted,
        outcome: None,
    }
}

fn row_count(store: &SqliteStore) -> i64 {
    store
        .lock()
        .query_row("SELECT COUNT(*) FROM algorithm_traces", [], |row| row.get(0))
        .expect("count")
}

// ============================================================================
// SECTION: Buffering Tests
// ============================================================================

#[test]
fn appends_buffer_until_flush() {
    let (tracer, store) = tracer();
    tracer.append(decision_trace(1_000)).expect("append");
    assert_eq!(row_count(&store), 0);
    tracer.flush().expect("flush");
    assert_eq!(row_count(&store), 1);
}

#[test]
fn get_flushes_and_round_trips_the_trace() {
    let (tracer, _store) = tracer();
    let trace = decision_trace(1_000);
    tracer.append(trace.clone()).expect("append");
    let stored = tracer.get(&trace.trace_id).expect("get");
    assert_eq!(stored, trace);
}

// ============================================================================
// SECTION: Outcome Tests
// ============================================================================

#[test]
fn outcome_is_patched_in_place() {
    let (tracer, store) = tracer();
    let trace = decision_trace(1_000);
    tracer.append(trace.clone()).expect("append");
    let outcome = AlgorithmOutcome {
        user_action: "executed".to_string(),
        execution_success: Some(true),
        duration_ms: Some(420),
    };
    tracer.update_outcome(&trace.trace_id, &outcome).expect("patch");
    let stored = tracer.get(&trace.trace_id).expect("get");
    assert_eq!(stored.outcome, Some(outcome));
    assert_eq!(row_count(&store), 1);
}

#[test]
fn patching_an_unknown_trace_fails() {
    let (tracer, _store) = tracer();
    let outcome = AlgorithmOutcome {
        user_action: "dismissed".to_string(),
        execution_success: None,
        duration_ms: None,
    };
    let err = tracer.update_outcome(&TraceId::generate(), &outcome).expect_err("unknown");
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ============================================================================
// SECTION: Cleanup Tests
// ============================================================================

#[test]
fn cleanup_deletes_only_expired_traces() {
    let (tracer, store) = tracer();
    let now = Timestamp::now().as_unix_millis();
    let old = decision_trace(now - 40 * 24 * 60 * 60 * 1000);
    let fresh = decision_trace(now);
    tracer.append(old).expect("append old");
    tracer.append(fresh.clone()).expect("append fresh");
    let deleted = tracer.cleanup(30).expect("cleanup");
    assert_eq!(deleted, 1);
    assert_eq!(row_count(&store), 1);
    tracer.get(&fresh.trace_id).expect("fresh survives");
}
