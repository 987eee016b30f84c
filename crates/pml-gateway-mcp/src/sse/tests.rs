// crates/pml-gateway-mcp/src/sse/tests.rs
// ============================================================================
// Module: Events Stream Manager Tests
// Description: Unit tests for the bounded SSE fan-out.
// Purpose: Validate the client cap, filters, heartbeat, and drop policy.
// Dependencies: pml-gateway-core, pml-gateway-mcp, tokio
// ============================================================================

//! ## Overview
//! Validates the client cap (third client refused at max two), filter
//! matching, heartbeat payloads, drop-on-full backpressure, and pruning of
//! aborted clients.

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

use std::time::Duration;

use serde_json::json;

use super::EventStreamManager;
use super::SseError;
use crate::config::SseConfig;
use pml_gateway_core::bus::EventBus;
use pml_gateway_core::types::event::GatewayEvent;
use pml_gateway_core::types::event::event_types;

fn config(max_clients: usize, buffer: usize) -> SseConfig {
    SseConfig {
        max_clients,
        heartbeat_secs: 1,
        buffer,
    }
}

fn event(event_type: &str) -> GatewayEvent {
    GatewayEvent::new(event_type, "tests", json!({}))
}

// ============================================================================
// SECTION: Client Cap Tests
// ============================================================================

#[tokio::test]
async fn third_client_is_refused_at_a_cap_of_two() {
    let bus = EventBus::new();
    let manager = EventStreamManager::start(bus, config(2, 8));
    let _first = manager.add_client(Vec::new()).expect("first");
    let _second = manager.add_client(Vec::new()).expect("second");
    let err = manager.add_client(Vec::new()).expect_err("third refused");
    assert!(matches!(err, SseError::TooManyClients { max: 2 }));
    manager.close();
}

#[tokio::test]
async fn dropped_clients_free_capacity() {
    let bus = EventBus::new();
    let manager = EventStreamManager::start(bus, config(1, 8));
    let first = manager.add_client(Vec::new()).expect("first");
    drop(first);
    manager.add_client(Vec::new()).expect("slot reclaimed");
    manager.close();
}

// ============================================================================
// SECTION: Delivery Tests
// ============================================================================

#[tokio::test]
async fn filters_select_event_families() {
    let bus = EventBus::new();
    let manager = EventStreamManager::start(bus.clone(), config(4, 8));
    let mut graph_only =
        manager.add_client(vec!["graph.*".to_string()]).expect("graph client");
    let mut everything = manager.add_client(Vec::new()).expect("wildcard client");
    bus.emit(event(event_types::GRAPH_EDGE_CREATED));
    bus.emit(event(event_types::CAPABILITY_LEARNED));
    bus.flush().await;
    let received = graph_only.recv().await.expect("graph event");
    assert_eq!(received.event_type, event_types::GRAPH_EDGE_CREATED);
    assert!(graph_only.try_recv().is_err(), "non-matching event must not arrive");
    assert_eq!(everything.recv().await.expect("first").event_type, event_types::GRAPH_EDGE_CREATED);
    assert_eq!(
        everything.recv().await.expect("second").event_type,
        event_types::CAPABILITY_LEARNED
    );
    manager.close();
}

#[tokio::test]
async fn full_buffers_drop_events_without_blocking() {
    let bus = EventBus::new();
    let manager = EventStreamManager::start(bus.clone(), config(1, 2));
    let mut slow = manager.add_client(Vec::new()).expect("client");
    for i in 0..10 {
        bus.emit(event(&format!("flood.{i}")));
    }
    bus.flush().await;
    // Only the buffer capacity survives; the rest were dropped.
    let mut received = 0;
    while slow.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 2);
    manager.close();
}

// ============================================================================
// SECTION: Heartbeat Tests
// ============================================================================

#[tokio::test]
async fn heartbeat_carries_connection_stats() {
    let bus = EventBus::new();
    let manager = EventStreamManager::start(bus, config(2, 8));
    let mut client = manager.add_client(vec!["nothing.matches".to_string()]).expect("client");
    let heartbeat = tokio::time::timeout(Duration::from_secs(3), client.recv())
        .await
        .expect("heartbeat in time")
        .expect("heartbeat event");
    assert_eq!(heartbeat.event_type, event_types::HEARTBEAT);
    assert_eq!(heartbeat.payload["connected_clients"], 1);
    assert!(heartbeat.payload["uptime_seconds"].is_u64());
    manager.close();
}
