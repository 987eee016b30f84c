// crates/pml-gateway-core/src/bus/tests.rs
// ============================================================================
// Module: Event Bus Tests
// Description: Unit tests for subscription, delivery, and fault isolation.
// Purpose: Validate FIFO delivery, wildcard fan-out, and close/reset rules.
// Dependencies: pml-gateway-core, tokio
// ============================================================================

//! ## Overview
//! Validates the bus contract: exact and wildcard handlers both receive each
//! event, handler faults never reach other handlers or the emitter, delivery
//! preserves emit order, and close/reset behave as documented.

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

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::json;

use super::EventBus;
use super::SubscriptionId;
use crate::error::GatewayError;
use crate::types::event::GatewayEvent;
use crate::types::time::Timestamp;

fn event(event_type: &str) -> GatewayEvent {
    GatewayEvent::new(event_type, "tests", json!({}))
}

/// Shared recorder collecting delivered event types in order.
fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&EventBus, &str) -> SubscriptionId) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_for_closure = Arc::clone(&seen);
    let subscribe = move |bus: &EventBus, event_type: &str| {
        let seen = Arc::clone(&seen_for_closure);
        bus.on_async(event_type, move |event: GatewayEvent| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().expect("recorder lock").push(event.event_type);
                Ok(())
            }
        })
    };
    (seen, subscribe)
}

// ============================================================================
// SECTION: Delivery Tests
// ============================================================================

#[tokio::test]
async fn exact_and_wildcard_handlers_both_receive() {
    let bus = EventBus::new();
    let (seen, subscribe) = recorder();
    subscribe(&bus, "tool.start");
    subscribe(&bus, "*");
    bus.emit(event("tool.start"));
    bus.flush().await;
    assert_eq!(seen.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn delivery_preserves_emit_order() {
    let bus = EventBus::new();
    let (seen, subscribe) = recorder();
    subscribe(&bus, "*");
    for i in 0..10 {
        bus.emit(event(&format!("step.{i}")));
    }
    bus.flush().await;
    let seen = seen.lock().expect("lock");
    let expected: Vec<String> = (0..10).map(|i| format!("step.{i}")).collect();
    assert_eq!(*seen, expected);
}

#[tokio::test]
async fn emit_fills_missing_timestamp_and_preserves_explicit() {
    let bus = EventBus::new();
    let stamped: Arc<Mutex<Vec<Timestamp>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamped);
    bus.on_async("*", move |event: GatewayEvent| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().expect("lock").push(event.timestamp);
            Ok(())
        }
    });
    bus.emit(event("a"));
    bus.emit(GatewayEvent::at("b", "tests", Timestamp::from_unix_millis(7), json!({})));
    bus.flush().await;
    let stamped = stamped.lock().expect("lock");
    assert!(stamped[0] > Timestamp::from_unix_millis(0));
    assert_eq!(stamped[1], Timestamp::from_unix_millis(7));
}

// ============================================================================
// SECTION: Fault Isolation Tests
// ============================================================================

#[tokio::test]
async fn failing_handler_does_not_block_others() {
    let bus = EventBus::new();
    bus.on_async("boom", |_event| async {
        Err(GatewayError::Internal("handler fault".to_string()))
    });
    bus.on_async("boom", |_event| async {
        let faulty = true;
        assert!(!faulty, "handler panic");
        Ok(())
    });
    let (seen, subscribe) = recorder();
    subscribe(&bus, "boom");
    bus.emit(event("boom"));
    bus.flush().await;
    assert_eq!(seen.lock().expect("lock").len(), 1);
}

// ============================================================================
// SECTION: Subscription Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn once_handler_fires_exactly_once() {
    let bus = EventBus::new();
    let seen: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&seen);
    bus.once(
        "tick",
        Arc::new(move |_event| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                *sink.lock().expect("lock") += 1;
                Ok(())
            })
        }),
    );
    bus.emit(event("tick"));
    bus.emit(event("tick"));
    bus.flush().await;
    assert_eq!(*seen.lock().expect("lock"), 1);
    assert_eq!(bus.handler_count("tick"), 0);
}

#[tokio::test]
async fn off_removes_subscription() {
    let bus = EventBus::new();
    let (seen, subscribe) = recorder();
    let id = subscribe(&bus, "tick");
    assert!(bus.off(id));
    assert!(!bus.off(id));
    bus.emit(event("tick"));
    bus.flush().await;
    assert!(seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn introspection_reports_registrations() {
    let bus = EventBus::new();
    let (_seen, subscribe) = recorder();
    subscribe(&bus, "a.b");
    subscribe(&bus, "a.b");
    subscribe(&bus, "*");
    assert!(bus.has_handlers("a.b"));
    assert!(bus.has_handlers("anything.else"));
    assert_eq!(bus.handler_count("a.b"), 2);
    assert_eq!(bus.registered_types(), vec!["*".to_string(), "a.b".to_string()]);
}

// ============================================================================
// SECTION: Close and Reset Tests
// ============================================================================

#[tokio::test]
async fn close_makes_emit_a_noop_and_subscriptions_refused() {
    let bus = EventBus::new();
    let (seen, subscribe) = recorder();
    subscribe(&bus, "*");
    bus.close();
    bus.emit(event("late"));
    bus.flush().await;
    assert!(seen.lock().expect("lock").is_empty());
    assert_eq!(bus.emit_count(), 0);
    let id = subscribe(&bus, "late");
    assert_eq!(id, SubscriptionId::NOOP);
}

#[tokio::test]
async fn reset_reopens_and_zeros_counters() {
    let bus = EventBus::new();
    let (_seen, subscribe) = recorder();
    subscribe(&bus, "*");
    bus.emit(event("a"));
    bus.flush().await;
    assert_eq!(bus.emit_count(), 1);
    bus.close();
    bus.reset();
    assert_eq!(bus.emit_count(), 0);
    let (seen, subscribe) = recorder();
    subscribe(&bus, "*");
    bus.emit(event("after-reset"));
    bus.flush().await;
    assert_eq!(bus.emit_count(), 1);
    assert_eq!(seen.lock().expect("lock").len(), 1);
}
