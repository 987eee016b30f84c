// crates/pml-gateway-core/src/pool/tests.rs
// ============================================================================
// Module: Connection Pool Tests
// Description: Unit tests for lazy creation, expiry, and close semantics.
// Purpose: Validate bounded size, idle expiry, and factory failure handling.
// Dependencies: pml-gateway-core, tokio
// ============================================================================

//! ## Overview
//! Validates the pool contract: lazy single creation per server, the
//! exhaustion error at capacity, idle-timer resets on acquire and release,
//! and fault-tolerant close.

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
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::ConnectionPool;
use super::PoolConfig;
use crate::error::GatewayError;
use crate::interfaces::ToolClient;
use crate::interfaces::ToolError;
use crate::types::identifiers::ServerId;

/// Test client counting disconnects.
struct FakeClient {
    disconnects: Arc<AtomicU32>,
}

#[async_trait]
impl ToolClient for FakeClient {
    async fn call_tool(&self, _tool_name: &str, _args: Value) -> Result<Value, ToolError> {
        Ok(Value::Null)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn server(name: &str) -> ServerId {
    ServerId::new(name).expect("server id")
}

fn config(max: usize, idle_ms: u64) -> PoolConfig {
    PoolConfig {
        max_connections: max,
        idle_timeout: Duration::from_millis(idle_ms),
    }
}

fn client(disconnects: &Arc<AtomicU32>) -> Arc<dyn ToolClient> {
    Arc::new(FakeClient {
        disconnects: Arc::clone(disconnects),
    })
}

// ============================================================================
// SECTION: Acquire Tests
// ============================================================================

#[tokio::test]
async fn acquire_creates_once_and_reuses() {
    let pool = ConnectionPool::new(config(4, 60_000));
    let disconnects = Arc::new(AtomicU32::new(0));
    let created = Arc::new(AtomicU32::new(0));
    for _ in 0..3 {
        let created = Arc::clone(&created);
        let disconnects = Arc::clone(&disconnects);
        pool.acquire(&server("fs"), move || async move {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(client(&disconnects))
        })
        .await
        .expect("acquire");
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.size().await, 1);
}

#[tokio::test]
async fn acquire_fails_when_pool_is_full() {
    let pool = ConnectionPool::new(config(1, 60_000));
    let disconnects = Arc::new(AtomicU32::new(0));
    let d1 = Arc::clone(&disconnects);
    pool.acquire(&server("a"), move || async move { Ok(client(&d1)) })
        .await
        .expect("first acquire");
    let d2 = Arc::clone(&disconnects);
    let err = pool
        .acquire(&server("b"), move || async move { Ok(client(&d2)) })
        .await
        .expect_err("pool full");
    assert!(matches!(err, GatewayError::PoolExhausted { max: 1 }));
}

#[tokio::test]
async fn factory_failure_leaves_pool_unchanged() {
    let pool = ConnectionPool::new(config(2, 60_000));
    let err = pool
        .acquire(&server("a"), || async {
            Err(GatewayError::Internal("connect refused".to_string()))
        })
        .await
        .expect_err("factory failure");
    assert!(matches!(err, GatewayError::Internal(_)));
    assert_eq!(pool.size().await, 0);
}

// ============================================================================
// SECTION: Idle Expiry Tests
// ============================================================================

#[tokio::test]
async fn idle_entry_is_disconnected_and_removed() {
    let pool = ConnectionPool::new(config(2, 30));
    let disconnects = Arc::new(AtomicU32::new(0));
    let d = Arc::clone(&disconnects);
    pool.acquire(&server("a"), move || async move { Ok(client(&d)) })
        .await
        .expect("acquire");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pool.size().await, 0);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn release_resets_the_idle_timer() {
    let pool = ConnectionPool::new(config(2, 80));
    let disconnects = Arc::new(AtomicU32::new(0));
    let d = Arc::clone(&disconnects);
    pool.acquire(&server("a"), move || async move { Ok(client(&d)) })
        .await
        .expect("acquire");
    // Keep releasing before the timeout elapses; the entry must survive.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(40)).await;
        pool.release(&server("a")).await;
    }
    assert_eq!(pool.size().await, 1);
    tokio::time::sleep(Duration::from_millis(160)).await;
    assert_eq!(pool.size().await, 0);
}

// ============================================================================
// SECTION: Close Tests
// ============================================================================

#[tokio::test]
async fn close_disconnects_all_and_refuses_acquires() {
    let pool = ConnectionPool::new(config(4, 60_000));
    let disconnects = Arc::new(AtomicU32::new(0));
    for name in ["a", "b", "c"] {
        let d = Arc::clone(&disconnects);
        pool.acquire(&server(name), move || async move { Ok(client(&d)) })
            .await
            .expect("acquire");
    }
    pool.close().await;
    assert_eq!(disconnects.load(Ordering::SeqCst), 3);
    assert_eq!(pool.size().await, 0);
    let d = Arc::clone(&disconnects);
    let err = pool
        .acquire(&server("late"), move || async move { Ok(client(&d)) })
        .await
        .expect_err("closed pool");
    assert!(matches!(err, GatewayError::Unavailable(_)));
}
