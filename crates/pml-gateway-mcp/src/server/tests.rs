// crates/pml-gateway-mcp/src/server/tests.rs
// ============================================================================
// Module: Gateway Server Tests
// Description: Unit tests for wiring, embeddings, and port handling.
// Purpose: Validate leaves-first build, the local embedding default, and
//          the port-in-use error.
// Dependencies: pml-gateway-mcp, tempfile, tokio
// ============================================================================

//! ## Overview
//! Validates that a default config wires completely (emitting the startup
//! event), that the hashed embedding provider is deterministic and
//! normalized, and that binding a taken port reports the dedicated error.

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

use super::GatewayServer;
use super::HashedEmbeddings;
use super::ServeError;
use crate::config::GatewayConfig;
use pml_gateway_core::interfaces::EmbeddingProvider;

// ============================================================================
// SECTION: Wiring Tests
// ============================================================================

#[tokio::test]
async fn default_config_wires_completely() {
    let server = GatewayServer::build(GatewayConfig::default()).await.expect("build");
    // One `graph.synced` from the initial sync plus `system.startup`.
    assert_eq!(server.bus.emit_count(), 2);
    assert!(server.sync_controller.is_running());
    assert_eq!(server.graph.node_count(), 0);
    server.shutdown().await;
    assert!(server.pool.is_closed());
    assert!(!server.sync_controller.is_running());
}

#[tokio::test]
async fn store_path_persists_across_builds() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let mut config = GatewayConfig::default();
    config.store_path = Some(dir.path().join("gateway.db"));
    let first = GatewayServer::build(config.clone()).await.expect("first build");
    first.shutdown().await;
    let second = GatewayServer::build(config).await.expect("second build");
    second.shutdown().await;
}

// ============================================================================
// SECTION: Embedding Tests
// ============================================================================

#[tokio::test]
async fn hashed_embeddings_are_deterministic_and_normalized() {
    let provider = HashedEmbeddings::new(64);
    let first = provider.embed("summarize the report").await.expect("embed");
    let second = provider.embed("summarize the report").await.expect("embed");
    assert_eq!(first, second);
    let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
    let other = provider.embed("delete every file").await.expect("embed");
    assert_ne!(first, other);
}

// ============================================================================
// SECTION: Port Tests
// ============================================================================

#[tokio::test]
async fn taken_port_reports_port_in_use() {
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = blocker.local_addr().expect("addr").port();
    let mut config = GatewayConfig::default();
    config.server.port = port;
    let server = GatewayServer::build(config).await.expect("build");
    let err = server.serve_http().await.expect_err("port taken");
    assert!(matches!(err, ServeError::PortInUse(taken) if taken == port));
    server.shutdown().await;
}
