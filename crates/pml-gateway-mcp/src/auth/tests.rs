// crates/pml-gateway-mcp/src/auth/tests.rs
// ============================================================================
// Module: Auth Gate Tests
// Description: Unit tests for the local/cloud authentication split.
// Purpose: Validate bypasses, key pattern checks, and admin mapping.
// Dependencies: pml-gateway-mcp
// ============================================================================

//! ## Overview
//! Validates that local mode bypasses auth, cloud mode fails closed on
//! missing/malformed/unknown keys, public routes and preflights bypass, and
//! admin usernames compare case-insensitively.

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

use std::collections::HashMap;
use std::sync::Arc;

use super::AuthGate;
use super::KeyValidator;
use crate::config::GatewayMode;
use pml_gateway_core::error::GatewayError;

const LIVE_KEY: &str = "ac_ABCDEF0123456789abcdef01";

/// Validator accepting exactly one key.
struct SingleKey;

impl KeyValidator for SingleKey {
    fn validate_key(&self, key: &str) -> Result<Option<String>, GatewayError> {
        Ok((key == LIVE_KEY).then(|| "Alice".to_string()))
    }
}

fn gate(mode: GatewayMode) -> AuthGate {
    AuthGate::new(mode, Arc::new(SingleKey), &["alice".to_string()]).expect("gate")
}

fn headers(key: Option<&str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(key) = key {
        headers.insert("x-api-key".to_string(), key.to_string());
    }
    headers
}

// ============================================================================
// SECTION: Local Mode Tests
// ============================================================================

#[test]
fn local_mode_bypasses_every_route() {
    let gate = gate(GatewayMode::Local);
    let context = gate.authenticate("GET", "/api/metrics", &headers(None)).expect("bypass");
    assert!(context.is_admin);
}

// ============================================================================
// SECTION: Cloud Mode Tests
// ============================================================================

#[test]
fn cloud_mode_accepts_a_live_key_and_maps_admins() {
    let gate = gate(GatewayMode::Cloud);
    let context = gate
        .authenticate("GET", "/api/metrics", &headers(Some(LIVE_KEY)))
        .expect("live key");
    assert_eq!(context.user_id.as_deref(), Some("Alice"));
    // `alice` is configured lowercase; comparison is case-insensitive.
    assert!(context.is_admin);
}

#[test]
fn cloud_mode_rejects_missing_key() {
    let gate = gate(GatewayMode::Cloud);
    let err = gate.authenticate("GET", "/api/metrics", &headers(None)).expect_err("missing");
    assert!(matches!(err, GatewayError::Unauthorized(_)));
}

#[test]
fn cloud_mode_rejects_malformed_key_without_lookup() {
    let gate = gate(GatewayMode::Cloud);
    for bad in ["sk-123", "ac_short", "ac_!!!!!!!!!!!!!!!!!!!!!!!!"] {
        let err =
            gate.authenticate("GET", "/api/metrics", &headers(Some(bad))).expect_err("pattern");
        assert!(matches!(err, GatewayError::Unauthorized(_)), "{bad}");
    }
}

#[test]
fn cloud_mode_rejects_unknown_key() {
    let gate = gate(GatewayMode::Cloud);
    let err = gate
        .authenticate("GET", "/api/metrics", &headers(Some("ac_zzzzzzzzzzzzzzzzzzzzzzzz")))
        .expect_err("unknown");
    assert!(matches!(err, GatewayError::Unauthorized(_)));
}

// ============================================================================
// SECTION: Bypass Tests
// ============================================================================

#[test]
fn health_and_preflights_bypass_cloud_auth() {
    let gate = gate(GatewayMode::Cloud);
    gate.authenticate("GET", "/health", &headers(None)).expect("health bypass");
    gate.authenticate("OPTIONS", "/api/metrics", &headers(None)).expect("preflight bypass");
}
