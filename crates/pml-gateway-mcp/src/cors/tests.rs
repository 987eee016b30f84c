// crates/pml-gateway-mcp/src/cors/tests.rs
// ============================================================================
// Module: CORS Policy Tests
// Description: Unit tests for the pinned-origin header set.
// Purpose: Validate origin selection and the absence of wildcards.
// Dependencies: pml-gateway-mcp
// ============================================================================

//! ## Overview
//! Validates origin pinning per mode and the fixed method/header lists.

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

use super::allowed_origin;
use super::cors_headers;
use crate::config::GatewayConfig;

// ============================================================================
// SECTION: Origin Tests
// ============================================================================

#[test]
fn local_mode_pins_the_localhost_origin() {
    let config = GatewayConfig::from_toml("[server]\nport = 9000\n").expect("config");
    assert_eq!(allowed_origin(&config), "http://localhost:9000");
}

#[test]
fn cloud_mode_pins_the_https_domain() {
    let config =
        GatewayConfig::from_toml("mode = \"cloud\"\n[server]\ndomain = \"api.example.com\"\n")
            .expect("config");
    assert_eq!(allowed_origin(&config), "https://api.example.com");
}

#[test]
fn header_set_never_contains_a_wildcard() {
    let config = GatewayConfig::from_toml("").expect("config");
    let headers = cors_headers(&config);
    assert_eq!(headers.len(), 3);
    for (name, value) in &headers {
        assert_ne!(value, "*", "{name} must not be a wildcard");
    }
    assert!(headers.iter().any(|(name, value)| {
        name == "Access-Control-Allow-Methods" && value == "GET,POST,DELETE,OPTIONS"
    }));
    assert!(headers.iter().any(|(name, value)| {
        name == "Access-Control-Allow-Headers" && value == "x-api-key,Content-Type"
    }));
}
