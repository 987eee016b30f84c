// crates/pml-gateway-mcp/src/dispatcher/tests.rs
// ============================================================================
// Module: Request Dispatcher Tests
// Description: Unit tests for route matching and param extraction.
// Purpose: Validate first-match order, method handling, and path rules.
// Dependencies: pml-gateway-mcp, serde_json, tokio
// ============================================================================

//! ## Overview
//! Validates registration-order precedence, `:param` and regex extraction,
//! the any-method wildcard, trailing-slash significance, query/fragment
//! stripping, and duplicate rejection.

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

use futures::FutureExt;
use serde_json::json;

use super::GatewayResponse;
use super::RequestDispatcher;
use super::RouteHandler;
use pml_gateway_core::error::GatewayError;

/// Handler replying with a fixed marker for identification.
fn marker(name: &'static str) -> RouteHandler {
    Arc::new(move |_request| {
        async move { GatewayResponse::ok(json!({ "handler": name })) }.boxed()
    })
}

async fn handler_name(dispatcher: &RequestDispatcher, method: &str, path: &str) -> Option<String> {
    let (handler, params) = dispatcher.route(method, path)?;
    let response = handler(super::GatewayRequest {
        params,
        ..super::GatewayRequest::default()
    })
    .await;
    match response {
        GatewayResponse::Json {
            body,
            ..
        } => body.get("handler").and_then(|v| v.as_str()).map(ToString::to_string),
        _ => None,
    }
}

// ============================================================================
// SECTION: Matching Tests
// ============================================================================

#[tokio::test]
async fn first_registered_match_wins() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher.get("/api/capabilities/:id", marker("specific")).expect("register");
    dispatcher.register("*", "/api/capabilities/:id", marker("generic")).expect("register");
    let name = handler_name(&dispatcher, "GET", "/api/capabilities/42").await;
    assert_eq!(name.as_deref(), Some("specific"));
}

#[tokio::test]
async fn params_are_extracted_from_literal_patterns() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher
        .get("/api/capabilities/:id/dependencies/:dep_id", marker("deps"))
        .expect("register");
    let (_, params) = dispatcher
        .route("GET", "/api/capabilities/cap-1/dependencies/dep-2")
        .expect("match");
    assert_eq!(params.get("id").map(String::as_str), Some("cap-1"));
    assert_eq!(params.get("dep_id").map(String::as_str), Some("dep-2"));
}

#[tokio::test]
async fn regex_named_groups_become_params() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher
        .register_regex("GET", r"^/traces/(?P<trace_id>[0-9a-f-]+)$", marker("trace"))
        .expect("register");
    let (_, params) = dispatcher.route("GET", "/traces/abc-123").expect("match");
    assert_eq!(params.get("trace_id").map(String::as_str), Some("abc-123"));
    assert!(dispatcher.route("GET", "/traces/NOPE").is_none());
}

#[tokio::test]
async fn wildcard_method_matches_any_verb() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher.register("*", "/mcp", marker("mcp")).expect("register");
    for method in ["GET", "POST", "DELETE", "OPTIONS"] {
        assert!(dispatcher.route(method, "/mcp").is_some(), "{method}");
    }
}

#[tokio::test]
async fn method_mismatch_does_not_match() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher.post("/mcp", marker("mcp")).expect("register");
    assert!(dispatcher.route("GET", "/mcp").is_none());
}

// ============================================================================
// SECTION: Path Rule Tests
// ============================================================================

#[test]
fn trailing_slash_is_significant() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher.get("/health", marker("bare")).expect("register");
    assert!(dispatcher.route("GET", "/health").is_some());
    assert!(dispatcher.route("GET", "/health/").is_none());
}

#[test]
fn query_and_fragment_are_stripped_before_matching() {
    let (path, query) = RequestDispatcher::normalize_path("/api/graph/path?from=a&to=b#frag");
    assert_eq!(path, "/api/graph/path");
    assert_eq!(query, "from=a&to=b");
    let (path, query) = RequestDispatcher::normalize_path("/health");
    assert_eq!(path, "/health");
    assert_eq!(query, "");
}

// ============================================================================
// SECTION: Registration Tests
// ============================================================================

#[test]
fn duplicate_routes_fail_fast() {
    let mut dispatcher = RequestDispatcher::new();
    dispatcher.get("/health", marker("one")).expect("register");
    let err = dispatcher.get("/health", marker("two")).expect_err("duplicate");
    assert!(matches!(err, GatewayError::Validation(_)));
    // The same pattern under a different verb stays legal.
    dispatcher.post("/health", marker("three")).expect("register");
}

#[test]
fn malformed_regex_is_rejected() {
    let mut dispatcher = RequestDispatcher::new();
    let err = dispatcher.register_regex("GET", "(unclosed", marker("bad")).expect_err("regex");
    assert!(matches!(err, GatewayError::Validation(_)));
}
