// crates/pml-gateway-mcp/src/dispatcher.rs
// ============================================================================
// Module: Request Dispatcher
// Description: Ordered pattern-matched routing with param extraction.
// Purpose: Route gateway requests by method and path, first match wins.
// Dependencies: futures, regex, serde_json, tokio
// ============================================================================

//! ## Overview
//! The dispatcher holds an ordered route table. Patterns are literal paths
//! with `:param` segments or anchored regexes with named groups; matching
//! walks the table in registration order and the first match wins, so
//! callers register specific routes before generic ones. Method `*` matches
//! any verb. The trailing slash is significant; query strings and fragments
//! are stripped before matching and never affect it. Duplicate
//! (method, pattern) registrations fail fast instead of shadowing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::types::event::GatewayEvent;

use crate::auth::AuthContext;

// ============================================================================
// SECTION: Request and Response
// ============================================================================

/// One gateway request, transport-independent.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    /// HTTP verb (uppercase).
    pub method: String,
    /// Path without query or fragment.
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// JSON body (null when absent).
    pub body: Value,
    /// Path parameters filled by the dispatcher.
    pub params: HashMap<String, String>,
    /// Authenticated context, when the auth gate passed.
    pub auth: Option<AuthContext>,
}

/// One gateway response, transport-independent.
pub enum GatewayResponse {
    /// JSON body with a status code.
    Json {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: Value,
    },
    /// Redirect to another origin.
    Redirect {
        /// Redirect target.
        location: String,
    },
    /// Long-lived server-sent event stream.
    EventStream {
        /// Channel of events for this client.
        events: mpsc::Receiver<GatewayEvent>,
    },
}

impl GatewayResponse {
    /// Builds a `200` JSON response.
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::Json {
            status: 200,
            body,
        }
    }

    /// Maps a gateway error onto its status code and error body.
    #[must_use]
    pub fn from_error(error: &GatewayError) -> Self {
        let (status, label) = match error {
            GatewayError::Validation(_) => (400, "Bad Request"),
            GatewayError::NotFound(_) => (404, "Not Found"),
            GatewayError::Unauthorized(_) => (401, "Unauthorized"),
            GatewayError::PoolExhausted {
                ..
            }
            | GatewayError::Unavailable(_) => (503, "Service Unavailable"),
            GatewayError::Permission(_) => (403, "Forbidden"),
            GatewayError::Timeout {
                ..
            } => (504, "Gateway Timeout"),
            GatewayError::Integrity(_) => (409, "Conflict"),
            GatewayError::Internal(_) => (500, "Internal Server Error"),
        };
        let message = if status == 500 {
            // Internal faults reply with a sanitized message.
            "internal error".to_string()
        } else {
            error.to_string()
        };
        Self::Json {
            status,
            body: serde_json::json!({ "error": label, "message": message }),
        }
    }
}

/// Boxed asynchronous route handler.
pub type RouteHandler =
    Arc<dyn Fn(GatewayRequest) -> BoxFuture<'static, GatewayResponse> + Send + Sync>;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// One compiled route pattern.
enum RoutePattern {
    /// Literal path with `:param` segments.
    Literal(Vec<Segment>),
    /// Anchored regex with named groups.
    Regex(Regex),
}

/// One segment of a literal pattern.
enum Segment {
    /// Must match exactly.
    Static(String),
    /// Captures the segment under a name.
    Param(String),
}

/// Splits a path into segments, preserving a trailing empty segment so the
/// trailing slash stays significant.
fn segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/').split('/').collect()
}

/// Compiles a literal pattern.
fn compile_literal(pattern: &str) -> Vec<Segment> {
    segments(pattern)
        .into_iter()
        .map(|segment| {
            segment.strip_prefix(':').map_or_else(
                || Segment::Static(segment.to_string()),
                |name| Segment::Param(name.to_string()),
            )
        })
        .collect()
}

/// Matches a literal pattern against a path.
fn match_literal(pattern: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let parts = segments(path);
    if parts.len() != pattern.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (segment, part) in pattern.iter().zip(parts) {
        match segment {
            Segment::Static(expected) if expected == part => {}
            Segment::Static(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), part.to_string());
            }
        }
    }
    Some(params)
}

/// Matches a regex pattern, extracting named groups.
fn match_regex(regex: &Regex, path: &str) -> Option<HashMap<String, String>> {
    let captures = regex.captures(path)?;
    let mut params = HashMap::new();
    for name in regex.capture_names().flatten() {
        if let Some(value) = captures.name(name) {
            params.insert(name.to_string(), value.as_str().to_string());
        }
    }
    Some(params)
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// One registered route.
struct Route {
    /// Uppercased verb, or `*` for any.
    method: String,
    /// Pattern source for duplicate detection.
    source: String,
    /// Compiled pattern.
    pattern: RoutePattern,
    /// Handler.
    handler: RouteHandler,
}

/// Ordered route table; first match wins.
#[derive(Default)]
pub struct RequestDispatcher {
    /// Routes in registration order.
    routes: Vec<Route>,
}

impl RequestDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a literal route (with optional `:param` segments).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] on a duplicate (method, pattern).
    pub fn register(
        &mut self,
        method: &str,
        pattern: &str,
        handler: RouteHandler,
    ) -> Result<(), GatewayError> {
        self.push_route(method, pattern, RoutePattern::Literal(compile_literal(pattern)), handler)
    }

    /// Registers a regex route with named capture groups as params.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] on a malformed regex or a
    /// duplicate (method, pattern).
    pub fn register_regex(
        &mut self,
        method: &str,
        pattern: &str,
        handler: RouteHandler,
    ) -> Result<(), GatewayError> {
        let regex = Regex::new(pattern)
            .map_err(|err| GatewayError::Validation(format!("route regex: {err}")))?;
        self.push_route(method, pattern, RoutePattern::Regex(regex), handler)
    }

    /// Registers a GET route.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] on duplicates.
    pub fn get(&mut self, pattern: &str, handler: RouteHandler) -> Result<(), GatewayError> {
        self.register("GET", pattern, handler)
    }

    /// Registers a POST route.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] on duplicates.
    pub fn post(&mut self, pattern: &str, handler: RouteHandler) -> Result<(), GatewayError> {
        self.register("POST", pattern, handler)
    }

    /// Registers a DELETE route.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] on duplicates.
    pub fn delete(&mut self, pattern: &str, handler: RouteHandler) -> Result<(), GatewayError> {
        self.register("DELETE", pattern, handler)
    }

    /// Finds the first matching route for a method and path.
    ///
    /// The path must already be stripped of query and fragment; the
    /// trailing slash is significant.
    #[must_use]
    pub fn route(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(RouteHandler, HashMap<String, String>)> {
        let method = method.to_ascii_uppercase();
        for route in &self.routes {
            if route.method != "*" && route.method != method {
                continue;
            }
            let matched = match &route.pattern {
                RoutePattern::Literal(pattern) => match_literal(pattern, path),
                RoutePattern::Regex(regex) => match_regex(regex, path),
            };
            if let Some(params) = matched {
                return Some((Arc::clone(&route.handler), params));
            }
        }
        None
    }

    /// Strips query string and fragment from a raw request target.
    #[must_use]
    pub fn normalize_path(target: &str) -> (&str, &str) {
        let without_fragment = target.split('#').next().unwrap_or(target);
        match without_fragment.split_once('?') {
            Some((path, query)) => (path, query),
            None => (without_fragment, ""),
        }
    }

    /// Appends a route, rejecting exact duplicates.
    fn push_route(
        &mut self,
        method: &str,
        source: &str,
        pattern: RoutePattern,
        handler: RouteHandler,
    ) -> Result<(), GatewayError> {
        let method = method.to_ascii_uppercase();
        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.source == source)
        {
            return Err(GatewayError::Validation(format!(
                "duplicate route {method} {source}"
            )));
        }
        self.routes.push(Route {
            method,
            source: source.to_string(),
            pattern,
            handler,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests;
