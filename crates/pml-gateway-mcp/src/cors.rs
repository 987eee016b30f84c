// crates/pml-gateway-mcp/src/cors.rs
// ============================================================================
// Module: CORS Policy
// Description: Origin-pinned CORS headers for every response path.
// Purpose: Compute the CORS header set and answer preflights.
// Dependencies: pml-gateway-mcp::config
// ============================================================================

//! ## Overview
//! CORS is pinned to one origin: `https://<domain>` in cloud mode and the
//! local HTTP origin otherwise; there is never a wildcard. The same header
//! set applies to success, error, and preflight responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::config::GatewayConfig;
use crate::config::GatewayMode;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Methods allowed across origins.
pub const ALLOW_METHODS: &str = "GET,POST,DELETE,OPTIONS";

/// Headers allowed across origins.
pub const ALLOW_HEADERS: &str = "x-api-key,Content-Type";

/// Computes the allowed origin for the configuration.
///
/// Cloud mode pins `https://<domain>`; local mode pins the localhost origin
/// on the configured port.
#[must_use]
pub fn allowed_origin(config: &GatewayConfig) -> String {
    match (config.mode, &config.server.domain) {
        (GatewayMode::Cloud, Some(domain)) => format!("https://{domain}"),
        _ => format!("http://localhost:{}", config.server.port),
    }
}

/// Returns the CORS header set applied to every response.
#[must_use]
pub fn cors_headers(config: &GatewayConfig) -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), allowed_origin(config)),
        ("Access-Control-Allow-Methods".to_string(), ALLOW_METHODS.to_string()),
        ("Access-Control-Allow-Headers".to_string(), ALLOW_HEADERS.to_string()),
    ]
}

#[cfg(test)]
mod tests;
