// crates/pml-gateway-core/src/error.rs
// ============================================================================
// Module: Gateway Error Taxonomy
// Description: Canonical error kinds shared across gateway subsystems.
// Purpose: Provide stable, programmatically matchable error variants.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The gateway error taxonomy maps one-to-one onto the transport-level error
//! surface: HTTP status codes and JSON-RPC error codes are derived from these
//! variants, never from string matching. Subsystem crates either use
//! [`GatewayError`] directly or convert their local error enums into it at
//! the crate boundary.
//! Invariants:
//! - Variants are stable for programmatic handling.
//! - Messages never embed secrets; sanitization happens before construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Gateway Errors
// ============================================================================

/// Canonical gateway error kinds.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Transport layers map variants to status codes without string matching.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed input, invalid JSON-RPC params, or a missing required field.
    #[error("validation error: {0}")]
    Validation(String),
    /// A capability, trace, or route was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing or invalid API key in cloud mode.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Connection pool size limit reached.
    #[error("connection pool exhausted (max {max})")]
    PoolExhausted {
        /// Configured pool size limit.
        max: usize,
    },
    /// Sandbox attempt disallowed by the effective permission set.
    #[error("permission denied: {0}")]
    Permission(String),
    /// RPC, decision gate, or workflow deadline exceeded.
    #[error("timeout after {timeout_ms}ms: {context}")]
    Timeout {
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
        /// Operation that timed out.
        context: String,
    },
    /// A dependent subsystem is not ready to serve requests.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// Foreign-key violation or illegal permission escalation target.
    #[error("integrity error: {0}")]
    Integrity(String),
    /// Unexpected internal fault; transports reply with a sanitized message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns a stable label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::PoolExhausted {
                ..
            } => "pool_exhausted",
            Self::Permission(_) => "permission",
            Self::Timeout {
                ..
            } => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Integrity(_) => "integrity",
            Self::Internal(_) => "internal",
        }
    }
}
