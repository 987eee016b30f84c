// crates/pml-gateway-mcp/src/lib.rs
// ============================================================================
// Module: PML Gateway MCP Library
// Description: Request dispatch, auth, SSE fan-out, and MCP transports.
// Purpose: Serve the gateway over MCP stdio and HTTP JSON-RPC.
// Dependencies: axum, pml-gateway-core, pml-gateway-graph,
//               pml-gateway-sandbox, pml-gateway-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The MCP crate is the outer surface of the gateway: a pattern-matched
//! request dispatcher with a local/cloud auth gate and CORS, a bounded SSE
//! fan-out fed by the event bus, the JSON-RPC method set (`tools/list`,
//! `tools/call` with `pml:discover` / `pml:execute` and their deprecated
//! synonyms) served over stdio and HTTP, and the server wiring that brings
//! the subsystems up leaves-first.
//!
//! Security posture: every request is untrusted; the auth gate fails closed
//! in cloud mode and CORS headers apply to error paths too; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod config;
pub mod cors;
pub mod dispatcher;
pub mod http;
pub mod rpc;
pub mod server;
pub mod sse;
pub mod stdio;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthContext;
pub use auth::AuthGate;
pub use config::GatewayConfig;
pub use config::GatewayMode;
pub use dispatcher::GatewayRequest;
pub use dispatcher::GatewayResponse;
pub use dispatcher::RequestDispatcher;
pub use rpc::McpService;
pub use server::GatewayServer;
pub use sse::EventStreamManager;
