// crates/pml-gateway-store-sqlite/src/lib.rs
// ============================================================================
// Module: PML Gateway SQLite Store Library
// Description: Durable capability, trace, and graph persistence.
// Purpose: Back the registry, trace store, algorithm tracer, and graph sync
//          with one SQLite database.
// Dependencies: pml-gateway-core, pml-gateway-graph, rusqlite
// ============================================================================

//! ## Overview
//! One SQLite database holds every persisted table of the gateway: tool
//! schemas and embeddings, the dependency graph, workflow patterns keyed by
//! code hash, FQDN-addressed capability records, sanitized execution traces,
//! algorithm decision traces, and API keys. The store opens in WAL mode with
//! a busy timeout and a `user_version` schema stamp, and fails closed on
//! version mismatches.
//!
//! Security posture: database contents are untrusted on read; rows that do
//! not decode fail the operation rather than degrade silently; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod algorithm_tracer;
pub mod api_keys;
pub mod capability_store;
pub mod registry;
pub mod store;
pub mod trace_store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use algorithm_tracer::AlgorithmDecision;
pub use algorithm_tracer::AlgorithmTrace;
pub use algorithm_tracer::AlgorithmTracer;
pub use api_keys::ApiKeyStore;
pub use capability_store::CapabilityStore;
pub use capability_store::DependencyDirection;
pub use capability_store::SaveCapabilityRequest;
pub use registry::CapabilityRegistry;
pub use registry::CapabilitySort;
pub use registry::CreateCapabilityRequest;
pub use registry::ListOptions;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::StoreError;
pub use trace_store::TraceFilter;
pub use trace_store::TraceStore;
