// crates/pml-gateway-sandbox/src/lib.rs
// ============================================================================
// Module: PML Gateway Sandbox Library
// Description: Worker-isolated evaluation of untrusted capability code.
// Purpose: Proxy tool/capability calls from isolated workers back to the
//          host with tracing, permissions, and deadlines.
// Dependencies: pml-gateway-core, serde_json, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! The sandbox runs untrusted code in a strictly isolated worker. Workers
//! have no ambient filesystem, network, environment, subprocess, or FFI
//! access; every side effect travels as an RPC frame over the worker channel
//! and is arbitrated by the host-side [`SandboxBridge`] against its tool and
//! capability dispatch tables. The bridge captures an ordered trace timeline
//! across calls, enforces the effective permission set, bounds capability
//! re-entry depth, and applies a run deadline.
//! Invariants:
//! - User-code faults return `{success: false, error}`; the host never
//!   crashes on them.
//! - Deny-by-default: subprocess and FFI access are always denied,
//!   regardless of the permission set.
//!
//! Security posture: worker output is untrusted input to the host; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bridge;
pub mod permissions;
pub mod protocol;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bridge::BridgeConfig;
pub use bridge::CapabilityDispatcher;
pub use bridge::NoCapabilities;
pub use bridge::SandboxBridge;
pub use bridge::SandboxOutcome;
pub use bridge::StaticToolDispatcher;
pub use bridge::ToolDispatcher;
pub use bridge::tool_table;
pub use permissions::permission_flags;
pub use protocol::TraceEntry;
pub use protocol::WorkerFrame;
pub use protocol::sanitize_result;
pub use worker::SubprocessWorker;
pub use worker::SubprocessWorkerConfig;
pub use worker::Worker;
pub use worker::WorkerError;
pub use worker::WorkerSession;
