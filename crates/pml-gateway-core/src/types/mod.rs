// crates/pml-gateway-core/src/types/mod.rs
// ============================================================================
// Module: Gateway Domain Types
// Description: Graph, capability, trace, event, and workflow data model.
// Purpose: Define the serializable domain model shared by all gateway crates.
// Dependencies: serde, serde_json, thiserror, uuid
// ============================================================================

//! ## Overview
//! The domain model follows the persisted-state layout of the gateway: graph
//! nodes and typed edges, FQDN-addressed capability records, sanitized
//! execution traces, bus events, and workflow DAGs. Types validate their
//! invariants at construction boundaries and serialize with stable wire
//! forms.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capability;
pub mod edge;
pub mod event;
pub mod identifiers;
pub mod node;
pub mod permission;
pub mod time;
pub mod trace;
pub mod workflow;
