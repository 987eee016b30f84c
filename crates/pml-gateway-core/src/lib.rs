// crates/pml-gateway-core/src/lib.rs
// ============================================================================
// Module: PML Gateway Core Library
// Description: Domain types, interfaces, event bus, pool, resolver, executor.
// Purpose: Provide the backend-agnostic core of the PML capability gateway.
// Dependencies: serde, serde_json, thiserror, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! PML Gateway Core defines the domain model of the capability gateway (graph
//! nodes and edges, capability records, execution traces, workflow DAGs), the
//! interfaces used to integrate external collaborators (tool clients, vector
//! indexes, embedding providers), and the runtime leaves every other crate
//! builds on: the process-wide [`EventBus`], the bounded [`ConnectionPool`],
//! the [`resolver`] for task arguments, and the [`ControlledExecutor`] that
//! runs validated DAGs layer by layer.
//! Invariants:
//! - Domain types validate at construction boundaries and fail closed.
//! - Event handler faults never propagate to emitters.
//! - Executor decisions and checkpoints are observable through bus events.
//!
//! Security posture: all inputs crossing this crate's boundaries are
//! untrusted; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builder;
pub mod bus;
pub mod error;
pub mod executor;
pub mod interfaces;
pub mod pool;
pub mod resolver;
pub mod types;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builder::BuildOptions;
pub use builder::CodeStructure;
pub use builder::dag_from_structure;
pub use builder::is_valid_for_dag_conversion;
pub use bus::EventBus;
pub use bus::EventHandler;
pub use error::GatewayError;
pub use executor::Checkpoint;
pub use executor::CommandQueue;
pub use executor::ControlledExecutor;
pub use executor::DecisionCommand;
pub use executor::ExecutorConfig;
pub use executor::TaskRecord;
pub use executor::TaskStatus;
pub use executor::WorkflowHandle;
pub use executor::WorkflowOutcome;
pub use executor::workflow_channel;
pub use interfaces::CapabilityRunner;
pub use interfaces::EmbeddingProvider;
pub use interfaces::GatewayMetrics;
pub use interfaces::NoopMetrics;
pub use interfaces::ToolClient;
pub use interfaces::ToolExecutor;
pub use interfaces::VectorIndex;
pub use pool::ConnectionPool;
pub use pool::PoolConfig;
pub use types::capability::CapabilityRecord;
pub use types::capability::Fqdn;
pub use types::edge::EdgeKind;
pub use types::edge::EdgeSource;
pub use types::event::GatewayEvent;
pub use types::identifiers::CapabilityId;
pub use types::identifiers::NodeId;
pub use types::identifiers::ServerId;
pub use types::identifiers::TraceId;
pub use types::identifiers::WorkflowId;
pub use types::node::GraphNode;
pub use types::node::NodeKind;
pub use types::permission::PermissionSet;
pub use types::time::Timestamp;
pub use types::trace::ExecutionTrace;
pub use types::workflow::TaskSpec;
pub use types::workflow::WorkflowDag;
