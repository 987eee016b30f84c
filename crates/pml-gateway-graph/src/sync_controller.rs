// crates/pml-gateway-graph/src/sync_controller.rs
// ============================================================================
// Module: Graph Sync Controller
// Description: Event-driven incremental graph updates from capability
//              lifecycle events.
// Purpose: Keep the knowledge graph aligned with capability changes without
//          holding a back-reference to the capability store.
// Dependencies: async-trait, pml-gateway-core, pml-gateway-graph::graph, tracing
// ============================================================================

//! ## Overview
//! The controller subscribes to capability lifecycle events by name:
//! zone-created and zone-updated events incrementally replace the affected
//! capability node and its `contains` edges, while merge events trigger a
//! full store sync. Start and stop are idempotent; events arriving after
//! stop are ignored. Newly learned capabilities are registered with the
//! external learner only when an embedding is already stored for them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use pml_gateway_core::bus::EventBus;
use pml_gateway_core::bus::SubscriptionId;
use pml_gateway_core::error::GatewayError;
use pml_gateway_core::interfaces::VectorIndex;
use pml_gateway_core::types::event::GatewayEvent;
use pml_gateway_core::types::event::event_types;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::node::GraphNode;

use crate::graph::KnowledgeGraph;

// ============================================================================
// SECTION: Learner Interface
// ============================================================================

/// External capability learner notified of new graph capabilities.
#[async_trait]
pub trait CapabilityLearner: Send + Sync {
    /// Registers a capability node with the learner.
    async fn register(&self, node_id: &NodeId);
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Event-driven incremental graph updater.
///
/// # Invariants
/// - `start` and `stop` are idempotent.
/// - After `stop`, late events are ignored.
pub struct GraphSyncController {
    /// Event bus carrying capability lifecycle events.
    bus: EventBus,
    /// Graph being maintained.
    graph: KnowledgeGraph,
    /// Embedding index used to gate learner registration.
    index: Arc<dyn VectorIndex>,
    /// Optional external learner.
    learner: Option<Arc<dyn CapabilityLearner>>,
    /// Whether the controller is processing events.
    running: Arc<AtomicBool>,
    /// Active bus subscriptions.
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl GraphSyncController {
    /// Creates a stopped controller.
    #[must_use]
    pub fn new(
        bus: EventBus,
        graph: KnowledgeGraph,
        index: Arc<dyn VectorIndex>,
        learner: Option<Arc<dyn CapabilityLearner>>,
    ) -> Self {
        Self {
            bus,
            graph,
            index,
            learner,
            running: Arc::new(AtomicBool::new(false)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes to capability lifecycle events. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut subscriptions = self.lock_subscriptions();
        for event_type in
            [event_types::CAPABILITY_ZONE_CREATED, event_types::CAPABILITY_ZONE_UPDATED]
        {
            let graph = self.graph.clone();
            let index = Arc::clone(&self.index);
            let learner = self.learner.clone();
            let running = Arc::clone(&self.running);
            subscriptions.push(self.bus.on_async(event_type, move |event: GatewayEvent| {
                let graph = graph.clone();
                let index = Arc::clone(&index);
                let learner = learner.clone();
                let running = Arc::clone(&running);
                async move {
                    if !running.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    apply_zone_event(&graph, &index, learner.as_deref(), &event).await
                }
            }));
        }
        let graph = self.graph.clone();
        let running = Arc::clone(&self.running);
        subscriptions.push(self.bus.on_async(
            event_types::CAPABILITY_MERGED,
            move |_event: GatewayEvent| {
                let graph = graph.clone();
                let running = Arc::clone(&running);
                async move {
                    if !running.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    graph.sync_from_store().await
                }
            },
        ));
    }

    /// Unsubscribes and ignores further events. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut subscriptions = self.lock_subscriptions();
        for id in subscriptions.drain(..) {
            self.bus.off(id);
        }
    }

    /// Returns true while the controller processes events.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Locks the subscription list, recovering from poisoning.
    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionId>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Applies a zone created/updated event to the graph.
async fn apply_zone_event(
    graph: &KnowledgeGraph,
    index: &Arc<dyn VectorIndex>,
    learner: Option<&dyn CapabilityLearner>,
    event: &GatewayEvent,
) -> Result<(), GatewayError> {
    let id = event
        .payload
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| GatewayError::Validation("zone event without id".to_string()))?;
    let node_id = NodeId::parse(id)
        .map_err(|err| GatewayError::Validation(format!("zone event id: {err}")))?;
    let name = event
        .payload
        .get("name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(id)
        .to_string();
    let tool_ids: Vec<NodeId> = event
        .payload
        .get("tools")
        .and_then(serde_json::Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(serde_json::Value::as_str)
                .filter_map(|raw| NodeId::parse(raw).ok())
                .collect()
        })
        .unwrap_or_default();
    graph.replace_capability(GraphNode::capability(node_id.clone(), name), &tool_ids);
    tracing::debug!(capability = %node_id, tools = tool_ids.len(), "capability zone applied");
    // Learner registration requires a stored embedding.
    if let Some(learner) = learner
        && index.contains(&node_id).await
    {
        learner.register(&node_id).await;
    }
    Ok(())
}
