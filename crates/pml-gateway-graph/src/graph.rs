// crates/pml-gateway-graph/src/graph.rs
// ============================================================================
// Module: Knowledge Graph
// Description: In-memory tool/capability graph with persistent backing.
// Purpose: Maintain typed edges, serve path/DAG queries, and sync with the
//          dependency store.
// Dependencies: petgraph, pml-gateway-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The knowledge graph holds tool, capability, and learned-operation nodes
//! joined by typed, provenance-weighted edges. Edge observation upserts an
//! edge, increments its count, and upgrades inferred provenance to observed
//! at the threshold; every write recomputes community structure and emits a
//! graph event. Query weighting uses `1 / confidence` so high-confidence
//! edges are short.
//! Invariants:
//! - Writers serialize behind one `RwLock`; readers see consistent
//!   snapshots between writes.
//! - Edge upserts are serialized per `(from, to)` pair by the write lock.
//! - `sync_from_store` is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use serde_json::json;

use pml_gateway_core::bus::EventBus;
use pml_gateway_core::error::GatewayError;
use pml_gateway_core::types::edge::EdgeKind;
use pml_gateway_core::types::edge::EdgeSource;
use pml_gateway_core::types::edge::GraphEdge;
use pml_gateway_core::types::edge::edge_weight;
use pml_gateway_core::types::event::GatewayEvent;
use pml_gateway_core::types::event::event_types;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::node::GraphNode;
use pml_gateway_core::types::workflow::TaskSpec;
use pml_gateway_core::types::workflow::WorkflowDag;
use pml_gateway_core::types::workflow::WorkflowError;

use crate::algorithms;

// ============================================================================
// SECTION: Store Interface
// ============================================================================

/// Persistent backing for graph nodes and edges.
///
/// Implementations live in the store crate; the graph only needs bulk loads
/// and edge upserts.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Loads every persisted node.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the store is unavailable.
    async fn load_nodes(&self) -> Result<Vec<GraphNode>, GatewayError>;

    /// Loads every persisted edge.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the store is unavailable.
    async fn load_edges(&self) -> Result<Vec<GraphEdge>, GatewayError>;

    /// Persists an edge upsert.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the write fails.
    async fn persist_edge(&self, edge: &GraphEdge) -> Result<(), GatewayError>;
}

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// Serializable snapshot of the graph for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// All nodes.
    pub nodes: Vec<GraphNode>,
    /// All edges.
    pub edges: Vec<GraphEdge>,
    /// Snapshot metadata (counts, community count).
    pub metadata: serde_json::Value,
}

/// A related node with its strongest connecting edge confidence.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedNode {
    /// Related node identifier.
    pub id: NodeId,
    /// Edge kind of the strongest connection.
    pub edge_type: EdgeKind,
    /// Confidence of the strongest connection.
    pub confidence: f64,
}

// ============================================================================
// SECTION: Graph State
// ============================================================================

/// Inner mutable graph state.
struct GraphInner {
    /// The petgraph structure.
    graph: StableDiGraph<GraphNode, GraphEdge>,
    /// Node id to index map.
    index: HashMap<NodeId, NodeIndex>,
    /// Community label per node, recomputed on write.
    communities: HashMap<NodeId, usize>,
}

impl GraphInner {
    fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            index: HashMap::new(),
            communities: HashMap::new(),
        }
    }

    /// Ensures a node exists, inserting it when absent.
    fn ensure_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&ix) = self.index.get(&node.id) {
            return ix;
        }
        let id = node.id.clone();
        let ix = self.graph.add_node(node);
        self.index.insert(id, ix);
        ix
    }

    /// Recomputes community labels after a write.
    fn refresh_communities(&mut self) {
        let by_index = algorithms::communities(&self.graph);
        self.communities = by_index
            .into_iter()
            .filter_map(|(ix, label)| {
                self.graph.node_weight(ix).map(|node| (node.id.clone(), label))
            })
            .collect();
    }
}

// ============================================================================
// SECTION: Knowledge Graph
// ============================================================================

/// Shared in-memory knowledge graph with persistent backing.
#[derive(Clone)]
pub struct KnowledgeGraph {
    /// Inner state; writers serialize on the write lock.
    inner: Arc<RwLock<GraphInner>>,
    /// Event bus receiving graph events.
    bus: EventBus,
    /// Optional persistent backing.
    store: Option<Arc<dyn GraphStore>>,
}

impl KnowledgeGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(bus: EventBus, store: Option<Arc<dyn GraphStore>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GraphInner::new())),
            bus,
            store,
        }
    }

    /// Loads all nodes and edges from the backing store, replacing the
    /// in-memory state, and emits `graph.synced`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the store is absent or unavailable.
    pub async fn sync_from_store(&self) -> Result<(), GatewayError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| GatewayError::Unavailable("graph store not configured".to_string()))?;
        let nodes = store.load_nodes().await?;
        let edges = store.load_edges().await?;
        let (node_count, edge_count) = {
            let mut inner = self.write();
            *inner = GraphInner::new();
            for node in nodes {
                inner.ensure_node(node);
            }
            for edge in edges {
                let from = inner.ensure_node(placeholder_node(&edge.from));
                let to = inner.ensure_node(placeholder_node(&edge.to));
                inner.graph.add_edge(from, to, edge);
            }
            inner.refresh_communities();
            (inner.graph.node_count(), inner.graph.edge_count())
        };
        self.bus.emit(GatewayEvent::new(
            event_types::GRAPH_SYNCED,
            "graph",
            json!({ "nodes": node_count, "edges": edge_count }),
        ));
        tracing::debug!(nodes = node_count, edges = edge_count, "graph synced from store");
        Ok(())
    }

    /// Inserts a node when absent.
    pub fn upsert_node(&self, node: GraphNode) {
        let mut inner = self.write();
        inner.ensure_node(node);
        inner.refresh_communities();
    }

    /// Removes a capability node and its incident edges, then reinserts the
    /// provided replacement with `contains` edges to the given tool nodes.
    pub fn replace_capability(&self, node: GraphNode, tool_ids: &[NodeId]) {
        let mut inner = self.write();
        if let Some(ix) = inner.index.remove(&node.id) {
            inner.graph.remove_node(ix);
        }
        let cap_ix = inner.ensure_node(node);
        for tool_id in tool_ids {
            let tool_ix = inner.ensure_node(placeholder_node(tool_id));
            let edge = GraphEdge::new(
                inner.graph[cap_ix].id.clone(),
                tool_id.clone(),
                EdgeKind::Contains,
                EdgeSource::Declared,
            );
            inner.graph.add_edge(cap_ix, tool_ix, edge);
        }
        inner.refresh_communities();
    }

    /// Observes an edge: upsert, count increment, provenance upgrade.
    ///
    /// Emits `graph.edge.created` on first observation and
    /// `graph.edge.updated` afterwards; persists through the backing store
    /// when configured.
    pub async fn observe(&self, from: &NodeId, to: &NodeId, kind: EdgeKind, source: EdgeSource) {
        let (edge, created) = {
            let mut inner = self.write();
            let from_ix = inner.ensure_node(placeholder_node(from));
            let to_ix = inner.ensure_node(placeholder_node(to));
            let existing = inner
                .graph
                .edges_connecting(from_ix, to_ix)
                .find(|e| e.weight().kind == kind)
                .map(|e| e.id());
            let (edge, created) = match existing {
                Some(edge_ix) => {
                    let weight =
                        inner.graph.edge_weight_mut(edge_ix).map(|weight| {
                            weight.observe();
                            weight.clone()
                        });
                    match weight {
                        Some(weight) => (weight, false),
                        None => return,
                    }
                }
                None => {
                    let edge = GraphEdge::new(from.clone(), to.clone(), kind, source);
                    inner.graph.add_edge(from_ix, to_ix, edge.clone());
                    (edge, true)
                }
            };
            inner.refresh_communities();
            (edge, created)
        };
        if let Some(store) = &self.store
            && let Err(err) = store.persist_edge(&edge).await
        {
            tracing::warn!(error = %err, "edge persistence failed");
        }
        let event_type = if created {
            event_types::GRAPH_EDGE_CREATED
        } else {
            event_types::GRAPH_EDGE_UPDATED
        };
        self.bus.emit(GatewayEvent::new(
            event_type,
            "graph",
            json!({
                "from": edge.from,
                "to": edge.to,
                "edge_type": edge.kind,
                "edge_source": edge.source,
                "count": edge.count,
                "confidence": edge.confidence,
            }),
        ));
    }

    /// Updates the graph from a completed workflow.
    ///
    /// Every `depends_on` pair becomes a dependency observation; consecutive
    /// tasks within each topological layer become sequence observations.
    /// Tool identifiers with the `code:` prefix mint operation nodes.
    pub async fn update_from_execution(&self, dag: &WorkflowDag) {
        let node_of = |task: &TaskSpec| NodeId::parse(task.tool.clone()).ok();
        for task in dag.tasks() {
            for dependency in &task.depends_on {
                let Some(dep_task) = dag.task(dependency) else {
                    continue;
                };
                if let (Some(from), Some(to)) = (node_of(dep_task), node_of(task)) {
                    self.observe(&from, &to, EdgeKind::Dependency, EdgeSource::Inferred).await;
                }
            }
        }
        for layer in dag.layers() {
            for pair in layer.windows(2) {
                let (Some(first), Some(second)) = (dag.task(&pair[0]), dag.task(&pair[1]))
                else {
                    continue;
                };
                if let (Some(from), Some(to)) = (node_of(first), node_of(second)) {
                    self.observe(&from, &to, EdgeKind::Sequence, EdgeSource::Inferred).await;
                }
            }
        }
    }

    /// Updates the graph from a sandbox trace timeline.
    ///
    /// `capability_end` and `tool_end` entries carrying a parent trace mint
    /// `contains` edges parent → child and `sequence` edges between
    /// consecutive children of the same parent.
    pub async fn update_from_code_trace(
        &self,
        parent: &NodeId,
        timeline: &[serde_json::Value],
    ) {
        let mut children: Vec<NodeId> = Vec::new();
        for entry in timeline {
            let entry_type = entry.get("type").and_then(serde_json::Value::as_str);
            let has_parent = entry.get("parentTraceId").is_some_and(|v| !v.is_null());
            if !has_parent {
                continue;
            }
            let child = match entry_type {
                Some("tool_end") => entry
                    .get("tool")
                    .and_then(serde_json::Value::as_str)
                    .and_then(|raw| NodeId::parse(raw).ok()),
                Some("capability_end") => entry
                    .get("capability")
                    .and_then(serde_json::Value::as_str)
                    .and_then(|raw| NodeId::parse(raw).ok()),
                _ => None,
            };
            if let Some(child) = child {
                self.observe(parent, &child, EdgeKind::Contains, EdgeSource::Observed).await;
                if let Some(previous) = children.last() {
                    self.observe(previous, &child, EdgeKind::Sequence, EdgeSource::Observed)
                        .await;
                }
                children.push(child);
            }
        }
    }

    /// Returns the lowest-cost path between two nodes.
    ///
    /// Edge cost is `1 / confidence`; returns `None` when either endpoint is
    /// missing or unreachable.
    #[must_use]
    pub fn shortest_path(&self, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
        let inner = self.read();
        let &start = inner.index.get(from)?;
        let &goal = inner.index.get(to)?;
        let (_cost, path) = petgraph::algo::astar(
            &inner.graph,
            start,
            |ix| ix == goal,
            |edge| 1.0 / edge.weight().confidence.max(f64::EPSILON),
            |_| 0.0,
        )?;
        Some(path.into_iter().filter_map(|ix| inner.graph.node_weight(ix).map(|n| n.id.clone())).collect())
    }

    /// Builds a DAG over the given nodes from their learned edges.
    ///
    /// Candidate dependency/sequence edges are applied in descending
    /// confidence order, skipping any edge that would close a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when no valid task set can be formed.
    pub fn build_dag(&self, node_ids: &[NodeId]) -> Result<WorkflowDag, WorkflowError> {
        let inner = self.read();
        let mut candidates: Vec<(NodeId, NodeId, f64)> = Vec::new();
        for from in node_ids {
            let Some(&from_ix) = inner.index.get(from) else {
                continue;
            };
            for edge in inner.graph.edges_directed(from_ix, Direction::Outgoing) {
                let to = &inner.graph[edge.target()].id;
                if node_ids.contains(to) && edge.weight().kind != EdgeKind::Similarity {
                    candidates.push((from.clone(), to.clone(), edge.weight().confidence));
                }
            }
        }
        drop(inner);
        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        let mut depends: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to, _confidence) in candidates {
            // Reject the edge when `from` is already reachable from `to`.
            if reaches(&depends, &from, &to) {
                continue;
            }
            let entry = depends.entry(to.clone()).or_default();
            if !entry.contains(&from) {
                entry.push(from);
            }
        }
        let tasks: Vec<TaskSpec> = node_ids
            .iter()
            .map(|id| {
                let mut task = TaskSpec::tool_task(id.as_str(), id.as_str());
                if let Some(deps) = depends.get(id) {
                    for dep in deps {
                        task = task.depends_on(dep.as_str());
                    }
                }
                task
            })
            .collect();
        WorkflowDag::new(tasks)
    }

    /// Returns the PageRank score of one node.
    #[must_use]
    pub fn page_rank(&self, node_id: &NodeId) -> Option<f64> {
        let inner = self.read();
        let &ix = inner.index.get(node_id)?;
        algorithms::page_rank(&inner.graph).get(&ix).copied()
    }

    /// Returns the community label of one node.
    #[must_use]
    pub fn community_of(&self, node_id: &NodeId) -> Option<usize> {
        self.read().communities.get(node_id).copied()
    }

    /// Returns the community label map.
    #[must_use]
    pub fn communities(&self) -> HashMap<NodeId, usize> {
        self.read().communities.clone()
    }

    /// Returns the strongest related nodes of a node, by edge confidence.
    #[must_use]
    pub fn related(&self, node_id: &NodeId, limit: usize) -> Vec<RelatedNode> {
        let inner = self.read();
        let Some(&ix) = inner.index.get(node_id) else {
            return Vec::new();
        };
        let mut related: Vec<RelatedNode> = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in inner.graph.edges_directed(ix, direction) {
                let other = if direction == Direction::Outgoing {
                    edge.target()
                } else {
                    edge.source()
                };
                if let Some(node) = inner.graph.node_weight(other) {
                    related.push(RelatedNode {
                        id: node.id.clone(),
                        edge_type: edge.weight().kind,
                        confidence: edge.weight().confidence,
                    });
                }
            }
        }
        related.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });
        related.dedup_by(|a, b| a.id == b.id);
        related.truncate(limit);
        related
    }

    /// Returns the success rate of a node, when known.
    #[must_use]
    pub fn success_rate(&self, node_id: &NodeId) -> Option<f64> {
        let inner = self.read();
        let &ix = inner.index.get(node_id)?;
        inner.graph.node_weight(ix).and_then(|node| node.success_rate)
    }

    /// Returns a node by identifier.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<GraphNode> {
        let inner = self.read();
        let &ix = inner.index.get(node_id)?;
        inner.graph.node_weight(ix).cloned()
    }

    /// Returns a full serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.read();
        let nodes: Vec<GraphNode> = inner.graph.node_weights().cloned().collect();
        let edges: Vec<GraphEdge> = inner.graph.edge_weights().cloned().collect();
        let community_count =
            inner.communities.values().collect::<std::collections::BTreeSet<_>>().len();
        GraphSnapshot {
            metadata: json!({
                "node_count": nodes.len(),
                "edge_count": edges.len(),
                "community_count": community_count,
            }),
            nodes,
            edges,
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.read().graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.read().graph.edge_count()
    }

    /// Returns the edge weight formula value; identical on read and write.
    #[must_use]
    pub fn get_edge_weight(kind: EdgeKind, source: EdgeSource) -> f64 {
        edge_weight(kind, source)
    }

    /// Acquires the read lock, recovering from poisoning.
    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquires the write lock, recovering from poisoning.
    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a minimal node for an id first seen through an edge.
fn placeholder_node(id: &NodeId) -> GraphNode {
    if id.is_capability() {
        GraphNode::capability(id.clone(), id.as_str())
    } else if id.is_operation() {
        GraphNode::operation(
            id.as_str().trim_start_matches("code:"),
            pml_gateway_core::types::node::OperationCategory::Object,
        )
    } else {
        match id.as_tool() {
            Some((server, tool)) => match pml_gateway_core::types::identifiers::ServerId::new(server)
            {
                Ok(server) => GraphNode::tool(&server, tool),
                Err(_) => GraphNode::capability(id.clone(), id.as_str()),
            },
            None => GraphNode::capability(id.clone(), id.as_str()),
        }
    }
}

/// Returns true when `target` is reachable from `start` over dependency
/// lists.
fn reaches(depends: &HashMap<NodeId, Vec<NodeId>>, start: &NodeId, target: &NodeId) -> bool {
    if start == target {
        return true;
    }
    let mut stack = vec![start];
    let mut seen = std::collections::BTreeSet::new();
    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(deps) = depends.get(current) {
            for dep in deps {
                if dep == target {
                    return true;
                }
                stack.push(dep);
            }
        }
    }
    false
}
