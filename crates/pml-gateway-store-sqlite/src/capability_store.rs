// crates/pml-gateway-store-sqlite/src/capability_store.rs
// ============================================================================
// Module: Capability Store
// Description: Workflow patterns, dependency edges, and graph persistence.
// Purpose: Save capability code with embeddings and maintain the learned
//          dependency table shared with the knowledge graph.
// Dependencies: pml-gateway-core, pml-gateway-graph, rusqlite, sha2
// ============================================================================

//! ## Overview
//! Capability code lives in `workflow_pattern`, keyed by the SHA-256 of the
//! snippet: saving identical code reuses the existing pattern row while the
//! registry bumps the capability version. The 4-character FQDN hash is the
//! hex prefix of the same digest. Dependency edges persist in
//! `tool_dependency` with the exact observation semantics of the in-memory
//! graph (count increments, inferred → observed at the threshold, one
//! confidence formula). The store also implements the graph crate's
//! [`GraphStore`] so `sync_from_store` round-trips.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use rusqlite::params;
use sha2::Digest;
use sha2::Sha256;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::interfaces::EmbeddingProvider;
use pml_gateway_core::types::capability::CapabilityRecord;
use pml_gateway_core::types::capability::Fqdn;
use pml_gateway_core::types::capability::Routing;
use pml_gateway_core::types::capability::Visibility;
use pml_gateway_core::types::edge::EdgeKind;
use pml_gateway_core::types::edge::EdgeSource;
use pml_gateway_core::types::edge::GraphEdge;
use pml_gateway_core::types::edge::edge_weight;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::node::GraphNode;
use pml_gateway_core::types::node::NodeKind;
use pml_gateway_core::types::node::OperationCategory;
use pml_gateway_core::types::permission::PermissionSet;
use pml_gateway_core::types::permission::PermissionSource;
use pml_gateway_core::types::time::Timestamp;
use pml_gateway_graph::GraphStore;

use crate::registry::CapabilityRegistry;
use crate::registry::CreateCapabilityRequest;
use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Direction filter for dependency queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyDirection {
    /// Edges leaving the node.
    From,
    /// Edges entering the node.
    To,
    /// Both directions.
    Both,
}

/// Request to save capability code.
///
/// # Invariants
/// - `code` and `intent` are non-empty.
#[derive(Debug, Clone)]
pub struct SaveCapabilityRequest {
    /// Capability code snippet.
    pub code: String,
    /// Natural-language intent behind the capability.
    pub intent: String,
    /// Owning organization.
    pub org: String,
    /// Owning project.
    pub project: String,
    /// Capability namespace.
    pub namespace: String,
    /// Capability action.
    pub action: String,
    /// Visibility outside the owning scope.
    pub visibility: Visibility,
    /// Execution routing.
    pub routing: Routing,
    /// Stored permission set.
    pub permission_set: PermissionSet,
    /// Permission provenance.
    pub permission_source: PermissionSource,
    /// Permission inference confidence.
    pub permission_confidence: f64,
}

// ============================================================================
// SECTION: Capability Store
// ============================================================================

/// Store for capability code, embeddings, and dependency edges.
#[derive(Clone)]
pub struct CapabilityStore {
    /// Shared database handle.
    store: SqliteStore,
    /// Registry used to link capability records.
    registry: CapabilityRegistry,
    /// Optional embedding model for intents.
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

impl CapabilityStore {
    /// Creates a capability store.
    #[must_use]
    pub fn new(
        store: SqliteStore,
        registry: CapabilityRegistry,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            store,
            registry,
            embeddings,
        }
    }

    /// Saves capability code: embeds the intent, upserts the workflow
    /// pattern keyed by code hash, and links a capability record.
    ///
    /// Identical code reuses the existing pattern row; the linked record's
    /// version increments through the registry's idempotent create.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on validation or database failure.
    pub async fn save_capability(
        &self,
        request: &SaveCapabilityRequest,
    ) -> Result<CapabilityRecord, StoreError> {
        if request.code.trim().is_empty() {
            return Err(StoreError::Invalid("capability code must not be empty".to_string()));
        }
        if request.intent.trim().is_empty() {
            return Err(StoreError::Invalid("capability intent must not be empty".to_string()));
        }
        let digest = hex_digest(&request.code);
        let embedding = match &self.embeddings {
            Some(provider) => Some(
                provider
                    .embed(&request.intent)
                    .await
                    .map_err(|err| StoreError::Invalid(err.to_string()))?,
            ),
            None => None,
        };
        let pattern_id = {
            let connection = self.store.lock();
            let existing: Option<String> = connection
                .query_row(
                    "SELECT id FROM workflow_pattern WHERE code_hash = ?1",
                    params![digest],
                    |row| row.get(0),
                )
                .optional()?;
            match existing {
                Some(id) => id,
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    connection.execute(
                        "INSERT INTO workflow_pattern
                             (id, code_hash, code, intent, embedding, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            id,
                            digest,
                            request.code,
                            request.intent,
                            embedding.as_deref().map(encode_embedding),
                            Timestamp::now().as_unix_millis()
                        ],
                    )?;
                    id
                }
            }
        };
        let fqdn = Fqdn::new(
            request.org.clone(),
            request.project.clone(),
            request.namespace.clone(),
            request.action.clone(),
            &digest[..4],
        )
        .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let record = self.registry.create(&CreateCapabilityRequest {
            fqdn,
            workflow_pattern_id: pattern_id,
            visibility: request.visibility,
            routing: request.routing,
            permission_set: request.permission_set,
            permission_source: request.permission_source,
            permission_confidence: request.permission_confidence,
        })?;
        // Keep the node embedding available for discovery sync.
        if let Some(embedding) = &embedding {
            self.store.lock().execute(
                "INSERT INTO tool_embedding (node_id, embedding) VALUES (?1, ?2)
                 ON CONFLICT (node_id) DO UPDATE SET embedding = excluded.embedding",
                params![record.id.to_string(), encode_embedding(embedding)],
            )?;
        }
        Ok(record)
    }

    /// Returns the code snippet behind a capability record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pattern is absent.
    pub fn pattern_code(&self, workflow_pattern_id: &str) -> Result<String, StoreError> {
        self.store
            .lock()
            .query_row(
                "SELECT code FROM workflow_pattern WHERE id = ?1",
                params![workflow_pattern_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("workflow pattern {workflow_pattern_id}")))
    }

    /// Counts workflow pattern rows (test support and metrics).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn pattern_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.store.lock().query_row(
            "SELECT COUNT(*) FROM workflow_pattern",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Upserts a tool schema node (startup ingest from MCP servers).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn upsert_node(&self, node: &GraphNode) -> Result<(), StoreError> {
        self.store.lock().execute(
            "INSERT INTO tool_schema (id, kind, name, server_id, success_rate, category, pure)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                 name = excluded.name,
                 success_rate = excluded.success_rate",
            params![
                node.id.as_str(),
                node.kind.as_str(),
                node.name,
                node.server_id.as_ref().map(ToString::to_string),
                node.success_rate,
                node.category.map(OperationCategory::as_str),
                node.pure.map(i64::from)
            ],
        )?;
        Ok(())
    }

    /// Creates or re-observes a dependency edge.
    ///
    /// Matches the in-memory observation semantics: count increments,
    /// inferred provenance upgrades to observed at the threshold, and the
    /// confidence column always holds the formula value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn add_dependency(
        &self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
        source: EdgeSource,
    ) -> Result<GraphEdge, StoreError> {
        let connection = self.store.lock();
        let existing: Option<(i64, String)> = connection
            .query_row(
                "SELECT count, edge_source FROM tool_dependency
                 WHERE from_node = ?1 AND to_node = ?2 AND edge_type = ?3",
                params![from.as_str(), to.as_str(), kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let edge = match existing {
            Some((count, source_label)) => {
                let stored_source = EdgeSource::parse(&source_label)
                    .ok_or_else(|| StoreError::Corrupt(format!("edge source `{source_label}`")))?;
                let mut edge = GraphEdge {
                    from: from.clone(),
                    to: to.clone(),
                    kind,
                    source: stored_source,
                    count: count as u64,
                    confidence: edge_weight(kind, stored_source),
                };
                edge.observe();
                edge
            }
            None => GraphEdge::new(from.clone(), to.clone(), kind, source),
        };
        connection.execute(
            "INSERT INTO tool_dependency
                 (from_node, to_node, edge_type, edge_source, count, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (from_node, to_node, edge_type) DO UPDATE SET
                 edge_source = excluded.edge_source,
                 count = excluded.count,
                 confidence = excluded.confidence",
            params![
                edge.from.as_str(),
                edge.to.as_str(),
                edge.kind.as_str(),
                edge.source.as_str(),
                edge.count as i64,
                edge.confidence
            ],
        )?;
        Ok(edge)
    }

    /// Returns the dependencies of a node in a direction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn get_dependencies(
        &self,
        id: &NodeId,
        direction: DependencyDirection,
    ) -> Result<Vec<GraphEdge>, StoreError> {
        let sql = match direction {
            DependencyDirection::From => {
                "SELECT * FROM tool_dependency WHERE from_node = ?1"
            }
            DependencyDirection::To => "SELECT * FROM tool_dependency WHERE to_node = ?1",
            DependencyDirection::Both => {
                "SELECT * FROM tool_dependency WHERE from_node = ?1 OR to_node = ?1"
            }
        };
        let connection = self.store.lock();
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params![id.as_str()], read_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Returns every dependency at or above a confidence floor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn get_all_dependencies(&self, min_confidence: f64) -> Result<Vec<GraphEdge>, StoreError> {
        let connection = self.store.lock();
        let mut statement =
            connection.prepare("SELECT * FROM tool_dependency WHERE confidence >= ?1")?;
        let rows = statement
            .query_map(params![min_confidence], read_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Removes a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the edge is absent.
    pub fn remove_dependency(
        &self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
    ) -> Result<(), StoreError> {
        let removed = self.store.lock().execute(
            "DELETE FROM tool_dependency
             WHERE from_node = ?1 AND to_node = ?2 AND edge_type = ?3",
            params![from.as_str(), to.as_str(), kind.as_str()],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!(
                "dependency {} -> {} ({})",
                from,
                to,
                kind.as_str()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Graph Store Adapter
// ============================================================================

#[async_trait]
impl GraphStore for CapabilityStore {
    async fn load_nodes(&self) -> Result<Vec<GraphNode>, GatewayError> {
        let connection = self.store.lock();
        let mut nodes = Vec::new();
        let mut statement = connection
            .prepare("SELECT id, kind, name, server_id, success_rate, category, pure FROM tool_schema")
            .map_err(StoreError::from)?;
        let schema_rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                ))
            })
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        for (id_raw, kind_raw, name, server_raw, success_rate, category_raw, pure) in schema_rows {
            nodes.push(decode_schema_node(
                &id_raw,
                &kind_raw,
                name,
                server_raw,
                success_rate,
                category_raw,
                pure,
            )?);
        }
        let mut statement = connection
            .prepare(
                "SELECT id, namespace, action, usage_count, success_count FROM capability_records",
            )
            .map_err(StoreError::from)?;
        let capability_rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        for (id_raw, namespace, action, usage, success) in capability_rows {
            let id = NodeId::parse(&id_raw)
                .map_err(|err| GatewayError::Internal(format!("capability node id: {err}")))?;
            let mut node = GraphNode::capability(id, format!("{namespace}:{action}"));
            if usage > 0 {
                node = node.with_success_rate(success as f64 / usage as f64);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    async fn load_edges(&self) -> Result<Vec<GraphEdge>, GatewayError> {
        let connection = self.store.lock();
        let mut statement =
            connection.prepare("SELECT * FROM tool_dependency").map_err(StoreError::from)?;
        let rows = statement
            .query_map([], read_edge)
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        let edges: Result<Vec<GraphEdge>, StoreError> = rows.into_iter().collect();
        Ok(edges?)
    }

    async fn persist_edge(&self, edge: &GraphEdge) -> Result<(), GatewayError> {
        self.store
            .lock()
            .execute(
                "INSERT INTO tool_dependency
                     (from_node, to_node, edge_type, edge_source, count, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (from_node, to_node, edge_type) DO UPDATE SET
                     edge_source = excluded.edge_source,
                     count = excluded.count,
                     confidence = excluded.confidence",
                params![
                    edge.from.as_str(),
                    edge.to.as_str(),
                    edge.kind.as_str(),
                    edge.source.as_str(),
                    edge.count as i64,
                    edge.confidence
                ],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Computes the lowercase hex SHA-256 digest of a code snippet.
#[must_use]
pub fn hex_digest(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Encodes an embedding as little-endian f32 bytes.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes one dependency row.
fn read_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<GraphEdge, StoreError>> {
    let from_raw: String = row.get("from_node")?;
    let to_raw: String = row.get("to_node")?;
    let kind_raw: String = row.get("edge_type")?;
    let source_raw: String = row.get("edge_source")?;
    let count: i64 = row.get("count")?;
    let confidence: f64 = row.get("confidence")?;
    Ok((|| {
        let from =
            NodeId::parse(&from_raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let to = NodeId::parse(&to_raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let kind = EdgeKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("edge type `{kind_raw}`")))?;
        let source = EdgeSource::parse(&source_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("edge source `{source_raw}`")))?;
        Ok(GraphEdge {
            from,
            to,
            kind,
            source,
            count: count as u64,
            confidence,
        })
    })())
}

/// Decodes a `tool_schema` row into a graph node.
fn decode_schema_node(
    id_raw: &str,
    kind_raw: &str,
    name: String,
    server_raw: Option<String>,
    success_rate: Option<f64>,
    category_raw: Option<String>,
    pure: Option<i64>,
) -> Result<GraphNode, StoreError> {
    let id = NodeId::parse(id_raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let kind = match kind_raw {
        "tool" => NodeKind::Tool,
        "capability" => NodeKind::Capability,
        "operation" => NodeKind::Operation,
        other => return Err(StoreError::Corrupt(format!("node kind `{other}`"))),
    };
    let server_id = match server_raw {
        Some(raw) => Some(
            pml_gateway_core::types::identifiers::ServerId::new(raw)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?,
        ),
        None => None,
    };
    let category = match category_raw.as_deref() {
        None => None,
        Some("array") => Some(OperationCategory::Array),
        Some("string") => Some(OperationCategory::String),
        Some("object") => Some(OperationCategory::Object),
        Some("math") => Some(OperationCategory::Math),
        Some("json") => Some(OperationCategory::Json),
        Some("binary") => Some(OperationCategory::Binary),
        Some("logical") => Some(OperationCategory::Logical),
        Some("bitwise") => Some(OperationCategory::Bitwise),
        Some(other) => return Err(StoreError::Corrupt(format!("operation category `{other}`"))),
    };
    Ok(GraphNode {
        id,
        kind,
        name,
        server_id,
        success_rate,
        category,
        pure: pure.map(|value| value != 0),
    })
}
