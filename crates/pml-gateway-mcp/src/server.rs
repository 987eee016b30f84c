// crates/pml-gateway-mcp/src/server.rs
// ============================================================================
// Module: Gateway Server Wiring
// Description: Leaves-first subsystem construction and HTTP serving.
// Purpose: Bring the gateway up in dependency order and serve transports.
// Dependencies: axum, pml-gateway-core, pml-gateway-graph,
//               pml-gateway-sandbox, pml-gateway-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! Wiring follows the leaves-first order: event bus, connection pool,
//! store, knowledge graph, search, sandbox bridge, executor, graph-sync
//! controller, SSE fan-out, and finally the dispatcher surface. The sync
//! controller subscribes to the bus by event type and holds no
//! back-reference to the store. Once wiring completes a `system.startup`
//! event is emitted. Serving binds the configured address and reports a
//! distinct error when the port is already taken so the CLI can exit with
//! its documented code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use pml_gateway_core::bus::EventBus;
use pml_gateway_core::error::GatewayError;
use pml_gateway_core::executor::AilConfig;
use pml_gateway_core::executor::AilTrigger;
use pml_gateway_core::executor::ApprovalRequired;
use pml_gateway_core::executor::ControlledExecutor;
use pml_gateway_core::executor::ExecutorConfig;
use pml_gateway_core::executor::HilConfig;
use pml_gateway_core::interfaces::CapabilityRunner;
use pml_gateway_core::interfaces::EmbeddingProvider;
use pml_gateway_core::interfaces::ToolClient;
use pml_gateway_core::interfaces::ToolError;
use pml_gateway_core::interfaces::ToolExecutor;
use pml_gateway_core::interfaces::VectorError;
use pml_gateway_core::pool::ConnectionPool;
use pml_gateway_core::pool::PoolConfig;
use pml_gateway_core::types::capability::Scope;
use pml_gateway_core::types::event::GatewayEvent;
use pml_gateway_core::types::event::event_types;
use pml_gateway_core::types::identifiers::ServerId;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::permission::PermissionSet;
use pml_gateway_core::types::permission::effective_permission_set;
use pml_gateway_core::types::workflow::TaskSpec;
use pml_gateway_graph::EmergenceMetrics;
use pml_gateway_graph::GraphStore;
use pml_gateway_graph::GraphSyncController;
use pml_gateway_graph::InMemoryVectorIndex;
use pml_gateway_graph::KnowledgeGraph;
use pml_gateway_graph::UnifiedSearch;
use pml_gateway_sandbox::BridgeConfig;
use pml_gateway_sandbox::CapabilityDispatcher;
use pml_gateway_sandbox::SandboxBridge;
use pml_gateway_sandbox::SubprocessWorker;
use pml_gateway_sandbox::SubprocessWorkerConfig;
use pml_gateway_sandbox::ToolDispatcher;
use pml_gateway_sandbox::Worker;
use pml_gateway_sandbox::WorkerError;
use pml_gateway_sandbox::WorkerSession;
use pml_gateway_store_sqlite::ApiKeyStore;
use pml_gateway_store_sqlite::CapabilityRegistry;
use pml_gateway_store_sqlite::CapabilityStore;
use pml_gateway_store_sqlite::SqliteStore;
use pml_gateway_store_sqlite::SqliteStoreConfig;
use pml_gateway_store_sqlite::TraceStore;

use crate::auth::AuthGate;
use crate::config::GatewayConfig;
use crate::http::HttpContext;
use crate::rpc::McpService;
use crate::sse::EventStreamManager;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle errors.
///
/// # Invariants
/// - `PortInUse` is distinguishable for the CLI's exit-code contract.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Initialization failed (database, wiring).
    #[error("gateway initialization failed: {0}")]
    Init(String),
    /// The configured port is already taken.
    #[error("port {0} already in use")]
    PortInUse(u16),
    /// Serving failed after startup.
    #[error("gateway serve failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Local Collaborator Defaults
// ============================================================================

/// Deterministic character-trigram feature-hash embedding.
///
/// Local-mode stand-in for the external embedding model; deployments plug a
/// real provider through the same interface.
pub struct HashedEmbeddings {
    /// Embedding dimension.
    dimension: usize,
}

impl HashedEmbeddings {
    /// Creates a provider with the given dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_ascii_lowercase();
        let bytes = lowered.as_bytes();
        if bytes.len() < 3 {
            let mut hasher = DefaultHasher::new();
            hasher.write(bytes);
            vector[(hasher.finish() as usize) % self.dimension] = 1.0;
            return Ok(vector);
        }
        for trigram in bytes.windows(3) {
            let mut hasher = DefaultHasher::new();
            hasher.write(trigram);
            let slot = (hasher.finish() as usize) % self.dimension;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

/// Factory seam for per-server MCP protocol clients.
#[async_trait]
pub trait ToolClientFactory: Send + Sync {
    /// Creates a client for the named server.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the server cannot be reached.
    async fn create(&self, server: &ServerId) -> Result<Arc<dyn ToolClient>, GatewayError>;
}

/// Tool executor over the connection pool.
pub struct PooledToolExecutor {
    /// Shared pool.
    pool: ConnectionPool,
    /// Client factory; absent in tool-less local runs.
    factory: Option<Arc<dyn ToolClientFactory>>,
}

#[async_trait]
impl ToolExecutor for PooledToolExecutor {
    async fn execute(&self, task: &TaskSpec, args: Value) -> Result<Value, ToolError> {
        let (server_raw, tool) = task
            .tool
            .split_once(':')
            .ok_or_else(|| ToolError::UnknownTool(task.tool.clone()))?;
        let server = ServerId::new(server_raw)
            .map_err(|_| ToolError::UnknownServer(server_raw.to_string()))?;
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| ToolError::UnknownServer(server_raw.to_string()))?;
        let client = self
            .pool
            .acquire(&server, || async { factory.create(&server).await })
            .await
            .map_err(|err| ToolError::CallFailed(err.to_string()))?;
        let result = client.call_tool(tool, args).await;
        self.pool.release(&server).await;
        result
    }
}

/// Worker factory used when no sandbox runtime is configured.
struct DisabledWorker;

#[async_trait]
impl Worker for DisabledWorker {
    async fn start(
        &self,
        _permission_set: PermissionSet,
    ) -> Result<Box<dyn WorkerSession>, WorkerError> {
        Err(WorkerError::Spawn("sandbox runtime not configured".to_string()))
    }
}

// ============================================================================
// SECTION: Sandbox Dispatch Wiring
// ============================================================================

/// Tool dispatch table bridging sandbox calls onto the tool executor.
struct GatewayToolDispatcher {
    /// Executor shared with the DAG engine.
    executor: Arc<PooledToolExecutor>,
    /// Advertised table (server to tool names) from the schema store.
    table: Map<String, Value>,
}

#[async_trait]
impl ToolDispatcher for GatewayToolDispatcher {
    fn tool_table(&self) -> Map<String, Value> {
        self.table.clone()
    }

    async fn call_tool(&self, server: &str, tool: &str, args: Value) -> Result<Value, String> {
        let task = TaskSpec::tool_task(format!("sandbox_{server}_{tool}"), format!("{server}:{tool}"));
        self.executor.execute(&task, args).await.map_err(|err| err.to_string())
    }
}

/// Capability dispatch resolving names through the registry and re-entering
/// the bridge at increased depth.
struct RegistryCapabilityDispatcher {
    /// Capability registry for resolution and usage metering.
    registry: CapabilityRegistry,
    /// Capability store for pattern code.
    capabilities: CapabilityStore,
    /// Default resolution scope.
    scope: Scope,
    /// Bridge set after construction (the bridge owns this dispatcher).
    bridge: OnceLock<Arc<SandboxBridge>>,
}

#[async_trait]
impl CapabilityDispatcher for RegistryCapabilityDispatcher {
    fn capability_names(&self) -> Vec<String> {
        self.registry
            .list(&self.scope, &pml_gateway_store_sqlite::ListOptions::default())
            .map(|(records, _)| records.iter().map(|record| record.display_name()).collect())
            .unwrap_or_default()
    }

    async fn call_capability(
        &self,
        name: &str,
        args: Value,
        parent_trace_id: Option<TraceId>,
        depth: u32,
    ) -> Result<Value, String> {
        let bridge = self.bridge.get().ok_or("sandbox bridge not wired")?;
        let record = self.registry.resolve(name, &self.scope).map_err(|err| err.to_string())?;
        let code =
            self.capabilities.pattern_code(&record.workflow_pattern_id).map_err(|err| err.to_string())?;
        let effective = effective_permission_set(
            record.permission_set,
            record.permission_source,
            record.permission_confidence,
        );
        let started = std::time::Instant::now();
        let outcome = bridge
            .execute_at_depth(&code, json!({ "args": args }), effective, parent_trace_id, depth)
            .await
            .map_err(|err| err.to_string())?;
        let latency = started.elapsed().as_millis() as u64;
        if let Err(err) = self.registry.record_usage(&record.id, outcome.success, latency) {
            tracing::warn!(error = %err, "capability usage metering failed");
        }
        if outcome.success {
            Ok(outcome.result.unwrap_or(Value::Null))
        } else {
            Err(outcome.error.unwrap_or_else(|| "capability failed".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Fully wired gateway.
pub struct GatewayServer {
    /// Configuration.
    pub config: GatewayConfig,
    /// Event bus (leaf singleton).
    pub bus: EventBus,
    /// Connection pool (leaf singleton).
    pub pool: ConnectionPool,
    /// Knowledge graph.
    pub graph: KnowledgeGraph,
    /// Graph-sync controller.
    pub sync_controller: Arc<GraphSyncController>,
    /// SSE fan-out.
    pub sse: EventStreamManager,
    /// JSON-RPC service.
    pub mcp: McpService,
    /// HTTP context for the axum surface.
    pub http: Arc<HttpContext>,
}

impl GatewayServer {
    /// Wires every subsystem leaves-first.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Init`] on store or wiring failure.
    pub async fn build(config: GatewayConfig) -> Result<Self, ServeError> {
        // Leaves first: bus, then pool.
        let bus = EventBus::new();
        let pool = ConnectionPool::new(PoolConfig {
            max_connections: config.pool.max_connections,
            idle_timeout: Duration::from_secs(config.pool.idle_timeout_secs),
        });

        // Store layer.
        let store = match &config.store_path {
            Some(path) => SqliteStore::open(&SqliteStoreConfig::new(path))
                .map_err(|err| ServeError::Init(err.to_string()))?,
            None => SqliteStore::open_in_memory()
                .map_err(|err| ServeError::Init(err.to_string()))?,
        };
        let registry = CapabilityRegistry::new(store.clone());
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(HashedEmbeddings::new(256));
        let capabilities =
            CapabilityStore::new(store.clone(), registry.clone(), Some(Arc::clone(&embeddings)));
        let traces = TraceStore::new(store.clone());
        let api_keys = ApiKeyStore::new(store);

        // Graph over the store; initial sync is tolerated to be empty.
        let graph = KnowledgeGraph::new(
            bus.clone(),
            Some(Arc::new(capabilities.clone()) as Arc<dyn GraphStore>),
        );
        if let Err(err) = graph.sync_from_store().await {
            return Err(ServeError::Init(err.to_string()));
        }

        // Discovery.
        let index = Arc::new(InMemoryVectorIndex::new());
        let search = Arc::new(UnifiedSearch::new(
            Arc::clone(&embeddings),
            Arc::clone(&index) as Arc<dyn pml_gateway_core::interfaces::VectorIndex>,
            graph.clone(),
        ));

        // Sandbox bridge.
        let tool_executor = Arc::new(PooledToolExecutor {
            pool: pool.clone(),
            factory: None,
        });
        let worker: Arc<dyn Worker> = if config.sandbox.worker_command.is_empty() {
            Arc::new(DisabledWorker)
        } else {
            Arc::new(SubprocessWorker::new(SubprocessWorkerConfig::new(
                config.sandbox.worker_command.clone(),
            )))
        };
        let scope = Scope {
            org: "local".to_string(),
            project: "default".to_string(),
        };
        let capability_dispatcher = Arc::new(RegistryCapabilityDispatcher {
            registry: registry.clone(),
            capabilities: capabilities.clone(),
            scope,
            bridge: OnceLock::new(),
        });
        let bridge = Arc::new(SandboxBridge::new(
            worker,
            Arc::new(GatewayToolDispatcher {
                executor: Arc::clone(&tool_executor),
                table: Map::new(),
            }),
            Arc::clone(&capability_dispatcher) as Arc<dyn CapabilityDispatcher>,
            BridgeConfig {
                run_timeout: Duration::from_secs(config.sandbox.run_timeout_secs),
                max_capability_depth: config.sandbox.max_capability_depth,
                ..BridgeConfig::default()
            },
        ));
        let _ = capability_dispatcher.bridge.set(Arc::clone(&bridge));

        // Executor over tools and the sandbox runner.
        let executor = Arc::new(ControlledExecutor::new(
            tool_executor,
            Some(Arc::clone(&bridge) as Arc<dyn CapabilityRunner>),
            bus.clone(),
            ExecutorConfig {
                max_concurrency: config.executor.max_concurrency,
                task_timeout: Duration::from_secs(config.executor.task_timeout_secs),
                ail: AilConfig {
                    enabled: config.executor.ail.enabled,
                    trigger: AilTrigger::PerLayer,
                    timeout: Duration::from_secs(config.executor.ail.timeout_secs),
                },
                hil: HilConfig {
                    enabled: config.executor.hil.enabled,
                    approval_required: if config.executor.hil.enabled {
                        ApprovalRequired::Always
                    } else {
                        ApprovalRequired::Never
                    },
                    timeout: Duration::from_secs(config.executor.hil.timeout_secs),
                },
            },
        ));

        // Event-driven graph sync; subscribes by type, no back-reference.
        let sync_controller = Arc::new(GraphSyncController::new(
            bus.clone(),
            graph.clone(),
            Arc::clone(&index) as Arc<dyn pml_gateway_core::interfaces::VectorIndex>,
            None,
        ));
        sync_controller.start();

        // Outer surface.
        let sse = EventStreamManager::start(bus.clone(), config.sse);
        let mcp = McpService::new(
            search,
            executor,
            Arc::clone(&bridge) as Arc<dyn CapabilityRunner>,
            graph.clone(),
            traces,
        );
        let auth = AuthGate::new(config.mode, Arc::new(api_keys), &config.admin_usernames)
            .map_err(|err| ServeError::Init(err.to_string()))?;
        let http = Arc::new(HttpContext {
            config: config.clone(),
            auth,
            graph: Some(graph.clone()),
            registry,
            capabilities,
            sse: sse.clone(),
            mcp: mcp.clone(),
            emergence: Arc::new(Mutex::new(EmergenceMetrics::new())),
        });

        bus.emit(GatewayEvent::new(
            event_types::SYSTEM_STARTUP,
            "server",
            json!({ "mode": config.mode.as_str() }),
        ));
        tracing::debug!("gateway wiring complete");

        Ok(Self {
            config,
            bus,
            pool,
            graph,
            sync_controller,
            sse,
            mcp,
            http,
        })
    }

    /// Binds the HTTP listener and serves until the future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::PortInUse`] when the bind address is taken and
    /// [`ServeError::Serve`] on runtime failure.
    pub async fn serve_http(&self) -> Result<(), ServeError> {
        let address = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = match tokio::net::TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                return Err(ServeError::PortInUse(self.config.server.port));
            }
            Err(err) => return Err(ServeError::Init(err.to_string())),
        };
        let router = crate::http::router(Arc::clone(&self.http))
            .map_err(|err| ServeError::Init(err.to_string()))?;
        tracing::debug!(%address, "gateway listening");
        axum::serve(listener, router)
            .await
            .map_err(|err| ServeError::Serve(err.to_string()))
    }

    /// Serves the MCP method set over process stdio.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Serve`] on channel failure.
    pub async fn serve_stdio(&self) -> Result<(), ServeError> {
        crate::stdio::serve_process_stdio(&self.mcp)
            .await
            .map_err(|err| ServeError::Serve(err.to_string()))
    }

    /// Shuts the gateway down: SSE, sync controller, pool, and bus.
    pub async fn shutdown(&self) {
        self.sse.close();
        self.sync_controller.stop();
        self.pool.close().await;
        self.bus.close();
    }
}

#[cfg(test)]
mod tests;
