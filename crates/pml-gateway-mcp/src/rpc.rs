// crates/pml-gateway-mcp/src/rpc.rs
// ============================================================================
// Module: MCP JSON-RPC Service
// Description: `tools/list` and `tools/call` over the gateway built-ins.
// Purpose: Serve `pml:discover` and `pml:execute` (plus deprecated
//          synonyms) on both transports.
// Dependencies: pml-gateway-core, pml-gateway-graph, pml-gateway-store-sqlite
// ============================================================================

//! ## Overview
//! One service handles the JSON-RPC method set for both transports. A
//! discover call fans into unified search; an execute call either runs
//! user code through the sandbox runner or compiles the submitted tasks
//! into a DAG and runs the controlled executor, persisting the resulting
//! execution trace and feeding the knowledge graph. Invalid parameters and
//! unknown tools reply with JSON-RPC error code `-32602`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::executor::ControlledExecutor;
use pml_gateway_core::executor::TaskStatus;
use pml_gateway_core::executor::WorkflowOutcome;
use pml_gateway_core::executor::workflow_channel;
use pml_gateway_core::interfaces::CapabilityRunner;
use pml_gateway_core::interfaces::CodeRunRequest;
use pml_gateway_core::interfaces::GatewayMetrics;
use pml_gateway_core::interfaces::NoopMetrics;
use pml_gateway_core::interfaces::RequestMetricEvent;
use pml_gateway_core::interfaces::RequestOutcome;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::identifiers::WorkflowId;
use pml_gateway_core::types::permission::PermissionSet;
use pml_gateway_core::types::time::Timestamp;
use pml_gateway_core::types::trace::ExecutionTrace;
use pml_gateway_core::types::trace::TraceTaskResult;
use pml_gateway_core::types::workflow::TaskSpec;
use pml_gateway_core::types::workflow::WorkflowDag;
use pml_gateway_graph::DiscoveryKind;
use pml_gateway_graph::KnowledgeGraph;
use pml_gateway_graph::SearchOptions;
use pml_gateway_graph::UnifiedSearch;
use pml_gateway_store_sqlite::TraceStore;

// ============================================================================
// SECTION: JSON-RPC Envelope
// ============================================================================

/// JSON-RPC error code for invalid params and unknown tools.
pub const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC error code for unknown methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for internal faults.
pub const INTERNAL_ERROR: i64 = -32603;

/// One JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request identifier echoed in the response.
    #[serde(default)]
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// One JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Protocol version marker.
    pub jsonrpc: &'static str,
    /// Request identifier.
    pub id: Value,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// JSON-RPC service over the gateway built-ins.
#[derive(Clone)]
pub struct McpService {
    /// Discovery scorer.
    search: Arc<UnifiedSearch>,
    /// DAG executor.
    executor: Arc<ControlledExecutor>,
    /// Sandbox runner for code execution.
    runner: Arc<dyn CapabilityRunner>,
    /// Knowledge graph updated from completed executions.
    graph: KnowledgeGraph,
    /// Trace persistence.
    traces: TraceStore,
    /// Metrics sink; no-op unless a deployment plugs one in.
    metrics: Arc<dyn GatewayMetrics>,
}

impl McpService {
    /// Creates the service over wired components.
    #[must_use]
    pub fn new(
        search: Arc<UnifiedSearch>,
        executor: Arc<ControlledExecutor>,
        runner: Arc<dyn CapabilityRunner>,
        graph: KnowledgeGraph,
        traces: TraceStore,
    ) -> Self {
        Self {
            search,
            executor,
            runner,
            graph,
            traces,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handles one JSON-RPC request.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let started = Instant::now();
        let operation = request.method.clone();
        let response = match request.method.as_str() {
            "tools/list" => JsonRpcResponse::success(request.id, tools_list()),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::failure(
                request.id,
                METHOD_NOT_FOUND,
                format!("unknown method `{}`", request.method),
            ),
        };
        let event = RequestMetricEvent {
            surface: "rpc",
            operation,
            outcome: if response.error.is_none() {
                RequestOutcome::Ok
            } else {
                RequestOutcome::Error
            },
            error_kind: None,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, started.elapsed());
        response
    }

    /// Handles `tools/call`.
    async fn handle_tools_call(&self, id: Value, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let outcome = match name {
            "pml:discover" => self.discover(arguments, DiscoveryKind::All).await,
            // Deprecated synonyms kept for older clients.
            "pml:search_tools" => self.discover(arguments, DiscoveryKind::Tool).await,
            "pml:search_capabilities" => {
                self.discover(arguments, DiscoveryKind::Capability).await
            }
            "pml:execute" => self.execute(arguments).await,
            "pml:execute_dag" => self.execute_dag(arguments).await,
            "pml:execute_code" => self.execute_code(arguments).await,
            other => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("unknown tool `{other}`"),
                );
            }
        };
        match outcome {
            Ok(payload) => JsonRpcResponse::success(
                id,
                json!({ "content": [{ "type": "text", "text": payload.to_string() }] }),
            ),
            Err(err @ GatewayError::Validation(_)) => {
                JsonRpcResponse::failure(id, INVALID_PARAMS, err.to_string())
            }
            Err(err) => JsonRpcResponse::failure(id, INTERNAL_ERROR, err.to_string()),
        }
    }

    /// Runs a discovery query.
    async fn discover(
        &self,
        arguments: Value,
        default_kind: DiscoveryKind,
    ) -> Result<Value, GatewayError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Validation("missing `query`".to_string()))?;
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(10, |limit| limit as usize);
        let min_score = arguments.get("min_score").and_then(Value::as_f64);
        let kind = match arguments.get("type").and_then(Value::as_str) {
            Some("tool") => DiscoveryKind::Tool,
            Some("capability") => DiscoveryKind::Capability,
            Some("all") => DiscoveryKind::All,
            Some(other) => {
                return Err(GatewayError::Validation(format!("unknown type `{other}`")));
            }
            None => default_kind,
        };
        let hits = self
            .search
            .discover(
                query,
                SearchOptions {
                    limit,
                    min_score,
                    kind,
                },
            )
            .await?;
        Ok(json!({ "results": hits }))
    }

    /// Routes `pml:execute` by argument shape: tasks run as a DAG, code
    /// runs in the sandbox.
    async fn execute(&self, arguments: Value) -> Result<Value, GatewayError> {
        if arguments.get("tasks").is_some() {
            return self.execute_dag(arguments).await;
        }
        if arguments.get("code").is_some() {
            return self.execute_code(arguments).await;
        }
        Err(GatewayError::Validation("expected `tasks` or `code`".to_string()))
    }

    /// Compiles and runs a task DAG.
    async fn execute_dag(&self, arguments: Value) -> Result<Value, GatewayError> {
        let tasks_value = arguments
            .get("tasks")
            .cloned()
            .ok_or_else(|| GatewayError::Validation("missing `tasks`".to_string()))?;
        let tasks: Vec<TaskSpec> = serde_json::from_value(tasks_value)
            .map_err(|err| GatewayError::Validation(format!("tasks: {err}")))?;
        let dag = WorkflowDag::new(tasks)
            .map_err(|err| GatewayError::Validation(err.to_string()))?;
        let context = arguments.get("context").cloned().unwrap_or_else(|| json!({}));
        let workflow_id = WorkflowId::generate();
        let (_handle, queue) = workflow_channel();
        let started = Timestamp::now();
        let outcome =
            self.executor.execute(workflow_id, dag.clone(), context.clone(), queue).await?;
        self.graph.update_from_execution(&dag).await;
        self.persist_outcome(&dag, &outcome, context, started);
        Ok(json!({
            "workflow_id": outcome.workflow_id,
            "success": outcome.success,
            "successfulTasks": outcome.successful_tasks,
            "failedTasks": outcome.failed_tasks,
            "failedSafeTasks": outcome.failed_safe_tasks,
            "records": outcome.records,
            "errors": outcome.errors,
        }))
    }

    /// Runs user code in the sandbox.
    async fn execute_code(&self, arguments: Value) -> Result<Value, GatewayError> {
        let code = arguments
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Validation("missing `code`".to_string()))?;
        let context = arguments.get("context").cloned().unwrap_or_else(|| json!({}));
        let permission_set = match arguments.get("permission_set").and_then(Value::as_str) {
            Some(label) => PermissionSet::parse(label)
                .ok_or_else(|| GatewayError::Validation(format!("permission set `{label}`")))?,
            None => PermissionSet::Minimal,
        };
        let outcome = self
            .runner
            .run_code(CodeRunRequest {
                code: code.to_string(),
                context,
                capability_id: None,
                parent_trace_id: None,
                permission_set,
            })
            .await?;
        Ok(json!({
            "success": outcome.success,
            "result": outcome.result,
            "error": outcome.error,
            "traces": outcome.traces,
        }))
    }

    /// Persists the execution trace of a completed workflow.
    fn persist_outcome(
        &self,
        dag: &WorkflowDag,
        outcome: &WorkflowOutcome,
        context: Value,
        started: Timestamp,
    ) {
        let executed_path: Vec<NodeId> = outcome
            .records
            .iter()
            .filter_map(|record| dag.task(&record.task_id))
            .filter_map(|task| NodeId::parse(task.tool.clone()).ok())
            .collect();
        let task_results: Vec<TraceTaskResult> = outcome
            .records
            .iter()
            .map(|record| TraceTaskResult {
                task_id: record.task_id.clone(),
                tool: dag
                    .task(&record.task_id)
                    .map(|task| task.tool.clone())
                    .unwrap_or_default(),
                args: Value::Null,
                result: record.output.clone(),
                success: record.status == TaskStatus::Success,
                duration_ms: record.duration_ms,
            })
            .collect();
        let now = Timestamp::now();
        let trace = ExecutionTrace {
            id: TraceId::generate(),
            capability_id: None,
            intent_text: None,
            initial_context: context,
            executed_at: started,
            success: outcome.success,
            duration_ms: now.millis_since(started),
            error_message: outcome.errors.first().cloned(),
            executed_path,
            decisions: Vec::new(),
            task_results,
            priority: 0.5,
            parent_trace_id: None,
            user_id: "local".to_string(),
            created_by: "executor".to_string(),
        };
        if let Err(err) = self.traces.insert(&trace) {
            tracing::warn!(error = %err, "trace persistence failed");
        }
    }
}

// ============================================================================
// SECTION: Tool Catalog
// ============================================================================

/// Builds the `tools/list` payload.
fn tools_list() -> Value {
    let discover_schema = json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "limit": { "type": "integer" },
            "min_score": { "type": "number" },
            "type": { "type": "string", "enum": ["tool", "capability", "all"] }
        },
        "required": ["query"]
    });
    let execute_schema = json!({
        "type": "object",
        "properties": {
            "tasks": { "type": "array" },
            "code": { "type": "string" },
            "context": { "type": "object" },
            "permission_set": { "type": "string" }
        }
    });
    json!({
        "tools": [
            {
                "name": "pml:discover",
                "description": "Discover tools and capabilities semantically.",
                "inputSchema": discover_schema,
            },
            {
                "name": "pml:execute",
                "description": "Execute a task DAG or a code snippet.",
                "inputSchema": execute_schema,
            },
            {
                "name": "pml:search_tools",
                "description": "Deprecated: use pml:discover with type=tool.",
                "inputSchema": discover_schema,
            },
            {
                "name": "pml:search_capabilities",
                "description": "Deprecated: use pml:discover with type=capability.",
                "inputSchema": discover_schema,
            },
            {
                "name": "pml:execute_dag",
                "description": "Deprecated: use pml:execute with tasks.",
                "inputSchema": execute_schema,
            },
            {
                "name": "pml:execute_code",
                "description": "Deprecated: use pml:execute with code.",
                "inputSchema": execute_schema,
            }
        ]
    })
}
