// crates/pml-gateway-sandbox/src/bridge.rs
// ============================================================================
// Module: Sandbox Worker Bridge
// Description: Host-side arbitration of worker tool/capability RPCs.
// Purpose: Dispatch worker calls against the tool and capability tables,
//          capture the trace timeline, and enforce depth and deadlines.
// Dependencies: pml-gateway-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The bridge owns one worker run: it boots a worker under the effective
//! permission set, sends the run frame with both dispatch tables, then
//! arbitrates every `tool_call` and `capability_call` frame against the
//! host-side dispatchers. Around each arbitrated call the bridge records
//! start and end trace entries with sanitized results; the timeline
//! accumulates across runs of one bridge session. Capability re-entry is
//! bounded by a depth limit and the whole run by a deadline.
//! Invariants:
//! - User-code faults surface as `{success: false, error}` outcomes.
//! - Worker frames are untrusted; malformed frames fail the run closed.
//! - `terminate` kills the worker and fails pending RPCs immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::interfaces::CapabilityRunner;
use pml_gateway_core::interfaces::CodeRunOutcome;
use pml_gateway_core::interfaces::CodeRunRequest;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::permission::PermissionSet;
use pml_gateway_core::types::time::Timestamp;

use crate::protocol::TraceEntry;
use crate::protocol::TraceEntryKind;
use crate::protocol::WorkerFrame;
use crate::protocol::sanitize_result;
use crate::worker::Worker;
use crate::worker::WorkerSession;

// ============================================================================
// SECTION: Dispatch Interfaces
// ============================================================================

/// Host-side tool dispatch table.
///
/// The table form (`server → tool names`) is shipped to the worker; calls
/// come back by name and are arbitrated here.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Returns the dispatch table advertised to the worker.
    fn tool_table(&self) -> Map<String, Value>;

    /// Invokes a tool on behalf of the worker.
    ///
    /// # Errors
    ///
    /// Returns a display message; the bridge forwards it to the worker.
    async fn call_tool(&self, server: &str, tool: &str, args: Value) -> Result<Value, String>;
}

/// Host-side capability dispatch table.
#[async_trait]
pub trait CapabilityDispatcher: Send + Sync {
    /// Returns the capability names advertised to the worker.
    fn capability_names(&self) -> Vec<String>;

    /// Invokes a capability on behalf of the worker.
    ///
    /// `depth` is the re-entry depth of the nested run.
    ///
    /// # Errors
    ///
    /// Returns a display message; the bridge forwards it to the worker.
    async fn call_capability(
        &self,
        name: &str,
        args: Value,
        parent_trace_id: Option<TraceId>,
        depth: u32,
    ) -> Result<Value, String>;
}

// ============================================================================
// SECTION: Config and Outcomes
// ============================================================================

/// Bridge configuration.
///
/// # Invariants
/// - `max_capability_depth` bounds re-entrant capability calls.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Deadline for one worker run.
    pub run_timeout: Duration,
    /// Deadline for one arbitrated RPC.
    pub rpc_timeout: Duration,
    /// Maximum capability re-entry depth.
    pub max_capability_depth: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(10),
            max_capability_depth: 3,
        }
    }
}

/// Outcome of one sandbox run.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// Whether the user code completed successfully.
    pub success: bool,
    /// Sanitized return value on success.
    pub result: Option<Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Trace timeline of this run, in order.
    pub traces: Vec<TraceEntry>,
}

// ============================================================================
// SECTION: Bridge
// ============================================================================

/// Host side of the sandbox: one worker factory plus dispatch tables.
pub struct SandboxBridge {
    /// Worker factory.
    worker: Arc<dyn Worker>,
    /// Tool dispatch table.
    tools: Arc<dyn ToolDispatcher>,
    /// Capability dispatch table.
    capabilities: Arc<dyn CapabilityDispatcher>,
    /// Configuration.
    config: BridgeConfig,
    /// Timeline accumulated across runs of this bridge session.
    timeline: Mutex<Vec<TraceEntry>>,
}

impl SandboxBridge {
    /// Creates a bridge over the given worker and dispatch tables.
    #[must_use]
    pub fn new(
        worker: Arc<dyn Worker>,
        tools: Arc<dyn ToolDispatcher>,
        capabilities: Arc<dyn CapabilityDispatcher>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            worker,
            tools,
            capabilities,
            config,
            timeline: Mutex::new(Vec::new()),
        }
    }

    /// Executes a code snippet in a fresh worker.
    ///
    /// User-code faults are reported in the outcome. Depth starts at zero
    /// for directly submitted code.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] for host-side faults: worker boot failure,
    /// malformed frames, or the run deadline.
    pub async fn execute(
        &self,
        code: &str,
        context: Value,
        permission_set: PermissionSet,
        parent_trace_id: Option<TraceId>,
    ) -> Result<SandboxOutcome, GatewayError> {
        self.execute_at_depth(code, context, permission_set, parent_trace_id, 0).await
    }

    /// Executes a snippet at an explicit re-entry depth.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] for host-side faults and for depth
    /// exhaustion.
    pub async fn execute_at_depth(
        &self,
        code: &str,
        context: Value,
        permission_set: PermissionSet,
        parent_trace_id: Option<TraceId>,
        depth: u32,
    ) -> Result<SandboxOutcome, GatewayError> {
        if depth > self.config.max_capability_depth {
            return Err(GatewayError::Permission(format!(
                "capability re-entry depth {depth} exceeds limit {}",
                self.config.max_capability_depth
            )));
        }
        let mut session = self
            .worker
            .start(permission_set)
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        let run = WorkerFrame::Run {
            code: code.to_string(),
            context,
            tools: self.tools.tool_table(),
            capabilities: self.capabilities.capability_names(),
        };
        if let Err(err) = session.send(run).await {
            session.terminate().await;
            return Err(GatewayError::Unavailable(err.to_string()));
        }
        let trace_start = self.lock_timeline().len();
        let started = Instant::now();
        let outcome = loop {
            let remaining = self.config.run_timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                session.terminate().await;
                return Err(GatewayError::Timeout {
                    timeout_ms: self.config.run_timeout.as_millis() as u64,
                    context: "sandbox run".to_string(),
                });
            }
            let frame = match tokio::time::timeout(remaining, session.recv()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(err)) => {
                    session.terminate().await;
                    return Err(GatewayError::Internal(format!("worker channel: {err}")));
                }
                Err(_) => {
                    session.terminate().await;
                    return Err(GatewayError::Timeout {
                        timeout_ms: self.config.run_timeout.as_millis() as u64,
                        context: "sandbox run".to_string(),
                    });
                }
            };
            match frame {
                WorkerFrame::ToolCall {
                    call_id,
                    server,
                    tool,
                    args,
                } => {
                    let reply =
                        self.arbitrate_tool(&server, &tool, args, parent_trace_id).await;
                    let frame = match reply {
                        Ok(result) => WorkerFrame::ToolResult {
                            call_id,
                            success: true,
                            result: Some(result),
                            error: None,
                        },
                        Err(error) => WorkerFrame::ToolResult {
                            call_id,
                            success: false,
                            result: None,
                            error: Some(error),
                        },
                    };
                    if let Err(err) = session.send(frame).await {
                        session.terminate().await;
                        return Err(GatewayError::Internal(format!("worker channel: {err}")));
                    }
                }
                WorkerFrame::CapabilityCall {
                    call_id,
                    capability,
                    args,
                } => {
                    let reply = self
                        .arbitrate_capability(&capability, args, parent_trace_id, depth)
                        .await;
                    let frame = match reply {
                        Ok(result) => WorkerFrame::CapabilityResult {
                            call_id,
                            success: true,
                            result: Some(result),
                            error: None,
                        },
                        Err(error) => WorkerFrame::CapabilityResult {
                            call_id,
                            success: false,
                            result: None,
                            error: Some(error),
                        },
                    };
                    if let Err(err) = session.send(frame).await {
                        session.terminate().await;
                        return Err(GatewayError::Internal(format!("worker channel: {err}")));
                    }
                }
                WorkerFrame::RunResult {
                    success,
                    result,
                    error,
                } => {
                    break SandboxOutcome {
                        success,
                        result: result.as_ref().map(sanitize_result),
                        error,
                        traces: Vec::new(),
                    };
                }
                unexpected => {
                    session.terminate().await;
                    return Err(GatewayError::Internal(format!(
                        "unexpected worker frame: {unexpected:?}"
                    )));
                }
            }
        };
        session.terminate().await;
        let traces = self.lock_timeline()[trace_start..].to_vec();
        Ok(SandboxOutcome {
            traces,
            ..outcome
        })
    }

    /// Returns the timeline accumulated across runs of this session.
    #[must_use]
    pub fn get_traces(&self) -> Vec<TraceEntry> {
        self.lock_timeline().clone()
    }

    /// Arbitrates one tool call with tracing and the RPC deadline.
    async fn arbitrate_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
        parent_trace_id: Option<TraceId>,
    ) -> Result<Value, String> {
        let trace_id = TraceId::generate();
        let tool_label = format!("{server}:{tool}");
        self.push_entry(TraceEntry {
            kind: TraceEntryKind::ToolStart,
            ts: Timestamp::now(),
            trace_id,
            parent_trace_id,
            tool: Some(tool_label.clone()),
            capability: None,
            args: Some(args.clone()),
            success: None,
            duration_ms: None,
            result: None,
            error: None,
        });
        let started = Instant::now();
        let reply = tokio::time::timeout(
            self.config.rpc_timeout,
            self.tools.call_tool(server, tool, args),
        )
        .await
        .map_err(|_| format!("tool call timed out after {}ms", self.config.rpc_timeout.as_millis()))
        .and_then(|inner| inner);
        let duration_ms = started.elapsed().as_millis() as u64;
        let (success, result, error) = match &reply {
            Ok(value) => (true, Some(sanitize_result(value)), None),
            Err(message) => (false, None, Some(message.clone())),
        };
        self.push_entry(TraceEntry {
            kind: TraceEntryKind::ToolEnd,
            ts: Timestamp::now(),
            trace_id,
            parent_trace_id,
            tool: Some(tool_label),
            capability: None,
            args: None,
            success: Some(success),
            duration_ms: Some(duration_ms),
            result: result.clone(),
            error,
        });
        reply.map(|value| sanitize_result(&value))
    }

    /// Arbitrates one capability call with tracing and the depth limit.
    async fn arbitrate_capability(
        &self,
        capability: &str,
        args: Value,
        parent_trace_id: Option<TraceId>,
        depth: u32,
    ) -> Result<Value, String> {
        let trace_id = TraceId::generate();
        self.push_entry(TraceEntry {
            kind: TraceEntryKind::CapabilityStart,
            ts: Timestamp::now(),
            trace_id,
            parent_trace_id,
            tool: None,
            capability: Some(capability.to_string()),
            args: Some(args.clone()),
            success: None,
            duration_ms: None,
            result: None,
            error: None,
        });
        let started = Instant::now();
        let next_depth = depth + 1;
        let reply = if next_depth > self.config.max_capability_depth {
            Err(format!(
                "capability re-entry depth {next_depth} exceeds limit {}",
                self.config.max_capability_depth
            ))
        } else {
            tokio::time::timeout(
                self.config.rpc_timeout,
                self.capabilities.call_capability(capability, args, Some(trace_id), next_depth),
            )
            .await
            .map_err(|_| {
                format!("capability call timed out after {}ms", self.config.rpc_timeout.as_millis())
            })
            .and_then(|inner| inner)
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let (success, result, error) = match &reply {
            Ok(value) => (true, Some(sanitize_result(value)), None),
            Err(message) => (false, None, Some(message.clone())),
        };
        self.push_entry(TraceEntry {
            kind: TraceEntryKind::CapabilityEnd,
            ts: Timestamp::now(),
            trace_id,
            parent_trace_id,
            tool: None,
            capability: Some(capability.to_string()),
            args: None,
            success: Some(success),
            duration_ms: Some(duration_ms),
            result: result.clone(),
            error,
        });
        reply.map(|value| sanitize_result(&value))
    }

    /// Appends a timeline entry.
    fn push_entry(&self, entry: TraceEntry) {
        self.lock_timeline().push(entry);
    }

    /// Locks the timeline, recovering from poisoning.
    fn lock_timeline(&self) -> std::sync::MutexGuard<'_, Vec<TraceEntry>> {
        match self.timeline.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Capability Runner Adapter
// ============================================================================

#[async_trait]
impl CapabilityRunner for SandboxBridge {
    async fn run_code(&self, request: CodeRunRequest) -> Result<CodeRunOutcome, GatewayError> {
        let outcome = self
            .execute(
                &request.code,
                request.context,
                request.permission_set,
                request.parent_trace_id,
            )
            .await?;
        let traces = outcome
            .traces
            .iter()
            .map(|entry| serde_json::to_value(entry).unwrap_or(Value::Null))
            .collect();
        Ok(CodeRunOutcome {
            success: outcome.success,
            result: outcome.result,
            error: outcome.error,
            traces,
        })
    }
}

// ============================================================================
// SECTION: Reference Dispatchers
// ============================================================================

/// Tool dispatcher over a static table of async handlers.
///
/// Useful for tests and single-process deployments.
pub struct StaticToolDispatcher {
    /// Handlers keyed by `server` then `tool`.
    handlers: Map<String, Value>,
    /// Callback invoked for every call.
    callback: Arc<dyn Fn(&str, &str, Value) -> Result<Value, String> + Send + Sync>,
}

impl StaticToolDispatcher {
    /// Creates a dispatcher advertising `table` and serving via `callback`.
    #[must_use]
    pub fn new(
        table: Map<String, Value>,
        callback: Arc<dyn Fn(&str, &str, Value) -> Result<Value, String> + Send + Sync>,
    ) -> Self {
        Self {
            handlers: table,
            callback,
        }
    }
}

#[async_trait]
impl ToolDispatcher for StaticToolDispatcher {
    fn tool_table(&self) -> Map<String, Value> {
        self.handlers.clone()
    }

    async fn call_tool(&self, server: &str, tool: &str, args: Value) -> Result<Value, String> {
        let advertised = self
            .handlers
            .get(server)
            .and_then(Value::as_array)
            .is_some_and(|tools| tools.iter().any(|t| t.as_str() == Some(tool)));
        if !advertised {
            return Err(format!("unknown tool {server}:{tool}"));
        }
        (self.callback)(server, tool, args)
    }
}

/// Capability dispatcher that rejects every call.
///
/// Deployments without re-entrant capabilities use this as the table.
pub struct NoCapabilities;

#[async_trait]
impl CapabilityDispatcher for NoCapabilities {
    fn capability_names(&self) -> Vec<String> {
        Vec::new()
    }

    async fn call_capability(
        &self,
        name: &str,
        _args: Value,
        _parent_trace_id: Option<TraceId>,
        _depth: u32,
    ) -> Result<Value, String> {
        Err(format!("unknown capability {name}"))
    }
}

/// Returns a tool table value for a `server → [tools]` listing.
#[must_use]
pub fn tool_table(entries: &[(&str, &[&str])]) -> Map<String, Value> {
    let mut table = Map::new();
    for (server, tools) in entries {
        table.insert(
            (*server).to_string(),
            Value::Array(tools.iter().map(|tool| json!(tool)).collect()),
        );
    }
    table
}
