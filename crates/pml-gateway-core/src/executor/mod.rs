// crates/pml-gateway-core/src/executor/mod.rs
// ============================================================================
// Module: Controlled DAG Executor
// Description: Layered parallel execution with decision gates & checkpoints.
// Purpose: Run validated workflow DAGs with bounded concurrency, HIL/AIL
//          gates, per-layer checkpoints, and safe-to-fail semantics.
// Dependencies: futures, serde, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The controlled executor runs a validated DAG layer by layer. Tasks within
//! a layer execute in parallel under a concurrency cap and a per-task
//! timeout; results are collected settled-style so one fault never aborts
//! its siblings. Between layers two independently configured gates may
//! block: the AIL gate waits for an algorithmic `continue` or a replacement
//! DAG (timeout continues unchanged), and the HIL gate waits for a human
//! approval (denial or timeout aborts). After every layer the executor emits
//! a checkpoint event carrying the cumulative state; a workflow resumed from
//! a checkpoint starts at that layer.
//! Invariants:
//! - A failed task blocks its dependents; independent branches continue.
//! - Pure tasks that fail are classified `failed_safe` and never count
//!   toward workflow failure.
//! - `checkpoint` is emitted exactly once per layer after the last
//!   `task_complete` of that layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use futures::FutureExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::bus::EventBus;
use crate::error::GatewayError;
use crate::interfaces::CapabilityRunner;
use crate::interfaces::CodeRunRequest;
use crate::interfaces::ToolExecutor;
use crate::resolver;
use crate::types::event::GatewayEvent;
use crate::types::event::event_types;
use crate::types::identifiers::CapabilityId;
use crate::types::identifiers::TaskId;
use crate::types::identifiers::WorkflowId;
use crate::types::workflow::TaskKind;
use crate::types::workflow::TaskSpec;
use crate::types::workflow::WorkflowDag;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum characters of a task result preview embedded in events.
pub const RESULT_PREVIEW_MAX_LENGTH: usize = 1000;

/// Source label stamped on executor events.
const EVENT_SOURCE: &str = "executor";

// ============================================================================
// SECTION: Config
// ============================================================================

/// AIL gate trigger condition.
///
/// # Invariants
/// - Variants are stable for configuration parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AilTrigger {
    /// Gate runs after every layer.
    #[default]
    PerLayer,
    /// Gate runs only after layers with failures.
    OnError,
}

/// Algorithm-in-the-loop gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct AilConfig {
    /// Whether the gate is active.
    pub enabled: bool,
    /// Trigger condition.
    pub trigger: AilTrigger,
    /// How long to wait for a command before continuing unchanged.
    pub timeout: Duration,
}

impl Default for AilConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: AilTrigger::PerLayer,
            timeout: Duration::from_secs(30),
        }
    }
}

/// HIL approval requirement.
///
/// # Invariants
/// - Variants are stable for configuration parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequired {
    /// Approval is requested after every layer.
    Always,
    /// The gate never runs.
    #[default]
    Never,
}

/// Human-in-the-loop gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct HilConfig {
    /// Whether the gate is active.
    pub enabled: bool,
    /// Approval requirement.
    pub approval_required: ApprovalRequired,
    /// How long to wait for an approval before aborting.
    pub timeout: Duration,
}

impl Default for HilConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            approval_required: ApprovalRequired::Never,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Controlled executor configuration.
///
/// # Invariants
/// - `max_concurrency` is greater than zero.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Maximum tasks running concurrently within a layer.
    pub max_concurrency: usize,
    /// Per-task execution deadline.
    pub task_timeout: Duration,
    /// AIL gate configuration.
    pub ail: AilConfig,
    /// HIL gate configuration.
    pub hil: HilConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout: Duration::from_secs(10),
            ail: AilConfig::default(),
            hil: HilConfig::default(),
        }
    }
}

// ============================================================================
// SECTION: Commands and Handles
// ============================================================================

/// Command pushed into a workflow's decision queue.
#[derive(Debug, Clone)]
pub enum DecisionCommand {
    /// Continue with the current DAG.
    Continue,
    /// Replace the DAG for the remaining layers.
    ReplaceDag(WorkflowDag),
    /// Human approval response.
    Approval {
        /// Whether the workflow may continue.
        approved: bool,
        /// Optional reviewer feedback.
        feedback: Option<String>,
    },
}

/// Handle used to steer a running workflow.
///
/// # Invariants
/// - Dropping the handle neither cancels nor completes the workflow.
#[derive(Clone)]
pub struct WorkflowHandle {
    /// Command queue sender.
    commands: mpsc::UnboundedSender<DecisionCommand>,
    /// Cancellation signal.
    cancel: Arc<watch::Sender<bool>>,
}

impl WorkflowHandle {
    /// Pushes a decision command; ignored when the workflow has finished.
    pub fn command(&self, command: DecisionCommand) {
        let _ = self.commands.send(command);
    }

    /// Cancels the workflow, aborting in-flight layer tasks.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Per-execution channel pair: the caller keeps the handle, the executor
/// consumes the queue.
#[must_use]
pub fn workflow_channel() -> (WorkflowHandle, CommandQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        WorkflowHandle {
            commands: tx,
            cancel: Arc::new(cancel_tx),
        },
        CommandQueue {
            commands: rx,
            cancel: cancel_rx,
        },
    )
}

/// Receiver side of a workflow's command channel.
pub struct CommandQueue {
    /// Decision command queue.
    commands: mpsc::UnboundedReceiver<DecisionCommand>,
    /// Cancellation signal.
    cancel: watch::Receiver<bool>,
}

// ============================================================================
// SECTION: Task Records and Checkpoints
// ============================================================================

/// Final status of one task.
///
/// # Invariants
/// - Variants are stable for persistence and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task completed successfully.
    Success,
    /// Task failed and counts toward workflow failure.
    Error,
    /// Pure task failed; does not count toward workflow failure.
    FailedSafe,
}

/// Persisted record of one executed task.
///
/// # Invariants
/// - `output` is present exactly for successful tasks.
/// - `capability_id` is carried for capability tasks so checkpoints retain
///   it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: TaskId,
    /// Final status.
    pub status: TaskStatus,
    /// Task output, when successful.
    pub output: Option<Value>,
    /// Error message, when failed.
    pub error: Option<String>,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Capability backing the task, when any.
    pub capability_id: Option<CapabilityId>,
}

/// Decision-gate log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    /// Layer index after which the gate ran.
    pub layer: usize,
    /// Gate type (`AIL` or `HIL`).
    pub decision_type: String,
    /// Outcome label (`continue`, `replaced`, `approved`, `rejected`,
    /// `timeout`).
    pub outcome: String,
    /// Reviewer feedback, when any.
    pub feedback: Option<String>,
}

/// Cumulative workflow state captured after each layer.
///
/// # Invariants
/// - `next_layer` names the first layer not yet executed.
/// - Records include capability task outputs with their capability ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Workflow identifier.
    pub workflow_id: WorkflowId,
    /// First layer not yet executed.
    pub next_layer: usize,
    /// Records of all tasks executed so far.
    pub records: Vec<TaskRecord>,
    /// Decision log so far.
    pub decisions: Vec<DecisionLogEntry>,
}

/// Final outcome of a workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    /// Workflow identifier.
    pub workflow_id: WorkflowId,
    /// Whether the workflow succeeded (no counted failures).
    pub success: bool,
    /// Records of every executed task.
    pub records: Vec<TaskRecord>,
    /// Decision log.
    pub decisions: Vec<DecisionLogEntry>,
    /// Number of successful tasks.
    pub successful_tasks: usize,
    /// Number of counted failures.
    pub failed_tasks: usize,
    /// Number of safe-to-fail failures.
    pub failed_safe_tasks: usize,
    /// Error messages of counted failures.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Layered parallel DAG executor with decision gates.
pub struct ControlledExecutor {
    /// Executes MCP tool tasks.
    tool_executor: Arc<dyn ToolExecutor>,
    /// Executes capability/code tasks; absent in tool-only deployments.
    capability_runner: Option<Arc<dyn CapabilityRunner>>,
    /// Event bus receiving task, decision, and checkpoint events.
    bus: EventBus,
    /// Configuration.
    config: ExecutorConfig,
}

impl ControlledExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        tool_executor: Arc<dyn ToolExecutor>,
        capability_runner: Option<Arc<dyn CapabilityRunner>>,
        bus: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            tool_executor,
            capability_runner,
            bus,
            config,
        }
    }

    /// Executes a DAG from the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on HIL denial, gate timeout, or
    /// cancellation. Task failures are reported inside the outcome, not as
    /// errors.
    pub async fn execute(
        &self,
        workflow_id: WorkflowId,
        dag: WorkflowDag,
        context: Value,
        queue: CommandQueue,
    ) -> Result<WorkflowOutcome, GatewayError> {
        self.run(workflow_id, dag, context, queue, None).await
    }

    /// Resumes a DAG from a checkpoint.
    ///
    /// Tasks recorded in the checkpoint are not re-executed; execution
    /// starts at the checkpoint's next layer.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] under the same conditions as
    /// [`ControlledExecutor::execute`].
    pub async fn resume(
        &self,
        dag: WorkflowDag,
        context: Value,
        queue: CommandQueue,
        checkpoint: Checkpoint,
    ) -> Result<WorkflowOutcome, GatewayError> {
        let workflow_id = checkpoint.workflow_id.clone();
        self.run(workflow_id, dag, context, queue, Some(checkpoint)).await
    }

    /// Shared layer loop.
    async fn run(
        &self,
        workflow_id: WorkflowId,
        mut dag: WorkflowDag,
        context: Value,
        mut queue: CommandQueue,
        checkpoint: Option<Checkpoint>,
    ) -> Result<WorkflowOutcome, GatewayError> {
        let mut records: BTreeMap<TaskId, TaskRecord> = BTreeMap::new();
        let mut decisions: Vec<DecisionLogEntry> = Vec::new();
        let mut start_layer = 0usize;
        if let Some(checkpoint) = checkpoint {
            start_layer = checkpoint.next_layer;
            decisions = checkpoint.decisions;
            for record in checkpoint.records {
                records.insert(record.task_id.clone(), record);
            }
        }
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut layer_index = start_layer;
        loop {
            let layers = dag.layers();
            if layer_index >= layers.len() {
                break;
            }
            let blocked = blocked_tasks(&dag, &records);
            let runnable: Vec<TaskSpec> = layers[layer_index]
                .iter()
                .filter(|id| !records.contains_key(*id) && !blocked.contains(*id))
                .filter_map(|id| dag.task(id).cloned())
                .collect();

            let layer_records = self
                .run_layer(&workflow_id, &runnable, &context, &records, &semaphore, &mut queue)
                .await?;
            let layer_failed = layer_records
                .iter()
                .filter(|record| record.status == TaskStatus::Error)
                .count();
            for record in layer_records {
                records.insert(record.task_id.clone(), record);
            }

            // Gates run between layers, before the checkpoint of this layer
            // is considered final.
            if self.config.ail.enabled
                && (self.config.ail.trigger == AilTrigger::PerLayer || layer_failed > 0)
            {
                if let Some(new_dag) =
                    self.ail_gate(&workflow_id, layer_index, layer_failed, &mut queue, &mut decisions).await
                {
                    dag = new_dag;
                }
            }
            if self.config.hil.enabled
                && self.config.hil.approval_required == ApprovalRequired::Always
            {
                self.hil_gate(&workflow_id, layer_index, &mut queue, &mut decisions, &records)
                    .await?;
            }

            self.emit_checkpoint(&workflow_id, layer_index + 1, &records, &decisions);
            layer_index += 1;
        }

        let outcome = build_outcome(workflow_id.clone(), &records, decisions);
        self.bus.emit(GatewayEvent::new(
            event_types::DAG_WORKFLOW_COMPLETE,
            EVENT_SOURCE,
            json!({
                "workflow_id": workflow_id,
                "success": outcome.success,
                "failedTasks": outcome.failed_tasks,
                "errors": outcome.errors,
            }),
        ));
        Ok(outcome)
    }

    /// Runs one layer's tasks in parallel and returns their records.
    async fn run_layer(
        &self,
        workflow_id: &WorkflowId,
        tasks: &[TaskSpec],
        context: &Value,
        prior: &BTreeMap<TaskId, TaskRecord>,
        semaphore: &Arc<Semaphore>,
        queue: &mut CommandQueue,
    ) -> Result<Vec<TaskRecord>, GatewayError> {
        let prior_results = prior_results_value(prior);
        let futures: Vec<_> = tasks
            .iter()
            .map(|task| {
                let semaphore = Arc::clone(semaphore);
                let prior_results = prior_results.clone();
                async move {
                    // A closed semaphore cannot happen; treat it as a fault.
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return failed_record(task, "executor semaphore closed".to_string(), 0);
                        }
                    };
                    self.run_task(task, context, &prior_results).await
                }
            })
            .collect();

        let mut cancel = queue.cancel.clone();
        let mut pending: FuturesUnordered<_> = futures.into_iter().collect();
        let mut results = Vec::new();
        loop {
            tokio::select! {
                settled = pending.next() => match settled {
                    Some(record) => {
                        // Emission order matches arrival order within the
                        // layer; the checkpoint follows the last of these.
                        self.emit_task_complete(workflow_id, &record);
                        results.push(record);
                    }
                    None => break,
                },
                _ = cancel.wait_for(|cancelled| *cancelled) => {
                    return Err(GatewayError::Internal("workflow cancelled".to_string()));
                }
            }
        }
        Ok(results)
    }

    /// Runs one task with argument resolution and a deadline.
    async fn run_task(&self, task: &TaskSpec, context: &Value, prior_results: &Value) -> TaskRecord {
        let resolved = resolver::resolve_arguments(&task.args, context, prior_results);
        let args = Value::Object(resolved);
        let started = Instant::now();
        let deadline = self.config.task_timeout;
        let outcome = tokio::time::timeout(deadline, self.dispatch_task(task, args, prior_results))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(output)) => TaskRecord {
                task_id: task.id.clone(),
                status: TaskStatus::Success,
                output: Some(output),
                error: None,
                duration_ms,
                capability_id: task.capability_id,
            },
            Ok(Err(message)) => failed_record(task, message, duration_ms),
            Err(_) => failed_record(
                task,
                format!("task timed out after {}ms", deadline.as_millis()),
                duration_ms,
            ),
        }
    }

    /// Dispatches a task to the tool executor or the capability runner.
    async fn dispatch_task(
        &self,
        task: &TaskSpec,
        args: Value,
        prior_results: &Value,
    ) -> Result<Value, String> {
        match task.kind {
            TaskKind::McpTool => {
                let call = self.tool_executor.execute(task, args);
                match std::panic::AssertUnwindSafe(call).catch_unwind().await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err("tool executor panicked".to_string()),
                }
            }
            TaskKind::Capability | TaskKind::CodeExecution => {
                let runner = self
                    .capability_runner
                    .as_ref()
                    .ok_or_else(|| "no capability runner configured".to_string())?;
                let code = task
                    .code
                    .clone()
                    .ok_or_else(|| "capability task without code".to_string())?;
                let request = CodeRunRequest {
                    code,
                    context: json!({
                        "deps": deps_value(prior_results),
                        "args": args,
                    }),
                    capability_id: task.capability_id,
                    parent_trace_id: None,
                    permission_set: crate::types::permission::PermissionSet::Minimal,
                };
                let run = runner.run_code(request);
                match std::panic::AssertUnwindSafe(run).catch_unwind().await {
                    Ok(Ok(outcome)) if outcome.success => {
                        Ok(json!({ "result": outcome.result.unwrap_or(Value::Null) }))
                    }
                    Ok(Ok(outcome)) => {
                        Err(outcome.error.unwrap_or_else(|| "capability failed".to_string()))
                    }
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err("capability runner panicked".to_string()),
                }
            }
        }
    }

    /// Runs the AIL gate; returns a replacement DAG when commanded.
    async fn ail_gate(
        &self,
        workflow_id: &WorkflowId,
        layer: usize,
        layer_failed: usize,
        queue: &mut CommandQueue,
        decisions: &mut Vec<DecisionLogEntry>,
    ) -> Option<WorkflowDag> {
        self.bus.emit(GatewayEvent::new(
            event_types::DAG_DECISION_REQUIRED,
            EVENT_SOURCE,
            json!({
                "workflow_id": workflow_id,
                "decisionType": "AIL",
                "layer": layer,
                "layerFailed": layer_failed,
            }),
        ));
        let command = tokio::time::timeout(self.config.ail.timeout, queue.commands.recv()).await;
        match command {
            Ok(Some(DecisionCommand::ReplaceDag(dag))) => {
                decisions.push(DecisionLogEntry {
                    layer,
                    decision_type: "AIL".to_string(),
                    outcome: "replaced".to_string(),
                    feedback: None,
                });
                Some(dag)
            }
            Ok(Some(DecisionCommand::Continue | DecisionCommand::Approval { .. })) | Ok(None) => {
                decisions.push(DecisionLogEntry {
                    layer,
                    decision_type: "AIL".to_string(),
                    outcome: "continue".to_string(),
                    feedback: None,
                });
                None
            }
            Err(_) => {
                // Timeout policy: empty result, continue unchanged.
                decisions.push(DecisionLogEntry {
                    layer,
                    decision_type: "AIL".to_string(),
                    outcome: "timeout".to_string(),
                    feedback: None,
                });
                None
            }
        }
    }

    /// Runs the HIL gate; denial and timeout abort the workflow.
    async fn hil_gate(
        &self,
        workflow_id: &WorkflowId,
        layer: usize,
        queue: &mut CommandQueue,
        decisions: &mut Vec<DecisionLogEntry>,
        records: &BTreeMap<TaskId, TaskRecord>,
    ) -> Result<(), GatewayError> {
        self.bus.emit(GatewayEvent::new(
            event_types::DAG_DECISION_REQUIRED,
            EVENT_SOURCE,
            json!({
                "workflow_id": workflow_id,
                "decisionType": "HIL",
                "layer": layer,
            }),
        ));
        loop {
            let command =
                tokio::time::timeout(self.config.hil.timeout, queue.commands.recv()).await;
            match command {
                Ok(Some(DecisionCommand::Approval {
                    approved: true,
                    feedback,
                })) => {
                    decisions.push(DecisionLogEntry {
                        layer,
                        decision_type: "HIL".to_string(),
                        outcome: "approved".to_string(),
                        feedback,
                    });
                    return Ok(());
                }
                Ok(Some(DecisionCommand::Approval {
                    approved: false,
                    feedback,
                })) => {
                    decisions.push(DecisionLogEntry {
                        layer,
                        decision_type: "HIL".to_string(),
                        outcome: "rejected".to_string(),
                        feedback: feedback.clone(),
                    });
                    self.emit_abort(workflow_id, records, "workflow rejected by approver");
                    return Err(GatewayError::Validation(format!(
                        "workflow rejected by approver{}",
                        feedback.map(|f| format!(": {f}")).unwrap_or_default()
                    )));
                }
                // Non-approval commands are not answers to this gate; keep
                // waiting within the same deadline policy.
                Ok(Some(DecisionCommand::Continue | DecisionCommand::ReplaceDag(_))) => {}
                Ok(None) | Err(_) => {
                    decisions.push(DecisionLogEntry {
                        layer,
                        decision_type: "HIL".to_string(),
                        outcome: "timeout".to_string(),
                        feedback: None,
                    });
                    self.emit_abort(workflow_id, records, "approval timed out");
                    return Err(GatewayError::Timeout {
                        timeout_ms: self.config.hil.timeout.as_millis() as u64,
                        context: "HIL approval".to_string(),
                    });
                }
            }
        }
    }

    /// Emits a `task_complete` event with a clipped result preview.
    fn emit_task_complete(&self, workflow_id: &WorkflowId, record: &TaskRecord) {
        let preview = record
            .output
            .as_ref()
            .map(|output| clip_preview(&output.to_string()))
            .unwrap_or_default();
        self.bus.emit(GatewayEvent::new(
            event_types::DAG_TASK_COMPLETED,
            EVENT_SOURCE,
            json!({
                "workflow_id": workflow_id,
                "taskId": record.task_id,
                "status": record.status,
                "preview": preview,
                "error": record.error,
                "durationMs": record.duration_ms,
            }),
        ));
    }

    /// Emits the per-layer checkpoint event.
    fn emit_checkpoint(
        &self,
        workflow_id: &WorkflowId,
        next_layer: usize,
        records: &BTreeMap<TaskId, TaskRecord>,
        decisions: &[DecisionLogEntry],
    ) {
        let checkpoint = Checkpoint {
            workflow_id: workflow_id.clone(),
            next_layer,
            records: records.values().cloned().collect(),
            decisions: decisions.to_vec(),
        };
        let payload = serde_json::to_value(&checkpoint).unwrap_or(Value::Null);
        self.bus.emit(GatewayEvent::new(event_types::DAG_CHECKPOINT, EVENT_SOURCE, payload));
    }

    /// Emits a failed `workflow_complete` event on abort.
    fn emit_abort(
        &self,
        workflow_id: &WorkflowId,
        records: &BTreeMap<TaskId, TaskRecord>,
        reason: &str,
    ) {
        let failed: Vec<&TaskId> = records
            .values()
            .filter(|record| record.status == TaskStatus::Error)
            .map(|record| &record.task_id)
            .collect();
        self.bus.emit(GatewayEvent::new(
            event_types::DAG_WORKFLOW_COMPLETE,
            EVENT_SOURCE,
            json!({
                "workflow_id": workflow_id,
                "success": false,
                "failedTasks": failed,
                "errors": [reason],
            }),
        ));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a failed record honoring the safe-to-fail metadata flag.
fn failed_record(task: &TaskSpec, message: String, duration_ms: u64) -> TaskRecord {
    let status = if task.metadata.pure { TaskStatus::FailedSafe } else { TaskStatus::Error };
    TaskRecord {
        task_id: task.id.clone(),
        status,
        output: None,
        error: Some(message),
        duration_ms,
        capability_id: task.capability_id,
    }
}

/// Returns the transitive set of tasks blocked by counted failures.
fn blocked_tasks(dag: &WorkflowDag, records: &BTreeMap<TaskId, TaskRecord>) -> BTreeSet<TaskId> {
    let mut blocked = BTreeSet::new();
    // Iterate to a fixed point so indirect dependents block as well.
    loop {
        let mut changed = false;
        for task in dag.tasks() {
            if blocked.contains(&task.id) {
                continue;
            }
            let is_blocked = task.depends_on.iter().any(|dependency| {
                blocked.contains(dependency)
                    || records
                        .get(dependency)
                        .is_some_and(|record| record.status == TaskStatus::Error)
            });
            if is_blocked {
                blocked.insert(task.id.clone());
                changed = true;
            }
        }
        if !changed {
            return blocked;
        }
    }
}

/// Builds the `task_<id> -> {output}` map consumed by the resolver.
fn prior_results_value(records: &BTreeMap<TaskId, TaskRecord>) -> Value {
    let mut map = Map::new();
    for (task_id, record) in records {
        if let Some(output) = &record.output {
            map.insert(task_id.result_key(), json!({ "output": output }));
        }
    }
    Value::Object(map)
}

/// Builds the `deps` object handed to capability code.
fn deps_value(prior_results: &Value) -> Value {
    let mut deps = Map::new();
    if let Some(entries) = prior_results.as_object() {
        for (key, value) in entries {
            if let Some(task_id) = key.strip_prefix("task_") {
                deps.insert(task_id.to_string(), value.clone());
            }
        }
    }
    Value::Object(deps)
}

/// Clips a preview string to [`RESULT_PREVIEW_MAX_LENGTH`] characters.
fn clip_preview(preview: &str) -> String {
    if preview.chars().count() <= RESULT_PREVIEW_MAX_LENGTH {
        return preview.to_string();
    }
    preview.chars().take(RESULT_PREVIEW_MAX_LENGTH).collect()
}

/// Builds the final outcome from accumulated records.
fn build_outcome(
    workflow_id: WorkflowId,
    records: &BTreeMap<TaskId, TaskRecord>,
    decisions: Vec<DecisionLogEntry>,
) -> WorkflowOutcome {
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut failed_safe = 0usize;
    let mut errors = Vec::new();
    for record in records.values() {
        match record.status {
            TaskStatus::Success => successful += 1,
            TaskStatus::FailedSafe => failed_safe += 1,
            TaskStatus::Error => {
                failed += 1;
                if let Some(error) = &record.error {
                    errors.push(error.clone());
                }
            }
        }
    }
    WorkflowOutcome {
        workflow_id,
        success: failed == 0,
        records: records.values().cloned().collect(),
        decisions,
        successful_tasks: successful,
        failed_tasks: failed,
        failed_safe_tasks: failed_safe,
        errors,
    }
}

#[cfg(test)]
mod tests;
