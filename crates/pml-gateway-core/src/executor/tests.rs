// crates/pml-gateway-core/src/executor/tests.rs
// ============================================================================
// Module: Controlled Executor Tests
// Description: Unit tests for layered execution, gates, and checkpoints.
// Purpose: Validate parallel layers, safe-to-fail policy, decision gates,
//          and checkpoint resume.
// Dependencies: pml-gateway-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Exercises the executor against fake tool executors and capability
//! runners: mixed tool/capability DAGs, partial failure with independent
//! branches, pure-task reclassification, HIL/AIL gate behavior, and resume
//! from a checkpoint.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use super::AilConfig;
use super::AilTrigger;
use super::ApprovalRequired;
use super::Checkpoint;
use super::ControlledExecutor;
use super::DecisionCommand;
use super::ExecutorConfig;
use super::HilConfig;
use super::TaskStatus;
use super::workflow_channel;
use crate::bus::EventBus;
use crate::error::GatewayError;
use crate::interfaces::CapabilityRunner;
use crate::interfaces::CodeRunOutcome;
use crate::interfaces::CodeRunRequest;
use crate::interfaces::ToolError;
use crate::interfaces::ToolExecutor;
use crate::types::event::GatewayEvent;
use crate::types::event::event_types;
use crate::types::identifiers::TaskId;
use crate::types::identifiers::WorkflowId;
use crate::types::workflow::TaskSpec;
use crate::types::workflow::WorkflowDag;

// ============================================================================
// SECTION: Fakes
// ============================================================================

/// Tool executor scripted by tool name.
struct FakeToolExecutor {
    /// Number of executed calls.
    calls: AtomicU32,
}

impl FakeToolExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ToolExecutor for FakeToolExecutor {
    async fn execute(&self, task: &TaskSpec, args: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match task.tool.as_str() {
            "fs:read" => Ok(json!({"value": 42})),
            "fs:write" => Ok(json!({"written": true, "args": args})),
            "net:flaky" => Err(ToolError::CallFailed("connection reset".to_string())),
            "net:slow" => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(json!({"late": true}))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Capability runner multiplying `deps.t1.output.value` by ten.
struct FakeCapabilityRunner;

#[async_trait]
impl CapabilityRunner for FakeCapabilityRunner {
    async fn run_code(&self, request: CodeRunRequest) -> Result<CodeRunOutcome, GatewayError> {
        let value = request
            .context
            .pointer("/deps/t1/output/value")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(CodeRunOutcome {
            success: true,
            result: Some(json!({"processed": value * 10, "capabilityId": "cap-x"})),
            error: None,
            traces: Vec::new(),
        })
    }
}

/// Collects bus events by type for assertions.
fn event_recorder(bus: &EventBus) -> Arc<Mutex<Vec<GatewayEvent>>> {
    let seen: Arc<Mutex<Vec<GatewayEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on_async("*", move |event: GatewayEvent| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().expect("recorder lock").push(event);
            Ok(())
        }
    });
    seen
}

fn executor(bus: &EventBus, config: ExecutorConfig) -> ControlledExecutor {
    ControlledExecutor::new(
        FakeToolExecutor::new(),
        Some(Arc::new(FakeCapabilityRunner)),
        bus.clone(),
        config,
    )
}

fn count_events(events: &[GatewayEvent], event_type: &str) -> usize {
    events.iter().filter(|event| event.event_type == event_type).count()
}

// ============================================================================
// SECTION: Mixed DAG Scenario
// ============================================================================

#[tokio::test]
async fn mixed_tool_and_capability_dag_completes() {
    let bus = EventBus::new();
    let events = event_recorder(&bus);
    let exec = executor(&bus, ExecutorConfig::default());
    let dag = WorkflowDag::new(vec![
        TaskSpec::tool_task("t1", "fs:read"),
        TaskSpec::capability_task(
            "cap1",
            "text:process",
            "const v = deps.t1.output.value; return { processed: v * 10 };",
            None,
        )
        .depends_on("t1"),
        TaskSpec::tool_task("t2", "fs:write").depends_on("cap1"),
    ])
    .expect("valid dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-mixed"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(outcome.success);
    assert_eq!(outcome.successful_tasks, 3);
    let cap1 = outcome
        .records
        .iter()
        .find(|record| record.task_id == TaskId::new("cap1"))
        .expect("cap1 record");
    let output = cap1.output.as_ref().expect("cap1 output");
    assert_eq!(output.pointer("/result/processed"), Some(&json!(420)));
    bus.flush().await;
    let events = events.lock().expect("lock");
    assert_eq!(count_events(&events, event_types::DAG_TASK_COMPLETED), 3);
    assert_eq!(count_events(&events, event_types::DAG_CHECKPOINT), 3);
    assert_eq!(count_events(&events, event_types::DAG_WORKFLOW_COMPLETE), 1);
}

// ============================================================================
// SECTION: Failure Semantics
// ============================================================================

#[tokio::test]
async fn failed_task_blocks_dependents_but_not_independent_branches() {
    let bus = EventBus::new();
    let exec = executor(&bus, ExecutorConfig::default());
    let dag = WorkflowDag::new(vec![
        TaskSpec::tool_task("bad", "net:flaky"),
        TaskSpec::tool_task("dependent", "fs:write").depends_on("bad"),
        TaskSpec::tool_task("indirect", "fs:write").depends_on("dependent"),
        TaskSpec::tool_task("independent", "fs:read"),
        TaskSpec::tool_task("downstream", "fs:write").depends_on("independent"),
    ])
    .expect("valid dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-partial"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(!outcome.success);
    assert_eq!(outcome.failed_tasks, 1);
    assert_eq!(outcome.successful_tasks, 2);
    // Blocked dependents produce no records at all.
    assert_eq!(outcome.records.len(), 3);
    assert!(!outcome.records.iter().any(|r| r.task_id == TaskId::new("dependent")));
    assert!(!outcome.records.iter().any(|r| r.task_id == TaskId::new("indirect")));
}

#[tokio::test]
async fn all_pure_tasks_failing_keeps_workflow_successful() {
    let bus = EventBus::new();
    let exec = executor(&bus, ExecutorConfig::default());
    let dag = WorkflowDag::new(vec![
        TaskSpec::tool_task("p1", "net:flaky").pure(),
        TaskSpec::tool_task("p2", "net:flaky").pure(),
        TaskSpec::tool_task("ok", "fs:read"),
    ])
    .expect("valid dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-pure"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(outcome.success);
    assert_eq!(outcome.failed_tasks, 0);
    assert_eq!(outcome.failed_safe_tasks, 2);
    assert_eq!(outcome.successful_tasks + outcome.failed_safe_tasks, outcome.records.len());
    for record in &outcome.records {
        if record.task_id != TaskId::new("ok") {
            assert_eq!(record.status, TaskStatus::FailedSafe);
        }
    }
}

#[tokio::test]
async fn task_timeout_becomes_an_error_record() {
    let bus = EventBus::new();
    let exec = executor(
        &bus,
        ExecutorConfig {
            task_timeout: Duration::from_millis(50),
            ..ExecutorConfig::default()
        },
    );
    let dag =
        WorkflowDag::new(vec![TaskSpec::tool_task("slow", "net:slow")]).expect("valid dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-timeout"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(!outcome.success);
    let record = &outcome.records[0];
    assert_eq!(record.status, TaskStatus::Error);
    assert!(record.error.as_deref().is_some_and(|e| e.contains("timed out")));
}

// ============================================================================
// SECTION: Decision Gates
// ============================================================================

#[tokio::test]
async fn hil_approval_continues_and_denial_aborts() {
    let bus = EventBus::new();
    let config = ExecutorConfig {
        hil: HilConfig {
            enabled: true,
            approval_required: ApprovalRequired::Always,
            timeout: Duration::from_secs(5),
        },
        ..ExecutorConfig::default()
    };
    // Approval path.
    let exec = executor(&bus, config);
    let dag = WorkflowDag::new(vec![TaskSpec::tool_task("t1", "fs:read")]).expect("dag");
    let (handle, queue) = workflow_channel();
    handle.command(DecisionCommand::Approval {
        approved: true,
        feedback: None,
    });
    let outcome = exec
        .execute(WorkflowId::new("wf-hil-ok"), dag.clone(), json!({}), queue)
        .await
        .expect("approved execution");
    assert!(outcome.success);
    assert_eq!(outcome.decisions[0].outcome, "approved");
    // Denial path.
    let (handle, queue) = workflow_channel();
    handle.command(DecisionCommand::Approval {
        approved: false,
        feedback: Some("too risky".to_string()),
    });
    let err = exec
        .execute(WorkflowId::new("wf-hil-no"), dag, json!({}), queue)
        .await
        .expect_err("denied execution");
    assert!(matches!(err, GatewayError::Validation(_)));
}

#[tokio::test]
async fn hil_timeout_aborts_with_timeout_error() {
    let bus = EventBus::new();
    let exec = executor(
        &bus,
        ExecutorConfig {
            hil: HilConfig {
                enabled: true,
                approval_required: ApprovalRequired::Always,
                timeout: Duration::from_millis(40),
            },
            ..ExecutorConfig::default()
        },
    );
    let dag = WorkflowDag::new(vec![TaskSpec::tool_task("t1", "fs:read")]).expect("dag");
    let (_handle, queue) = workflow_channel();
    let err = exec
        .execute(WorkflowId::new("wf-hil-timeout"), dag, json!({}), queue)
        .await
        .expect_err("gate timeout");
    assert!(matches!(err, GatewayError::Timeout { .. }));
}

#[tokio::test]
async fn ail_timeout_continues_unchanged() {
    let bus = EventBus::new();
    let exec = executor(
        &bus,
        ExecutorConfig {
            ail: AilConfig {
                enabled: true,
                trigger: AilTrigger::PerLayer,
                timeout: Duration::from_millis(30),
            },
            ..ExecutorConfig::default()
        },
    );
    let dag = WorkflowDag::new(vec![TaskSpec::tool_task("t1", "fs:read")]).expect("dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-ail-timeout"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(outcome.success);
    assert_eq!(outcome.decisions[0].decision_type, "AIL");
    assert_eq!(outcome.decisions[0].outcome, "timeout");
}

#[tokio::test]
async fn ail_on_error_trigger_skips_clean_layers() {
    let bus = EventBus::new();
    let events = event_recorder(&bus);
    let exec = executor(
        &bus,
        ExecutorConfig {
            ail: AilConfig {
                enabled: true,
                trigger: AilTrigger::OnError,
                timeout: Duration::from_millis(30),
            },
            ..ExecutorConfig::default()
        },
    );
    let dag = WorkflowDag::new(vec![TaskSpec::tool_task("t1", "fs:read")]).expect("dag");
    let (_handle, queue) = workflow_channel();
    let outcome = exec
        .execute(WorkflowId::new("wf-ail-clean"), dag, json!({}), queue)
        .await
        .expect("execution");
    assert!(outcome.success);
    assert!(outcome.decisions.is_empty());
    bus.flush().await;
    let events = events.lock().expect("lock");
    assert_eq!(count_events(&events, event_types::DAG_DECISION_REQUIRED), 0);
}

// ============================================================================
// SECTION: Checkpoint Resume
// ============================================================================

#[tokio::test]
async fn resume_starts_from_checkpoint_layer() {
    let bus = EventBus::new();
    let tool_executor = FakeToolExecutor::new();
    let exec = ControlledExecutor::new(
        Arc::clone(&tool_executor) as Arc<dyn ToolExecutor>,
        Some(Arc::new(FakeCapabilityRunner)),
        bus.clone(),
        ExecutorConfig::default(),
    );
    let dag = WorkflowDag::new(vec![
        TaskSpec::tool_task("t1", "fs:read"),
        TaskSpec::tool_task("t2", "fs:write").depends_on("t1"),
    ])
    .expect("dag");
    let (_handle, queue) = workflow_channel();
    let first = exec
        .execute(WorkflowId::new("wf-resume"), dag.clone(), json!({}), queue)
        .await
        .expect("first run");
    assert_eq!(tool_executor.calls.load(Ordering::SeqCst), 2);
    // Rebuild a checkpoint as of layer 1 (t1 done, t2 pending).
    let checkpoint = Checkpoint {
        workflow_id: WorkflowId::new("wf-resume"),
        next_layer: 1,
        records: first
            .records
            .iter()
            .filter(|record| record.task_id == TaskId::new("t1"))
            .cloned()
            .collect(),
        decisions: Vec::new(),
    };
    let (_handle, queue) = workflow_channel();
    let resumed = exec.resume(dag, json!({}), queue, checkpoint).await.expect("resume");
    assert!(resumed.success);
    assert_eq!(resumed.records.len(), 2);
    // Only t2 ran during the resumed execution.
    assert_eq!(tool_executor.calls.load(Ordering::SeqCst), 3);
}
