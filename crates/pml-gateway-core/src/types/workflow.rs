// crates/pml-gateway-core/src/types/workflow.rs
// ============================================================================
// Module: Workflow DAG Model
// Description: Task specifications and validated workflow DAGs.
// Purpose: Validate acyclicity and compute topological layers for execution.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A workflow DAG is a set of tasks with optional dependency lists. DAGs are
//! validated before execution: task identifiers must be unique, every
//! dependency target must exist, and the dependency relation must be
//! acyclic (Kahn check). Layering follows the standard
//! longest-dependency-chain-to-root partition; tasks within a layer may run
//! in parallel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::types::identifiers::CapabilityId;
use crate::types::identifiers::TaskId;

// ============================================================================
// SECTION: Workflow Errors
// ============================================================================

/// Errors raised by DAG validation.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// The DAG contained no tasks.
    #[error("workflow must contain at least one task")]
    Empty,
    /// Two tasks shared one identifier.
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),
    /// A dependency referenced a task that does not exist.
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency {
        /// Task declaring the dependency.
        task: TaskId,
        /// Missing dependency target.
        dependency: TaskId,
    },
    /// The dependency relation contained a cycle.
    #[error("dependency cycle involving tasks: {0}")]
    Cycle(String),
    /// A capability or code task was missing its inline code.
    #[error("task {0} requires an inline code snippet")]
    MissingCode(TaskId),
    /// An analyzed code structure cannot be converted into a DAG.
    #[error("code structure is not convertible to a DAG")]
    NotConvertible,
}

// ============================================================================
// SECTION: Task Specification
// ============================================================================

/// Execution kind of a task.
///
/// # Invariants
/// - Variants are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Direct MCP tool call.
    #[default]
    McpTool,
    /// Learned capability executed through the sandbox.
    Capability,
    /// Ad-hoc code executed through the sandbox.
    CodeExecution,
}

/// Task metadata flags.
///
/// # Invariants
/// - `pure` marks safe-to-fail tasks; their failures do not count toward
///   workflow failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskMetadata {
    /// Whether the task is a pure, safe-to-fail operation.
    #[serde(default)]
    pub pure: bool,
}

/// One task of a workflow DAG.
///
/// # Invariants
/// - `code` is present for capability and code-execution tasks.
/// - `depends_on` entries name tasks within the same DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task identifier, unique within the DAG.
    pub id: TaskId,
    /// Tool identifier (`serverId:toolName`) or capability display name.
    pub tool: String,
    /// JSON arguments or argument schema entries.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Identifiers of tasks this task depends on.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Execution kind.
    #[serde(default, rename = "type")]
    pub kind: TaskKind,
    /// Inline code snippet for capability/code tasks.
    #[serde(default)]
    pub code: Option<String>,
    /// Capability backing a capability task.
    #[serde(default)]
    pub capability_id: Option<CapabilityId>,
    /// Metadata flags.
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskSpec {
    /// Creates a plain MCP tool task.
    #[must_use]
    pub fn tool_task(id: impl Into<TaskId>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            args: Map::new(),
            depends_on: Vec::new(),
            kind: TaskKind::McpTool,
            code: None,
            capability_id: None,
            metadata: TaskMetadata::default(),
        }
    }

    /// Creates a capability task with inline code.
    #[must_use]
    pub fn capability_task(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        code: impl Into<String>,
        capability_id: Option<CapabilityId>,
    ) -> Self {
        Self {
            id: id.into(),
            tool: name.into(),
            args: Map::new(),
            depends_on: Vec::new(),
            kind: TaskKind::Capability,
            code: Some(code.into()),
            capability_id,
            metadata: TaskMetadata::default(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Replaces the argument map.
    #[must_use]
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Marks the task as pure (safe to fail).
    #[must_use]
    pub const fn pure(mut self) -> Self {
        self.metadata.pure = true;
        self
    }
}

// ============================================================================
// SECTION: Workflow DAG
// ============================================================================

/// A validated workflow DAG.
///
/// # Invariants
/// - Task identifiers are unique; all dependencies resolve; no cycles.
/// - Construction goes through [`WorkflowDag::new`], which enforces the
///   above and rejects invalid structures before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDag {
    /// Validated tasks in input order.
    tasks: Vec<TaskSpec>,
}

impl WorkflowDag {
    /// Validates a task set into a DAG.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] on duplicate ids, unknown dependencies,
    /// cycles, or capability tasks without code.
    pub fn new(tasks: Vec<TaskSpec>) -> Result<Self, WorkflowError> {
        if tasks.is_empty() {
            return Err(WorkflowError::Empty);
        }
        let mut ids = BTreeSet::new();
        for task in &tasks {
            if !ids.insert(task.id.clone()) {
                return Err(WorkflowError::DuplicateTask(task.id.clone()));
            }
            if matches!(task.kind, TaskKind::Capability | TaskKind::CodeExecution)
                && task.code.as_deref().is_none_or(str::is_empty)
            {
                return Err(WorkflowError::MissingCode(task.id.clone()));
            }
        }
        for task in &tasks {
            for dependency in &task.depends_on {
                if !ids.contains(dependency) {
                    return Err(WorkflowError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        let dag = Self {
            tasks,
        };
        dag.kahn_check()?;
        Ok(dag)
    }

    /// Returns the tasks in input order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Returns the task with the given identifier.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    /// Partitions tasks into topological layers.
    ///
    /// A task's layer index is the length of its longest dependency chain to
    /// a root; tasks within one layer are mutually independent.
    #[must_use]
    pub fn layers(&self) -> Vec<Vec<TaskId>> {
        let mut depth: BTreeMap<TaskId, usize> = BTreeMap::new();
        // Input order is not topological; iterate to a fixed point. The DAG
        // is validated acyclic, so this terminates within `tasks.len()`
        // passes.
        for _ in 0..self.tasks.len() {
            let mut changed = false;
            for task in &self.tasks {
                let layer = task
                    .depends_on
                    .iter()
                    .map(|dep| depth.get(dep).map_or(1, |d| d + 1))
                    .max()
                    .unwrap_or(0);
                let previous = depth.insert(task.id.clone(), layer);
                if previous != Some(layer) {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        let max_layer = depth.values().copied().max().unwrap_or(0);
        let mut layers = vec![Vec::new(); max_layer + 1];
        for task in &self.tasks {
            let layer = depth.get(&task.id).copied().unwrap_or(0);
            layers[layer].push(task.id.clone());
        }
        layers
    }

    /// Runs the Kahn cycle check over the dependency relation.
    fn kahn_check(&self) -> Result<(), WorkflowError> {
        let mut in_degree: BTreeMap<&TaskId, usize> =
            self.tasks.iter().map(|task| (&task.id, task.depends_on.len())).collect();
        let mut dependents: BTreeMap<&TaskId, Vec<&TaskId>> = BTreeMap::new();
        for task in &self.tasks {
            for dependency in &task.depends_on {
                dependents.entry(dependency).or_default().push(&task.id);
            }
        }
        let mut ready: Vec<&TaskId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop() {
            visited += 1;
            for dependent in dependents.get(id).map_or(&[][..], Vec::as_slice) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }
        if visited == self.tasks.len() {
            Ok(())
        } else {
            let cyclic: Vec<String> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            Err(WorkflowError::Cycle(cyclic.join(", ")))
        }
    }
}
