// crates/pml-gateway-core/src/builder.rs
// ============================================================================
// Module: Static-Structure DAG Builder
// Description: Converts analyzed code structures into workflow DAGs.
// Purpose: Let statically analyzable code run on the DAG executor instead of
//          the sandbox.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An external analyzer decomposes capability code into a static structure
//! of tool-call nodes and data edges. When the structure is valid for
//! conversion, the builder emits a workflow DAG with prefixed task ids whose
//! dependencies follow the structure edges; decision nodes are materialized
//! as safe-to-fail tasks under an option flag. When conversion is not
//! possible the caller falls back to sandbox execution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::types::identifiers::CapabilityId;
use crate::types::workflow::TaskKind;
use crate::types::workflow::TaskSpec;
use crate::types::workflow::WorkflowDag;
use crate::types::workflow::WorkflowError;

// ============================================================================
// SECTION: Structure Model
// ============================================================================

/// One node of an analyzed code structure.
///
/// # Invariants
/// - `id` is unique within the structure.
/// - `code` is present when `kind` requires inline code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureNode {
    /// Node identifier from the analyzer.
    pub id: String,
    /// Tool identifier or capability display name.
    pub tool: String,
    /// Argument schema entries for the task.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Task kind.
    #[serde(default, rename = "type")]
    pub kind: TaskKind,
    /// Inline code for capability/code nodes.
    #[serde(default)]
    pub code: Option<String>,
    /// Capability backing the node, when known.
    #[serde(default)]
    pub capability_id: Option<CapabilityId>,
    /// Whether the node is a pure, safe-to-fail operation.
    #[serde(default)]
    pub pure: bool,
}

/// One data edge of an analyzed code structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEdge {
    /// Producing node.
    pub from: String,
    /// Consuming node.
    pub to: String,
}

/// One decision point of an analyzed code structure.
///
/// # Invariants
/// - `after` names a node of the same structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDecision {
    /// Decision identifier from the analyzer.
    pub id: String,
    /// Condition expression evaluated at the decision point.
    pub condition: String,
    /// Node whose output the decision consumes.
    pub after: String,
}

/// Analyzed code structure produced by the external analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CodeStructure {
    /// Tool-call nodes.
    #[serde(default)]
    pub nodes: Vec<StructureNode>,
    /// Data edges.
    #[serde(default)]
    pub edges: Vec<StructureEdge>,
    /// Decision points.
    #[serde(default)]
    pub decisions: Vec<StructureDecision>,
}

// ============================================================================
// SECTION: Conversion
// ============================================================================

/// Options controlling structure-to-DAG conversion.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Prefix applied to every generated task id.
    pub task_prefix: String,
    /// Whether decision points become materialized tasks.
    pub materialize_decisions: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            task_prefix: "node".to_string(),
            materialize_decisions: false,
        }
    }
}

/// Returns true when the structure can be converted into a DAG.
///
/// Conversion requires at least one node, unique node ids, edges that
/// reference known nodes without self-loops, inline code on every
/// capability/code node, and decisions anchored to known nodes. Acyclicity
/// is enforced by DAG validation during conversion.
#[must_use]
pub fn is_valid_for_dag_conversion(structure: &CodeStructure) -> bool {
    if structure.nodes.is_empty() {
        return false;
    }
    let mut ids = std::collections::BTreeSet::new();
    for node in &structure.nodes {
        if !ids.insert(node.id.as_str()) {
            return false;
        }
        if matches!(node.kind, TaskKind::Capability | TaskKind::CodeExecution)
            && node.code.as_deref().is_none_or(str::is_empty)
        {
            return false;
        }
    }
    for edge in &structure.edges {
        if edge.from == edge.to || !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str())
        {
            return false;
        }
    }
    structure.decisions.iter().all(|decision| ids.contains(decision.after.as_str()))
}

/// Converts a valid structure into a workflow DAG.
///
/// Task ids are `<prefix>_<nodeId>`; dependencies follow structure edges.
/// Decisions are materialized as safe-to-fail code tasks when the option is
/// set.
///
/// # Errors
///
/// Returns [`WorkflowError`] when the structure is invalid for conversion or
/// the resulting task set fails DAG validation (including cycles).
pub fn dag_from_structure(
    structure: &CodeStructure,
    options: &BuildOptions,
) -> Result<WorkflowDag, WorkflowError> {
    if !is_valid_for_dag_conversion(structure) {
        return Err(WorkflowError::NotConvertible);
    }
    let task_id = |node_id: &str| format!("{}_{node_id}", options.task_prefix);
    let mut tasks = Vec::with_capacity(structure.nodes.len());
    for node in &structure.nodes {
        let mut task = TaskSpec {
            id: task_id(&node.id).into(),
            tool: node.tool.clone(),
            args: node.args.clone(),
            depends_on: Vec::new(),
            kind: node.kind,
            code: node.code.clone(),
            capability_id: node.capability_id,
            metadata: crate::types::workflow::TaskMetadata {
                pure: node.pure,
            },
        };
        for edge in &structure.edges {
            if edge.to == node.id {
                task.depends_on.push(task_id(&edge.from).into());
            }
        }
        tasks.push(task);
    }
    if options.materialize_decisions {
        for decision in &structure.decisions {
            let mut args = Map::new();
            args.insert("condition".to_string(), Value::String(decision.condition.clone()));
            tasks.push(TaskSpec {
                id: format!("decision_{}", decision.id).into(),
                tool: "code:decision".to_string(),
                args,
                depends_on: vec![task_id(&decision.after).into()],
                kind: TaskKind::CodeExecution,
                code: Some(decision.condition.clone()),
                capability_id: None,
                metadata: crate::types::workflow::TaskMetadata {
                    pure: true,
                },
            });
        }
    }
    WorkflowDag::new(tasks)
}

#[cfg(test)]
mod tests;
