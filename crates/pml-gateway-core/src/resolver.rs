// crates/pml-gateway-core/src/resolver.rs
// ============================================================================
// Module: Argument Resolver
// Description: Resolves literal, parameter, and reference task arguments.
// Purpose: Turn argument schemas into concrete values before execution.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Task arguments come in three shapes: literals copied verbatim, parameters
//! read from the execution context, and references, dotted paths with
//! bracketed array indexing resolved against prior task results. Resolution
//! is total: a reference that fails to resolve is silently omitted from the
//! result while every resolvable entry survives. Explicit arguments override
//! resolved ones on merge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::types::identifiers::TaskId;

// ============================================================================
// SECTION: Argument Schema
// ============================================================================

/// One entry of an argument schema.
///
/// # Invariants
/// - Values that do not match the tagged forms are literals verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSpec {
    /// Copied into the result unchanged.
    Literal(Value),
    /// Read from `context.parameters.<name>`.
    Parameter(String),
    /// Dotted path resolved against prior task results.
    Reference(String),
}

impl ArgSpec {
    /// Classifies a JSON value into an argument spec.
    ///
    /// Objects tagged `{"type": "literal" | "parameter" | "reference"}` map
    /// onto their variants; every other value is a literal.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if let Value::Object(map) = value {
            match map.get("type").and_then(Value::as_str) {
                Some("literal") => {
                    return Self::Literal(map.get("value").cloned().unwrap_or(Value::Null));
                }
                Some("parameter") => {
                    if let Some(name) = map.get("parameterName").and_then(Value::as_str) {
                        return Self::Parameter(name.to_string());
                    }
                }
                Some("reference") => {
                    if let Some(expression) = map.get("expression").and_then(Value::as_str) {
                        return Self::Reference(expression.to_string());
                    }
                }
                _ => {}
            }
        }
        Self::Literal(value.clone())
    }
}

// ============================================================================
// SECTION: Reference Expressions
// ============================================================================

/// One step of a parsed reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    /// Object field access.
    Field(String),
    /// Array index access.
    Index(usize),
}

/// Parses `n1.items[0].name` into a root task and path steps.
///
/// Returns `None` on malformed expressions; resolution treats those as
/// failed references.
fn parse_reference(expression: &str) -> Option<(String, Vec<PathStep>)> {
    let mut chars = expression.char_indices().peekable();
    let mut root_end = expression.len();
    for (i, c) in expression.char_indices() {
        if c == '.' || c == '[' {
            root_end = i;
            break;
        }
    }
    let root = &expression[..root_end];
    if root.is_empty() {
        return None;
    }
    // Skip the root characters before walking the remaining steps.
    while chars.peek().is_some_and(|(i, _)| *i < root_end) {
        chars.next();
    }
    let mut steps = Vec::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '.' => {
                let mut field = String::new();
                while let Some((_, next)) = chars.peek() {
                    if *next == '.' || *next == '[' {
                        break;
                    }
                    field.push(*next);
                    chars.next();
                }
                if field.is_empty() {
                    return None;
                }
                steps.push(PathStep::Field(field));
            }
            '[' => {
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, digit)) if digit.is_ascii_digit() => digits.push(digit),
                        _ => return None,
                    }
                }
                let index = digits.parse().ok()?;
                steps.push(PathStep::Index(index));
            }
            _ => return None,
        }
    }
    Some((root.to_string(), steps))
}

/// Walks path steps down a JSON value.
fn walk<'a>(mut value: &'a Value, steps: &[PathStep]) -> Option<&'a Value> {
    for step in steps {
        value = match step {
            PathStep::Field(field) => value.as_object()?.get(field)?,
            PathStep::Index(index) => value.as_array()?.get(*index)?,
        };
    }
    Some(value)
}

/// Resolves a reference expression against prior task results.
///
/// Prior results are keyed `task_<nodeId>`; a stored result's `output`
/// wrapper is transparent, so both `n1.content` and `n1.output.content`
/// resolve against `{"task_n1": {"output": {"content": ...}}}`.
#[must_use]
pub fn resolve_reference(expression: &str, prior_results: &Value) -> Option<Value> {
    let (root, steps) = parse_reference(expression)?;
    let entry = prior_results.as_object()?.get(&TaskId::new(root).result_key())?;
    if let Some(found) = walk(entry, &steps) {
        return Some(found.clone());
    }
    let output = entry.as_object()?.get("output")?;
    walk(output, &steps).cloned()
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Summary of one resolution pass.
///
/// # Invariants
/// - `total == literals + parameters + references`.
/// - `resolved + failed == total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionSummary {
    /// Schema entries processed.
    pub total: usize,
    /// Literal entries.
    pub literals: usize,
    /// Parameter entries.
    pub parameters: usize,
    /// Reference entries.
    pub references: usize,
    /// Entries present in the result.
    pub resolved: usize,
    /// Entries omitted from the result.
    pub failed: usize,
}

/// Resolves an argument schema against a context and prior results.
///
/// Literals are copied verbatim, parameters read from `context.parameters`,
/// references resolved against `prior_results`. Failed references and
/// missing parameters are omitted; the pass never fails.
#[must_use]
pub fn resolve_arguments(
    args_schema: &Map<String, Value>,
    context: &Value,
    prior_results: &Value,
) -> Map<String, Value> {
    resolve_with_summary(args_schema, context, prior_results).0
}

/// Resolves an argument schema and reports per-kind counts.
#[must_use]
pub fn resolve_with_summary(
    args_schema: &Map<String, Value>,
    context: &Value,
    prior_results: &Value,
) -> (Map<String, Value>, ResolutionSummary) {
    let mut resolved = Map::new();
    let mut summary = ResolutionSummary::default();
    for (key, entry) in args_schema {
        summary.total += 1;
        match ArgSpec::from_value(entry) {
            ArgSpec::Literal(value) => {
                summary.literals += 1;
                summary.resolved += 1;
                resolved.insert(key.clone(), value);
            }
            ArgSpec::Parameter(name) => {
                summary.parameters += 1;
                let value = context
                    .as_object()
                    .and_then(|object| object.get("parameters"))
                    .and_then(|parameters| parameters.as_object())
                    .and_then(|parameters| parameters.get(&name));
                match value {
                    Some(value) => {
                        summary.resolved += 1;
                        resolved.insert(key.clone(), value.clone());
                    }
                    None => summary.failed += 1,
                }
            }
            ArgSpec::Reference(expression) => {
                summary.references += 1;
                match resolve_reference(&expression, prior_results) {
                    Some(value) => {
                        summary.resolved += 1;
                        resolved.insert(key.clone(), value);
                    }
                    None => summary.failed += 1,
                }
            }
        }
    }
    (resolved, summary)
}

/// Merges resolved and explicit arguments; explicit entries win.
#[must_use]
pub fn merge_arguments(
    resolved: Map<String, Value>,
    explicit: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = resolved;
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Returns the required argument names missing from the resolved map.
#[must_use]
pub fn validate_required_arguments(
    resolved: &Map<String, Value>,
    required: &[String],
) -> Vec<String> {
    required.iter().filter(|name| !resolved.contains_key(*name)).cloned().collect()
}

#[cfg(test)]
mod tests;
