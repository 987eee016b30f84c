// crates/pml-gateway-store-sqlite/src/trace_store.rs
// ============================================================================
// Module: Execution Trace Store
// Description: Sanitized trace persistence with prioritized replay sampling.
// Purpose: Persist traces, clamp priorities, and bias samples by priority.
// Dependencies: pml-gateway-core, rand, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Traces are sanitized on write: secret-bearing keys in arguments and
//! contexts hold the redaction literal before the row exists. Reads return
//! traces in descending execution time. Priorities clamp to `[0, 1]` on
//! every write, and prioritized-experience-replay sampling draws traces with
//! probability proportional to `priority^α` under the global α.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::Rng;
use rusqlite::OptionalExtension;
use rusqlite::params;

use pml_gateway_core::types::identifiers::CapabilityId;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::trace::ANONYMIZED_USER;
use pml_gateway_core::types::trace::DecisionRecord;
use pml_gateway_core::types::trace::ExecutionTrace;
use pml_gateway_core::types::trace::PER_ALPHA;
use pml_gateway_core::types::trace::TraceTaskResult;
use pml_gateway_core::types::trace::clamp_priority;

use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Filter for trace listings.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    /// Restrict to one capability.
    pub capability_id: Option<CapabilityId>,
    /// Restrict to one user.
    pub user_id: Option<String>,
    /// Page size; zero means no limit.
    pub limit: usize,
}

// ============================================================================
// SECTION: Trace Store
// ============================================================================

/// Store over the `execution_trace` table.
#[derive(Clone)]
pub struct TraceStore {
    /// Shared database handle.
    store: SqliteStore,
}

impl TraceStore {
    /// Creates a trace store.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }

    /// Inserts a trace, sanitizing and clamping before the row is written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn insert(&self, trace: &ExecutionTrace) -> Result<(), StoreError> {
        let mut trace = trace.clone();
        trace.sanitize();
        trace.set_priority(trace.priority);
        let executed_path = serde_json::to_string(&trace.executed_path)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let decisions = serde_json::to_string(&trace.decisions)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let task_results = serde_json::to_string(&trace.task_results)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        self.store.lock().execute(
            "INSERT INTO execution_trace (
                 id, capability_id, intent_text, initial_context, executed_at,
                 success, duration_ms, error_message, executed_path, decisions,
                 task_results, priority, parent_trace_id, user_id, created_by
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                trace.id.to_string(),
                trace.capability_id.map(|id| id.to_string()),
                trace.intent_text,
                trace.initial_context.to_string(),
                trace.executed_at.as_unix_millis(),
                i64::from(trace.success),
                trace.duration_ms as i64,
                trace.error_message,
                executed_path,
                decisions,
                task_results,
                trace.priority,
                trace.parent_trace_id.map(|id| id.to_string()),
                trace.user_id,
                trace.created_by
            ],
        )?;
        Ok(())
    }

    /// Returns a trace by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    pub fn get(&self, id: &TraceId) -> Result<ExecutionTrace, StoreError> {
        let connection = self.store.lock();
        let row = connection
            .query_row(
                "SELECT * FROM execution_trace WHERE id = ?1",
                params![id.to_string()],
                read_trace,
            )
            .optional()?;
        match row {
            Some(trace) => trace,
            None => Err(StoreError::NotFound(format!("trace {id}"))),
        }
    }

    /// Lists traces in descending execution time under a filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list(&self, filter: &TraceFilter) -> Result<Vec<ExecutionTrace>, StoreError> {
        let mut sql = String::from("SELECT * FROM execution_trace WHERE 1 = 1");
        let mut arguments: Vec<String> = Vec::new();
        if let Some(capability_id) = &filter.capability_id {
            sql.push_str(" AND capability_id = ?");
            arguments.push(capability_id.to_string());
        }
        if let Some(user_id) = &filter.user_id {
            sql.push_str(" AND user_id = ?");
            arguments.push(user_id.clone());
        }
        sql.push_str(" ORDER BY executed_at DESC");
        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
            arguments.push(filter.limit.to_string());
        }
        let connection = self.store.lock();
        let mut statement = connection.prepare(&sql)?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(arguments.iter()), read_trace)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Clamps and stores a trace priority.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trace is absent.
    pub fn update_priority(&self, id: &TraceId, priority: f64) -> Result<(), StoreError> {
        let updated = self.store.lock().execute(
            "UPDATE execution_trace SET priority = ?1 WHERE id = ?2",
            params![clamp_priority(priority), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("trace {id}")));
        }
        Ok(())
    }

    /// Anonymizes a trace: user replaced, intent and context cleared.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trace is absent.
    pub fn anonymize(&self, id: &TraceId) -> Result<(), StoreError> {
        let updated = self.store.lock().execute(
            "UPDATE execution_trace SET user_id = ?1, intent_text = NULL, initial_context = 'null'
             WHERE id = ?2",
            params![ANONYMIZED_USER, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("trace {id}")));
        }
        Ok(())
    }

    /// Returns the highest-priority traces, descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn get_high_priority(&self, limit: usize) -> Result<Vec<ExecutionTrace>, StoreError> {
        let connection = self.store.lock();
        let mut statement = connection
            .prepare("SELECT * FROM execution_trace ORDER BY priority DESC LIMIT ?1")?;
        let rows = statement
            .query_map(params![limit as i64], read_trace)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Draws a prioritized-experience-replay sample.
    ///
    /// Each eligible trace is drawn with probability proportional to
    /// `priority^α` (global α), without replacement, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn sample_by_priority(
        &self,
        limit: usize,
        min_priority: f64,
    ) -> Result<Vec<ExecutionTrace>, StoreError> {
        let eligible = {
            let connection = self.store.lock();
            let mut statement = connection
                .prepare("SELECT * FROM execution_trace WHERE priority >= ?1")?;
            let rows = statement
                .query_map(params![min_priority], read_trace)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().collect::<Result<Vec<ExecutionTrace>, _>>()?
        };
        Ok(weighted_sample(eligible, limit))
    }
}

// ============================================================================
// SECTION: Sampling
// ============================================================================

/// Weighted sampling without replacement by `priority^α`.
fn weighted_sample(mut pool: Vec<ExecutionTrace>, limit: usize) -> Vec<ExecutionTrace> {
    let mut rng = rand::thread_rng();
    let mut sampled = Vec::with_capacity(limit.min(pool.len()));
    while sampled.len() < limit && !pool.is_empty() {
        let weights: Vec<f64> =
            pool.iter().map(|trace| trace.priority.max(f64::EPSILON).powf(PER_ALPHA)).collect();
        let total: f64 = weights.iter().sum();
        let mut draw = rng.gen_range(0.0..total.max(f64::EPSILON));
        let mut chosen = 0usize;
        for (index, weight) in weights.iter().enumerate() {
            if draw < *weight {
                chosen = index;
                break;
            }
            draw -= weight;
        }
        sampled.push(pool.swap_remove(chosen));
    }
    sampled
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Decodes one trace row.
fn read_trace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ExecutionTrace, StoreError>> {
    let id_raw: String = row.get("id")?;
    let capability_raw: Option<String> = row.get("capability_id")?;
    let parent_raw: Option<String> = row.get("parent_trace_id")?;
    let context_raw: String = row.get("initial_context")?;
    let path_raw: String = row.get("executed_path")?;
    let decisions_raw: String = row.get("decisions")?;
    let tasks_raw: String = row.get("task_results")?;
    let intent_text: Option<String> = row.get("intent_text")?;
    let executed_at: i64 = row.get("executed_at")?;
    let success: i64 = row.get("success")?;
    let duration_ms: i64 = row.get("duration_ms")?;
    let error_message: Option<String> = row.get("error_message")?;
    let priority: f64 = row.get("priority")?;
    let user_id: String = row.get("user_id")?;
    let created_by: String = row.get("created_by")?;
    Ok((|| {
        let id = TraceId::parse(&id_raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let capability_id = capability_raw
            .map(|raw| CapabilityId::parse(&raw))
            .transpose()
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let parent_trace_id = parent_raw
            .map(|raw| TraceId::parse(&raw))
            .transpose()
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let initial_context = serde_json::from_str(&context_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let executed_path: Vec<NodeId> = serde_json::from_str(&path_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let decisions: Vec<DecisionRecord> = serde_json::from_str(&decisions_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let task_results: Vec<TraceTaskResult> = serde_json::from_str(&tasks_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(ExecutionTrace {
            id,
            capability_id,
            intent_text,
            initial_context,
            executed_at: pml_gateway_core::types::time::Timestamp::from_unix_millis(executed_at),
            success: success != 0,
            duration_ms: duration_ms as u64,
            error_message,
            executed_path,
            decisions,
            task_results,
            priority,
            parent_trace_id,
            user_id,
            created_by,
        })
    })())
}

#[cfg(test)]
mod tests;
