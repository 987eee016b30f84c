// crates/pml-gateway-store-sqlite/src/algorithm_tracer.rs
// ============================================================================
// Module: Algorithm Tracer
// Description: Append-only log of algorithm scoring decisions.
// Purpose: Buffer decision traces, patch outcomes, and expire old rows.
// Dependencies: pml-gateway-core, rusqlite, serde, serde_json
// ============================================================================

//! ## Overview
//! Every discovery scoring decision appends a trace: mode, target type,
//! signals, scoring parameters, final score, threshold, and the decision
//! label. Appends buffer in memory and flush at a capacity mark or on an
//! explicit flush; outcomes are patched in place once user action or
//! execution results arrive. Cleanup deletes traces older than a retention
//! window and reports the count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use pml_gateway_core::types::identifiers::TraceId;
use pml_gateway_core::types::time::Timestamp;

use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Buffered appends are flushed once the buffer reaches this size.
const FLUSH_AT: usize = 32;

/// Milliseconds per day for retention arithmetic.
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// SECTION: Trace Types
// ============================================================================

/// Algorithm mode behind a scoring decision.
///
/// # Invariants
/// - Labels are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmMode {
    /// The algorithm searched on an explicit request.
    ActiveSearch,
    /// The algorithm volunteered a suggestion.
    PassiveSuggestion,
}

/// Target type of a scoring decision.
///
/// # Invariants
/// - Labels are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A tool was scored.
    Tool,
    /// A capability was scored.
    Capability,
}

/// Decision label of a scoring pass.
///
/// # Invariants
/// - Labels are stable for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmDecision {
    /// The candidate was surfaced.
    Accepted,
    /// The candidate scored below the threshold.
    RejectedByThreshold,
    /// The candidate was dropped for reliability.
    FilteredByReliability,
}

/// Outcome patched onto a trace after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmOutcome {
    /// What the user did with the suggestion.
    pub user_action: String,
    /// Whether the resulting execution succeeded.
    pub execution_success: Option<bool>,
    /// Execution duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// One algorithm decision trace.
///
/// # Invariants
/// - `final_score` and `threshold_used` are finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmTrace {
    /// Trace identifier.
    pub trace_id: TraceId,
    /// Decision timestamp.
    pub timestamp: Timestamp,
    /// Algorithm mode.
    pub algorithm_mode: AlgorithmMode,
    /// Target type.
    pub target_type: TargetType,
    /// Intent text, when available.
    pub intent: Option<String>,
    /// Observed signals (graph density, cluster match, ...).
    pub signals: Value,
    /// Scoring parameters (α, reliability factor, structural boost).
    pub params: Value,
    /// Final score.
    pub final_score: f64,
    /// Threshold applied.
    pub threshold_used: f64,
    /// Decision label.
    pub decision: AlgorithmDecision,
    /// Outcome, once known.
    pub outcome: Option<AlgorithmOutcome>,
}

// ============================================================================
// SECTION: Tracer
// ============================================================================

/// Buffered append-only tracer over `algorithm_traces`.
pub struct AlgorithmTracer {
    /// Shared database handle.
    store: SqliteStore,
    /// Pending appends.
    buffer: Mutex<Vec<AlgorithmTrace>>,
}

impl AlgorithmTracer {
    /// Creates a tracer with an empty buffer.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Appends a trace to the buffer, flushing at the capacity mark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when an implied flush fails.
    pub fn append(&self, trace: AlgorithmTrace) -> Result<(), StoreError> {
        let should_flush = {
            let mut buffer = self.lock_buffer();
            buffer.push(trace);
            buffer.len() >= FLUSH_AT
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes every buffered trace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure; unwritten traces stay
    /// buffered.
    pub fn flush(&self) -> Result<(), StoreError> {
        let pending: Vec<AlgorithmTrace> = {
            let mut buffer = self.lock_buffer();
            buffer.drain(..).collect()
        };
        if pending.is_empty() {
            return Ok(());
        }
        let connection = self.store.lock();
        for trace in &pending {
            let signals = trace.signals.to_string();
            let trace_params = trace.params.to_string();
            let outcome = trace
                .outcome
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            connection.execute(
                "INSERT INTO algorithm_traces (
                     trace_id, timestamp, algorithm_mode, target_type, intent,
                     signals, params, final_score, threshold_used, decision, outcome
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (trace_id) DO NOTHING",
                params![
                    trace.trace_id.to_string(),
                    trace.timestamp.as_unix_millis(),
                    mode_label(trace.algorithm_mode),
                    target_label(trace.target_type),
                    trace.intent,
                    signals,
                    trace_params,
                    trace.final_score,
                    trace.threshold_used,
                    decision_label(trace.decision),
                    outcome
                ],
            )?;
        }
        Ok(())
    }

    /// Patches the outcome of a persisted trace in place.
    ///
    /// Flushes the buffer first so recent appends are patchable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trace is absent.
    pub fn update_outcome(
        &self,
        trace_id: &TraceId,
        outcome: &AlgorithmOutcome,
    ) -> Result<(), StoreError> {
        self.flush()?;
        let payload =
            serde_json::to_string(outcome).map_err(|err| StoreError::Invalid(err.to_string()))?;
        let updated = self.store.lock().execute(
            "UPDATE algorithm_traces SET outcome = ?1 WHERE trace_id = ?2",
            params![payload, trace_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("algorithm trace {trace_id}")));
        }
        Ok(())
    }

    /// Returns a trace by identifier, flushing the buffer first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent.
    pub fn get(&self, trace_id: &TraceId) -> Result<AlgorithmTrace, StoreError> {
        self.flush()?;
        let connection = self.store.lock();
        let row = connection
            .query_row(
                "SELECT * FROM algorithm_traces WHERE trace_id = ?1",
                params![trace_id.to_string()],
                read_algorithm_trace,
            )
            .optional()?;
        match row {
            Some(trace) => trace,
            None => Err(StoreError::NotFound(format!("algorithm trace {trace_id}"))),
        }
    }

    /// Deletes traces older than the retention window; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn cleanup(&self, days: u32) -> Result<usize, StoreError> {
        self.flush()?;
        let cutoff = Timestamp::now().as_unix_millis() - i64::from(days) * DAY_MS;
        let deleted = self
            .store
            .lock()
            .execute("DELETE FROM algorithm_traces WHERE timestamp < ?1", params![cutoff])?;
        Ok(deleted)
    }

    /// Locks the buffer, recovering from poisoning.
    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<AlgorithmTrace>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Returns the persisted mode label.
const fn mode_label(mode: AlgorithmMode) -> &'static str {
    match mode {
        AlgorithmMode::ActiveSearch => "active_search",
        AlgorithmMode::PassiveSuggestion => "passive_suggestion",
    }
}

/// Returns the persisted target label.
const fn target_label(target: TargetType) -> &'static str {
    match target {
        TargetType::Tool => "tool",
        TargetType::Capability => "capability",
    }
}

/// Returns the persisted decision label.
const fn decision_label(decision: AlgorithmDecision) -> &'static str {
    match decision {
        AlgorithmDecision::Accepted => "accepted",
        AlgorithmDecision::RejectedByThreshold => "rejected_by_threshold",
        AlgorithmDecision::FilteredByReliability => "filtered_by_reliability",
    }
}

/// Decodes one algorithm trace row.
fn read_algorithm_trace(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<AlgorithmTrace, StoreError>> {
    let trace_raw: String = row.get("trace_id")?;
    let timestamp: i64 = row.get("timestamp")?;
    let mode_raw: String = row.get("algorithm_mode")?;
    let target_raw: String = row.get("target_type")?;
    let intent: Option<String> = row.get("intent")?;
    let signals_raw: String = row.get("signals")?;
    let params_raw: String = row.get("params")?;
    let final_score: f64 = row.get("final_score")?;
    let threshold_used: f64 = row.get("threshold_used")?;
    let decision_raw: String = row.get("decision")?;
    let outcome_raw: Option<String> = row.get("outcome")?;
    Ok((|| {
        let trace_id =
            TraceId::parse(&trace_raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let algorithm_mode = match mode_raw.as_str() {
            "active_search" => AlgorithmMode::ActiveSearch,
            "passive_suggestion" => AlgorithmMode::PassiveSuggestion,
            other => return Err(StoreError::Corrupt(format!("algorithm mode `{other}`"))),
        };
        let target_type = match target_raw.as_str() {
            "tool" => TargetType::Tool,
            "capability" => TargetType::Capability,
            other => return Err(StoreError::Corrupt(format!("target type `{other}`"))),
        };
        let decision = match decision_raw.as_str() {
            "accepted" => AlgorithmDecision::Accepted,
            "rejected_by_threshold" => AlgorithmDecision::RejectedByThreshold,
            "filtered_by_reliability" => AlgorithmDecision::FilteredByReliability,
            other => return Err(StoreError::Corrupt(format!("decision `{other}`"))),
        };
        let signals = serde_json::from_str(&signals_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let params = serde_json::from_str(&params_raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let outcome = outcome_raw
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(AlgorithmTrace {
            trace_id,
            timestamp: Timestamp::from_unix_millis(timestamp),
            algorithm_mode,
            target_type,
            intent,
            signals,
            params,
            final_score,
            threshold_used,
            decision,
            outcome,
        })
    })())
}

#[cfg(test)]
mod tests;
