// crates/pml-gateway-core/src/types/time.rs
// ============================================================================
// Module: Gateway Time Model
// Description: Millisecond timestamps for events, traces, and checkpoints.
// Purpose: Provide one canonical wall-clock representation across records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The gateway stamps events, traces, and checkpoints with Unix epoch
//! milliseconds. Callers that need deterministic replay construct timestamps
//! explicitly; runtime paths use [`Timestamp::now`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Serializes as a plain integer; ordering matches chronological order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from raw epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self(i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX))
    }

    /// Returns the raw epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the elapsed milliseconds since an earlier timestamp.
    ///
    /// Saturates at zero when `earlier` is in the future.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> u64 {
        let delta = self.0 - earlier.0;
        if delta < 0 { 0 } else { delta as u64 }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
