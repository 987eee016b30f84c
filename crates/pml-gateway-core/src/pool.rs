// crates/pml-gateway-core/src/pool.rs
// ============================================================================
// Module: Tool Server Connection Pool
// Description: Bounded, lazy, idle-expiring pool of tool-server clients.
// Purpose: Share per-server connections with single-flight creation.
// Dependencies: futures, tokio, tracing
// ============================================================================

//! ## Overview
//! The pool creates connections lazily through caller-supplied factories and
//! expires them after an idle period. Acquire returns the existing client
//! for a server when present (resetting its idle timer), otherwise invokes
//! the factory while holding the pool lock, so no two factories run
//! concurrently for the same server.
//! Invariants:
//! - The pool never exceeds `max_connections` entries.
//! - Factory failures leave the pool unchanged and propagate to the caller.
//! - Close disconnects every entry and tolerates per-entry faults.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::interfaces::ToolClient;
use crate::types::identifiers::ServerId;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the connection pool.
///
/// # Invariants
/// - `max_connections` is greater than zero.
/// - `idle_timeout` applies per entry from its last acquire or release.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum number of simultaneously pooled connections.
    pub max_connections: usize,
    /// Idle period after which an entry is disconnected and removed.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// SECTION: Pool Entries
// ============================================================================

/// One pooled connection with its idle-timer epoch.
struct PoolEntry {
    /// The shared client.
    client: Arc<dyn ToolClient>,
    /// Epoch bumped on every timer reset; stale timers no-op.
    epoch: u64,
}

/// Shared pool state.
struct PoolInner {
    /// Pool configuration.
    config: PoolConfig,
    /// Entries keyed by server; guarded by one async lock that is also held
    /// across factory invocation (single-flight).
    entries: Mutex<HashMap<ServerId, PoolEntry>>,
    /// Whether the pool is closed.
    closed: std::sync::atomic::AtomicBool,
}

// ============================================================================
// SECTION: Connection Pool
// ============================================================================

/// Bounded lazy pool of tool-server clients.
///
/// # Invariants
/// - `acquire` is single-flight per server: the pool lock is held across the
///   factory call.
/// - Idle timers are reset by both `acquire` and `release`.
#[derive(Clone)]
pub struct ConnectionPool {
    /// Shared state.
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool with the provided configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                entries: Mutex::new(HashMap::new()),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Returns the existing client for a server, or creates one.
    ///
    /// The factory runs under the pool lock; concurrent acquires for any
    /// server wait rather than racing a second factory call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PoolExhausted`] when the pool is full and the
    /// server has no entry, [`GatewayError::Unavailable`] after close, and
    /// any factory error unchanged.
    pub async fn acquire<F, Fut>(
        &self,
        server_id: &ServerId,
        factory: F,
    ) -> Result<Arc<dyn ToolClient>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn ToolClient>, GatewayError>>,
    {
        if self.is_closed() {
            return Err(GatewayError::Unavailable("connection pool is closed".to_string()));
        }
        let mut entries = self.inner.entries.lock().await;
        if let Some(entry) = entries.get_mut(server_id) {
            entry.epoch += 1;
            let client = Arc::clone(&entry.client);
            let epoch = entry.epoch;
            drop(entries);
            self.spawn_idle_timer(server_id.clone(), epoch);
            return Ok(client);
        }
        if entries.len() >= self.inner.config.max_connections {
            return Err(GatewayError::PoolExhausted {
                max: self.inner.config.max_connections,
            });
        }
        let client = factory().await?;
        entries.insert(
            server_id.clone(),
            PoolEntry {
                client: Arc::clone(&client),
                epoch: 0,
            },
        );
        drop(entries);
        self.spawn_idle_timer(server_id.clone(), 0);
        Ok(client)
    }

    /// Resets the idle timer of an entry after use.
    ///
    /// Unknown servers are ignored.
    pub async fn release(&self, server_id: &ServerId) {
        let mut entries = self.inner.entries.lock().await;
        if let Some(entry) = entries.get_mut(server_id) {
            entry.epoch += 1;
            let epoch = entry.epoch;
            drop(entries);
            self.spawn_idle_timer(server_id.clone(), epoch);
        }
    }

    /// Returns the number of pooled connections.
    pub async fn size(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    /// Disconnects every entry and refuses further acquires.
    ///
    /// Per-entry disconnect faults are logged and do not stop the sweep.
    pub async fn close(&self) {
        self.inner.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        let drained: Vec<(ServerId, Arc<dyn ToolClient>)> = {
            let mut entries = self.inner.entries.lock().await;
            entries.drain().map(|(id, entry)| (id, entry.client)).collect()
        };
        for (server_id, client) in drained {
            let outcome =
                std::panic::AssertUnwindSafe(client.disconnect()).catch_unwind().await;
            if outcome.is_err() {
                tracing::warn!(server = %server_id, "disconnect fault during pool close");
            }
        }
    }

    /// Returns true when the pool refuses acquires.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Spawns the idle timer for an entry epoch.
    ///
    /// The timer removes and disconnects the entry only when its epoch is
    /// still current at expiry; resets invalidate older timers.
    fn spawn_idle_timer(&self, server_id: ServerId, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.idle_timeout).await;
            let expired = {
                let mut entries = inner.entries.lock().await;
                match entries.get(&server_id) {
                    Some(entry) if entry.epoch == epoch => entries.remove(&server_id),
                    _ => None,
                }
            };
            if let Some(entry) = expired {
                tracing::debug!(server = %server_id, "idle connection expired");
                entry.client.disconnect().await;
            }
        });
    }
}

#[cfg(test)]
mod tests;
