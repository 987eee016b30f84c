// crates/pml-gateway-mcp/src/sse.rs
// ============================================================================
// Module: Events Stream Manager
// Description: Bounded SSE fan-out with filters, heartbeat, backpressure.
// Purpose: Deliver bus events to streaming clients without blocking the bus.
// Dependencies: pml-gateway-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The stream manager feeds a bounded set of SSE clients from the event bus.
//! Each client subscribes with glob-prefix filters (or receives everything),
//! holds a bounded buffer, and loses events on overflow; slow consumers are
//! never allowed to block back into the bus. A heartbeat task periodically
//! sends `{connected_clients, uptime_seconds}` to every client and prunes
//! aborted connections, so a disconnect is observed within one heartbeat
//! interval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pml_gateway_core::bus::EventBus;
use pml_gateway_core::bus::SubscriptionId;
use pml_gateway_core::types::event::GatewayEvent;
use pml_gateway_core::types::event::event_types;
use pml_gateway_core::types::event::matches_filter;

use crate::config::SseConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stream manager errors.
///
/// # Invariants
/// - Variants are stable for transport mapping.
#[derive(Debug, Error)]
pub enum SseError {
    /// The client cap is reached.
    #[error("too many clients (max {max})")]
    TooManyClients {
        /// Configured client cap.
        max: usize,
    },
}

// ============================================================================
// SECTION: Clients
// ============================================================================

/// One connected SSE client.
struct SseClient {
    /// Client identifier.
    id: u64,
    /// Glob-prefix filters; empty means all events.
    filters: Vec<String>,
    /// Bounded channel into the client's connection task.
    sender: mpsc::Sender<GatewayEvent>,
}

impl SseClient {
    /// Returns true when the client wants the event type.
    fn wants(&self, event_type: &str) -> bool {
        self.filters.is_empty()
            || self.filters.iter().any(|filter| matches_filter(event_type, filter))
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Shared stream-manager state.
struct SseInner {
    /// Fan-out configuration.
    config: SseConfig,
    /// Connected clients; locked only for add/remove/snapshot.
    clients: Mutex<Vec<SseClient>>,
    /// Next client identifier.
    next_id: AtomicU64,
    /// Manager start time for uptime reporting.
    started_at: Instant,
}

/// Bounded SSE fan-out fed by the event bus.
#[derive(Clone)]
pub struct EventStreamManager {
    /// Shared state.
    inner: Arc<SseInner>,
    /// Event bus feeding the fan-out.
    bus: EventBus,
    /// Bus subscription feeding broadcasts.
    subscription: SubscriptionId,
    /// Heartbeat task handle.
    heartbeat: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventStreamManager {
    /// Creates a manager, subscribes to the bus, and starts the heartbeat.
    #[must_use]
    pub fn start(bus: EventBus, config: SseConfig) -> Self {
        let inner = Arc::new(SseInner {
            config,
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            started_at: Instant::now(),
        });
        let broadcast_inner = Arc::clone(&inner);
        let subscription = bus.on_async("*", move |event: GatewayEvent| {
            let inner = Arc::clone(&broadcast_inner);
            async move {
                broadcast(&inner, &event);
                Ok(())
            }
        });
        let heartbeat_inner = Arc::clone(&inner);
        let interval = std::time::Duration::from_secs(config.heartbeat_secs);
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                send_heartbeat(&heartbeat_inner);
            }
        });
        Self {
            inner,
            bus,
            subscription,
            heartbeat: Arc::new(Mutex::new(Some(heartbeat))),
        }
    }

    /// Adds a client with the given filters.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::TooManyClients`] at the cap.
    pub fn add_client(
        &self,
        filters: Vec<String>,
    ) -> Result<mpsc::Receiver<GatewayEvent>, SseError> {
        let mut clients = lock_clients(&self.inner);
        prune_closed(&mut clients);
        if clients.len() >= self.inner.config.max_clients {
            return Err(SseError::TooManyClients {
                max: self.inner.config.max_clients,
            });
        }
        let (sender, receiver) = mpsc::channel(self.inner.config.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        clients.push(SseClient {
            id,
            filters,
            sender,
        });
        tracing::debug!(client = id, total = clients.len(), "sse client connected");
        Ok(receiver)
    }

    /// Returns the number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        let mut clients = lock_clients(&self.inner);
        prune_closed(&mut clients);
        clients.len()
    }

    /// Returns manager uptime in whole seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Stops the heartbeat, unsubscribes from the bus, and drops clients.
    pub fn close(&self) {
        if let Some(handle) = lock_heartbeat(&self.heartbeat).take() {
            handle.abort();
        }
        self.bus.off(self.subscription);
        lock_clients(&self.inner).clear();
    }
}

// ============================================================================
// SECTION: Broadcast
// ============================================================================

/// Delivers one event to every matching client, dropping on full buffers.
fn broadcast(inner: &Arc<SseInner>, event: &GatewayEvent) {
    let clients = lock_clients(inner);
    for client in clients.iter() {
        if !client.wants(&event.event_type) {
            continue;
        }
        if let Err(mpsc::error::TrySendError::Full(_)) = client.sender.try_send(event.clone()) {
            tracing::debug!(client = client.id, "sse buffer full; event dropped");
        }
    }
}

/// Sends the heartbeat event to every client and prunes aborted ones.
fn send_heartbeat(inner: &Arc<SseInner>) {
    let mut clients = lock_clients(inner);
    prune_closed(&mut clients);
    let connected = clients.len();
    let uptime = inner.started_at.elapsed().as_secs();
    let heartbeat = GatewayEvent::new(
        event_types::HEARTBEAT,
        "sse",
        json!({ "connected_clients": connected, "uptime_seconds": uptime }),
    );
    for client in clients.iter() {
        let _ = client.sender.try_send(heartbeat.clone());
    }
}

/// Removes clients whose connection tasks are gone.
fn prune_closed(clients: &mut Vec<SseClient>) {
    clients.retain(|client| !client.sender.is_closed());
}

/// Locks the client list, recovering from poisoning.
fn lock_clients(inner: &Arc<SseInner>) -> std::sync::MutexGuard<'_, Vec<SseClient>> {
    match inner.clients.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Locks the heartbeat slot, recovering from poisoning.
fn lock_heartbeat(
    heartbeat: &Arc<Mutex<Option<JoinHandle<()>>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match heartbeat.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests;
