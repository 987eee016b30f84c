// crates/pml-gateway-core/src/bus.rs
// ============================================================================
// Module: Gateway Event Bus
// Description: Process-wide typed pub/sub with wildcard subscribers.
// Purpose: Deliver events asynchronously with per-handler fault isolation.
// Dependencies: futures, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The event bus is a single-process pub/sub: handlers subscribe to an exact
//! event type or the `*` wildcard, `emit` enqueues the event and returns
//! immediately, and a dedicated dispatcher task delivers events in FIFO emit
//! order. A handler fault (an `Err` return or a panic) never reaches other
//! handlers or the emitter; it is swallowed with diagnostic logging only.
//! Invariants:
//! - Delivery order matches emit order for every subscriber.
//! - `emit` after `close` is a no-op; `reset` re-opens and zeros counters.
//! - Emit overhead is enqueue-only; handler work happens off the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::error::GatewayError;
use crate::types::event::GatewayEvent;
use crate::types::event::WILDCARD;
use crate::types::time::Timestamp;

// ============================================================================
// SECTION: Handler Types
// ============================================================================

/// Boxed asynchronous event handler.
pub type EventHandler =
    Arc<dyn Fn(GatewayEvent) -> BoxFuture<'static, Result<(), GatewayError>> + Send + Sync>;

/// Opaque subscription identifier returned by [`EventBus::on`].
///
/// # Invariants
/// - The zero value is the no-op subscription returned after `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// No-op subscription handed out by a closed bus.
    pub const NOOP: Self = Self(0);
}

/// Registered handler entry.
struct HandlerEntry {
    /// Subscription identifier.
    id: u64,
    /// Whether the handler unsubscribes after its first delivery.
    once: bool,
    /// The handler itself.
    handler: EventHandler,
}

// ============================================================================
// SECTION: Bus State
// ============================================================================

/// Mutable bus state guarded by one lock.
struct BusState {
    /// Whether the bus is closed to emits and subscriptions.
    closed: bool,
    /// Next subscription identifier (1-based; 0 is the no-op id).
    next_id: u64,
    /// Handlers keyed by event type (wildcard under `*`).
    handlers: HashMap<String, Vec<HandlerEntry>>,
    /// Number of accepted emits since construction or reset.
    emit_count: u64,
}

impl BusState {
    fn new() -> Self {
        Self {
            closed: false,
            next_id: 1,
            handlers: HashMap::new(),
            emit_count: 0,
        }
    }
}

/// Queue item consumed by the dispatcher task.
enum QueueItem {
    /// An event to deliver.
    Event(GatewayEvent),
    /// A barrier acknowledged once every prior event was delivered.
    Flush(oneshot::Sender<()>),
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Process-wide typed pub/sub with wildcard subscribers.
///
/// # Invariants
/// - One dispatcher task consumes the queue; FIFO order is preserved per
///   subscriber.
/// - Handler faults are logged and swallowed.
#[derive(Clone)]
pub struct EventBus {
    /// Shared mutable state.
    state: Arc<Mutex<BusState>>,
    /// Sender feeding the dispatcher task.
    queue: mpsc::UnboundedSender<QueueItem>,
}

impl EventBus {
    /// Creates a bus and spawns its dispatcher task.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(BusState::new()));
        let (queue, rx) = mpsc::unbounded_channel();
        let dispatcher_state = Arc::clone(&state);
        tokio::spawn(dispatch_loop(dispatcher_state, rx));
        Self {
            state,
            queue,
        }
    }

    /// Subscribes a handler to an event type (or `*` for all events).
    ///
    /// Returns [`SubscriptionId::NOOP`] when the bus is closed.
    pub fn on(&self, event_type: &str, handler: EventHandler) -> SubscriptionId {
        self.subscribe(event_type, handler, false)
    }

    /// Subscribes a handler that is removed after its first delivery.
    pub fn once(&self, event_type: &str, handler: EventHandler) -> SubscriptionId {
        self.subscribe(event_type, handler, true)
    }

    /// Subscribes an async closure; convenience over [`EventBus::on`].
    pub fn on_async<F, Fut>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
    {
        self.on(event_type, Arc::new(move |event| handler(event).boxed()))
    }

    /// Removes a subscription; returns true when it existed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        if id == SubscriptionId::NOOP {
            return false;
        }
        let mut state = self.lock_state();
        let mut removed = false;
        for entries in state.handlers.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.id != id.0);
            removed |= entries.len() != before;
        }
        state.handlers.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Emits an event; delivery happens asynchronously in FIFO order.
    ///
    /// Fills in the timestamp when the event carries none. No-op after
    /// `close`.
    pub fn emit(&self, mut event: GatewayEvent) {
        {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.emit_count += 1;
        }
        if event.timestamp == Timestamp::default() {
            event.timestamp = Timestamp::now();
        }
        // The receiver lives as long as the process; a send failure only
        // happens during teardown and is intentionally ignored.
        let _ = self.queue.send(QueueItem::Event(event));
    }

    /// Waits until every previously emitted event has been delivered.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(QueueItem::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Closes the bus: subsequent emits are no-ops and subscriptions are
    /// refused.
    pub fn close(&self) {
        self.lock_state().closed = true;
    }

    /// Re-opens the bus and returns it to its freshly constructed state.
    ///
    /// Test hook: clears handlers and zeros the emit counter.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        *state = BusState::new();
    }

    /// Returns true when any handler (exact or wildcard) would receive the
    /// type.
    #[must_use]
    pub fn has_handlers(&self, event_type: &str) -> bool {
        let state = self.lock_state();
        state.handlers.get(event_type).is_some_and(|entries| !entries.is_empty())
            || state.handlers.get(WILDCARD).is_some_and(|entries| !entries.is_empty())
    }

    /// Returns the number of handlers registered for the exact type.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.lock_state().handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Returns the number of accepted emits since construction or reset.
    #[must_use]
    pub fn emit_count(&self) -> u64 {
        self.lock_state().emit_count
    }

    /// Returns the event types with at least one registered handler.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let state = self.lock_state();
        let mut types: Vec<String> = state.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Registers a handler entry under the given type.
    fn subscribe(&self, event_type: &str, handler: EventHandler, once: bool) -> SubscriptionId {
        let mut state = self.lock_state();
        if state.closed {
            return SubscriptionId::NOOP;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.entry(event_type.to_string()).or_default().push(HandlerEntry {
            id,
            once,
            handler,
        });
        SubscriptionId(id)
    }

    /// Locks the bus state, recovering from a poisoned lock.
    ///
    /// Handlers never run under this lock, so poisoning can only come from a
    /// panic inside the bus itself; the state stays structurally valid.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Consumes the queue and delivers events to matching handlers.
async fn dispatch_loop(
    state: Arc<Mutex<BusState>>,
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Event(event) => {
                let handlers = snapshot_handlers(&state, &event.event_type);
                for handler in handlers {
                    let outcome =
                        std::panic::AssertUnwindSafe(handler(event.clone())).catch_unwind().await;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::warn!(
                                event_type = %event.event_type,
                                error = %err,
                                "event handler failed"
                            );
                        }
                        Err(_) => {
                            tracing::warn!(
                                event_type = %event.event_type,
                                "event handler panicked"
                            );
                        }
                    }
                }
            }
            QueueItem::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Snapshots the handlers matching an event type, removing `once` entries.
fn snapshot_handlers(state: &Arc<Mutex<BusState>>, event_type: &str) -> Vec<EventHandler> {
    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mut snapshot = Vec::new();
    for key in [event_type, WILDCARD] {
        if let Some(entries) = guard.handlers.get_mut(key) {
            for entry in entries.iter() {
                snapshot.push(Arc::clone(&entry.handler));
            }
            entries.retain(|entry| !entry.once);
        }
    }
    guard.handlers.retain(|_, entries| !entries.is_empty());
    snapshot
}

#[cfg(test)]
mod tests;
