//! Publish/subscribe fan-out for registry events.
//!
//! Two ways to observe events:
//! - [`ChangeNotifier::subscribe`] registers a synchronous handler for one
//!   [`EventKind`]; handlers run inline, in publish order.
//! - [`ChangeNotifier::stream`] returns a `broadcast` receiver carrying every
//!   event, for consumers living on their own task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use balance_core::{EventKind, RegistryEvent};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

/// Handler invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Identifies a subscription so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    id: u64,
    kind: EventKind,
    handler: EventHandler,
}

/// Broadcasts registry events to subscribers.
pub struct ChangeNotifier {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    stream_tx: broadcast::Sender<RegistryEvent>,
}

impl ChangeNotifier {
    /// Capacity of the broadcast stream. Slow stream consumers past this lag
    /// and observe `RecvError::Lagged`.
    pub const STREAM_CAPACITY: usize = 256;

    #[must_use]
    pub fn new() -> Self {
        let (stream_tx, _rx) = broadcast::channel(Self::STREAM_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            stream_tx,
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        SubscriptionHandle(id)
    }

    /// Cancels a subscription. Returns `false` if it was already cancelled.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.id != handle.0);
        subs.len() != before
    }

    /// Returns a receiver of every event published from now on.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<RegistryEvent> {
        self.stream_tx.subscribe()
    }

    /// Delivers `event` to every handler subscribed to its kind, then to
    /// stream receivers.
    pub fn publish(&self, event: &RegistryEvent) {
        let kind = event.kind();

        // Clone the matching handlers out so a handler may subscribe or
        // unsubscribe without deadlocking.
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        trace!(event = %kind, handlers = handlers.len(), "Publishing registry event");

        for handler in &handlers {
            handler(event);
        }

        // No receivers is fine.
        let _ = self.stream_tx.send(event.clone());
    }

    /// Publishes a batch of events in order.
    pub fn publish_all(&self, events: &[RegistryEvent]) {
        for event in events {
            self.publish(event);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
