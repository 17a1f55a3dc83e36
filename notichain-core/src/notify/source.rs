//! Event Sources
//!
//! An [`EventSource`] is a list of listeners that can be added and removed
//! from any thread. It is the only place in the crate where subscribe and
//! unsubscribe race against each other, so it is the only place that needs
//! mutual exclusion for them.
//!
//! # Delivery
//!
//! Raising an event takes a snapshot of the listeners under a read lock and
//! then calls each one with no lock held. A listener may therefore subscribe,
//! unsubscribe, or raise further events from inside its own invocation. A
//! listener removed during delivery still sees the event that was already in
//! flight.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::subscription::SubscriptionId;
use super::PropertyChangedHandler;

/// A thread-safe, ordered list of listeners of type `H`.
///
/// Clones share the same listener list.
pub struct EventSource<H>
where
    H: Clone + Send + Sync,
{
    listeners: Arc<RwLock<Vec<(SubscriptionId, H)>>>,
}

impl<H> EventSource<H>
where
    H: Clone + Send + Sync,
{
    /// Create an event source with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a listener. Listeners are invoked in subscription order.
    pub fn subscribe(&self, handler: H) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners.write().push((id, handler));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Copy of the current listeners, for delivery without holding the lock.
    pub fn handlers(&self) -> SmallVec<[H; 4]> {
        self.listeners
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

impl<H> Default for EventSource<H>
where
    H: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for EventSource<H>
where
    H: Clone + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<H> std::fmt::Debug for EventSource<H>
where
    H: Clone + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

/// Listener list for "property changed" events.
pub type PropertyChangedSource = EventSource<PropertyChangedHandler>;

impl EventSource<PropertyChangedHandler> {
    /// Tell every listener that `property` changed on `sender`.
    pub fn raise(&self, sender: &dyn Any, property: &str) {
        let handlers = self.handlers();
        tracing::trace!(property, listeners = handlers.len(), "raising property change");
        for handler in handlers {
            handler(sender, property);
        }
    }
}
