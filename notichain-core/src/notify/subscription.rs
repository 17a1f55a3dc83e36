//! Subscription identifiers and handles.
//!
//! Every listener added to an event source gets a [`SubscriptionId`]. Managers
//! keep a [`Subscription`] per source they listen to; dropping or cancelling
//! it removes the listener again.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a listener registration.
///
/// IDs come from a process-wide atomic counter, so they are unique across
/// event sources and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a live listener registration.
///
/// Dropping the handle runs its cancel action, which unsubscribes the
/// listener from the source it was added to.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the action that undoes a registration.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now. Calling this more than once has no further effect.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether the registration is still in place.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn subscription_ids_are_unique() {
        let id1 = SubscriptionId::new();
        let id2 = SubscriptionId::new();
        let id3 = SubscriptionId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn cancel_runs_once() {
        let cancelled = Arc::new(AtomicI32::new(0));
        let cancelled_clone = cancelled.clone();

        let mut subscription = Subscription::new(move || {
            cancelled_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(subscription.is_active());

        subscription.cancel();
        subscription.cancel();
        assert!(!subscription.is_active());

        drop(subscription);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels() {
        let cancelled = Arc::new(AtomicI32::new(0));
        let cancelled_clone = cancelled.clone();

        {
            let _subscription = Subscription::new(move || {
                cancelled_clone.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
