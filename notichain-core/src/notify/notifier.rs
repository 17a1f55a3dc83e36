//! Host-side notification wiring.
//!
//! A [`Notifier`] is what a data-bound object embeds to take part in
//! notification chains. It owns two listener lists and the host's
//! [`ChainManager`]:
//!
//! - the *public* list, which outside observers (bindings, parent managers)
//!   reach through [`NotifyPropertyChanged`](super::NotifyPropertyChanged);
//! - the *internal* list, which only the host's own manager listens to.
//!
//! [`Notifier::raise`] notifies public listeners first and the host's own
//! manager second, so an observer always sees a source property change before
//! the dependent-property changes it causes.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::engine::{chain_callback, Chain, ChainManager};
use crate::error::Result;

use super::source::PropertyChangedSource;
use super::subscription::SubscriptionId;
use super::PropertyChangedHandler;

/// Notification plumbing for one host object.
///
/// The host must live in an `Arc`; construct it with [`Arc::new_cyclic`] and
/// hand the weak self-reference to [`Notifier::new`].
///
/// # Example
///
/// ```rust,ignore
/// struct LineItem {
///     notifier: Notifier,
///     quantity: Mutex<u32>,
/// }
///
/// impl LineItem {
///     fn new() -> Arc<Self> {
///         Arc::new_cyclic(|this| Self {
///             notifier: Notifier::new(this.clone()),
///             quantity: Mutex::new(0),
///         })
///     }
/// }
/// ```
pub struct Notifier {
    public: PropertyChangedSource,
    internal: PropertyChangedSource,
    chains: ChainManager,
}

impl Notifier {
    /// Create the notifier for `host`.
    ///
    /// The host's manager listens to the internal list, and every chain it
    /// creates re-raises its dependent property on the host by default.
    pub fn new<H>(host: Weak<H>) -> Self
    where
        H: Any + Send + Sync,
    {
        let public = PropertyChangedSource::new();
        let internal = PropertyChangedSource::new();
        let chains = ChainManager::new();

        let subscribe_to = internal.clone();
        let unsubscribe_from = internal.clone();
        chains.observe(
            move |handler| subscribe_to.subscribe(handler),
            move |id| {
                unsubscribe_from.unsubscribe(id);
            },
        );

        let (raise_public, raise_internal) = (public.clone(), internal.clone());
        chains.add_default_callback(chain_callback(move |_sender, _notifying, dependent| {
            if let Some(host) = host.upgrade() {
                raise_on(&raise_public, &raise_internal, &*host, dependent);
            }
        }));

        Self {
            public,
            internal,
            chains,
        }
    }

    /// Announce that `property` changed on `sender` (normally the host).
    pub fn raise(&self, sender: &dyn Any, property: &str) {
        raise_on(&self.public, &self.internal, sender, property);
    }

    /// Add a public listener.
    pub fn subscribe(&self, handler: PropertyChangedHandler) -> SubscriptionId {
        self.public.subscribe(handler)
    }

    /// Remove a public listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.public.unsubscribe(id)
    }

    /// The host's chain manager.
    pub fn chains(&self) -> &ChainManager {
        &self.chains
    }

    /// Declare the dependencies of `dependent_property` and finish its chain.
    ///
    /// Meant to be called at the top of the dependent property's getter on
    /// every read. The first call configures the chain; later calls find it
    /// finished and skip `configure` entirely.
    pub fn declare<F>(&self, dependent_property: &str, configure: F) -> Result<Chain>
    where
        F: FnOnce(&Chain) -> Result<()>,
    {
        let chain = self.chains.create_or_get(dependent_property)?;
        chain.configure(configure)?;
        chain.finish(false);
        Ok(chain)
    }

    /// Tear down the host's chains and subscriptions.
    pub fn dispose(&self) {
        self.chains.dispose();
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.chains.dispose();
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("public_listeners", &self.public.listener_count())
            .field("chains", &self.chains.chain_count())
            .finish()
    }
}

fn raise_on(
    public: &PropertyChangedSource,
    internal: &PropertyChangedSource,
    sender: &dyn Any,
    property: &str,
) {
    public.raise(sender, property);
    internal.raise(sender, property);
}
