//! Chain Managers
//!
//! A [`ChainManager`] owns every chain declared on one notifying object and
//! routes that object's change events into them.
//!
//! Two kinds of manager exist, with the same type:
//!
//! - **Host managers** are wired to the host's events with
//!   [`observe`](ChainManager::observe). A [`Notifier`](crate::Notifier) does
//!   this for you.
//! - **Nested managers** are created by deep registrations. Each watches the
//!   value currently found at one property of its parent and is rebound
//!   whenever the parent announces that property changed.
//!
//! Rebinding swaps the subscription but keeps the manager's chains, so relay
//! chains configured once keep working for every later value.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{require, Result};
use crate::notify::{
    node_any, property_changed_handler, same_binding, CollectionNode, Node,
    PropertyChangedHandler, Subscription,
};

use super::chain::{Chain, ChainCallback, ChainSnapshot};
use super::collection::{CollectionManager, CollectionSnapshot};
use super::path::{Accessor, CollectionAccessor};

/// Serializable view of a manager and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    pub bound: bool,
    pub disposed: bool,
    pub chains: Vec<ChainSnapshot>,
    pub managers: Vec<NestedSnapshot>,
    pub collections: Vec<CollectionSnapshot>,
}

/// A nested manager together with the property it watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedSnapshot {
    pub property: String,
    pub manager: ManagerSnapshot,
}

#[derive(Default)]
struct ManagerState {
    chains: IndexMap<String, Chain>,
    managers: IndexMap<String, ChainManager>,
    collections: IndexMap<String, CollectionManager>,
    default_callbacks: Vec<ChainCallback>,
    subscription: Option<Subscription>,
    bound: Option<Node>,
    accessor: Option<Accessor>,
    disposed: bool,
}

pub(crate) struct ManagerInner {
    state: Mutex<ManagerState>,
}

/// Owns the chains of one notifying object.
///
/// Clones share state.
#[derive(Clone)]
pub struct ChainManager {
    inner: Arc<ManagerInner>,
}

impl ChainManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    /// A manager that is already disposed.
    pub(crate) fn disposed() -> Self {
        let manager = Self::new();
        manager.inner.state.lock().disposed = true;
        manager
    }

    /// Whether both handles refer to the same manager.
    pub fn ptr_eq(&self, other: &ChainManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Connect this manager to a host's change events.
    ///
    /// `subscribe` receives the handler to register and returns a token that
    /// `unsubscribe` later consumes. Observing again replaces the previous
    /// registration.
    pub fn observe<S, U, T>(&self, subscribe: S, unsubscribe: U) -> &Self
    where
        S: FnOnce(PropertyChangedHandler) -> T,
        U: FnOnce(T) + Send + 'static,
        T: Send + 'static,
    {
        if self.is_disposed() {
            return self;
        }
        let token = subscribe(self.event_handler());
        let subscription = Subscription::new(move || unsubscribe(token));
        let stale = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                Some(subscription)
            } else {
                state.subscription.replace(subscription)
            }
        };
        drop(stale);
        self
    }

    /// Handler that publishes incoming events on this manager.
    fn event_handler(&self) -> PropertyChangedHandler {
        let manager = self.downgrade();
        property_changed_handler(move |sender, property| {
            if let Some(inner) = manager.upgrade() {
                ChainManager::from_inner(inner).publish(sender, property);
            }
        })
    }

    /// Add a callback attached to every chain created from now on.
    pub fn add_default_callback(&self, callback: ChainCallback) -> &Self {
        let mut state = self.inner.state.lock();
        if !state.disposed
            && !state
                .default_callbacks
                .iter()
                .any(|existing| Arc::ptr_eq(existing, &callback))
        {
            state.default_callbacks.push(callback);
        }
        self
    }

    /// The chain for `dependent_property`, created on first use.
    ///
    /// A disposed manager hands back a disposed chain.
    pub fn create_or_get(&self, dependent_property: &str) -> Result<Chain> {
        require(dependent_property, "dependent_property")?;
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Ok(Chain::detached(dependent_property));
        }
        if let Some(chain) = state.chains.get(dependent_property) {
            return Ok(chain.clone());
        }

        let chain = Chain::attached(self.downgrade(), dependent_property);
        for callback in &state.default_callbacks {
            chain.and_call(callback.clone());
        }
        state
            .chains
            .insert(dependent_property.to_string(), chain.clone());
        tracing::debug!(dependent = dependent_property, "chain created");
        Ok(chain)
    }

    /// The nested manager for `property`, bound to `current`.
    pub fn create_or_get_manager(&self, property: &str, current: Option<Node>) -> Result<ChainManager> {
        require(property, "property")?;
        Ok(self.nested(property, None, current))
    }

    /// The collection manager for `property`, bound to `current`.
    pub fn create_or_get_collection_manager(
        &self,
        property: &str,
        current: Option<CollectionNode>,
    ) -> Result<CollectionManager> {
        require(property, "property")?;
        Ok(self.nested_collection(property, None, current))
    }

    pub(crate) fn nested(
        &self,
        property: &str,
        accessor: Option<Accessor>,
        current: Option<Node>,
    ) -> ChainManager {
        let manager = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return ChainManager::disposed();
            }
            state
                .managers
                .entry(property.to_string())
                .or_insert_with(|| {
                    tracing::debug!(property, "nested manager created");
                    ChainManager::new()
                })
                .clone()
        };
        if let Some(accessor) = accessor {
            let mut state = manager.inner.state.lock();
            if state.accessor.is_none() {
                state.accessor = Some(accessor);
            }
        }
        manager.bind(current);
        manager
    }

    pub(crate) fn nested_collection(
        &self,
        property: &str,
        accessor: Option<CollectionAccessor>,
        current: Option<CollectionNode>,
    ) -> CollectionManager {
        let manager = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return CollectionManager::detached(property);
            }
            state
                .collections
                .entry(property.to_string())
                .or_insert_with(|| {
                    tracing::debug!(property, "collection manager created");
                    CollectionManager::named(property)
                })
                .clone()
        };
        if let Some(accessor) = accessor {
            manager.set_accessor(accessor);
        }
        manager.bind(current);
        manager
    }

    /// Watch `node` instead of the currently bound node.
    ///
    /// Nothing happens if `node` is the node already bound. Otherwise the old
    /// subscription is removed and the new one added as one step, then every
    /// child manager re-reads its value from `node`.
    pub fn bind(&self, node: Option<Node>) {
        let (managers, collections) = {
            let mut state = self.inner.state.lock();
            if state.disposed || same_binding(state.bound.as_ref(), node.as_ref()) {
                return;
            }
            state.subscription = None;
            state.subscription = node.as_ref().map(|node| self.subscribe_to(node));
            state.bound = node.clone();
            tracing::debug!(bound = node.is_some(), "manager rebound");
            (
                state.managers.values().cloned().collect::<SmallVec<[ChainManager; 4]>>(),
                state
                    .collections
                    .values()
                    .cloned()
                    .collect::<SmallVec<[CollectionManager; 2]>>(),
            )
        };

        let source = node.as_ref().map(node_any);
        for manager in &managers {
            manager.refresh_from(source);
        }
        for collection in &collections {
            collection.refresh_from(source);
        }
    }

    fn subscribe_to(&self, node: &Node) -> Subscription {
        let id = node.subscribe_property_changed(self.event_handler());
        let node = node.clone();
        Subscription::new(move || {
            node.unsubscribe_property_changed(id);
        })
    }

    /// Re-read this manager's node from its parent's value and rebind.
    ///
    /// A manager without an accessor keeps its binding unless the parent
    /// value is gone. So does one whose accessor cannot read `source`.
    pub(crate) fn refresh_from(&self, source: Option<&dyn Any>) {
        let accessor = {
            let state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.accessor.clone()
        };
        let next = match (accessor, source) {
            (_, None) => None,
            (Some(read), Some(source)) => match read(source) {
                Some(next) => next,
                None => {
                    tracing::trace!("sender is not the accessor's source type, binding kept");
                    return;
                }
            },
            (None, Some(_)) => return,
        };
        self.bind(next);
    }

    /// Deliver "`property` changed on `sender`".
    ///
    /// The nested and collection managers registered under `property` are
    /// rebound first, then every chain observing `property` runs. Returns
    /// whether any chain matched.
    pub fn publish(&self, sender: &dyn Any, property: &str) -> bool {
        let (chains, nested, collection) = {
            let state = self.inner.state.lock();
            if state.disposed {
                return false;
            }
            (
                state.chains.values().cloned().collect::<SmallVec<[Chain; 8]>>(),
                state.managers.get(property).cloned(),
                state.collections.get(property).cloned(),
            )
        };

        if let Some(nested) = nested {
            nested.refresh_from(Some(sender));
        }
        if let Some(collection) = collection {
            collection.refresh_from(Some(sender));
        }

        let mut matched = false;
        for chain in &chains {
            matched |= chain.publish(sender, property);
        }
        tracing::trace!(property, matched, chains = chains.len(), "published");
        matched
    }

    /// Unsubscribe and dispose every chain and child manager.
    pub fn dispose(&self) {
        let (subscription, chains, managers, collections) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.bound = None;
            state.accessor = None;
            state.default_callbacks.clear();
            (
                state.subscription.take(),
                std::mem::take(&mut state.chains),
                std::mem::take(&mut state.managers),
                std::mem::take(&mut state.collections),
            )
        };

        drop(subscription);
        for chain in chains.values() {
            chain.dispose();
        }
        for manager in managers.values() {
            manager.dispose();
        }
        for collection in collections.values() {
            collection.dispose();
        }
        tracing::debug!(
            chains = chains.len(),
            managers = managers.len(),
            collections = collections.len(),
            "manager disposed"
        );
    }

    pub fn chain(&self, dependent_property: &str) -> Option<Chain> {
        self.inner.state.lock().chains.get(dependent_property).cloned()
    }

    pub fn chain_count(&self) -> usize {
        self.inner.state.lock().chains.len()
    }

    pub fn manager(&self, property: &str) -> Option<ChainManager> {
        self.inner.state.lock().managers.get(property).cloned()
    }

    pub fn collection_manager(&self, property: &str) -> Option<CollectionManager> {
        self.inner.state.lock().collections.get(property).cloned()
    }

    /// The node this manager currently watches (nested managers only).
    pub fn bound_node(&self) -> Option<Node> {
        self.inner.state.lock().bound.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        let (bound, disposed, chains, managers, collections) = {
            let state = self.inner.state.lock();
            (
                state.bound.is_some(),
                state.disposed,
                state.chains.values().cloned().collect::<Vec<_>>(),
                state
                    .managers
                    .iter()
                    .map(|(property, manager)| (property.clone(), manager.clone()))
                    .collect::<Vec<_>>(),
                state.collections.values().cloned().collect::<Vec<_>>(),
            )
        };
        ManagerSnapshot {
            bound,
            disposed,
            chains: chains.iter().map(Chain::snapshot).collect(),
            managers: managers
                .into_iter()
                .map(|(property, manager)| NestedSnapshot {
                    property,
                    manager: manager.snapshot(),
                })
                .collect(),
            collections: collections.iter().map(CollectionManager::snapshot).collect(),
        }
    }
}

impl Default for ChainManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChainManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ChainManager")
            .field("chains", &state.chains.keys().collect::<Vec<_>>())
            .field("managers", &state.managers.keys().collect::<Vec<_>>())
            .field("collections", &state.collections.keys().collect::<Vec<_>>())
            .field("bound", &state.bound.is_some())
            .field("disposed", &state.disposed)
            .finish()
    }
}
