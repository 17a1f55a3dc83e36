//! Collection Managers
//!
//! A [`CollectionManager`] watches a collection-valued property. It turns
//! every membership change into one synthetic [`MEMBERSHIP_CHANGED`] event for
//! its relay chains, and keeps a member manager per distinct member so that
//! registered member paths fire for exactly the items currently present.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{require, Result};
use crate::notify::{
    collection_addr, collection_changed_handler, node_addr, node_any, CollectionChange,
    CollectionNode, Node, Subscription,
};

use super::chain::{Chain, ChainCallback};
use super::manager::{ChainManager, ManagerSnapshot};
use super::path::{CollectionAccessor, PropertyPath};

/// Reserved property name published once per membership change.
pub const MEMBERSHIP_CHANGED: &str = "[membership]";

/// Serializable view of a collection manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSnapshot {
    pub property: String,
    pub bound: bool,
    pub disposed: bool,
    pub member_count: usize,
    pub member_paths: Vec<String>,
    pub chains: ManagerSnapshot,
}

struct Member {
    manager: ChainManager,
    count: usize,
}

#[derive(Clone)]
struct MemberTemplate {
    relay: String,
    path: PropertyPath,
    callback: ChainCallback,
}

impl MemberTemplate {
    fn apply(&self, manager: &ChainManager, node: &Node) {
        let applied = manager.create_or_get(&self.relay).and_then(|relay| {
            relay.deep_on(&self.callback, Some(node_any(node)), self.path.steps())?;
            relay.and_call(self.callback.clone());
            Ok(())
        });
        if let Err(error) = applied {
            tracing::warn!(%error, relay = %self.relay, path = %self.path, "member path not applied");
        }
    }

    fn same_as(&self, other: &MemberTemplate) -> bool {
        self.relay == other.relay
            && self.path.key() == other.path.key()
            && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

#[derive(Default)]
struct CollectionState {
    bound: Option<CollectionNode>,
    subscription: Option<Subscription>,
    accessor: Option<CollectionAccessor>,
    members: IndexMap<usize, Member>,
    templates: Vec<MemberTemplate>,
    disposed: bool,
}

struct CollectionInner {
    property: Arc<str>,
    chains: ChainManager,
    state: Mutex<CollectionState>,
}

/// Watches one collection-valued property and its members.
///
/// Clones share state.
#[derive(Clone)]
pub struct CollectionManager {
    inner: Arc<CollectionInner>,
}

impl CollectionManager {
    /// Create an unbound manager for the collection property `property`.
    pub fn new(property: &str) -> Result<Self> {
        require(property, "property")?;
        Ok(Self::named(property))
    }

    pub(crate) fn named(property: &str) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                property: Arc::from(property),
                chains: ChainManager::new(),
                state: Mutex::new(CollectionState::default()),
            }),
        }
    }

    pub(crate) fn detached(property: &str) -> Self {
        let manager = Self::named(property);
        manager.dispose();
        manager
    }

    /// Name of the watched collection property.
    pub fn property(&self) -> &str {
        &self.inner.property
    }

    /// Relay chain `dependent_property`, fired by membership changes it
    /// observes.
    pub fn create_or_get(&self, dependent_property: &str) -> Result<Chain> {
        self.inner.chains.create_or_get(dependent_property)
    }

    /// The manager holding the relay chains.
    pub fn chains(&self) -> &ChainManager {
        &self.inner.chains
    }

    pub(crate) fn set_accessor(&self, accessor: CollectionAccessor) {
        let mut state = self.inner.state.lock();
        if state.accessor.is_none() {
            state.accessor = Some(accessor);
        }
    }

    /// Register `path` on every current and future member. Changes along the
    /// path run `callback`.
    pub(crate) fn add_member_path(&self, relay: &str, path: &PropertyPath, callback: ChainCallback) {
        let template = MemberTemplate {
            relay: relay.to_string(),
            path: path.clone(),
            callback,
        };
        let members = {
            let mut state = self.inner.state.lock();
            if state.disposed || state.templates.iter().any(|t| t.same_as(&template)) {
                return;
            }
            state.templates.push(template.clone());
            state
                .members
                .values()
                .map(|member| member.manager.clone())
                .collect::<Vec<_>>()
        };
        for manager in &members {
            if let Some(node) = manager.bound_node() {
                template.apply(manager, &node);
            }
        }
    }

    /// Watch `collection` instead of the currently bound one.
    ///
    /// Every member subscription of the old collection is dropped and the
    /// members of the new one are subscribed.
    pub fn bind(&self, collection: Option<CollectionNode>) {
        let stale = {
            let mut state = self.inner.state.lock();
            let unchanged = match (&state.bound, &collection) {
                (Some(bound), Some(next)) => collection_addr(bound) == collection_addr(next),
                (None, None) => true,
                _ => false,
            };
            if state.disposed || unchanged {
                return;
            }
            state.subscription = None;
            state.subscription = collection.as_ref().map(|c| self.subscribe_to(c));
            state.bound = collection.clone();
            std::mem::take(&mut state.members)
        };

        for member in stale.values() {
            member.manager.dispose();
        }
        if let Some(collection) = &collection {
            for node in collection.members() {
                self.add_member(node);
            }
        }
        tracing::debug!(
            property = %self.inner.property,
            bound = collection.is_some(),
            members = self.member_count(),
            "collection rebound"
        );
    }

    fn subscribe_to(&self, collection: &CollectionNode) -> Subscription {
        let manager = Arc::downgrade(&self.inner);
        let id = collection.subscribe_collection_changed(collection_changed_handler(
            move |sender, change| {
                if let Some(inner) = manager.upgrade() {
                    CollectionManager { inner }.handle_change(sender, change);
                }
            },
        ));
        let collection = collection.clone();
        Subscription::new(move || {
            collection.unsubscribe_collection_changed(id);
        })
    }

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

    /// Reconcile member subscriptions with `change`, then publish
    /// [`MEMBERSHIP_CHANGED`] once.
    pub fn handle_change(&self, sender: &dyn Any, change: &CollectionChange) {
        if self.is_disposed() {
            return;
        }
        tracing::debug!(property = %self.inner.property, ?change, "membership changed");
        match change {
            CollectionChange::Added(nodes) => {
                for node in nodes {
                    self.add_member(node.clone());
                }
            }
            CollectionChange::Removed(nodes) => {
                for node in nodes {
                    self.remove_member(node);
                }
            }
            CollectionChange::Replaced { old, new } => {
                for node in old {
                    self.remove_member(node);
                }
                for node in new {
                    self.add_member(node.clone());
                }
            }
            CollectionChange::Moved => {}
            CollectionChange::Reset => self.reset_members(),
        }
        self.inner.chains.publish(sender, MEMBERSHIP_CHANGED);
    }

    fn add_member(&self, node: Node) {
        let (manager, templates) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            if let Some(member) = state.members.get_mut(&node_addr(&node)) {
                member.count += 1;
                return;
            }
            let manager = ChainManager::new();
            state.members.insert(
                node_addr(&node),
                Member {
                    manager: manager.clone(),
                    count: 1,
                },
            );
            (manager, state.templates.clone())
        };

        manager.bind(Some(node.clone()));
        for template in &templates {
            template.apply(&manager, &node);
        }
    }

    fn remove_member(&self, node: &Node) {
        let addr = node_addr(node);
        let removed = {
            let mut state = self.inner.state.lock();
            let Some(member) = state.members.get_mut(&addr) else {
                return;
            };
            if member.count > 1 {
                member.count -= 1;
                None
            } else {
                state.members.shift_remove(&addr)
            }
        };
        if let Some(member) = removed {
            member.manager.dispose();
        }
    }

    fn reset_members(&self) {
        let (collection, stale) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            (state.bound.clone(), std::mem::take(&mut state.members))
        };
        for member in stale.values() {
            member.manager.dispose();
        }
        if let Some(collection) = collection {
            for node in collection.members() {
                self.add_member(node);
            }
        }
    }

    /// Number of distinct members currently subscribed.
    pub fn member_count(&self) -> usize {
        self.inner.state.lock().members.len()
    }

    /// Whether `node` is a subscribed member.
    pub fn is_observing(&self, node: &Node) -> bool {
        self.inner.state.lock().members.contains_key(&node_addr(node))
    }

    pub fn bound_collection(&self) -> Option<CollectionNode> {
        self.inner.state.lock().bound.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Drop the collection and member subscriptions and dispose the relay
    /// chains.
    pub fn dispose(&self) {
        let (subscription, members) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.bound = None;
            state.accessor = None;
            state.templates.clear();
            (state.subscription.take(), std::mem::take(&mut state.members))
        };
        drop(subscription);
        for member in members.values() {
            member.manager.dispose();
        }
        self.inner.chains.dispose();
        tracing::debug!(property = %self.inner.property, "collection manager disposed");
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        let (bound, disposed, member_count, member_paths) = {
            let state = self.inner.state.lock();
            (
                state.bound.is_some(),
                state.disposed,
                state.members.len(),
                state.templates.iter().map(|t| t.path.key()).collect(),
            )
        };
        CollectionSnapshot {
            property: self.inner.property.to_string(),
            bound,
            disposed,
            member_count,
            member_paths,
            chains: self.inner.chains.snapshot(),
        }
    }
}

impl fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CollectionManager")
            .field("property", &self.inner.property)
            .field("bound", &state.bound.is_some())
            .field("members", &state.members.len())
            .field("member_paths", &state.templates.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}
