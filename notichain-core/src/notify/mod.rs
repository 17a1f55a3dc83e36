//! Change Notification
//!
//! This module defines what the chain engine needs from the objects it
//! watches, and the building blocks hosts use to provide it.
//!
//! # Concepts
//!
//! ## Notifying objects
//!
//! An object implementing [`NotifyPropertyChanged`] lets listeners subscribe
//! to "property P changed on sender S" events. Objects reachable through a
//! property path are handled as [`Node`]s: reference-counted trait objects
//! whose identity is their allocation address.
//!
//! ## Notifying collections
//!
//! A collection implementing [`NotifyCollectionChanged`] reports membership
//! changes (add, remove, replace, move, reset) and can list its members.
//! [`ObservableVec`] is a ready-made implementation.
//!
//! ## Hosts
//!
//! A host embeds a [`Notifier`], which bundles the event sources and the
//! host's [`ChainManager`](crate::ChainManager). There is no base type to
//! inherit; the host forwards its trait methods to the notifier.

mod notifier;
mod observable_vec;
mod source;
mod subscription;

use std::any::Any;
use std::sync::Arc;

pub use notifier::Notifier;
pub use observable_vec::ObservableVec;
pub use source::{EventSource, PropertyChangedSource};
pub use subscription::{Subscription, SubscriptionId};

/// Listener for property changes: `(sender, property_name)`.
pub type PropertyChangedHandler = Arc<dyn Fn(&dyn Any, &str) + Send + Sync>;

/// Listener for collection membership changes: `(collection, change)`.
pub type CollectionChangedHandler = Arc<dyn Fn(&dyn Any, &CollectionChange) + Send + Sync>;

/// Build a [`PropertyChangedHandler`] from a closure.
pub fn property_changed_handler<F>(handler: F) -> PropertyChangedHandler
where
    F: Fn(&dyn Any, &str) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Build a [`CollectionChangedHandler`] from a closure.
pub fn collection_changed_handler<F>(handler: F) -> CollectionChangedHandler
where
    F: Fn(&dyn Any, &CollectionChange) + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Access to the concrete value behind a trait object.
pub trait AsAny {
    /// The value as `&dyn Any`, for downcasting in path accessors.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An object that raises an event whenever one of its properties changes.
pub trait NotifyPropertyChanged: AsAny + Send + Sync {
    /// Add a listener for property changes.
    fn subscribe_property_changed(&self, handler: PropertyChangedHandler) -> SubscriptionId;

    /// Remove a listener. Returns whether it was registered.
    fn unsubscribe_property_changed(&self, id: SubscriptionId) -> bool;
}

/// A collection that raises an event whenever its membership changes.
pub trait NotifyCollectionChanged: AsAny + Send + Sync {
    /// Add a listener for membership changes.
    fn subscribe_collection_changed(&self, handler: CollectionChangedHandler) -> SubscriptionId;

    /// Remove a listener. Returns whether it was registered.
    fn unsubscribe_collection_changed(&self, id: SubscriptionId) -> bool;

    /// The current members, in collection order.
    fn members(&self) -> Vec<Node>;
}

/// A notifying object reachable through a property path.
pub type Node = Arc<dyn NotifyPropertyChanged>;

/// A notifying collection reachable through a property.
pub type CollectionNode = Arc<dyn NotifyCollectionChanged>;

/// A membership change reported by a [`NotifyCollectionChanged`] collection.
#[derive(Clone)]
pub enum CollectionChange {
    /// Members were inserted.
    Added(Vec<Node>),
    /// Members were removed.
    Removed(Vec<Node>),
    /// Members were replaced in place.
    Replaced {
        /// The members that left the collection.
        old: Vec<Node>,
        /// The members that took their place.
        new: Vec<Node>,
    },
    /// Members changed position; membership is unchanged.
    Moved,
    /// The contents changed wholesale; re-read [`NotifyCollectionChanged::members`].
    Reset,
}

impl std::fmt::Debug for CollectionChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added(items) => write!(f, "Added({})", items.len()),
            Self::Removed(items) => write!(f, "Removed({})", items.len()),
            Self::Replaced { old, new } => write!(f, "Replaced({} -> {})", old.len(), new.len()),
            Self::Moved => f.write_str("Moved"),
            Self::Reset => f.write_str("Reset"),
        }
    }
}

/// The concrete value behind a node.
///
/// Goes through the trait object so the result is the node's own type, not
/// the `Arc` holding it.
pub fn node_any(node: &Node) -> &dyn Any {
    (**node).as_any()
}

/// Address-based identity of a node.
pub(crate) fn node_addr(node: &Node) -> usize {
    Arc::as_ptr(node) as *const () as usize
}

/// Whether two nodes are the same instance.
pub fn same_node(a: &Node, b: &Node) -> bool {
    node_addr(a) == node_addr(b)
}

/// Whether two optional nodes refer to the same instance (or are both absent).
pub(crate) fn same_binding(a: Option<&Node>, b: Option<&Node>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_node(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Address-based identity of a collection.
pub(crate) fn collection_addr(collection: &CollectionNode) -> usize {
    Arc::as_ptr(collection) as *const () as usize
}
