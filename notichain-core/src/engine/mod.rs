//! Chain Engine
//!
//! This module implements dependency notification: declaring that a
//! dependent property is derived from source properties, and re-announcing
//! the dependent whenever any source changes.
//!
//! # Concepts
//!
//! ## Chains
//!
//! A [`Chain`] lists the source properties (exact names or patterns) one
//! dependent property observes, and the callbacks to run when one of them
//! changes. Chains are declared from inside the dependent property's getter;
//! after the first `finish` further declarations are ignored, so re-running
//! the getter is free.
//!
//! ## Managers
//!
//! A [`ChainManager`] owns the chains of one object and receives its change
//! events. For deep dependencies (`line_item.cost`) it also owns a nested
//! manager per intermediate property, bound to whatever value that property
//! currently holds and rebound whenever the property changes.
//!
//! ## Collections
//!
//! A [`CollectionManager`] watches a collection-valued property. Membership
//! changes become a single [`MEMBERSHIP_CHANGED`] event, and member paths are
//! subscribed on exactly the items currently in the collection.
//!
//! # Implementation Notes
//!
//! Every type here is a cheap handle around shared state behind a
//! `parking_lot::Mutex`. Locks are released before any callback or accessor
//! runs, so callbacks may freely re-enter the engine. Children are owned by
//! their parents; everything registered with an event source refers back to
//! the engine through a `Weak`.

mod chain;
mod collection;
mod manager;
mod path;

pub use chain::{chain_callback, Chain, ChainCallback, ChainSnapshot, ANY_PROPERTY_PATTERN};
pub use collection::{CollectionManager, CollectionSnapshot, MEMBERSHIP_CHANGED};
pub use manager::{ChainManager, ManagerSnapshot, NestedSnapshot};
pub use path::{
    relay_name, Accessor, CollectionAccessor, CollectionStep, PathStep, PropertyPath,
    RELAY_PREFIX,
};
