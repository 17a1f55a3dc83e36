//! Notichain Core
//!
//! This crate provides dependency-notification chains for data-bound object
//! graphs. A host object declares that a computed property depends on other
//! properties (its own, properties of objects it references, or properties
//! of every member of a collection it holds), and the engine re-announces the
//! computed property whenever any of those sources change.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `notify`: Notification traits, listener lists, and host-side plumbing
//! - `engine`: Chains, chain managers, collection managers, and property paths
//!
//! # Example
//!
//! ```rust,ignore
//! use notichain_core::{Notifier, PathStep, PropertyPath, Node};
//!
//! impl Order {
//!     fn total(&self) -> u32 {
//!         self.notifier
//!             .declare("total", |chain| {
//!                 let path = PropertyPath::new([
//!                     PathStep::node("line_item", |o: &Order| o.line_item().map(|i| i as Node)),
//!                     PathStep::leaf("cost"),
//!                 ])?;
//!                 chain.on_path(self, &path)?;
//!                 Ok(())
//!             })
//!             .ok();
//!         self.line_item().map_or(0, |item| item.cost())
//!     }
//! }
//!
//! // Replacing `line_item`, or changing `cost` on the current line item,
//! // now raises "total" on the order.
//! ```

pub mod engine;
pub mod error;
pub mod notify;

pub use engine::{
    chain_callback, relay_name, Chain, ChainCallback, ChainManager, CollectionManager,
    CollectionStep, PathStep, PropertyPath, ANY_PROPERTY_PATTERN, MEMBERSHIP_CHANGED,
    RELAY_PREFIX,
};
pub use error::{ChainError, Result};
pub use notify::{
    property_changed_handler, CollectionChange, CollectionNode, Node, Notifier,
    NotifyCollectionChanged, NotifyPropertyChanged, ObservableVec, PropertyChangedSource,
    SubscriptionId,
};
