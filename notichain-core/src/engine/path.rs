//! Property paths.
//!
//! Chains key everything by property name. This module turns getters into
//! those names and describes multi-step paths through an object graph.
//!
//! # Naming
//!
//! [`property_name!`](crate::property_name) yields a getter's name as a
//! `&'static str` and refers to the getter itself, so renaming the getter
//! without updating the call site fails to compile.
//!
//! # Paths
//!
//! A [`PropertyPath`] is an ordered list of [`PathStep`]s. Every step except
//! the last must be able to read the next notifying object from the value
//! before it; the last step only names the property being watched.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{require, ChainError, Result};
use crate::notify::{CollectionNode, Node};

/// Prefix of relay chain names: the relay for dependent `total` is `../total`.
pub const RELAY_PREFIX: &str = "../";

/// Reads the next notifying object from a source value.
///
/// The outer `None` means the source is not the type the accessor reads
/// from; `Some(None)` means the property is currently empty.
pub type Accessor = Arc<dyn Fn(&dyn Any) -> Option<Option<Node>> + Send + Sync>;

/// Reads a notifying collection from a source value, with the same
/// convention as [`Accessor`].
pub type CollectionAccessor =
    Arc<dyn Fn(&dyn Any) -> Option<Option<CollectionNode>> + Send + Sync>;

/// Expand to the name of a getter on a type, checked at compile time.
///
/// ```rust,ignore
/// assert_eq!(property_name!(LineItem, quantity), "quantity");
/// ```
#[macro_export]
macro_rules! property_name {
    ($ty:ty, $getter:ident) => {{
        let _ = <$ty>::$getter;
        stringify!($getter)
    }};
}

/// Name of the relay chain that forwards nested changes to `dependent`.
pub fn relay_name(dependent: &str) -> String {
    format!("{RELAY_PREFIX}{dependent}")
}

/// One step of a [`PropertyPath`].
#[derive(Clone)]
pub struct PathStep {
    name: Arc<str>,
    read: Option<Accessor>,
}

impl PathStep {
    /// A step that reads the next notifying object from a `T`.
    ///
    /// A source that is not a `T` reads as unknown rather than empty, so a
    /// nested manager keeps its binding when another type raises the name.
    pub fn node<T, F>(name: &str, read: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Option<Node> + Send + Sync + 'static,
    {
        let read: Accessor =
            Arc::new(move |source: &dyn Any| source.downcast_ref::<T>().map(&read));
        Self {
            name: Arc::from(name),
            read: Some(read),
        }
    }

    /// A final step that only names the watched property.
    pub fn leaf(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            read: None,
        }
    }

    /// The property this step reads or watches.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the next object from `source`, if this step can.
    pub fn read(&self, source: &dyn Any) -> Option<Node> {
        self.read.as_ref().and_then(|read| read(source)).flatten()
    }

    pub(crate) fn accessor(&self) -> Option<&Accessor> {
        self.read.as_ref()
    }
}

impl fmt::Debug for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathStep")
            .field("name", &self.name)
            .field("reads_node", &self.read.is_some())
            .finish()
    }
}

/// A validated, non-empty list of path steps.
#[derive(Clone, Debug)]
pub struct PropertyPath {
    steps: SmallVec<[PathStep; 4]>,
}

impl PropertyPath {
    /// Build a path, checking that it is non-empty, that every name is
    /// non-blank, and that every step but the last can read a node.
    pub fn new<I>(steps: I) -> Result<Self>
    where
        I: IntoIterator<Item = PathStep>,
    {
        let steps: SmallVec<[PathStep; 4]> = steps.into_iter().collect();
        if steps.is_empty() {
            return Err(ChainError::EmptyPath);
        }
        for step in &steps {
            require(step.name(), "path step")?;
        }
        if let Some(step) = steps[..steps.len() - 1]
            .iter()
            .find(|step| step.accessor().is_none())
        {
            return Err(ChainError::MissingAccessor {
                step: step.name().to_string(),
            });
        }
        Ok(Self { steps })
    }

    /// A one-step path watching `name` directly.
    pub fn leaf(name: &str) -> Result<Self> {
        Self::new([PathStep::leaf(name)])
    }

    /// The steps, first to last.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Number of steps.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Dotted key, e.g. `line_item.cost`.
    pub fn key(&self) -> String {
        self.steps
            .iter()
            .map(PathStep::name)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A collection-valued property on a source object.
#[derive(Clone)]
pub struct CollectionStep {
    name: Arc<str>,
    read: CollectionAccessor,
}

impl CollectionStep {
    /// A step that reads a notifying collection from a `T`.
    pub fn new<T, F>(name: &str, read: F) -> Result<Self>
    where
        T: Any,
        F: Fn(&T) -> Option<CollectionNode> + Send + Sync + 'static,
    {
        require(name, "collection property")?;
        let read: CollectionAccessor =
            Arc::new(move |source: &dyn Any| source.downcast_ref::<T>().map(&read));
        Ok(Self {
            name: Arc::from(name),
            read,
        })
    }

    /// The collection property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the collection from `source`.
    pub fn read(&self, source: &dyn Any) -> Option<CollectionNode> {
        (self.read)(source).flatten()
    }

    pub(crate) fn accessor(&self) -> &CollectionAccessor {
        &self.read
    }
}

impl fmt::Debug for CollectionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStep")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{
        NotifyPropertyChanged, PropertyChangedHandler, PropertyChangedSource, SubscriptionId,
    };

    struct Order {
        customer: Option<Node>,
    }

    impl Order {
        fn customer(&self) -> Option<Node> {
            self.customer.clone()
        }
    }

    struct Customer {
        events: PropertyChangedSource,
    }

    impl NotifyPropertyChanged for Customer {
        fn subscribe_property_changed(&self, handler: PropertyChangedHandler) -> SubscriptionId {
            self.events.subscribe(handler)
        }

        fn unsubscribe_property_changed(&self, id: SubscriptionId) -> bool {
            self.events.unsubscribe(id)
        }
    }

    #[test]
    fn property_name_yields_getter_name() {
        assert_eq!(property_name!(Order, customer), "customer");
    }

    #[test]
    fn relay_names_nest() {
        assert_eq!(relay_name("total"), "../total");
        assert_eq!(relay_name(&relay_name("total")), "../../total");
    }

    #[test]
    fn node_step_reads_through_downcast() {
        let customer: Node = Arc::new(Customer {
            events: PropertyChangedSource::new(),
        });
        let order = Order {
            customer: Some(customer.clone()),
        };
        let step = PathStep::node("customer", Order::customer);

        let read = step.read(&order).expect("order has a customer");
        assert!(crate::notify::same_node(&read, &customer));
        assert!(step.read(&42_u8).is_none());
        assert!(PathStep::leaf("name").read(&order).is_none());
    }

    #[test]
    fn path_validation() {
        assert!(matches!(
            PropertyPath::new(Vec::new()),
            Err(ChainError::EmptyPath)
        ));
        assert!(matches!(
            PropertyPath::new([PathStep::leaf("customer"), PathStep::leaf("name")]),
            Err(ChainError::MissingAccessor { step }) if step == "customer"
        ));
        assert!(matches!(
            PropertyPath::new([PathStep::leaf(" ")]),
            Err(ChainError::BlankArgument { .. })
        ));

        let path = PropertyPath::new([
            PathStep::node("customer", Order::customer),
            PathStep::leaf("name"),
        ])
        .unwrap();
        assert_eq!(path.depth(), 2);
        assert_eq!(path.key(), "customer.name");
        assert_eq!(path.to_string(), "customer.name");
    }
}
