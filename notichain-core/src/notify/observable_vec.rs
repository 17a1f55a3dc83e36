//! Observable Vector
//!
//! An `ObservableVec` is a shared, ordered collection of notifying items that
//! reports every membership change. It implements both notification traits:
//! membership changes go to collection listeners, and the `len` property is
//! raised to property listeners whenever the count may have changed.
//!
//! All mutators take `&self`; the item list sits behind a lock that is
//! released before any listener runs.

use std::sync::Arc;

use parking_lot::RwLock;

use super::source::{EventSource, PropertyChangedSource};
use super::subscription::SubscriptionId;
use super::{
    CollectionChange, CollectionChangedHandler, Node, NotifyCollectionChanged,
    NotifyPropertyChanged, PropertyChangedHandler,
};

/// Name raised to property listeners when the item count may have changed.
pub const LEN_PROPERTY: &str = "len";

/// A vector of shared notifying items that announces membership changes.
pub struct ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    items: RwLock<Vec<Arc<T>>>,
    changes: EventSource<CollectionChangedHandler>,
    properties: PropertyChangedSource,
}

impl<T> ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    /// Create a collection holding `items`. No events are raised.
    pub fn from_items(items: Vec<Arc<T>>) -> Self {
        Self {
            items: RwLock::new(items),
            changes: EventSource::new(),
            properties: PropertyChangedSource::new(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Item at `index`, if any.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).cloned()
    }

    /// Copy of the current items.
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    /// Append an item.
    pub fn push(&self, item: Arc<T>) {
        self.items.write().push(item.clone());
        self.notify(CollectionChange::Added(vec![item as Node]), true);
    }

    /// Insert an item at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, item: Arc<T>) {
        {
            let mut items = self.items.write();
            let index = index.min(items.len());
            items.insert(index, item.clone());
        }
        self.notify(CollectionChange::Added(vec![item as Node]), true);
    }

    /// Remove and return the item at `index`.
    pub fn remove(&self, index: usize) -> Option<Arc<T>> {
        let removed = {
            let mut items = self.items.write();
            (index < items.len()).then(|| items.remove(index))
        }?;
        self.notify(CollectionChange::Removed(vec![removed.clone() as Node]), true);
        Some(removed)
    }

    /// Remove the first occurrence of `item` (by identity).
    pub fn remove_item(&self, item: &Arc<T>) -> bool {
        let position = self
            .items
            .read()
            .iter()
            .position(|existing| Arc::ptr_eq(existing, item));
        match position {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn replace(&self, index: usize, item: Arc<T>) -> Option<Arc<T>> {
        let old = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item.clone())
        };
        self.notify(
            CollectionChange::Replaced {
                old: vec![old.clone() as Node],
                new: vec![item as Node],
            },
            false,
        );
        Some(old)
    }

    /// Move the item at `from` to position `to`.
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        {
            let mut items = self.items.write();
            if from >= items.len() || to >= items.len() {
                return false;
            }
            let item = items.remove(from);
            items.insert(to, item);
        }
        self.notify(CollectionChange::Moved, false);
        true
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.items.write().clear();
        self.notify(CollectionChange::Reset, true);
    }

    /// Replace the whole contents with `items`, raising a single reset.
    pub fn reset(&self, items: Vec<Arc<T>>) {
        *self.items.write() = items;
        self.notify(CollectionChange::Reset, true);
    }

    fn notify(&self, change: CollectionChange, len_changed: bool) {
        tracing::trace!(?change, "collection changed");
        for handler in self.changes.handlers() {
            handler(self, &change);
        }
        if len_changed {
            self.properties.raise(self, LEN_PROPERTY);
        }
    }
}

impl<T> Default for ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NotifyCollectionChanged for ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    fn subscribe_collection_changed(&self, handler: CollectionChangedHandler) -> SubscriptionId {
        self.changes.subscribe(handler)
    }

    fn unsubscribe_collection_changed(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    fn members(&self) -> Vec<Node> {
        self.items
            .read()
            .iter()
            .map(|item| item.clone() as Node)
            .collect()
    }
}

impl<T> NotifyPropertyChanged for ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    fn subscribe_property_changed(&self, handler: PropertyChangedHandler) -> SubscriptionId {
        self.properties.subscribe(handler)
    }

    fn unsubscribe_property_changed(&self, id: SubscriptionId) -> bool {
        self.properties.unsubscribe(id)
    }
}

impl<T> std::fmt::Debug for ObservableVec<T>
where
    T: NotifyPropertyChanged + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableVec")
            .field("len", &self.len())
            .field("listeners", &self.changes.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{collection_changed_handler, property_changed_handler};
    use parking_lot::Mutex;

    struct Item {
        events: PropertyChangedSource,
    }

    impl Item {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: PropertyChangedSource::new(),
            })
        }
    }

    impl NotifyPropertyChanged for Item {
        fn subscribe_property_changed(&self, handler: PropertyChangedHandler) -> SubscriptionId {
            self.events.subscribe(handler)
        }

        fn unsubscribe_property_changed(&self, id: SubscriptionId) -> bool {
            self.events.unsubscribe(id)
        }
    }

    fn record(items: &ObservableVec<Item>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let changes = seen.clone();
        items.subscribe_collection_changed(collection_changed_handler(move |_, change| {
            changes.lock().push(format!("{change:?}"));
        }));
        let properties = seen.clone();
        items.subscribe_property_changed(property_changed_handler(move |_, property| {
            properties.lock().push(property.to_string());
        }));
        seen
    }

    #[test]
    fn mutations_report_membership_changes() {
        let items = ObservableVec::new();
        let seen = record(&items);
        let first = Item::new();

        items.push(first.clone());
        items.insert(0, Item::new());
        assert!(items.move_item(0, 1));
        assert!(items.replace(1, Item::new()).is_some());
        assert!(items.remove_item(&first));
        items.clear();

        assert_eq!(
            *seen.lock(),
            vec![
                "Added(1)",
                "len",
                "Added(1)",
                "len",
                "Moved",
                "Replaced(1 -> 1)",
                "Removed(1)",
                "len",
                "Reset",
                "len",
            ]
        );
        assert!(items.is_empty());
    }

    #[test]
    fn members_follow_item_order() {
        let a = Item::new();
        let b = Item::new();
        let items = ObservableVec::from_items(vec![a.clone(), b.clone()]);
        items.move_item(1, 0);

        let members = items.members();
        let a_node: Node = a;
        let b_node: Node = b;
        assert!(crate::notify::same_node(&members[0], &b_node));
        assert!(crate::notify::same_node(&members[1], &a_node));
    }

    #[test]
    fn out_of_range_operations_are_ignored() {
        let items: ObservableVec<Item> = ObservableVec::new();
        let seen = record(&items);

        assert!(items.remove(3).is_none());
        assert!(items.replace(0, Item::new()).is_none());
        assert!(!items.move_item(0, 1));
        assert!(seen.lock().is_empty());
    }
}
