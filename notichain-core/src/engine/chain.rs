//! Notification Chains
//!
//! A [`Chain`] is the complete registration of one dependent property: the
//! source properties it observes and the callbacks to run when any of them
//! change.
//!
//! # Lifecycle
//!
//! 1. Created lazily by [`ChainManager::create_or_get`], usually from inside
//!    the dependent property's getter.
//!
//! 2. Configured with `on*` and `and_call`.
//!
//! 3. Locked with `finish`. From then on every configuration call is a silent
//!    no-op, so the getter can redeclare the same configuration on every read.
//!
//! 4. Disposed together with its manager. A disposed chain ignores
//!    everything and never matches.
//!
//! # Deep dependencies
//!
//! `on_path` watches a property on an object reached through other
//! properties. The first step is observed directly; the rest is registered on
//! a *relay chain* named `../<dependent>` inside the nested manager for that
//! step. The relay's callback re-executes this chain, so a change deep in the
//! graph surfaces here as if it happened on the host.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

use crate::error::{require, ChainError, Result};
use crate::notify::node_any;

use super::collection::MEMBERSHIP_CHANGED;
use super::manager::{ChainManager, ManagerInner};
use super::path::{relay_name, CollectionStep, PathStep, PropertyPath};

/// Callback run when a chain fires: `(sender, notifying_property, dependent_property)`.
///
/// `sender` and `notifying_property` are `None` when the chain is executed
/// directly rather than in response to an event.
pub type ChainCallback = Arc<dyn Fn(Option<&dyn Any>, Option<&str>, &str) + Send + Sync>;

/// Build a [`ChainCallback`] from a closure.
pub fn chain_callback<F>(callback: F) -> ChainCallback
where
    F: Fn(Option<&dyn Any>, Option<&str>, &str) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Pattern registered by [`Chain::on_any`].
pub const ANY_PROPERTY_PATTERN: &str = "^.*$";

/// Serializable view of a chain's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub dependent_property: String,
    pub observed_properties: Vec<String>,
    pub observed_patterns: Vec<String>,
    pub callback_count: usize,
    pub finished: bool,
    pub disposed: bool,
}

#[derive(Default)]
struct ChainState {
    observed: IndexSet<String>,
    patterns: Vec<Regex>,
    callbacks: Vec<ChainCallback>,
    finished: bool,
    disposed: bool,
}

impl ChainState {
    fn is_locked(&self) -> bool {
        self.finished || self.disposed
    }

    fn matches(&self, property: &str) -> bool {
        self.observed.contains(property) || self.patterns.iter().any(|p| p.is_match(property))
    }
}

struct ChainInner {
    dependent: Arc<str>,
    manager: Weak<ManagerInner>,
    state: Mutex<ChainState>,
    /// Re-executes this chain. Created once so repeated registrations on a
    /// relay de-duplicate by identity.
    relay: ChainCallback,
}

/// The observed sources and callbacks of one dependent property.
///
/// Clones share state.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<ChainInner>,
}

impl Chain {
    /// Create a chain for `dependent_property` owned by `manager`.
    ///
    /// The chain is not registered with the manager; use
    /// [`ChainManager::create_or_get`] for that.
    pub fn new(manager: &ChainManager, dependent_property: &str) -> Result<Self> {
        require(dependent_property, "dependent_property")?;
        Ok(Self::build(manager.downgrade(), dependent_property, false))
    }

    pub(crate) fn attached(manager: Weak<ManagerInner>, dependent_property: &str) -> Self {
        Self::build(manager, dependent_property, false)
    }

    /// A chain that starts out disposed, handed out by disposed managers.
    pub(crate) fn detached(dependent_property: &str) -> Self {
        Self::build(Weak::new(), dependent_property, true)
    }

    fn build(manager: Weak<ManagerInner>, dependent_property: &str, disposed: bool) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<ChainInner>| {
            let this = this.clone();
            ChainInner {
                dependent: Arc::from(dependent_property),
                manager,
                state: Mutex::new(ChainState {
                    disposed,
                    ..ChainState::default()
                }),
                relay: chain_callback(move |sender, notifying, _relay| {
                    if let Some(inner) = this.upgrade() {
                        Chain { inner }.execute(sender, notifying);
                    }
                }),
            }
        });
        Self { inner }
    }

    /// Name of the dependent property.
    pub fn dependent_property(&self) -> &str {
        &self.inner.dependent
    }

    /// Observed exact property names, in registration order.
    pub fn observed_properties(&self) -> Vec<String> {
        self.inner.state.lock().observed.iter().cloned().collect()
    }

    /// Observed patterns, in registration order.
    pub fn observed_patterns(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .patterns
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    pub fn callback_count(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Whether both handles refer to the same chain.
    pub fn ptr_eq(&self, other: &Chain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `configure` against this chain unless it is finished or disposed.
    pub fn configure<F>(&self, configure: F) -> Result<&Self>
    where
        F: FnOnce(&Chain) -> Result<()>,
    {
        if self.is_locked() {
            return Ok(self);
        }
        configure(self)?;
        Ok(self)
    }

    /// Observe an exact property name.
    pub fn on(&self, property: &str) -> Result<&Self> {
        require(property, "property")?;
        self.insert_name(property);
        Ok(self)
    }

    /// Observe every property whose name matches `pattern`.
    pub fn on_pattern(&self, pattern: &str) -> Result<&Self> {
        require(pattern, "pattern")?;
        if self.is_locked() {
            return Ok(self);
        }
        let regex = Regex::new(pattern).map_err(|source| ChainError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let mut state = self.inner.state.lock();
        if !state.is_locked() && !state.patterns.iter().any(|p| p.as_str() == pattern) {
            state.patterns.push(regex);
        }
        Ok(self)
    }

    /// Observe every property.
    pub fn on_any(&self) -> Result<&Self> {
        self.on_pattern(ANY_PROPERTY_PATTERN)
    }

    /// Observe a property reached through `path`, starting from `source`.
    ///
    /// `source` is the object the first step reads from, normally the host.
    /// A one-step path is the same as [`on`](Self::on).
    pub fn on_path(&self, source: &dyn Any, path: &PropertyPath) -> Result<&Self> {
        if self.is_locked() {
            return Ok(self);
        }
        let relay = self.inner.relay.clone();
        self.deep_on(&relay, Some(source), path.steps())?;
        Ok(self)
    }

    /// Observe a collection-valued property and, optionally, a path on each
    /// of its members.
    ///
    /// Fires when the collection property itself is reassigned, when its
    /// membership changes, and when `member_path` changes on any current
    /// member.
    pub fn on_collection(
        &self,
        source: &dyn Any,
        collection: &CollectionStep,
        member_path: Option<&PropertyPath>,
    ) -> Result<&Self> {
        if self.is_locked() {
            return Ok(self);
        }
        self.insert_name(collection.name());
        let Some(manager) = self.manager() else {
            return Ok(self);
        };

        let current = collection.read(source);
        let collections = manager.nested_collection(
            collection.name(),
            Some(collection.accessor().clone()),
            current,
        );
        let relay_name = relay_name(self.dependent_property());
        let callback = self.inner.relay.clone();
        collections
            .create_or_get(&relay_name)?
            .on(MEMBERSHIP_CHANGED)?
            .and_call(callback.clone());
        if let Some(path) = member_path {
            collections.add_member_path(&relay_name, path, callback);
        }
        Ok(self)
    }

    /// Register `steps` on this chain, creating relays for everything past
    /// the first step. `top` re-executes the chain being configured.
    pub(crate) fn deep_on(
        &self,
        top: &ChainCallback,
        source: Option<&dyn Any>,
        steps: &[PathStep],
    ) -> Result<()> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(());
        };
        self.insert_name(first.name());
        if rest.is_empty() {
            return Ok(());
        }
        let Some(manager) = self.manager() else {
            return Ok(());
        };

        let current = source.and_then(|source| first.read(source));
        let nested = manager.nested(first.name(), first.accessor().cloned(), current);
        let relay = nested.create_or_get(&relay_name(self.dependent_property()))?;
        let bound = nested.bound_node();
        relay.deep_on(top, bound.as_ref().map(node_any), rest)?;
        relay.and_call(top.clone());
        Ok(())
    }

    /// Add a callback. The same `Arc` is only ever added once.
    pub fn and_call(&self, callback: ChainCallback) -> &Self {
        let mut state = self.inner.state.lock();
        if state.is_locked() || state.callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return self;
        }
        state.callbacks.push(callback);
        self
    }

    /// Add a callback that ignores its arguments.
    ///
    /// Each call wraps `callback` in a new `Arc`, so repeated calls add it
    /// again.
    pub fn and_call_fn<F>(&self, callback: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.and_call(chain_callback(move |_, _, _| callback()))
    }

    /// Remove every callback, unless the chain is finished.
    pub fn clear_callbacks(&self) -> &Self {
        let mut state = self.inner.state.lock();
        if !state.finished {
            state.callbacks.clear();
        }
        self
    }

    /// Lock the configuration, optionally executing once with no sender.
    pub fn finish(&self, execute_now: bool) {
        if !self.lock_configuration() {
            return;
        }
        if execute_now {
            self.execute(None, None);
        }
    }

    /// Lock the configuration and execute once with the given context.
    ///
    /// Useful for seeding state on the first read of the dependent property.
    pub fn finish_with(&self, sender: Option<&dyn Any>, notifying_property: Option<&str>) {
        if self.lock_configuration() {
            self.execute(sender, notifying_property);
        }
    }

    fn lock_configuration(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_locked() {
            return false;
        }
        state.finished = true;
        true
    }

    /// Run the callbacks if `property` is observed, by exact name or pattern.
    ///
    /// Returns whether the chain matched.
    pub fn publish(&self, sender: &dyn Any, property: &str) -> bool {
        let callbacks = {
            let state = self.inner.state.lock();
            if state.disposed || !state.matches(property) {
                return false;
            }
            state.callbacks.clone()
        };
        tracing::trace!(
            dependent = %self.inner.dependent,
            property,
            callbacks = callbacks.len(),
            "chain matched"
        );
        for callback in &callbacks {
            callback(Some(sender), Some(property), &self.inner.dependent);
        }
        true
    }

    /// Run every callback now.
    pub fn execute(&self, sender: Option<&dyn Any>, notifying_property: Option<&str>) {
        let callbacks = {
            let state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.callbacks.clone()
        };
        for callback in &callbacks {
            callback(sender, notifying_property, &self.inner.dependent);
        }
    }

    /// Clear all state. Later calls do nothing.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        state.observed.clear();
        state.patterns.clear();
        state.callbacks.clear();
        state.disposed = true;
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        let state = self.inner.state.lock();
        ChainSnapshot {
            dependent_property: self.inner.dependent.to_string(),
            observed_properties: state.observed.iter().cloned().collect(),
            observed_patterns: state.patterns.iter().map(|p| p.as_str().to_string()).collect(),
            callback_count: state.callbacks.len(),
            finished: state.finished,
            disposed: state.disposed,
        }
    }

    fn is_locked(&self) -> bool {
        self.inner.state.lock().is_locked()
    }

    fn insert_name(&self, property: &str) {
        let mut state = self.inner.state.lock();
        if !state.is_locked() {
            state.observed.insert(property.to_string());
        }
    }

    fn manager(&self) -> Option<ChainManager> {
        self.inner.manager.upgrade().map(ChainManager::from_inner)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Chain")
            .field("dependent", &self.inner.dependent)
            .field("observed", &state.observed)
            .field("patterns", &state.patterns.len())
            .field("callbacks", &state.callbacks.len())
            .field("finished", &state.finished)
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Calls = Arc<Mutex<Vec<(Option<String>, String)>>>;

    fn recorder() -> (Calls, ChainCallback) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let callback = chain_callback(move |_sender, notifying, dependent| {
            calls_clone
                .lock()
                .push((notifying.map(str::to_string), dependent.to_string()));
        });
        (calls, callback)
    }

    fn chain(dependent: &str) -> (ChainManager, Chain) {
        let manager = ChainManager::new();
        let chain = manager.create_or_get(dependent).unwrap();
        (manager, chain)
    }

    #[test]
    fn blank_arguments_are_rejected() {
        let manager = ChainManager::new();
        assert!(matches!(
            Chain::new(&manager, ""),
            Err(ChainError::BlankArgument { argument: "dependent_property" })
        ));

        let (_manager, chain) = chain("total");
        assert!(chain.on(" ").is_err());
        assert!(chain.on_pattern("").is_err());
        assert!(matches!(
            chain.on_pattern("("),
            Err(ChainError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn publish_matches_exact_names() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.on("price").unwrap().on("quantity").unwrap().and_call(callback);

        assert!(chain.publish(&(), "price"));
        assert!(!chain.publish(&(), "name"));

        assert_eq!(
            *calls.lock(),
            vec![(Some("price".to_string()), "total".to_string())]
        );
    }

    #[test]
    fn and_call_fn_runs_argumentless_closure() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_manager, chain) = chain("total");
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        chain.on("price").unwrap().and_call_fn(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        chain.publish(&(), "price");
        chain.publish(&(), "price");
        chain.execute(None, None);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(chain.callback_count(), 1);

        chain.finish(false);
        chain.and_call_fn(|| {});
        assert_eq!(chain.callback_count(), 1);
    }

    #[test]
    fn repeated_names_are_observed_once() {
        let (_manager, chain) = chain("total");
        chain.on("price").unwrap().on("price").unwrap();
        assert_eq!(chain.observed_properties(), vec!["price".to_string()]);
    }

    #[test]
    fn publish_matches_patterns() {
        let (_manager, chain) = chain("summary");
        let (calls, callback) = recorder();
        chain.on_pattern("^line_item[0-9]$").unwrap().and_call(callback);

        assert!(chain.publish(&(), "line_item2"));
        assert!(!chain.publish(&(), "line_item10"));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn on_any_matches_everything() {
        let (_manager, chain) = chain("anything");
        let (calls, callback) = recorder();
        chain.on_any().unwrap().and_call(callback);

        assert!(chain.publish(&(), "a"));
        assert!(chain.publish(&(), "b"));
        assert_eq!(chain.observed_patterns(), vec![ANY_PROPERTY_PATTERN]);
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn exact_and_pattern_match_fires_once() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.on("price").unwrap().on_pattern("^pr").unwrap().and_call(callback);

        assert!(chain.publish(&(), "price"));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn registration_is_idempotent() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        for _ in 0..3 {
            chain
                .on("price")
                .unwrap()
                .on_pattern("^qty")
                .unwrap()
                .and_call(callback.clone());
        }

        assert_eq!(chain.observed_properties(), vec!["price"]);
        assert_eq!(chain.observed_patterns(), vec!["^qty"]);
        assert_eq!(chain.callback_count(), 1);

        chain.publish(&(), "price");
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn configuration_after_finish_is_ignored() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.on("price").unwrap().and_call(callback);
        chain.finish(false);

        let (_, late) = recorder();
        chain.on("quantity").unwrap().on_any().unwrap().and_call(late);
        chain.clear_callbacks();
        let ran = std::cell::Cell::new(false);
        chain
            .configure(|_| {
                ran.set(true);
                Ok(())
            })
            .unwrap();

        assert!(!ran.get());
        assert_eq!(chain.observed_properties(), vec!["price"]);
        assert!(chain.observed_patterns().is_empty());
        assert_eq!(chain.callback_count(), 1);
        assert!(!chain.publish(&(), "quantity"));
        assert!(chain.publish(&(), "price"));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn finish_can_execute_once() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.and_call(callback);

        chain.finish(true);
        chain.finish(true);
        assert_eq!(*calls.lock(), vec![(None, "total".to_string())]);
    }

    #[test]
    fn finish_with_passes_context() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.and_call(callback);

        chain.finish_with(Some(&()), Some("seed"));
        chain.finish_with(Some(&()), Some("again"));
        assert_eq!(
            *calls.lock(),
            vec![(Some("seed".to_string()), "total".to_string())]
        );
    }

    #[test]
    fn clear_callbacks_before_finish() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.on("price").unwrap().and_call(callback);
        chain.clear_callbacks();

        assert!(chain.publish(&(), "price"));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn dispose_makes_chain_inert() {
        let (_manager, chain) = chain("total");
        let (calls, callback) = recorder();
        chain.on("price").unwrap().and_call(callback.clone());

        chain.dispose();
        chain.dispose();
        chain.on("price").unwrap().and_call(callback);

        assert!(chain.is_disposed());
        assert!(!chain.publish(&(), "price"));
        chain.execute(None, None);
        assert!(calls.lock().is_empty());
        assert!(chain.observed_properties().is_empty());
    }

    #[test]
    fn callbacks_may_reenter_the_chain() {
        let (_manager, chain) = chain("total");
        let depth = Arc::new(Mutex::new(0));
        let depth_clone = depth.clone();
        let reentrant = chain.clone();
        chain.on("price").unwrap().and_call(chain_callback(move |_, _, _| {
            let mut depth = depth_clone.lock();
            *depth += 1;
            let first = *depth == 1;
            drop(depth);
            if first {
                reentrant.publish(&(), "price");
            }
        }));

        chain.publish(&(), "price");
        assert_eq!(*depth.lock(), 2);
    }

    #[test]
    fn snapshot_reflects_configuration() {
        let (_manager, chain) = chain("total");
        let (_, callback) = recorder();
        chain.on("price").unwrap().on_pattern("^q").unwrap().and_call(callback);
        chain.finish(false);

        let snapshot = chain.snapshot();
        assert_eq!(snapshot.dependent_property, "total");
        assert_eq!(snapshot.observed_properties, vec!["price"]);
        assert_eq!(snapshot.observed_patterns, vec!["^q"]);
        assert_eq!(snapshot.callback_count, 1);
        assert!(snapshot.finished);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["dependent_property"], "total");
    }
}
