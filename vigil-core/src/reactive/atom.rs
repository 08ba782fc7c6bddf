//! Atoms and the observer/source seams.
//!
//! An [`Atom`] is the untyped core of anything that can be observed: it owns
//! a version counter and the set of derivations currently observing it.
//! Typed cells, computed values and observable containers embed an atom and
//! expose themselves to the rest of the system through [`Source`].
//! Derivations that can be notified implement [`Reactive`].
//!
//! Observers are held weakly, so an atom never keeps a dead derivation
//! alive; dead entries are pruned on every notification pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{default_name, AtomId, SubscriberId};
use crate::error::Result;

/// How certain a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staleness {
    /// A direct dependency was written.
    Definite,
    /// An upstream computed value may or may not have changed.
    Possible,
}

/// A trait for derivations that can be notified when dependencies change.
pub(crate) trait Reactive: Send + Sync {
    /// Debug name, surfaced only in diagnostics.
    fn name(&self) -> String;

    /// Mark this derivation as needing a check and schedule it if it is a
    /// reaction.
    fn on_dependency_changed(&self, staleness: Staleness);
}

/// Something a derivation can depend on.
pub(crate) trait Source: Send + Sync {
    fn atom(&self) -> &Atom;

    /// Bring the source up to date. Plain cells are always current; computed
    /// values recompute here if needed, bumping their version on change.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the source is known to be current without refreshing.
    fn is_up_to_date(&self) -> bool {
        true
    }

    /// Called when the first observer subscribes.
    fn on_become_observed(&self) {}

    /// Called when the last observer unsubscribes.
    fn on_become_unobserved(&self) {}

    /// The dependencies this source itself has, for diagnostics.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }
}

/// A dependency recorded during a tracked run: the source and the version
/// it had when it was read.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) source: Arc<dyn Source>,
    pub(crate) version: u64,
}

impl Dependency {
    pub(crate) fn atom_id(&self) -> AtomId {
        self.source.atom().id()
    }

    /// Whether the source still has the version recorded at read time.
    pub(crate) fn is_current(&self) -> bool {
        self.source.atom().version() == self.version
    }

    /// Refresh the source and report whether its version moved.
    pub(crate) fn changed(&self) -> Result<bool> {
        self.source.refresh()?;
        Ok(!self.is_current())
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("atom", &self.source.atom().name())
            .field("version", &self.version)
            .finish()
    }
}

/// The tracked core of an observable.
pub(crate) struct Atom {
    id: AtomId,
    name: String,
    version: AtomicU64,
    observers: Mutex<IndexMap<SubscriberId, Weak<dyn Reactive>>>,
}

impl Atom {
    pub(crate) fn new(kind: &str, name: Option<String>) -> Self {
        let id = AtomId::new();
        Self {
            id,
            name: name.unwrap_or_else(|| default_name(kind, id.raw())),
            version: AtomicU64::new(0),
            observers: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn id(&self) -> AtomId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of live observers.
    pub(crate) fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observer_count() > 0
    }

    pub(crate) fn observer_names(&self) -> Vec<String> {
        self.live_observers().iter().map(|o| o.name()).collect()
    }

    /// Add an observer. Returns true if it is the first one.
    pub(crate) fn add_observer(&self, id: SubscriberId, observer: Weak<dyn Reactive>) -> bool {
        let mut observers = self.observers.lock();
        observers.retain(|_, weak| weak.strong_count() > 0);
        let was_empty = observers.is_empty();
        observers.insert(id, observer);
        was_empty
    }

    /// Remove an observer. Returns true if the atom just lost its last one.
    pub(crate) fn remove_observer(&self, id: SubscriberId) -> bool {
        let mut observers = self.observers.lock();
        let removed = observers.shift_remove(&id).is_some();
        observers.retain(|_, weak| weak.strong_count() > 0);
        removed && observers.is_empty()
    }

    /// Upgrade every live observer, dropping dead entries.
    fn live_observers(&self) -> Vec<Arc<dyn Reactive>> {
        let mut observers = self.observers.lock();
        let mut live = Vec::with_capacity(observers.len());
        observers.retain(|_, weak| match weak.upgrade() {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => false,
        });
        live
    }

    /// Record a write: bump the version and mark every observer stale.
    ///
    /// Runs inside a batch so that reactions are only run once the
    /// outermost batch closes.
    pub(crate) fn report_changed(&self) {
        Runtime::batch(|| {
            let version = self.bump_version();
            tracing::trace!(atom = %self.name, version, "observable changed");
            self.notify(Staleness::Definite);
        });
    }

    /// Tell every observer that this atom may have changed.
    pub(crate) fn notify(&self, staleness: Staleness) {
        // Lock released before observers run.
        let observers = self.live_observers();
        for observer in observers {
            observer.on_dependency_changed(staleness);
        }
    }
}

impl std::fmt::Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Record a read of `source` in the active tracking context, if any.
pub(crate) fn report_observed(source: Arc<dyn Source>) -> bool {
    if !ReactiveContext::is_tracking() {
        return false;
    }
    let version = source.atom().version();
    ReactiveContext::track(Dependency { source, version })
}

/// Subscribe `observer` to `source`, waking the source up if it was idle.
pub(crate) fn subscribe(source: &Arc<dyn Source>, id: SubscriberId, observer: Weak<dyn Reactive>) {
    if source.atom().add_observer(id, observer) {
        source.on_become_observed();
    }
}

/// Unsubscribe `id` from `source`, suspending the source if it went idle.
pub(crate) fn unsubscribe(source: &Arc<dyn Source>, id: SubscriberId) {
    if source.atom().remove_observer(id) {
        source.on_become_unobserved();
    }
}

/// Replace a subscription set: unsubscribe what is gone, subscribe what is
/// new.
pub(crate) fn rebind(
    id: SubscriberId,
    observer: &Weak<dyn Reactive>,
    old: &[Dependency],
    new: &[Dependency],
) {
    for dep in old {
        if !new.iter().any(|d| d.atom_id() == dep.atom_id()) {
            unsubscribe(&dep.source, id);
        }
    }
    for dep in new {
        if !old.iter().any(|d| d.atom_id() == dep.atom_id()) {
            subscribe(&dep.source, id, observer.clone());
        }
    }
}
