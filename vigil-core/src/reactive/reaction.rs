//! Reaction Implementation
//!
//! A [`Reaction`] is a side-effecting derivation that re-runs whenever its
//! dependencies change.
//!
//! # How Reactions Work
//!
//! 1. A reaction is built from an `on_invalidate` callback. Calling
//!    [`Reaction::schedule`] queues the first run.
//!
//! 2. The callback calls [`Reaction::track`] with the part whose reads
//!    should become dependencies. The reaction subscribes to every source
//!    read there, replacing the previous set.
//!
//! 3. When a dependency changes, the reaction is marked dirty and queued on
//!    the runtime. It never runs inline: the queue is flushed when the
//!    outermost batch closes.
//!
//! 4. Before running, the reaction refreshes its dependencies. If none of
//!    them actually moved (a structural computed produced an equal value,
//!    say) the run is skipped.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Tracking -> Idle
//!   \-> Dirty -> Scheduled -> Running -> Tracking -> Idle
//! ```
//!
//! Disposing a reaction, or dropping its last handle, unsubscribes it from
//! everything it observes. Queued runs check the disposed flag first.
//!
//! # Builders
//!
//! - [`autorun`]: tracks and runs a function, re-running it on change
//! - [`reaction`]: tracks an expression and runs an effect when its value
//!   changes
//! - [`when`]: runs an effect once, the first time a predicate holds

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::action::run_in_action;
use super::atom::{self, rebind, Reactive, Staleness};
use super::comparer::Comparer;
use super::context::{Dependencies, FrameKind, ReactiveContext};
use super::runtime::{BatchGuard, Runtime};
use super::subscriber::{default_name, SubscriberId};
use crate::diagnostics::DependencyTree;

/// Where a reaction is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionPhase {
    Idle,
    /// Collecting dependencies.
    Tracking,
    /// A dependency changed; queued for the next flush pass.
    Dirty,
    /// Picked up by the current flush pass.
    Scheduled,
    Running,
}

type InvalidateFn = Box<dyn Fn(&Reaction) + Send + Sync>;

pub(crate) struct ReactionInner {
    id: SubscriberId,
    name: Arc<str>,
    phase: Mutex<ReactionPhase>,
    dependencies: Mutex<Dependencies>,
    disposed: AtomicBool,
    /// Run on the next pass without checking dependencies.
    forced: AtomicBool,
    run_count: AtomicUsize,
    on_invalidate: InvalidateFn,
    weak_self: Weak<ReactionInner>,
}

impl ReactionInner {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn name(&self) -> String {
        self.name.to_string()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn phase(&self) -> ReactionPhase {
        *self.phase.lock()
    }

    fn observer(&self) -> Weak<dyn Reactive> {
        let weak: Weak<dyn Reactive> = self.weak_self.clone();
        weak
    }

    /// Dropped from a divergent flush.
    pub(crate) fn abandon(&self) {
        *self.phase.lock() = ReactionPhase::Idle;
    }

    pub(crate) fn mark_scheduled(&self) {
        let mut phase = self.phase.lock();
        if *phase == ReactionPhase::Dirty {
            *phase = ReactionPhase::Scheduled;
        }
    }

    /// Run the reaction if it is still live and a dependency really changed.
    pub(crate) fn run_scheduled(self: &Arc<Self>) {
        if self.is_disposed() {
            self.abandon();
            return;
        }
        // Checking dependencies recomputes them, which may panic.
        let _guard = RunGuard { reaction: self };
        if !self.should_run() {
            tracing::trace!(reaction = %self.name, "skipped, dependencies unchanged");
            return;
        }

        *self.phase.lock() = ReactionPhase::Running;
        tracing::trace!(reaction = %self.name, "running");

        let handle = Reaction {
            inner: Arc::clone(self),
        };
        Runtime::batch(|| (self.on_invalidate)(&handle));
    }

    fn should_run(&self) -> bool {
        if self.forced.swap(false, Ordering::SeqCst) {
            return true;
        }

        let dependencies = self.dependencies.lock().clone();
        for dependency in &dependencies {
            match dependency.changed() {
                Ok(true) => return true,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(reaction = %self.name, %error, "dependency check failed");
                    return true;
                }
            }
        }
        false
    }

    fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::new();
        {
            let mut phase = self.phase.lock();
            if *phase != ReactionPhase::Dirty {
                *phase = ReactionPhase::Tracking;
            }
        }

        let context = ReactiveContext::enter(self.id, FrameKind::Reaction, self.name.clone());
        let result = f();
        let dependencies = context.finish();
        self.run_count.fetch_add(1, Ordering::SeqCst);

        let disposed = self.is_disposed();
        let previous = {
            let mut current = self.dependencies.lock();
            if disposed {
                std::mem::take(&mut *current)
            } else {
                std::mem::replace(&mut *current, dependencies.clone())
            }
        };

        if disposed {
            rebind(self.id, &self.observer(), &previous, &[]);
            self.abandon();
            return result;
        }
        rebind(self.id, &self.observer(), &previous, &dependencies);
        tracing::trace!(
            reaction = %self.name,
            dependencies = dependencies.len(),
            "tracked"
        );

        // Something moved between the read and the subscription.
        let missed = dependencies
            .iter()
            .any(|dep| !dep.is_current() || !dep.source.is_up_to_date());
        if missed {
            self.on_dependency_changed(Staleness::Possible);
        }

        let mut phase = self.phase.lock();
        if *phase == ReactionPhase::Tracking {
            *phase = ReactionPhase::Idle;
        }
        result
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for dependency in &dependencies {
            atom::unsubscribe(&dependency.source, self.id);
        }
        self.abandon();
        tracing::trace!(reaction = %self.name, "disposed");
    }
}

impl Reactive for ReactionInner {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn on_dependency_changed(&self, _staleness: Staleness) {
        if self.is_disposed() {
            return;
        }
        {
            let mut phase = self.phase.lock();
            if matches!(*phase, ReactionPhase::Dirty | ReactionPhase::Scheduled) {
                return;
            }
            *phase = ReactionPhase::Dirty;
        }
        if let Some(this) = self.weak_self.upgrade() {
            Runtime::enqueue(&this);
        }
    }
}

impl Drop for ReactionInner {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for dependency in std::mem::take(self.dependencies.get_mut()) {
            atom::unsubscribe(&dependency.source, self.id);
        }
    }
}

/// Puts a reaction back to idle after a run, unless the run dirtied it again.
struct RunGuard<'a> {
    reaction: &'a ReactionInner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.reaction.phase.lock();
        if *phase != ReactionPhase::Dirty {
            *phase = ReactionPhase::Idle;
        }
    }
}

/// A handle to a reaction.
///
/// Handles are cheap to clone. Dropping the last one disposes the reaction.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use vigil_core::reactive::{ObservableValue, Reaction};
///
/// let count = ObservableValue::new(0);
/// let seen = Arc::new(AtomicI32::new(0));
///
/// let reaction = {
///     let (count, seen) = (count.clone(), seen.clone());
///     Reaction::new("printer", move |reaction| {
///         reaction.track(|| seen.store(count.get(), Ordering::SeqCst));
///     })
/// };
/// reaction.schedule();
///
/// count.set(3);
/// assert_eq!(seen.load(Ordering::SeqCst), 3);
/// ```
#[must_use = "dropping the last handle disposes the reaction"]
#[derive(Clone)]
pub struct Reaction {
    inner: Arc<ReactionInner>,
}

impl Reaction {
    /// Create a reaction. `on_invalidate` runs whenever the reaction is
    /// scheduled and should call [`track`](Reaction::track).
    ///
    /// The reaction does not run until [`schedule`](Reaction::schedule) is
    /// called.
    pub fn new<F>(name: impl Into<String>, on_invalidate: F) -> Self
    where
        F: Fn(&Reaction) + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), "Reaction", on_invalidate)
    }

    fn build<F>(name: Option<String>, kind: &str, on_invalidate: F) -> Self
    where
        F: Fn(&Reaction) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let name: Arc<str> = name.unwrap_or_else(|| default_name(kind, id.raw())).into();
        let inner = Arc::new_cyclic(|weak_self| ReactionInner {
            id,
            name,
            phase: Mutex::new(ReactionPhase::Idle),
            dependencies: Mutex::new(Dependencies::new()),
            disposed: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            on_invalidate: Box::new(on_invalidate),
            weak_self: weak_self.clone(),
        });
        Self { inner }
    }

    /// Run `f`, making everything it reads a dependency of this reaction.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.track(f)
    }

    /// Queue a run regardless of dependencies. Runs right away unless a
    /// batch is open.
    pub fn schedule(&self) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.forced.store(true, Ordering::SeqCst);
        self.inner.on_dependency_changed(Staleness::Definite);
        Runtime::flush();
    }

    /// Stop the reaction and unsubscribe it from all its dependencies.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn phase(&self) -> ReactionPhase {
        self.inner.phase()
    }

    /// How many times the reaction has tracked.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    pub fn dependency_tree(&self) -> DependencyTree {
        let dependencies = self.inner.dependencies.lock().clone();
        DependencyTree::build(self.inner.name(), &dependencies)
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name())
            .field("phase", &self.phase())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run `view` now and again whenever anything it read changes.
///
/// ```rust
/// use vigil_core::reactive::{autorun, ObservableValue};
///
/// let name = ObservableValue::new("ada".to_string());
/// let _logger = {
///     let name = name.clone();
///     autorun(move |_| println!("hello {}", name.get()))
/// };
/// name.set("grace".to_string());
/// ```
pub fn autorun<F>(view: F) -> Reaction
where
    F: Fn(&Reaction) + Send + Sync + 'static,
{
    start_autorun(None, view)
}

pub fn autorun_named<F>(name: impl Into<String>, view: F) -> Reaction
where
    F: Fn(&Reaction) + Send + Sync + 'static,
{
    start_autorun(Some(name.into()), view)
}

fn start_autorun<F>(name: Option<String>, view: F) -> Reaction
where
    F: Fn(&Reaction) + Send + Sync + 'static,
{
    let reaction = Reaction::build(name, "Autorun", move |reaction| {
        reaction.track(|| view(reaction));
    });
    reaction.schedule();
    reaction
}

/// Options for [`reaction`].
pub struct ReactionOptions<T> {
    /// Run the effect after the first evaluation too.
    pub fire_immediately: bool,
    /// Decides whether a new expression value counts as a change.
    pub comparer: Comparer<T>,
    pub name: Option<String>,
}

impl<T: PartialEq + 'static> Default for ReactionOptions<T> {
    fn default() -> Self {
        Self {
            fire_immediately: false,
            comparer: Comparer::default_eq(),
            name: None,
        }
    }
}

/// Track `expression` and run `effect(new, old)` whenever its value
/// changes.
///
/// Only reads made by `expression` are tracked. The effect runs as an
/// action, so its reads are not dependencies and its writes are batched.
pub fn reaction<T, E, F>(expression: E, effect: F, options: ReactionOptions<T>) -> Reaction
where
    T: Clone + Send + Sync + 'static,
    E: Fn() -> T + Send + Sync + 'static,
    F: Fn(&T, Option<&T>) + Send + Sync + 'static,
{
    let ReactionOptions {
        fire_immediately,
        comparer,
        name,
    } = options;
    let previous: Mutex<Option<T>> = Mutex::new(None);
    let first_run = AtomicBool::new(true);

    let reaction = Reaction::build(name, "Reaction", move |reaction| {
        let value = reaction.track(&expression);
        let first = first_run.swap(false, Ordering::SeqCst);
        let old = previous.lock().replace(value.clone());
        let changed = match &old {
            Some(old) => !comparer.equals(old, &value),
            None => true,
        };

        if reaction.is_disposed() {
            return;
        }
        if (first && fire_immediately) || (!first && changed) {
            run_in_action(reaction.name(), || effect(&value, old.as_ref()));
        }
    });
    reaction.schedule();
    reaction
}

/// Run `effect` once, the first time `predicate` returns true, then dispose.
pub fn when<P, F>(predicate: P, effect: F) -> Reaction
where
    P: Fn() -> bool + Send + Sync + 'static,
    F: FnOnce() + Send + 'static,
{
    let effect = Mutex::new(Some(effect));
    let reaction = Reaction::build(None, "When", move |reaction| {
        if !reaction.track(&predicate) {
            return;
        }
        reaction.dispose();
        if let Some(effect) = effect.lock().take() {
            run_in_action(reaction.name(), effect);
        }
    });
    reaction.schedule();
    reaction
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
