//! Computed Value Implementation
//!
//! A [`Computed`] is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the computed value runs its function inside a
//!    tracking frame and caches the result together with the version of
//!    every dependency it read.
//!
//! 2. When accessed again, if no dependency changed, the cached value is
//!    returned without running the function.
//!
//! 3. While something observes the computed value, it stays subscribed to
//!    its dependencies and is told when they change: `Stale` for a direct
//!    write, `PossiblyStale` when an upstream computed value may have
//!    changed.
//!
//! 4. With no observers it unsubscribes and re-verifies dependency versions
//!    on every access instead, so nothing keeps it alive or notifies it.
//!
//! 5. After recomputing, the comparer decides whether the new result counts
//!    as a change. Only a change bumps the version seen downstream.
//!
//! # Why This Matters
//!
//! This lazy approach avoids unnecessary recomputation:
//!
//! - An observable changes
//! - 10 computed values depend on it
//! - Only the ones actually read (directly or by a reaction) recompute

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::atom::{self, rebind, Atom, Dependency, Reactive, Source, Staleness};
use super::comparer::{Comparer, StructuralEq};
use super::context::{Dependencies, FrameKind, ReactiveContext};
use super::subscriber::{default_name, SubscriberId};
use crate::config::with_configuration;
use crate::diagnostics::{self, DependencyTree, Diagnostic, ObserverTree};
use crate::error::{ReactiveError, Result};

/// Dirty state for a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationState {
    /// The cached value is up-to-date.
    UpToDate,

    /// An upstream computed value might have changed. Need to check.
    PossiblyStale,

    /// A dependency changed; the value must be recomputed.
    Stale,
}

/// Options for [`Computed::with_options`].
pub struct ComputedOptions<T> {
    /// Decides whether a recomputed result is a change.
    pub comparer: Comparer<T>,
    /// Debug name.
    pub name: Option<String>,
    /// Stay subscribed to dependencies even with no observers.
    pub keep_alive: bool,
    /// Warn when read outside a reactive context.
    pub requires_reaction: bool,
}

impl<T: 'static> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            comparer: Comparer::always(),
            name: None,
            keep_alive: false,
            requires_reaction: false,
        }
    }
}

struct ComputedState<T> {
    value: Option<T>,
    dependencies: Dependencies,
    state: DerivationState,
    computing: bool,
    subscribed: bool,
    compute_count: usize,
}

pub(crate) struct ComputedInner<T> {
    id: SubscriberId,
    name: Arc<str>,
    atom: Atom,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    comparer: Comparer<T>,
    keep_alive: bool,
    requires_reaction: bool,
    state: Mutex<ComputedState<T>>,
    weak_self: Weak<ComputedInner<T>>,
}

/// Resets the computing flag even if the user function panics.
///
/// A panicking computation drops the cached value and goes back to
/// `UpToDate`, so the next dependency change notifies observers again and
/// the next read recomputes.
struct ComputingGuard<'a, T> {
    state: &'a Mutex<ComputedState<T>>,
}

impl<T> Drop for ComputingGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.computing = false;
        if std::thread::panicking() {
            state.value = None;
            state.state = DerivationState::UpToDate;
        }
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn observer(&self) -> Weak<dyn Reactive> {
        let weak: Weak<dyn Reactive> = self.weak_self.clone();
        weak
    }

    /// Make sure the cached value is valid, recomputing if necessary.
    fn refresh(&self) -> Result<()> {
        if self.state.lock().computing {
            return Err(ReactiveError::Cycle {
                name: self.name.to_string(),
            });
        }

        if self.needs_recompute()? {
            self.recompute()
        } else {
            let mut state = self.state.lock();
            if state.subscribed {
                state.state = DerivationState::UpToDate;
            }
            Ok(())
        }
    }

    fn needs_recompute(&self) -> Result<bool> {
        let dependencies = {
            let state = self.state.lock();
            if state.value.is_none() {
                return Ok(true);
            }
            if state.subscribed {
                match state.state {
                    DerivationState::UpToDate => return Ok(false),
                    DerivationState::Stale => return Ok(true),
                    DerivationState::PossiblyStale => {}
                }
            }
            state.dependencies.clone()
        };

        // Unsubscribed or possibly stale: verify every recorded version.
        for dependency in &dependencies {
            if dependency.changed()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn recompute(&self) -> Result<()> {
        self.state.lock().computing = true;
        let guard = ComputingGuard { state: &self.state };

        let context = ReactiveContext::enter(self.id, FrameKind::Computed, self.name.clone());
        let value = (self.compute)();
        let dependencies = context.finish();

        let previous = self.state.lock().value.clone();
        let changed = match &previous {
            Some(previous) => !self.comparer.equals(previous, &value),
            None => true,
        };
        tracing::trace!(
            computed = %self.name,
            dependencies = dependencies.len(),
            changed,
            "recomputed"
        );

        let should_subscribe = self.keep_alive || self.atom.is_observed();
        let (old_dependencies, was_subscribed) = {
            let mut state = self.state.lock();
            if changed {
                state.value = Some(value);
            }
            state.compute_count += 1;
            state.state = DerivationState::UpToDate;
            let was_subscribed = state.subscribed;
            state.subscribed = should_subscribe;
            let old = std::mem::replace(&mut state.dependencies, dependencies.clone());
            (old, was_subscribed)
        };
        drop(guard);

        if changed {
            self.atom.bump_version();
        }

        let observer = self.observer();
        match (was_subscribed, should_subscribe) {
            (true, true) => rebind(self.id, &observer, &old_dependencies, &dependencies),
            (false, true) => rebind(self.id, &observer, &[], &dependencies),
            (true, false) => rebind(self.id, &observer, &old_dependencies, &[]),
            (false, false) => {}
        }
        Ok(())
    }

    fn value(&self) -> T {
        self.state
            .lock()
            .value
            .clone()
            .expect("computed value present after refresh")
    }

    fn warn_if_unobserved_read(&self) {
        let required =
            self.requires_reaction || with_configuration(|config| config.computed_requires_reaction);
        if required && !ReactiveContext::is_tracking() && !self.atom.is_observed() && !self.keep_alive
        {
            diagnostics::report(Diagnostic::ComputedRequiresReaction {
                computed: self.name.to_string(),
            });
        }
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn on_dependency_changed(&self, staleness: Staleness) {
        let propagate = {
            let mut state = self.state.lock();
            let was = state.state;
            state.state = match (was, staleness) {
                (_, Staleness::Definite) | (DerivationState::Stale, _) => DerivationState::Stale,
                _ => DerivationState::PossiblyStale,
            };
            was == DerivationState::UpToDate
        };

        if propagate {
            self.atom.notify(Staleness::Possible);
        }
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn atom(&self) -> &Atom {
        &self.atom
    }

    fn refresh(&self) -> Result<()> {
        ComputedInner::refresh(self)
    }

    fn is_up_to_date(&self) -> bool {
        let state = self.state.lock();
        state.subscribed
            && !state.computing
            && state.value.is_some()
            && state.state == DerivationState::UpToDate
    }

    fn on_become_observed(&self) {
        let dependencies = {
            let mut state = self.state.lock();
            if state.subscribed || state.computing {
                return;
            }
            state.subscribed = true;
            state.dependencies.clone()
        };

        rebind(self.id, &self.observer(), &[], &dependencies);

        // Anything that moved while we were not listening makes us unsure.
        let current = dependencies
            .iter()
            .all(|dep| dep.is_current() && dep.source.is_up_to_date());
        let mut state = self.state.lock();
        state.state = if state.value.is_some() && current {
            DerivationState::UpToDate
        } else {
            DerivationState::PossiblyStale
        };
    }

    fn on_become_unobserved(&self) {
        if self.keep_alive {
            return;
        }
        let dependencies = {
            let mut state = self.state.lock();
            if !state.subscribed {
                return;
            }
            state.subscribed = false;
            state.dependencies.clone()
        };
        tracing::trace!(computed = %self.name, "suspended");
        rebind(self.id, &self.observer(), &dependencies, &[]);
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.state.lock().dependencies.to_vec()
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.subscribed {
            for dependency in std::mem::take(&mut state.dependencies) {
                atom::unsubscribe(&dependency.source, self.id);
            }
        }
    }
}

/// A cached value derived from observables.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{Computed, ObservableValue};
///
/// let counter = ObservableValue::new(0);
/// let doubled = {
///     let counter = counter.clone();
///     Computed::new(move || counter.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 0);
/// counter.set(5);
/// assert_eq!(doubled.get(), 10);
/// assert_eq!(doubled.compute_count(), 2);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed value. Every recomputation counts as a change.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(compute, ComputedOptions::default())
    }

    /// Create a computed value whose structurally equal results do not
    /// notify observers.
    pub fn structural<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: StructuralEq,
    {
        Self::with_options(
            compute,
            ComputedOptions {
                comparer: Comparer::structural(),
                ..ComputedOptions::default()
            },
        )
    }

    pub fn with_options<F>(compute: F, options: ComputedOptions<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let name: Arc<str> = options
            .name
            .unwrap_or_else(|| default_name("Computed", id.raw()))
            .into();

        let inner = Arc::new_cyclic(|weak_self| ComputedInner {
            id,
            atom: Atom::new("Computed", Some(name.to_string())),
            name,
            compute: Box::new(compute),
            comparer: options.comparer,
            keep_alive: options.keep_alive,
            requires_reaction: options.requires_reaction,
            state: Mutex::new(ComputedState {
                value: None,
                dependencies: Dependencies::new(),
                state: DerivationState::Stale,
                computing: false,
                subscribed: false,
                compute_count: 0,
            }),
            weak_self: weak_self.clone(),
        });

        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computed value is read while it is computing itself.
    /// Use [`try_get`](Computed::try_get) to handle cycles.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Get the current value, reporting cycles as errors.
    pub fn try_get(&self) -> Result<T> {
        self.inner.warn_if_unobserved_read();
        self.inner.refresh()?;
        atom::report_observed(self.inner.clone());
        Ok(self.inner.value())
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.refresh()?;
        Ok(self.inner.value())
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Version seen by downstream derivations; bumped when a recomputation
    /// produced a different value.
    pub fn version(&self) -> u64 {
        self.inner.atom.version()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DerivationState {
        self.inner.state.lock().state
    }

    /// How many times the function has run.
    pub fn compute_count(&self) -> usize {
        self.inner.state.lock().compute_count
    }

    /// Check if the computed value has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    pub fn is_computing(&self) -> bool {
        self.inner.state.lock().computing
    }

    /// Whether the computed value is currently subscribed to its
    /// dependencies.
    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscribed
    }

    /// Get the number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.atom.observer_count()
    }

    pub fn observer_tree(&self) -> ObserverTree {
        ObserverTree {
            name: self.inner.name.to_string(),
            observers: self.inner.atom.observer_names(),
        }
    }

    pub fn dependency_tree(&self) -> DependencyTree {
        let dependencies = self.inner.state.lock().dependencies.clone();
        DependencyTree::build(self.inner.name.to_string(), &dependencies)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ObservableValue;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert!(!computed.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        // First access triggers computation
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn caches_value_until_dependency_changes() {
        let source = ObservableValue::new(1);
        let computed = {
            let source = source.clone();
            Computed::new(move || source.get() + 1)
        };

        assert_eq!(computed.get(), 2);
        assert_eq!(computed.get(), 2);
        assert_eq!(computed.compute_count(), 1);

        source.set(10);
        assert_eq!(computed.get(), 11);
        assert_eq!(computed.get(), 11);
        assert_eq!(computed.compute_count(), 2);
    }

    #[test]
    fn unobserved_computed_is_not_subscribed() {
        let source = ObservableValue::new(1);
        let computed = {
            let source = source.clone();
            Computed::new(move || source.get())
        };

        computed.get();
        assert!(!computed.is_subscribed());
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn keep_alive_stays_subscribed() {
        let source = ObservableValue::new(1);
        let computed = {
            let source = source.clone();
            Computed::with_options(
                move || source.get(),
                ComputedOptions {
                    keep_alive: true,
                    ..ComputedOptions::default()
                },
            )
        };

        computed.get();
        assert!(computed.is_subscribed());
        assert_eq!(source.observer_count(), 1);

        source.set(2);
        assert_eq!(computed.state(), DerivationState::Stale);
        assert_eq!(computed.get(), 2);
        assert_eq!(computed.state(), DerivationState::UpToDate);
    }

    #[test]
    fn computed_depends_on_computed() {
        let base = ObservableValue::new(5);
        let doubled = {
            let base = base.clone();
            Computed::new(move || base.get() * 2)
        };
        let plus_ten = {
            let doubled = doubled.clone();
            Computed::new(move || doubled.get() + 10)
        };

        assert_eq!(plus_ten.get(), 20);
        base.set(10);
        assert_eq!(plus_ten.get(), 30);
        assert_eq!(doubled.compute_count(), 2);
    }

    #[test]
    fn structural_result_keeps_version() {
        let source = ObservableValue::new(1);
        let parity = {
            let source = source.clone();
            Computed::structural(move || source.get() % 2)
        };

        parity.get();
        let version = parity.version();
        source.set(3);
        assert_eq!(parity.get(), 1);
        assert_eq!(parity.compute_count(), 2);
        assert_eq!(parity.version(), version);
    }

    #[test]
    fn default_policy_always_replaces() {
        let source = ObservableValue::new(1);
        let parity = {
            let source = source.clone();
            Computed::new(move || source.get() % 2)
        };

        parity.get();
        let version = parity.version();
        source.set(3);
        parity.get();
        assert_eq!(parity.version(), version + 1);
    }

    #[test]
    fn dependency_set_is_replaced() {
        let use_a = ObservableValue::new(true);
        let a = ObservableValue::named("a", 1, Comparer::default_eq());
        let b = ObservableValue::named("b", 2, Comparer::default_eq());
        let pick = {
            let (use_a, a, b) = (use_a.clone(), a.clone(), b.clone());
            Computed::with_options(
                move || if use_a.get() { a.get() } else { b.get() },
                ComputedOptions {
                    keep_alive: true,
                    name: Some("pick".into()),
                    ..ComputedOptions::default()
                },
            )
        };

        assert_eq!(pick.get(), 1);
        assert_eq!(a.observer_count(), 1);
        assert_eq!(b.observer_count(), 0);

        use_a.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);

        let tree = pick.dependency_tree();
        assert_eq!(tree.name, "pick");
        assert!(tree.names().contains(&"b".to_string()));
    }

    #[test]
    fn cycle_is_reported() {
        let slot: Arc<Mutex<Option<Computed<i32>>>> = Arc::new(Mutex::new(None));
        let outcome = Arc::new(Mutex::new(None));

        let computed = {
            let slot = slot.clone();
            let outcome = outcome.clone();
            Computed::new(move || {
                let me = slot.lock().clone();
                if let Some(me) = me {
                    *outcome.lock() = Some(me.try_get());
                }
                1
            })
        };
        *slot.lock() = Some(computed.clone());

        assert_eq!(computed.get(), 1);
        assert!(matches!(
            outcome.lock().take(),
            Some(Err(ReactiveError::Cycle { .. }))
        ));
        assert!(!computed.is_computing());
    }

    #[test]
    fn panicking_computation_recovers() {
        let fail = ObservableValue::new(true);
        let computed = {
            let fail = fail.clone();
            Computed::new(move || {
                if fail.get() {
                    panic!("bad input");
                }
                7
            })
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.get()));
        assert!(result.is_err());
        assert!(!computed.is_computing());
        assert_eq!(ReactiveContext::depth(), 0);

        fail.set(false);
        assert_eq!(computed.get(), 7);
    }
}
