//! Observable Value Implementation
//!
//! An [`ObservableValue`] is the fundamental reactive primitive. It holds a
//! value and tracks which derivations depend on it.
//!
//! # How Observable Values Work
//!
//! 1. When the value is read within a tracking context (computed value or
//!    reaction), the read is recorded together with the current version.
//!
//! 2. When a write changes the value, the version is bumped and every
//!    observer is marked stale.
//!
//! 3. Reactions that were marked stale run once the enclosing batch closes.
//!
//! Writes that are equal under the cell's [`Comparer`] are ignored.
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - An atom (ID, version counter, weak observer set)
//! - The value, behind a `parking_lot::RwLock`
//! - The comparer

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::atom::{self, Atom, Source};
use super::comparer::Comparer;
use super::context::{FrameKind, ReactiveContext};
use super::action::current_action;
use crate::config::{with_configuration, EnforceActions};
use crate::diagnostics::{self, Diagnostic, ObserverTree};
use crate::error::{MisuseError, ReactiveError, Result};

pub(crate) struct ObservableInner<T> {
    atom: Atom,
    value: RwLock<T>,
    comparer: Comparer<T>,
}

impl<T: Send + Sync + 'static> Source for ObservableInner<T> {
    fn atom(&self) -> &Atom {
        &self.atom
    }
}

/// A tracked mutable value.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::ObservableValue;
///
/// let count = ObservableValue::new(0);
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// assert!(count.set(5));
/// assert!(!count.set(5));
/// assert_eq!(count.version(), 1);
/// ```
pub struct ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ObservableInner<T>>,
}

impl<T> ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_comparer(value, Comparer::default_eq())
    }

    /// Create a new cell with an explicit equality policy.
    pub fn with_comparer(value: T, comparer: Comparer<T>) -> Self {
        Self::build(value, comparer, None)
    }

    /// Create a named cell. The name only shows up in diagnostics.
    pub fn named(name: impl Into<String>, value: T, comparer: Comparer<T>) -> Self {
        Self::build(value, comparer, Some(name.into()))
    }

    fn build(value: T, comparer: Comparer<T>, name: Option<String>) -> Self {
        Self {
            inner: Arc::new(ObservableInner {
                atom: Atom::new("ObservableValue", name),
                value: RwLock::new(value),
                comparer,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.atom.name()
    }

    /// Current version; bumped by one on every effective write.
    pub fn version(&self) -> u64 {
        self.inner.atom.version()
    }

    /// Number of derivations currently subscribed.
    pub fn observer_count(&self) -> usize {
        self.inner.atom.observer_count()
    }

    /// Names of the derivations currently observing this cell.
    pub fn observer_tree(&self) -> ObserverTree {
        ObserverTree {
            name: self.name().to_string(),
            observers: self.inner.atom.observer_names(),
        }
    }

    pub fn comparer(&self) -> &Comparer<T> {
        &self.inner.comparer
    }

    /// Get the current value, recording a dependency if called inside a
    /// tracking context.
    pub fn get(&self) -> T {
        self.report_observed();
        self.inner.value.read().clone()
    }

    /// Pass the current value to `f`, recording a dependency like [`get`].
    ///
    /// `f` sees a snapshot taken before it runs, so it may write to this
    /// cell.
    ///
    /// [`get`]: ObservableValue::get
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.report_observed();
        let current = self.inner.value.read().clone();
        f(&current)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value. Returns whether the value changed.
    ///
    /// Writing from inside a computed value is rejected; the error is logged
    /// and the write skipped. Use [`try_set`] to handle it.
    ///
    /// [`try_set`]: ObservableValue::try_set
    pub fn set(&self, value: T) -> bool {
        match self.try_set(value) {
            Ok(changed) => changed,
            Err(error) => {
                tracing::error!(observable = %self.name(), %error, "write rejected");
                false
            }
        }
    }

    /// Set a new value, reporting misuse as an error.
    pub fn try_set(&self, value: T) -> Result<bool> {
        check_write_allowed(&self.inner.atom)?;

        // Compare outside the lock: comparers may read other observables.
        let current = self.inner.value.read().clone();
        if self.inner.comparer.equals(&current, &value) {
            return Ok(false);
        }

        *self.inner.value.write() = value;
        self.inner.atom.report_changed();
        Ok(true)
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let current = self.inner.value.read().clone();
        self.set(f(&current))
    }

    fn report_observed(&self) {
        atom::report_observed(self.inner.clone());
    }

    /// Notify observers without a write, for owners that retire the cell.
    pub(crate) fn report_changed(&self) {
        self.inner.atom.report_changed();
    }
}

/// Reject writes from inside computed values and report writes outside
/// actions when actions are enforced.
pub(crate) fn check_write_allowed(atom: &Atom) -> Result<()> {
    if ReactiveContext::current_kind() == Some(FrameKind::Computed) {
        return Err(ReactiveError::Misuse(MisuseError::StateChangeInComputed {
            observable: atom.name().to_string(),
        }));
    }

    if current_action().is_none() {
        let report = match with_configuration(|config| config.enforce_actions) {
            EnforceActions::Never => false,
            EnforceActions::Observed => atom.is_observed(),
            EnforceActions::Always => true,
        };
        if report {
            diagnostics::report(Diagnostic::EnforceActions {
                observable: atom.name().to_string(),
            });
        }
    }
    Ok(())
}

impl<T> Clone for ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Handles are equal when they point at the same cell.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Debug for ObservableValue<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableValue")
            .field("name", &self.name())
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
