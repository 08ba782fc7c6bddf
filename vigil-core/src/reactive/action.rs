//! Actions
//!
//! An action is a mutation boundary. It opens a batch so that every write
//! inside it produces at most one notification pass, and it suspends
//! tracking so that reads inside it never become dependencies of an
//! enclosing derivation.
//!
//! Actions nest. Only the outermost one flushes, and it does so whether the
//! body returned normally or not (except while unwinding, where pending
//! reactions are left for the next flush).

use std::cell::RefCell;
use std::sync::Arc;

use super::context::{FrameKind, ReactiveContext};
use super::runtime::BatchGuard;
use crate::diagnostics::{self, Diagnostic};

thread_local! {
    static ACTION_STACK: RefCell<Vec<Arc<str>>> = const { RefCell::new(Vec::new()) };
}

/// Name of the innermost running action, if any.
pub fn current_action() -> Option<Arc<str>> {
    ACTION_STACK.with(|stack| stack.borrow().last().cloned())
}

struct ActionScope;

impl ActionScope {
    fn enter(name: &str) -> Self {
        ACTION_STACK.with(|stack| stack.borrow_mut().push(Arc::from(name)));
        Self
    }
}

impl Drop for ActionScope {
    fn drop(&mut self) {
        ACTION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` as an action.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{run_in_action, ObservableValue};
///
/// let a = ObservableValue::new(0);
/// let b = ObservableValue::new(0);
/// run_in_action("move", || {
///     a.set(1);
///     b.set(2);
/// });
/// ```
pub fn run_in_action<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let _span = tracing::trace_span!("action", action = name).entered();
    // Dropped in reverse: scope, untracked frame, then the batch flushes.
    let _batch = BatchGuard::new();
    let _untracked = ReactiveContext::untracked();
    let _scope = ActionScope::enter(name);
    f()
}

/// Run `f` in a batch without suspending tracking.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    super::runtime::Runtime::batch(f)
}

/// Run `f` without recording any dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = ReactiveContext::untracked();
    f()
}

/// A named closure whose every call runs as an action.
pub struct Action<F> {
    name: Arc<str>,
    f: F,
}

impl<F> Action<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: Arc::from(name.into()),
            f,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        run_in_action(&self.name, || (self.f)(args))
    }
}

impl<F> std::fmt::Debug for Action<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

/// Wrap `f` so that every call runs as an action named `name`.
///
/// ```rust
/// use vigil_core::reactive::{action, ObservableValue};
///
/// let count = ObservableValue::new(0);
/// let add = {
///     let count = count.clone();
///     action("add", move |by: i32| count.update(|c| c + by))
/// };
/// add(2);
/// add(3);
/// assert_eq!(count.get(), 5);
/// ```
pub fn action<A, R, F>(name: impl Into<String>, f: F) -> impl Fn(A) -> R
where
    F: Fn(A) -> R,
{
    let action = Action::new(name, f);
    move |args| action.call(args)
}

/// How an auto action call was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoActionMode {
    /// Called while a computed value was deriving: ran as a tracked read.
    Derivation,
    /// Ran as an action.
    Action,
}

/// Decide how an auto action named `name` should run right now.
///
/// A call from a computed value is a read; a call with no tracking context
/// is a mutation. A call from a reaction could be either; it runs as an
/// action and a [`Diagnostic::StructuralAmbiguityWarning`] is reported.
pub fn auto_action_mode(name: &str) -> AutoActionMode {
    match ReactiveContext::current_kind() {
        Some(FrameKind::Computed) => AutoActionMode::Derivation,
        Some(FrameKind::Reaction) => {
            let reaction = ReactiveContext::current_name()
                .map(|name| name.to_string())
                .unwrap_or_default();
            diagnostics::report(Diagnostic::StructuralAmbiguityWarning {
                action: name.to_string(),
                reaction,
            });
            AutoActionMode::Action
        }
        Some(FrameKind::Untracked) | None => AutoActionMode::Action,
    }
}

/// Run `f` as an auto action: a tracked read inside a computed value, an
/// action everywhere else.
pub fn run_auto_action<R>(name: &str, f: impl FnOnce() -> R) -> R {
    match auto_action_mode(name) {
        AutoActionMode::Derivation => f(),
        AutoActionMode::Action => run_in_action(name, f),
    }
}

/// Wrap `f` as an auto action.
pub fn auto_action<A, R, F>(name: impl Into<String>, f: F) -> impl Fn(A) -> R
where
    F: Fn(A) -> R,
{
    let name = name.into();
    move |args| run_auto_action(&name, || f(args))
}
