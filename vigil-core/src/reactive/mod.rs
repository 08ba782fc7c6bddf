//! Reactive Primitives
//!
//! This module implements the core reactive system: observable values,
//! computed values, actions and reactions.
//!
//! # Concepts
//!
//! ## Observable Values
//!
//! An [`ObservableValue`] is a container for mutable state. When its value is
//! read within a tracking context (a computed value or a reaction), the read
//! is recorded as a dependency. When the value changes, every dependent is
//! notified.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed, and only when read.
//!
//! ## Actions
//!
//! An action is a mutation boundary. Writes inside one action are seen by
//! reactions as a single update, after the outermost action closes.
//!
//! ## Reactions
//!
//! A [`Reaction`] is a side-effecting computation that re-runs when its
//! dependencies change. [`autorun`], [`reaction`] and [`when`] build the
//! common shapes.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically through a thread-local stack of
//! tracking frames (see [`ReactiveContext`]). Batching and the reaction
//! queue are thread-local too (see [`Runtime`]).

mod action;
pub(crate) mod atom;
mod comparer;
mod computed;
mod context;
mod observable;
mod reaction;
mod runtime;
mod subscriber;

pub use action::{
    action, auto_action, auto_action_mode, batch, current_action, run_auto_action,
    run_in_action, untracked, Action, AutoActionMode,
};
pub use comparer::{Comparer, ComparerKind, StructuralEq};
pub use computed::{Computed, ComputedOptions, DerivationState};
pub use context::{FrameKind, ReactiveContext};
pub use observable::ObservableValue;
pub use reaction::{autorun, autorun_named, reaction, when, Reaction, ReactionOptions, ReactionPhase};
pub use runtime::{BatchGuard, ReactionScheduler, Runtime};
pub use subscriber::{AtomId, SubscriberId};

pub(crate) use observable::check_write_allowed;
