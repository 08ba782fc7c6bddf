//! Reactive Runtime
//!
//! The runtime owns the per-thread batching state and the queue of
//! reactions waiting to run.
//!
//! # How It Works
//!
//! 1. Writes happen inside a batch. A write outside any batch opens an
//!    implicit one around itself.
//!
//! 2. When an observable changes, its observers are marked stale. Computed
//!    values propagate the mark to their own observers; reactions enqueue
//!    themselves here.
//!
//! 3. When the outermost batch closes, the queue is flushed:
//!    a. The queue is drained in discovery order
//!    b. Each reaction checks whether a dependency really changed
//!    c. Reactions that did run may enqueue more work, handled by the
//!       next pass
//!    d. Too many passes aborts the flush as divergent
//!
//! # Thread Safety
//!
//! All of this state is thread-local. A host may install a scheduler with
//! [`Runtime::set_reaction_scheduler`] to decide when a flush actually runs;
//! the runtime only guarantees ordering and coalescing.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::reaction::ReactionInner;
use super::subscriber::SubscriberId;
use crate::config::with_configuration;
use crate::diagnostics::{self, Diagnostic};

/// Receives the flush routine and decides when to call it.
pub type ReactionScheduler = Rc<dyn Fn(Box<dyn FnOnce()>)>;

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<IndexMap<SubscriberId, Weak<ReactionInner>>> = RefCell::new(IndexMap::new());
    static SCHEDULER: RefCell<Option<ReactionScheduler>> = const { RefCell::new(None) };
}

/// Per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Run `f` inside a batch. Reactions triggered by writes in `f` run once
    /// the outermost batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::new();
        f()
    }

    /// Number of batches currently open on this thread.
    pub fn batch_depth() -> usize {
        BATCH_DEPTH.with(Cell::get)
    }

    pub fn in_batch() -> bool {
        Self::batch_depth() > 0
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads are currently being collected.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }

    /// Number of reactions waiting for a flush.
    pub fn pending_reactions() -> usize {
        PENDING.with(|pending| pending.borrow().len())
    }

    /// Install a scheduler that decides when queued reactions run.
    pub fn set_reaction_scheduler<F>(scheduler: F)
    where
        F: Fn(Box<dyn FnOnce()>) + 'static,
    {
        SCHEDULER.with(|slot| *slot.borrow_mut() = Some(Rc::new(scheduler)));
    }

    /// Go back to running reactions as soon as the outermost batch closes.
    pub fn reset_reaction_scheduler() {
        SCHEDULER.with(|slot| *slot.borrow_mut() = None);
    }

    /// Queue a reaction. Repeated calls before the next pass coalesce.
    pub(crate) fn enqueue(reaction: &Arc<ReactionInner>) {
        PENDING.with(|pending| {
            pending
                .borrow_mut()
                .entry(reaction.id())
                .or_insert_with(|| Arc::downgrade(reaction));
        });
    }

    /// Flush queued reactions unless a batch is still open.
    pub fn flush() {
        if Self::in_batch() || FLUSHING.with(Cell::get) {
            return;
        }
        if Self::pending_reactions() == 0 {
            return;
        }

        let scheduler = SCHEDULER.with(|slot| slot.borrow().clone());
        match scheduler {
            Some(scheduler) => scheduler(Box::new(Self::run_reactions)),
            None => Self::run_reactions(),
        }
    }

    fn run_reactions() {
        if FLUSHING.with(Cell::get) {
            return;
        }
        let _flushing = FlushGuard::enter();
        let max_iterations = with_configuration(|config| config.max_reaction_iterations);
        let mut iterations = 0;

        loop {
            let pass: Vec<Arc<ReactionInner>> = PENDING
                .with(|pending| std::mem::take(&mut *pending.borrow_mut()))
                .into_values()
                .filter_map(|weak| weak.upgrade())
                .collect();
            if pass.is_empty() {
                break;
            }

            iterations += 1;
            if iterations > max_iterations {
                let reactions = pass.iter().map(|reaction| reaction.name()).collect();
                for reaction in &pass {
                    reaction.abandon();
                }
                diagnostics::report(Diagnostic::ReactionDiverged {
                    iterations: max_iterations,
                    reactions,
                });
                break;
            }

            tracing::debug!(pass = iterations, reactions = pass.len(), "flushing reactions");
            for reaction in &pass {
                reaction.mark_scheduled();
            }
            let mut pass = PassGuard {
                remaining: pass.into_iter().rev().collect(),
            };
            while let Some(reaction) = pass.remaining.pop() {
                reaction.run_scheduled();
            }
        }
    }
}

/// Keeps a batch open for as long as it lives.
///
/// Closing the outermost batch flushes pending reactions, except while
/// unwinding: then they stay queued for the next flush.
pub struct BatchGuard {
    _not_send: PhantomData<*const ()>,
}

impl BatchGuard {
    pub fn new() -> Self {
        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for BatchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let remaining = BATCH_DEPTH.with(|depth| {
            let remaining = depth.get().saturating_sub(1);
            depth.set(remaining);
            remaining
        });

        if remaining == 0 && !std::thread::panicking() {
            Runtime::flush();
        }
    }
}

struct FlushGuard;

impl FlushGuard {
    fn enter() -> Self {
        FLUSHING.with(|flushing| flushing.set(true));
        Self
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}

/// Reactions left in a pass when a reaction panics go back to idle.
struct PassGuard {
    remaining: Vec<Arc<ReactionInner>>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        for reaction in self.remaining.drain(..) {
            reaction.abandon();
        }
    }
}
