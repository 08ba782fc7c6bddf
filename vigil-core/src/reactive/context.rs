//! Tracking Context
//!
//! The tracking context records which derivation is currently running so
//! that reads can be attributed to it automatically.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a computed value or a
//! reaction pushes a tracking frame; actions and [`untracked`] push an
//! untracked frame that shadows whatever is below it. Only the top frame
//! collects reads, and only if it is a tracking frame.
//!
//! Frames are popped by the guard returned from [`ReactiveContext::enter`],
//! so the stack unwinds correctly even if the computation panics.
//!
//! [`untracked`]: crate::reactive::untracked

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::atom::Dependency;
use super::subscriber::{AtomId, SubscriberId};

/// Dependencies collected by one tracked run.
pub(crate) type Dependencies = SmallVec<[Dependency; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// What kind of computation owns a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A computed value is deriving its result.
    Computed,
    /// A reaction is tracking its dependencies.
    Reaction,
    /// Reads are not collected (actions, `untracked`).
    Untracked,
}

impl FrameKind {
    fn collects(self) -> bool {
        !matches!(self, FrameKind::Untracked)
    }
}

/// An entry in the context stack.
struct ContextEntry {
    subscriber_id: Option<SubscriberId>,
    name: Option<Arc<str>>,
    kind: FrameKind,
    /// Reads in first-seen order. The first version seen for an atom wins,
    /// so a write between two reads is still detected as a change.
    dependencies: IndexMap<AtomId, Dependency>,
}

/// Guard that pops its frame when dropped or finished.
pub struct ReactiveContext {
    depth: usize,
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a tracking frame for `subscriber_id`.
    pub(crate) fn enter(subscriber_id: SubscriberId, kind: FrameKind, name: Arc<str>) -> Self {
        Self::push(Some(subscriber_id), kind, Some(name))
    }

    /// Enter a frame that suspends tracking for everything run inside it.
    pub fn untracked() -> Self {
        Self::push(None, FrameKind::Untracked, None)
    }

    fn push(subscriber_id: Option<SubscriberId>, kind: FrameKind, name: Option<Arc<str>>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                subscriber_id,
                name,
                kind,
                dependencies: IndexMap::new(),
            });
            stack.len()
        });

        Self {
            depth,
            subscriber_id,
            finished: false,
        }
    }

    /// Check if there is any frame on the stack.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Check if the top frame collects reads.
    pub fn is_tracking() -> bool {
        Self::current_kind().is_some_and(FrameKind::collects)
    }

    /// Kind of the top frame, if any.
    pub fn current_kind() -> Option<FrameKind> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.kind))
    }

    /// The derivation whose reads are currently being collected.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|entry| entry.kind.collects())
                .and_then(|entry| entry.subscriber_id)
        })
    }

    /// Debug name of the derivation whose reads are being collected.
    pub fn current_name() -> Option<Arc<str>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|entry| entry.kind.collects())
                .and_then(|entry| entry.name.clone())
        })
    }

    /// Number of frames on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a dependency in the top frame. Returns false if the top frame
    /// does not collect reads.
    pub(crate) fn track(dependency: Dependency) -> bool {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(entry) if entry.kind.collects() => {
                    entry
                        .dependencies
                        .entry(dependency.atom_id())
                        .or_insert(dependency);
                    true
                }
                _ => false,
            }
        })
    }

    /// Pop this frame and return the dependencies it collected.
    pub(crate) fn finish(mut self) -> Dependencies {
        self.finished = true;
        match self.pop() {
            Some(entry) => entry.dependencies.into_values().collect(),
            None => Dependencies::new(),
        }
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext popped out of order"
            );
            stack.pop()
        });

        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, entry.subscriber_id
            );
        }
        popped
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            // Dependencies are dropped after the stack borrow is released.
            let popped = self.pop();
            drop(popped);
        }
    }
}
