//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that observable values, computed values, actions and
//! reactions work together correctly.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use vigil_core::reactive::{
    autorun, reaction, run_in_action, untracked, Computed, ObservableValue, ReactionOptions,
    ReactiveContext, Runtime,
};
use vigil_core::value::{plain_map, Value};

fn counter() -> Arc<AtomicI32> {
    Arc::new(AtomicI32::new(0))
}

/// A computed value recomputes exactly once after its source changes.
#[test]
fn doubled_counter_recomputes_once() {
    let counter = ObservableValue::new(0);
    let doubled = {
        let counter = counter.clone();
        Computed::new(move || counter.get() * 2)
    };

    assert_eq!(doubled.get(), 0);
    assert_eq!(doubled.compute_count(), 1);

    counter.set(5);
    assert_eq!(doubled.get(), 10);
    assert_eq!(doubled.compute_count(), 2);
}

/// An observed computed value is cached between reads.
#[test]
fn observed_computed_is_memoized() {
    let counter = ObservableValue::new(1);
    let doubled = {
        let counter = counter.clone();
        Computed::new(move || counter.get() * 2)
    };
    let _observer = {
        let doubled = doubled.clone();
        autorun(move |_| {
            doubled.get();
        })
    };
    assert_eq!(doubled.compute_count(), 1);

    for _ in 0..5 {
        assert_eq!(doubled.get(), 2);
    }
    assert_eq!(doubled.compute_count(), 1);

    counter.set(2);
    for _ in 0..5 {
        assert_eq!(doubled.get(), 4);
    }
    assert_eq!(doubled.compute_count(), 2);
}

/// A structural computed that produces an equal record does not rerun its
/// reactions.
#[test]
fn structural_point_suppresses_reaction() {
    let x = ObservableValue::new(1i64);
    let unrelated = ObservableValue::new(0i64);
    let point = {
        let (x, unrelated) = (x.clone(), unrelated.clone());
        Computed::structural(move || {
            unrelated.get();
            plain_map([("x", x.get())])
        })
    };

    let runs = counter();
    let _view = {
        let (point, runs) = (point.clone(), runs.clone());
        autorun(move |_| {
            point.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    unrelated.set(1);
    assert_eq!(point.compute_count(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    x.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Writes in nested actions are seen together after the outer action.
#[test]
fn nested_actions_flush_once() {
    let a = ObservableValue::new(0);
    let b = ObservableValue::new(0);
    let runs = counter();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let _sum = {
        let (a, b, runs, seen) = (a.clone(), b.clone(), runs.clone(), seen.clone());
        autorun(move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            seen.lock().push((a.get(), b.get()));
        })
    };

    run_in_action("outer", || {
        run_in_action("inner", || {
            a.set(1);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        b.set(2);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec![(0, 0), (1, 2)]);
}

/// Reads inside `untracked` do not become dependencies.
#[test]
fn untracked_reads_are_not_dependencies() {
    let tracked = ObservableValue::new(1);
    let ignored = ObservableValue::new(10);
    let sum = {
        let (tracked, ignored) = (tracked.clone(), ignored.clone());
        Computed::new(move || tracked.get() + untracked(|| ignored.get()))
    };
    let _observer = {
        let sum = sum.clone();
        autorun(move |_| {
            sum.get();
        })
    };

    assert_eq!(sum.get(), 11);
    assert_eq!(ignored.observer_count(), 0);

    ignored.set(20);
    assert_eq!(sum.compute_count(), 1);
    assert_eq!(sum.get(), 11);

    tracked.set(2);
    assert_eq!(sum.get(), 22);
}

/// A computed that stops reading a value is unsubscribed from it.
#[test]
fn dropped_branch_is_unsubscribed() {
    let use_left = ObservableValue::new(true);
    let left = ObservableValue::new("left");
    let right = ObservableValue::new("right");
    let side = {
        let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
        Computed::new(move || if use_left.get() { left.get() } else { right.get() })
    };
    let _observer = {
        let side = side.clone();
        autorun(move |_| {
            side.get();
        })
    };

    assert_eq!(left.observer_count(), 1);
    assert_eq!(right.observer_count(), 0);

    use_left.set(false);
    assert_eq!(side.get(), "right");
    assert_eq!(left.observer_count(), 0);
    assert_eq!(right.observer_count(), 1);

    let before = side.compute_count();
    left.set("changed");
    assert_eq!(side.compute_count(), before);
}

/// A diamond recomputes its bottom once per change.
#[test]
fn diamond_recomputes_once() {
    let source = ObservableValue::new(1);
    let left = {
        let source = source.clone();
        Computed::new(move || source.get() + 1)
    };
    let right = {
        let source = source.clone();
        Computed::new(move || source.get() * 10)
    };
    let bottom = {
        let (left, right) = (left.clone(), right.clone());
        Computed::new(move || left.get() + right.get())
    };

    let runs = counter();
    let _view = {
        let (bottom, runs) = (bottom.clone(), runs.clone());
        autorun(move |_| {
            bottom.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    source.set(2);
    assert_eq!(bottom.get(), 23);
    assert_eq!(bottom.compute_count(), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A reaction sees the previous and new value of its expression.
#[test]
fn reaction_reports_old_and_new() {
    let temperature = ObservableValue::new(20);
    let changes = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let _watch = {
        let (temperature, changes) = (temperature.clone(), changes.clone());
        reaction(
            move || temperature.get(),
            move |new, old| changes.lock().push((*new, old.copied())),
            ReactionOptions::default(),
        )
    };

    temperature.set(21);
    temperature.set(21);
    temperature.set(25);
    assert_eq!(*changes.lock(), vec![(21, Some(20)), (25, Some(21))]);
}

/// A panic inside an action leaves no open batch or tracking frame.
#[test]
fn panic_in_action_unwinds_cleanly() {
    let value = ObservableValue::new(0);
    let runs = counter();
    let _view = {
        let (value, runs) = (value.clone(), runs.clone());
        autorun(move |_| {
            value.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_in_action("explode", || {
            value.set(1);
            panic!("boom");
        })
    }));
    assert!(result.is_err());
    assert!(!Runtime::in_batch());
    assert!(!ReactiveContext::is_active());

    // The queued run is picked up by the next flush.
    value.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(Runtime::pending_reactions(), 0);
}

/// A panic inside a computed propagates to the reader and the computed
/// recovers on the next read.
#[test]
fn panic_in_computed_propagates() {
    let fail = ObservableValue::new(true);
    let checked = {
        let fail = fail.clone();
        Computed::new(move || {
            if fail.get() {
                panic!("invalid state");
            }
            Value::from("ok")
        })
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| checked.get()));
    assert!(result.is_err());
    assert!(!ReactiveContext::is_active());
    assert!(!checked.is_computing());

    fail.set(false);
    assert_eq!(checked.get(), Value::from("ok"));
}

/// A host scheduler decides when queued reactions run.
#[test]
fn custom_scheduler_defers_reactions() {
    let queued: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let queued = queued.clone();
        Runtime::set_reaction_scheduler(move |flush| queued.borrow_mut().push(flush));
    }

    let value = ObservableValue::new(0);
    let seen = Arc::new(AtomicI32::new(-1));
    let _view = {
        let (value, seen) = (value.clone(), seen.clone());
        autorun(move |_| seen.store(value.get(), Ordering::SeqCst))
    };
    assert_eq!(seen.load(Ordering::SeqCst), -1);

    let flushes: Vec<_> = queued.borrow_mut().drain(..).collect();
    for flush in flushes {
        flush();
    }
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    value.set(3);
    value.set(4);
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    let flushes: Vec<_> = queued.borrow_mut().drain(..).collect();
    for flush in flushes {
        flush();
    }
    assert_eq!(seen.load(Ordering::SeqCst), 4);

    Runtime::reset_reaction_scheduler();
}
