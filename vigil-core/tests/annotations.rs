//! Integration Tests for the Annotation Layer
//!
//! These tests build observable objects from plain targets and check that
//! their members behave like the reactive primitives behind them.
//!
//! Annotation signatures are remembered per class for the whole process, so
//! every test uses its own class names.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use vigil_core::annotation::{
    extend_observable, make_auto_observable, make_observable, observable, Annotation,
    AnnotationMap, ObservableOptions, Target,
};
use vigil_core::diagnostics::{take_diagnostics, Diagnostic};
use vigil_core::reactive::{autorun, autorun_named};
use vigil_core::value::{plain_map, Shape, Value};
use vigil_core::{MisuseError, ReactiveError};

fn int(value: Value) -> i64 {
    value.as_int().unwrap_or_default()
}

fn counter_target(class: &str) -> Target {
    Target::new(class)
        .field("count", 0)
        .field("label", "counter")
        .getter("double", |this| {
            Value::from(int(this.get("count").unwrap()) * 2)
        })
        .method("increment", |this, _| {
            let next = int(this.get("count").unwrap()) + 1;
            this.set("count", next).unwrap();
            Value::from(next)
        })
        .method("add_twice", |this, args| {
            let step = args.first().cloned().map(int).unwrap_or(1);
            for _ in 0..2 {
                let next = int(this.get("count").unwrap()) + step;
                this.set("count", next).unwrap();
            }
            Value::Null
        })
}

/// Only the listed members of `make_observable` become reactive.
#[test]
fn make_observable_applies_listed_annotations() {
    let annotations = AnnotationMap::new()
        .with("count", Annotation::Observable)
        .with("double", Annotation::Computed)
        .with("increment", Annotation::Action);
    let store = make_observable(
        counter_target("ListedCounter"),
        &annotations,
        ObservableOptions::named("listed"),
    )
    .unwrap();

    assert_eq!(store.name(), "listed");
    assert_eq!(store.annotation("label"), None);
    assert_eq!(store.annotation("add_twice"), None);

    let seen = Arc::new(AtomicI32::new(-1));
    let _view = {
        let (store, seen) = (store.clone(), seen.clone());
        autorun(move |_| {
            let double = int(store.get("double").unwrap());
            seen.store(double as i32, Ordering::SeqCst);
        })
    };
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    assert_eq!(store.call("increment", &[]).unwrap(), Value::from(1));
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    let computed = store.computed("double").unwrap();
    assert_eq!(computed.name(), "listed.double");
    assert_eq!(computed.compute_count(), 2);
}

/// An action method with several writes runs its reactions once.
#[test]
fn action_method_batches_writes() {
    let annotations = AnnotationMap::new()
        .with("count", Annotation::Observable)
        .with("add_twice", Annotation::Action);
    let store = make_observable(
        counter_target("BatchedCounter"),
        &annotations,
        ObservableOptions::default(),
    )
    .unwrap();

    let runs = Arc::new(AtomicI32::new(0));
    let _view = {
        let (store, runs) = (store.clone(), runs.clone());
        autorun(move |_| {
            store.get("count").unwrap();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    store.call("add_twice", &[Value::from(5)]).unwrap();
    assert_eq!(int(store.get("count").unwrap()), 10);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Annotations inferred by `make_auto_observable` follow member kinds, and
/// overrides win.
#[test]
fn auto_observable_infers_and_overrides() {
    let overrides = AnnotationMap::from_json(r#"{ "label": false, "double": "computed.struct" }"#)
        .unwrap();
    let store = make_auto_observable(
        counter_target("AutoCounter"),
        &overrides,
        ObservableOptions::default(),
    )
    .unwrap();

    assert_eq!(store.annotation("count"), Some(Annotation::Observable));
    assert_eq!(store.annotation("label"), None);
    assert_eq!(store.annotation("double"), Some(Annotation::ComputedStruct));
    assert_eq!(store.annotation("increment"), Some(Annotation::AutoAction));
    assert_eq!(store.keys(), vec!["count", "label", "double", "increment", "add_twice"]);
}

/// `autoBind` turns inferred methods into bound actions.
#[test]
fn bound_actions_keep_their_object() {
    let options = ObservableOptions::from_json(r#"{ "autoBind": true }"#).unwrap();
    let store =
        make_auto_observable(counter_target("BoundCounter"), &AnnotationMap::new(), options)
            .unwrap();
    assert_eq!(store.annotation("increment"), Some(Annotation::ActionBound));

    let increment = store.bound_action("increment").unwrap();
    increment.call(&[]);
    increment.call(&[]);
    assert_eq!(int(store.get("count").unwrap()), 2);
    assert!(increment.name().ends_with(".increment"));
}

/// An unbound action runs against whichever object it is handed.
#[test]
fn unbound_action_takes_receiver() {
    let first = observable(
        counter_target("Unbound"),
        &AnnotationMap::new(),
        ObservableOptions::default(),
    )
    .unwrap();
    let second = observable(
        counter_target("Unbound"),
        &AnnotationMap::new(),
        ObservableOptions::default(),
    )
    .unwrap();

    let increment = first.unbound_action("increment").unwrap();
    assert_eq!(increment.member(), "increment");
    increment.call(&second, &[]);
    increment.call(&second, &[]);

    assert_eq!(int(first.get("count").unwrap()), 0);
    assert_eq!(int(second.get("count").unwrap()), 2);
}

/// Members added with `extend_observable` are picked up by observers of
/// the object's keys.
#[test]
fn extension_notifies_key_observers() {
    let store = observable(
        Target::new("Extensible").field("a", 1),
        &AnnotationMap::new(),
        ObservableOptions::default(),
    )
    .unwrap();

    let key_counts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let _view = {
        let (store, key_counts) = (store.clone(), key_counts.clone());
        autorun(move |_| key_counts.lock().push(store.keys().len()))
    };

    extend_observable(
        &store,
        Target::new("Extensible")
            .field("b", 2)
            .getter("sum", |this| {
                Value::from(int(this.get("a").unwrap()) + int(this.get("b").unwrap()))
            }),
        &AnnotationMap::new(),
    )
    .unwrap();

    assert_eq!(*key_counts.lock(), vec![1, 3]);
    assert!(store.has("sum"));
    assert_eq!(store.annotation("sum"), Some(Annotation::Computed));
    assert_eq!(int(store.get("sum").unwrap()), 3);
}

/// Deep observables wrap nested plain containers; snapshots give back
/// equal plain data and do not follow later changes.
#[test]
fn deep_fields_and_snapshots() {
    let store = observable(
        Target::new("Profile")
            .field("name", "ada")
            .field("tags", vec!["math", "engines"])
            .field("address", plain_map([("city", "london")])),
        &AnnotationMap::new().with("address", Annotation::ObservableRef),
        ObservableOptions::default(),
    )
    .unwrap();

    let tags = store.get("tags").unwrap();
    assert_eq!(tags.shape(), Shape::ObservableContainer);
    assert_eq!(store.get("address").unwrap().shape(), Shape::PlainContainer);

    let snapshot = store.to_plain_deep();
    assert_eq!(
        snapshot,
        plain_map([
            ("name", Value::from("ada")),
            ("tags", Value::from(vec!["math", "engines"])),
            ("address", plain_map([("city", "london")])),
        ])
    );

    tags.as_list().unwrap().push(Value::from("poetry"));
    assert_eq!(tags.as_list().unwrap().len(), 3);
    match &snapshot {
        Value::Map(fields) => assert_eq!(fields["tags"], Value::from(vec!["math", "engines"])),
        other => panic!("expected a map, got {other:?}"),
    }

    let shallow = store.to_plain_shallow();
    match &shallow {
        Value::Map(fields) => assert_eq!(fields["tags"].shape(), Shape::ObservableContainer),
        other => panic!("expected a map, got {other:?}"),
    }
}

/// Misused members fail with the matching error.
#[test]
fn member_misuse_is_reported() {
    let store = make_auto_observable(
        counter_target("MisusedCounter"),
        &AnnotationMap::new(),
        ObservableOptions::named("misused"),
    )
    .unwrap();

    assert_eq!(
        store.set("double", 4).unwrap_err(),
        ReactiveError::Misuse(MisuseError::ReadOnly {
            object: "misused".into(),
            member: "double".into(),
        })
    );
    assert!(matches!(
        store.get("increment"),
        Err(ReactiveError::Misuse(MisuseError::NotReadable { .. }))
    ));
    assert!(matches!(
        store.call("count", &[]),
        Err(ReactiveError::Misuse(MisuseError::NotCallable { .. }))
    ));
    assert!(matches!(
        store.bound_action("increment"),
        Err(ReactiveError::Misuse(MisuseError::NotBound { .. }))
    ));
    assert_eq!(
        store.get("missing").unwrap_err(),
        ReactiveError::UnknownMember {
            object: "misused".into(),
            member: "missing".into(),
        }
    );
}

/// Annotating a missing member or re-annotating a class differently fails
/// fast.
#[test]
fn annotation_misuse_fails_fast() {
    let missing = make_observable(
        counter_target("TypoCounter"),
        &AnnotationMap::new().with("cuont", Annotation::Observable),
        ObservableOptions::default(),
    );
    assert!(matches!(missing, Err(MisuseError::MissingMember { .. })));

    make_auto_observable(
        counter_target("ShiftingCounter"),
        &AnnotationMap::new(),
        ObservableOptions::default(),
    )
    .unwrap();
    let shifted = make_auto_observable(
        counter_target("ShiftingCounter"),
        &AnnotationMap::new().with("count", Annotation::ObservableShallow),
        ObservableOptions::default(),
    );
    assert_eq!(
        shifted.unwrap_err(),
        MisuseError::InconsistentAnnotations {
            class: "ShiftingCounter".into(),
            detail: "'count' was 'observable', now 'observable.shallow'".into(),
        }
    );
}

/// A getter may not write state; the write is rejected and nothing changes.
#[test]
fn computed_members_cannot_write() {
    let store = make_auto_observable(
        Target::new("SneakyWriter")
            .field("x", 1)
            .getter("sneaky", |this| Value::from(this.set("x", 5).is_err())),
        &AnnotationMap::new(),
        ObservableOptions::default(),
    )
    .unwrap();

    assert_eq!(store.get("sneaky").unwrap(), Value::from(true));
    assert_eq!(int(store.get("x").unwrap()), 1);
}

/// An auto action is a tracked read inside a computed, and an action with a
/// warning when called from a reaction.
#[test]
fn auto_action_follows_calling_context() {
    let store = make_auto_observable(
        Target::new("Describer")
            .field("x", 1)
            .field("log", 0)
            .method("describe", |this, _| {
                Value::from(format!("x={}", int(this.get("x").unwrap())))
            })
            .method("note", |this, _| {
                let next = int(this.get("log").unwrap()) + 1;
                this.set("log", next).unwrap();
                Value::Null
            })
            .getter("summary", |this| this.call("describe", &[]).unwrap()),
        &AnnotationMap::new(),
        ObservableOptions::named("describer"),
    )
    .unwrap();
    take_diagnostics();

    let summaries = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let _view = {
        let (store, summaries) = (store.clone(), summaries.clone());
        autorun_named("summary-view", move |_| {
            summaries.lock().push(store.get("summary").unwrap());
        })
    };
    store.set("x", 2).unwrap();
    assert_eq!(
        *summaries.lock(),
        vec![Value::from("x=1"), Value::from("x=2")]
    );
    assert!(take_diagnostics().is_empty());

    let _noter = {
        let store = store.clone();
        autorun_named("noter", move |_| {
            store.call("note", &[]).unwrap();
        })
    };
    assert_eq!(int(store.get("log").unwrap()), 1);
    assert_eq!(
        take_diagnostics(),
        vec![Diagnostic::StructuralAmbiguityWarning {
            action: "describer.note".into(),
            reaction: "noter".into(),
        }]
    );
}
