//! Objects produced by the annotation layer.
//!
//! An [`ObservableObject`] owns one slot per member. Annotated members are
//! backed by the reactive primitives; everything else stays plain and is
//! read and written without tracking.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::options::ObservableOptions;
use super::target::{Getter, Member, Method};
use super::Annotation;
use crate::error::{MisuseError, ReactiveError, Result};
use crate::reactive::{
    run_auto_action, run_in_action, Comparer, ComparerKind, Computed, ComputedOptions,
    ObservableValue,
};
use crate::value::{KeySet, Value};

#[derive(Clone)]
enum Slot {
    Plain(Value),
    PlainGetter(Getter),
    PlainMethod(Method),
    Observable {
        cell: ObservableValue<Value>,
        annotation: Annotation,
    },
    Computed {
        computed: Computed<Value>,
        annotation: Annotation,
    },
    Action {
        method: Method,
        annotation: Annotation,
    },
}

impl Slot {
    fn annotation(&self) -> Option<Annotation> {
        match self {
            Slot::Observable { annotation, .. }
            | Slot::Computed { annotation, .. }
            | Slot::Action { annotation, .. } => Some(*annotation),
            Slot::Plain(_) | Slot::PlainGetter(_) | Slot::PlainMethod(_) => None,
        }
    }
}

struct ObjectInner {
    class: String,
    /// Used again to infer members added later.
    options: ObservableOptions,
    keys: Arc<KeySet>,
    slots: RwLock<IndexMap<String, Slot>>,
}

/// A record whose annotated members are reactive.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Arc<ObjectInner>,
}

impl ObservableObject {
    pub(crate) fn empty(class: String, options: ObservableOptions) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                keys: KeySet::new(&class, options.name.clone()),
                class,
                options,
                slots: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Debug name; defaults to `Class@id`.
    pub fn name(&self) -> &str {
        self.inner.keys.name()
    }

    pub fn class(&self) -> &str {
        &self.inner.class
    }

    pub(crate) fn options(&self) -> &ObservableOptions {
        &self.inner.options
    }

    fn member_name(&self, member: &str) -> String {
        format!("{}.{}", self.name(), member)
    }

    /// Install `member` with an annotation already checked against its kind.
    pub(crate) fn install(&self, member: String, value: Member, annotation: Option<Annotation>) {
        let annotation = annotation.filter(|a| *a != Annotation::Exclude);
        let slot = match (value, annotation) {
            (Member::Field(value), Some(annotation)) if annotation.is_observable() => {
                let comparer = match annotation.comparer_kind() {
                    Some(ComparerKind::Structural) => Comparer::structural(),
                    _ => Comparer::default_eq(),
                };
                let value = annotation.enhancer().unwrap_or_default().apply(value);
                Slot::Observable {
                    cell: ObservableValue::named(self.member_name(&member), value, comparer),
                    annotation,
                }
            }
            (Member::Getter(getter), Some(annotation)) if annotation.is_computed() => {
                let comparer = match annotation.comparer_kind() {
                    Some(ComparerKind::Structural) => Comparer::structural(),
                    _ => Comparer::always(),
                };
                let object: Weak<ObjectInner> = Arc::downgrade(&self.inner);
                let computed = Computed::with_options(
                    move || match object.upgrade() {
                        Some(inner) => getter(&ObservableObject { inner }),
                        None => Value::Null,
                    },
                    ComputedOptions {
                        comparer,
                        name: Some(self.member_name(&member)),
                        ..ComputedOptions::default()
                    },
                );
                Slot::Computed {
                    computed,
                    annotation,
                }
            }
            (Member::Method(method), Some(annotation)) if annotation.is_action() => {
                Slot::Action { method, annotation }
            }
            (Member::Field(value), _) => Slot::Plain(value),
            (Member::Getter(getter), _) => Slot::PlainGetter(getter),
            (Member::Method(method), _) => Slot::PlainMethod(method),
        };
        self.inner.slots.write().insert(member, slot);
    }

    pub(crate) fn contains(&self, member: &str) -> bool {
        self.inner.slots.read().contains_key(member)
    }

    /// Tell key observers that members were added.
    pub(crate) fn keys_changed(&self) {
        self.inner.keys.changed();
    }

    fn slot(&self, member: &str) -> Result<Slot> {
        self.inner
            .slots
            .read()
            .get(member)
            .cloned()
            .ok_or_else(|| ReactiveError::UnknownMember {
                object: self.name().to_string(),
                member: member.to_string(),
            })
    }

    fn misuse(&self, member: &str, make: fn(String, String) -> MisuseError) -> ReactiveError {
        ReactiveError::Misuse(make(self.name().to_string(), member.to_string()))
    }

    /// Read a field or getter. Observable and computed members are tracked.
    pub fn get(&self, member: &str) -> Result<Value> {
        match self.slot(member)? {
            Slot::Plain(value) => Ok(value),
            Slot::Observable { cell, .. } => Ok(cell.get()),
            Slot::Computed { computed, .. } => computed.try_get(),
            Slot::PlainGetter(getter) => Ok(getter(self)),
            Slot::PlainMethod(_) | Slot::Action { .. } => Err(self.misuse(member, |object, member| {
                MisuseError::NotReadable { object, member }
            })),
        }
    }

    /// Write a field. Returns whether the value changed.
    pub fn set(&self, member: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        match self.slot(member)? {
            Slot::Observable { cell, annotation } => {
                let value = annotation.enhancer().unwrap_or_default().apply(value);
                cell.try_set(value)
            }
            Slot::Plain(current) => {
                if current == value {
                    return Ok(false);
                }
                self.inner
                    .slots
                    .write()
                    .insert(member.to_string(), Slot::Plain(value));
                Ok(true)
            }
            Slot::Computed { .. } | Slot::PlainGetter(_) | Slot::PlainMethod(_) | Slot::Action { .. } => {
                Err(self.misuse(member, |object, member| MisuseError::ReadOnly { object, member }))
            }
        }
    }

    /// Call a method. Action members run as actions; auto actions decide
    /// from the calling context.
    pub fn call(&self, member: &str, args: &[Value]) -> Result<Value> {
        match self.slot(member)? {
            Slot::Action { method, annotation } => {
                Ok(invoke(&self.member_name(member), &method, Some(annotation), self, args))
            }
            Slot::PlainMethod(method) => Ok(method(self, args)),
            _ => Err(self.misuse(member, |object, member| MisuseError::NotCallable {
                object,
                member,
            })),
        }
    }

    /// Whether the object has `member`. Tracked: reacts to members added
    /// later with `extend_observable`.
    pub fn has(&self, member: &str) -> bool {
        self.inner.keys.observe();
        self.contains(member)
    }

    /// Member names in declaration order. Tracked like [`has`](Self::has).
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys.observe();
        self.inner.slots.read().keys().cloned().collect()
    }

    /// The annotation applied to `member`, if any.
    pub fn annotation(&self, member: &str) -> Option<Annotation> {
        self.inner
            .slots
            .read()
            .get(member)
            .and_then(Slot::annotation)
    }

    /// The computed value behind a `computed` member.
    pub fn computed(&self, member: &str) -> Option<Computed<Value>> {
        match self.inner.slots.read().get(member) {
            Some(Slot::Computed { computed, .. }) => Some(computed.clone()),
            _ => None,
        }
    }

    /// An `action.bound` member, callable without its receiver.
    pub fn bound_action(&self, member: &str) -> Result<BoundAction> {
        match self.slot(member)? {
            Slot::Action {
                method,
                annotation: Annotation::ActionBound,
            } => Ok(BoundAction {
                name: self.member_name(member).into(),
                object: self.clone(),
                method,
            }),
            Slot::Action { .. } | Slot::PlainMethod(_) => {
                Err(self.misuse(member, |object, member| MisuseError::NotBound { object, member }))
            }
            _ => Err(self.misuse(member, |object, member| MisuseError::NotCallable {
                object,
                member,
            })),
        }
    }

    /// A method detached from this object; the receiver is supplied per
    /// call.
    pub fn unbound_action(&self, member: &str) -> Result<UnboundAction> {
        let (method, annotation) = match self.slot(member)? {
            Slot::Action { method, annotation } => (method, Some(annotation)),
            Slot::PlainMethod(method) => (method, None),
            _ => {
                return Err(self.misuse(member, |object, member| MisuseError::NotCallable {
                    object,
                    member,
                }))
            }
        };
        Ok(UnboundAction {
            member: member.into(),
            method,
            annotation,
        })
    }

    fn fields(&self) -> Vec<(String, Value)> {
        self.inner.keys.observe();
        let slots: Vec<(String, Slot)> = self
            .inner
            .slots
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        slots
            .into_iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Plain(value) => Some((name, value)),
                Slot::Observable { cell, .. } => Some((name, cell.get())),
                _ => None,
            })
            .collect()
    }

    /// Snapshot of the fields. Nested observable containers are kept.
    pub fn to_plain_shallow(&self) -> Value {
        Value::Map(self.fields().into_iter().collect())
    }

    /// Snapshot of the fields with every nested container made plain.
    pub fn to_plain_deep(&self) -> Value {
        Value::Map(
            self.fields()
                .into_iter()
                .map(|(name, value)| (name, value.to_plain_deep()))
                .collect(),
        )
    }
}

fn invoke(
    name: &str,
    method: &Method,
    annotation: Option<Annotation>,
    receiver: &ObservableObject,
    args: &[Value],
) -> Value {
    match annotation {
        Some(Annotation::AutoAction) => run_auto_action(name, || method(receiver, args)),
        Some(_) => run_in_action(name, || method(receiver, args)),
        None => method(receiver, args),
    }
}

impl PartialEq for ObservableObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<(String, Option<Annotation>)> = self
            .inner
            .slots
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.annotation()))
            .collect();
        f.debug_struct("ObservableObject")
            .field("name", &self.name())
            .field("members", &members)
            .finish()
    }
}

/// An action tied to the object it came from.
#[derive(Clone)]
pub struct BoundAction {
    name: Arc<str>,
    object: ObservableObject,
    method: Method,
}

impl BoundAction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Value {
        invoke(
            &self.name,
            &self.method,
            Some(Annotation::ActionBound),
            &self.object,
            args,
        )
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction").field("name", &self.name).finish()
    }
}

/// A method that runs against whatever receiver it is given.
#[derive(Clone)]
pub struct UnboundAction {
    member: Arc<str>,
    method: Method,
    annotation: Option<Annotation>,
}

impl UnboundAction {
    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn call(&self, receiver: &ObservableObject, args: &[Value]) -> Value {
        let name = receiver.member_name(&self.member);
        invoke(&name, &self.method, self.annotation, receiver, args)
    }
}

impl fmt::Debug for UnboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundAction")
            .field("member", &self.member)
            .field("annotation", &self.annotation)
            .finish()
    }
}
