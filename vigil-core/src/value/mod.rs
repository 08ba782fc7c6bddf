//! Dynamic Values
//!
//! [`Value`] is the dynamically shaped data held by annotated objects. Plain
//! data (primitives, lists, maps) is compared structurally; observable
//! containers and opaque objects are handles and compare by identity.
//!
//! # Wrapping
//!
//! When a value is stored in an observable member, an [`Enhancer`] decides
//! whether it gets wrapped:
//!
//! - `Deep`: plain lists and maps become observable containers, recursively
//! - `Shallow`: plain lists and maps become observable containers whose
//!   items are stored as-is
//! - `Reference`: nothing is wrapped
//!
//! Only the [`Shape::PlainContainer`] shape is ever wrapped. Primitives,
//! observable containers and opaque objects pass through unchanged.
//!
//! # Snapshots
//!
//! [`Value::to_plain_shallow`] and [`Value::to_plain_deep`] turn observable
//! containers back into plain data without touching the originals.

mod list;
mod map;

pub use list::ObservableList;
pub use map::ObservableMap;
pub(crate) use map::KeySet;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::{untracked, StructuralEq};

/// How a value is classified before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Primitive,
    PlainContainer,
    ObservableContainer,
    Opaque,
}

/// Wrapping policy for values written to observable members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enhancer {
    #[default]
    Deep,
    Shallow,
    Reference,
}

impl Enhancer {
    /// Wrap `value` according to this policy.
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Enhancer::Reference, value) => value,
            (Enhancer::Deep, Value::List(items)) => {
                Value::ObservableList(ObservableList::with_enhancer(items, Enhancer::Deep))
            }
            (Enhancer::Deep, Value::Map(entries)) => {
                Value::ObservableMap(ObservableMap::with_enhancer(entries, Enhancer::Deep))
            }
            (Enhancer::Shallow, Value::List(items)) => {
                Value::ObservableList(ObservableList::with_enhancer(items, Enhancer::Reference))
            }
            (Enhancer::Shallow, Value::Map(entries)) => {
                Value::ObservableMap(ObservableMap::with_enhancer(entries, Enhancer::Reference))
            }
            (_, value) => value,
        }
    }
}

/// An object the runtime never looks into.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({})", self.type_name)
    }
}

/// A dynamically shaped value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    ObservableList(ObservableList),
    ObservableMap(ObservableMap),
    Opaque(Opaque),
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                Shape::Primitive
            }
            Value::List(_) | Value::Map(_) => Shape::PlainContainer,
            Value::ObservableList(_) | Value::ObservableMap(_) => Shape::ObservableContainer,
            Value::Opaque(_) => Shape::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ObservableList> {
        match self {
            Value::ObservableList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ObservableMap> {
        match self {
            Value::ObservableMap(map) => Some(map),
            _ => None,
        }
    }

    /// Snapshot one level: an observable container becomes the plain
    /// container of its current items. Nested values are left as they are.
    pub fn to_plain_shallow(&self) -> Value {
        match self {
            Value::ObservableList(list) => list.to_plain_shallow(),
            Value::ObservableMap(map) => map.to_plain_shallow(),
            other => other.clone(),
        }
    }

    /// Snapshot recursively: the result contains no observable containers.
    pub fn to_plain_deep(&self) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(Value::to_plain_deep).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_plain_deep()))
                    .collect(),
            ),
            Value::ObservableList(list) => list.to_plain_deep(),
            Value::ObservableMap(map) => map.to_plain_deep(),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::ObservableList(a), Value::ObservableList(b)) => a == b,
            (Value::ObservableMap(a), Value::ObservableMap(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl StructuralEq for Value {
    /// Compares current contents, looking through observable containers.
    /// Reads made here are never tracked.
    fn structural_eq(&self, other: &Self) -> bool {
        untracked(|| self.to_plain_deep() == other.to_plain_deep())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl From<ObservableList> for Value {
    fn from(list: ObservableList) -> Self {
        Value::ObservableList(list)
    }
}

impl From<ObservableMap> for Value {
    fn from(map: ObservableMap) -> Self {
        Value::ObservableMap(map)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

/// Build a plain [`Value::Map`] from key/value pairs.
pub fn plain_map<K, V, I>(entries: I) -> Value
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect(),
    )
}
