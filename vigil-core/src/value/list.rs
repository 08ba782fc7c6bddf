//! Observable list.
//!
//! The whole list is one observable: any read of it (length, an item, a
//! snapshot) depends on every mutation. Items are wrapped with the list's
//! enhancer when they are stored.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Enhancer, Value};
use crate::reactive::atom::{self, Atom, Source};
use crate::reactive::check_write_allowed;

struct ListInner {
    atom: Atom,
    items: RwLock<Vec<Value>>,
    enhancer: Enhancer,
}

impl Source for ListInner {
    fn atom(&self) -> &Atom {
        &self.atom
    }
}

/// A tracked list of [`Value`]s.
///
/// ```rust
/// use vigil_core::value::{ObservableList, Value};
///
/// let list = ObservableList::new(vec![Value::from(1)]);
/// list.push(Value::from(2));
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.to_vec(), vec![Value::from(1), Value::from(2)]);
/// ```
#[derive(Clone)]
pub struct ObservableList {
    inner: Arc<ListInner>,
}

impl ObservableList {
    /// Create a deep list.
    pub fn new(items: Vec<Value>) -> Self {
        Self::with_enhancer(items, Enhancer::Deep)
    }

    pub fn with_enhancer(items: Vec<Value>, enhancer: Enhancer) -> Self {
        Self::build(items, enhancer, None)
    }

    pub fn named(name: impl Into<String>, items: Vec<Value>, enhancer: Enhancer) -> Self {
        Self::build(items, enhancer, Some(name.into()))
    }

    fn build(items: Vec<Value>, enhancer: Enhancer, name: Option<String>) -> Self {
        let items = items.into_iter().map(|item| enhancer.apply(item)).collect();
        Self {
            inner: Arc::new(ListInner {
                atom: Atom::new("ObservableList", name),
                items: RwLock::new(items),
                enhancer,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.atom.name()
    }

    pub fn enhancer(&self) -> Enhancer {
        self.inner.enhancer
    }

    pub fn version(&self) -> u64 {
        self.inner.atom.version()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.atom.observer_count()
    }

    fn report_observed(&self) {
        atom::report_observed(self.inner.clone());
    }

    pub fn len(&self) -> usize {
        self.report_observed();
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.report_observed();
        self.inner.items.read().get(index).cloned()
    }

    /// Current items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.report_observed();
        self.inner.items.read().clone()
    }

    /// Apply `f` to the items if writes are allowed here. `f` returns its
    /// result and whether it changed anything.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> (R, bool)) -> Option<R> {
        if let Err(error) = check_write_allowed(&self.inner.atom) {
            tracing::error!(list = %self.name(), %error, "write rejected");
            return None;
        }
        let (result, changed) = f(&mut self.inner.items.write());
        if changed {
            self.inner.atom.report_changed();
        }
        Some(result)
    }

    /// Replace the item at `index`. Returns whether it changed.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let value = self.inner.enhancer.apply(value);
        self.mutate(|items| {
            let slot = &mut items[index];
            if *slot == value {
                return (false, false);
            }
            *slot = value;
            (true, true)
        })
        .unwrap_or(false)
    }

    pub fn push(&self, value: Value) {
        let value = self.inner.enhancer.apply(value);
        self.mutate(|items| {
            items.push(value);
            ((), true)
        });
    }

    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items| {
            let popped = items.pop();
            let changed = popped.is_some();
            (popped, changed)
        })
        .flatten()
    }

    /// Insert at `index`, shifting later items.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, value: Value) {
        let value = self.inner.enhancer.apply(value);
        self.mutate(|items| {
            items.insert(index, value);
            ((), true)
        });
    }

    /// Remove the item at `index`, or return `None` if there is none.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.mutate(|items| {
            if index < items.len() {
                (Some(items.remove(index)), true)
            } else {
                (None, false)
            }
        })
        .flatten()
    }

    pub fn clear(&self) {
        self.mutate(|items| {
            let changed = !items.is_empty();
            items.clear();
            ((), changed)
        });
    }

    /// Replace every item, returning the old ones.
    pub fn replace(&self, values: Vec<Value>) -> Vec<Value> {
        let enhancer = self.inner.enhancer;
        let values: Vec<Value> = values.into_iter().map(|v| enhancer.apply(v)).collect();
        self.mutate(|items| {
            let old = std::mem::replace(items, values);
            let changed = old != *items;
            (old, changed)
        })
        .unwrap_or_default()
    }

    pub fn to_plain_shallow(&self) -> Value {
        Value::List(self.to_vec())
    }

    pub fn to_plain_deep(&self) -> Value {
        Value::List(self.to_vec().iter().map(Value::to_plain_deep).collect())
    }
}

impl PartialEq for ObservableList {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("name", &self.name())
            .field("items", &*self.inner.items.read())
            .finish()
    }
}
