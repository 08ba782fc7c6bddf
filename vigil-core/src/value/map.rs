//! Observable map.
//!
//! Each entry is its own [`ObservableValue`], so reading one key does not
//! depend on writes to another. The key set is tracked separately: `keys`,
//! `len`, `has` and lookups of missing keys depend on additions and
//! removals.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{Enhancer, Value};
use crate::reactive::atom::{self, Atom, Source};
use crate::reactive::{batch, check_write_allowed, Comparer, ObservableValue};

/// A tracked set of member names, shared with observable objects.
pub(crate) struct KeySet {
    atom: Atom,
}

impl KeySet {
    pub(crate) fn new(kind: &str, name: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            atom: Atom::new(kind, name),
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.atom.name()
    }

    pub(crate) fn observe(self: &Arc<Self>) {
        atom::report_observed(self.clone());
    }

    pub(crate) fn check_write(&self) -> crate::error::Result<()> {
        check_write_allowed(&self.atom)
    }

    pub(crate) fn changed(&self) {
        self.atom.report_changed();
    }
}

impl Source for KeySet {
    fn atom(&self) -> &Atom {
        &self.atom
    }
}

struct MapInner {
    keys: Arc<KeySet>,
    entries: RwLock<IndexMap<String, ObservableValue<Value>>>,
    enhancer: Enhancer,
}

/// A tracked string-keyed map of [`Value`]s.
///
/// ```rust
/// use vigil_core::value::{ObservableMap, Value};
///
/// let map = ObservableMap::default();
/// map.set("a", Value::from(1));
/// assert!(map.has("a"));
/// assert_eq!(map.get("a"), Some(Value::from(1)));
/// assert_eq!(map.keys(), vec!["a".to_string()]);
/// ```
#[derive(Clone)]
pub struct ObservableMap {
    inner: Arc<MapInner>,
}

impl Default for ObservableMap {
    fn default() -> Self {
        Self::with_enhancer(IndexMap::new(), Enhancer::Deep)
    }
}

impl ObservableMap {
    /// Create a deep map.
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self::with_enhancer(entries, Enhancer::Deep)
    }

    pub fn with_enhancer(entries: IndexMap<String, Value>, enhancer: Enhancer) -> Self {
        Self::build(entries, enhancer, None)
    }

    pub fn named(
        name: impl Into<String>,
        entries: IndexMap<String, Value>,
        enhancer: Enhancer,
    ) -> Self {
        Self::build(entries, enhancer, Some(name.into()))
    }

    fn build(entries: IndexMap<String, Value>, enhancer: Enhancer, name: Option<String>) -> Self {
        let keys = KeySet::new("ObservableMap", name);
        let entries = entries
            .into_iter()
            .map(|(key, value)| {
                let cell = Self::entry_cell(keys.name(), &key, enhancer.apply(value));
                (key, cell)
            })
            .collect();

        Self {
            inner: Arc::new(MapInner {
                keys,
                entries: RwLock::new(entries),
                enhancer,
            }),
        }
    }

    fn entry_cell(map: &str, key: &str, value: Value) -> ObservableValue<Value> {
        ObservableValue::named(format!("{map}.{key}"), value, Comparer::default_eq())
    }

    pub fn name(&self) -> &str {
        self.inner.keys.name()
    }

    pub fn enhancer(&self) -> Enhancer {
        self.inner.enhancer
    }

    fn report_keys_observed(&self) {
        self.inner.keys.observe();
    }

    fn cell(&self, key: &str) -> Option<ObservableValue<Value>> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Look up `key`. A missing key depends on the key set, so adding it
    /// later is noticed.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.cell(key) {
            Some(cell) => Some(cell.get()),
            None => {
                self.report_keys_observed();
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.report_keys_observed();
        self.inner.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.report_keys_observed();
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.report_keys_observed();
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Entries in insertion order. Depends on the key set and every value.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.report_keys_observed();
        let cells: Vec<(String, ObservableValue<Value>)> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(key, cell)| (key.clone(), cell.clone()))
            .collect();
        cells
            .into_iter()
            .map(|(key, cell)| (key, cell.get()))
            .collect()
    }

    /// Set `key`. Returns whether anything changed.
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let value = self.inner.enhancer.apply(value);

        if let Some(cell) = self.cell(&key) {
            return cell.set(value);
        }
        if let Err(error) = self.inner.keys.check_write() {
            tracing::error!(map = %self.name(), key = %key, %error, "write rejected");
            return false;
        }

        let cell = Self::entry_cell(self.name(), &key, value);
        self.inner.entries.write().insert(key, cell);
        self.inner.keys.changed();
        true
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if let Err(error) = self.inner.keys.check_write() {
            tracing::error!(map = %self.name(), key = %key, %error, "write rejected");
            return None;
        }

        let cell = self.inner.entries.write().shift_remove(key)?;
        let value = cell.get_untracked();
        batch(|| {
            // Readers of the removed entry re-run and find it gone.
            cell.report_changed();
            self.inner.keys.changed();
        });
        Some(value)
    }

    pub fn clear(&self) {
        let keys: Vec<String> = self.inner.entries.read().keys().cloned().collect();
        batch(|| {
            for key in &keys {
                self.remove(key);
            }
        });
    }

    pub fn to_plain_shallow(&self) -> Value {
        Value::Map(self.entries().into_iter().collect())
    }

    pub fn to_plain_deep(&self) -> Value {
        Value::Map(
            self.entries()
                .into_iter()
                .map(|(key, value)| (key, value.to_plain_deep()))
                .collect(),
        )
    }
}

impl PartialEq for ObservableMap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObservableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("name", &self.name())
            .field("keys", &self.inner.entries.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
