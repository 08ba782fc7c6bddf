//! Equality policies.
//!
//! Observable cells use a comparer to decide whether a write is a change;
//! computed values use one to decide whether a recomputation should be
//! visible downstream.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Deep, content-based equality.
///
/// For most types this is the same as `PartialEq`. It differs for types
/// whose `PartialEq` compares handles by identity, such as the observable
/// containers inside [`Value`](crate::value::Value).
pub trait StructuralEq {
    fn structural_eq(&self, other: &Self) -> bool;
}

macro_rules! structural_via_partial_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StructuralEq for $ty {
                fn structural_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

structural_via_partial_eq!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str,
);

impl<T: StructuralEq + ?Sized> StructuralEq for Arc<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other) || (**self).structural_eq(other)
    }
}

impl<T: StructuralEq> StructuralEq for Option<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.structural_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: StructuralEq> StructuralEq for [T] {
    fn structural_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.structural_eq(b))
    }
}

impl<T: StructuralEq> StructuralEq for Vec<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        self.as_slice().structural_eq(other.as_slice())
    }
}

impl<K: Ord, V: StructuralEq> StructuralEq for BTreeMap<K, V> {
    fn structural_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.structural_eq(o)))
    }
}

impl<K: Eq + Hash, V: StructuralEq> StructuralEq for HashMap<K, V> {
    fn structural_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.structural_eq(o)))
    }
}

impl<A: StructuralEq, B: StructuralEq> StructuralEq for (A, B) {
    fn structural_eq(&self, other: &Self) -> bool {
        self.0.structural_eq(&other.0) && self.1.structural_eq(&other.1)
    }
}

impl<A: StructuralEq, B: StructuralEq, C: StructuralEq> StructuralEq for (A, B, C) {
    fn structural_eq(&self, other: &Self) -> bool {
        self.0.structural_eq(&other.0)
            && self.1.structural_eq(&other.1)
            && self.2.structural_eq(&other.2)
    }
}

/// Which built-in policy a comparer implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparerKind {
    /// `PartialEq`.
    Default,
    /// [`StructuralEq`].
    Structural,
    /// Every new value counts as a change.
    Always,
    /// A user-supplied function.
    Custom,
}

type EqualsFn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

/// An equality policy for values of type `T`.
pub struct Comparer<T> {
    kind: ComparerKind,
    equals: Arc<EqualsFn<T>>,
}

impl<T: 'static> Comparer<T> {
    /// Compare with `PartialEq`.
    pub fn default_eq() -> Self
    where
        T: PartialEq,
    {
        Self {
            kind: ComparerKind::Default,
            equals: Arc::new(|a: &T, b: &T| a == b),
        }
    }

    /// Compare by content.
    pub fn structural() -> Self
    where
        T: StructuralEq,
    {
        Self {
            kind: ComparerKind::Structural,
            equals: Arc::new(|a: &T, b: &T| a.structural_eq(b)),
        }
    }

    /// Never consider two values equal.
    pub fn always() -> Self {
        Self {
            kind: ComparerKind::Always,
            equals: Arc::new(|_: &T, _: &T| false),
        }
    }

    /// Use a custom equality function.
    pub fn custom<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: ComparerKind::Custom,
            equals: Arc::new(equals),
        }
    }

    pub fn kind(&self) -> ComparerKind {
        self.kind
    }

    pub fn equals(&self, a: &T, b: &T) -> bool {
        (self.equals)(a, b)
    }
}

impl<T: PartialEq + 'static> Default for Comparer<T> {
    fn default() -> Self {
        Self::default_eq()
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            equals: Arc::clone(&self.equals),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Comparer").field(&self.kind).finish()
    }
}
