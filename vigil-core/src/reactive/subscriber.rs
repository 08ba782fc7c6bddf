//! Identifier types for the reactive system.
//!
//! Every derivation (computed value or reaction) gets a [`SubscriberId`], and
//! every observable storage location gets an [`AtomId`]. Both are drawn from
//! process-wide atomic counters so they stay unique across threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed value or reaction) gets a unique ID when
/// created. Observer sets and the pending-reaction queue are keyed by it,
/// which is what makes repeated notifications coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for an atom (the tracked core of an observable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl AtomId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for AtomId {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the default debug name for an anonymous node.
pub(crate) fn default_name(kind: &str, id: u64) -> String {
    format!("{kind}@{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn atom_ids_increase() {
        let a = AtomId::new();
        let b = AtomId::new();
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn default_names_carry_kind_and_id() {
        assert_eq!(default_name("Computed", 7), "Computed@7");
    }
}
