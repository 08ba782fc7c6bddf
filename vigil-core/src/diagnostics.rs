//! Diagnostics.
//!
//! Non-fatal conditions are logged through `tracing` and also kept in a
//! small per-thread buffer so that tools and tests can inspect them.
//! Dependency trees describe what a derivation currently depends on.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::Serialize;

use crate::reactive::atom::Dependency;

/// How many diagnostics are kept before the oldest are dropped.
const MAX_BUFFERED: usize = 256;

/// A non-fatal condition reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An auto action was called from a reaction, where it could be either a
    /// read or a mutation. It ran as an action.
    StructuralAmbiguityWarning { action: String, reaction: String },
    /// An observable was written outside an action while actions are
    /// enforced.
    EnforceActions { observable: String },
    /// A computed value that requires a reaction was read outside one.
    ComputedRequiresReaction { computed: String },
    /// Reactions kept invalidating each other; the flush was aborted.
    ReactionDiverged { iterations: usize, reactions: Vec<String> },
}

thread_local! {
    static DIAGNOSTICS: RefCell<VecDeque<Diagnostic>> = const { RefCell::new(VecDeque::new()) };
}

pub(crate) fn report(diagnostic: Diagnostic) {
    match &diagnostic {
        Diagnostic::StructuralAmbiguityWarning { action, reaction } => tracing::warn!(
            action = %action,
            reaction = %reaction,
            "auto action invoked from a reaction; running it as an action"
        ),
        Diagnostic::EnforceActions { observable } => tracing::warn!(
            observable = %observable,
            "observable changed outside an action"
        ),
        Diagnostic::ComputedRequiresReaction { computed } => tracing::warn!(
            computed = %computed,
            "computed value read outside a reactive context"
        ),
        Diagnostic::ReactionDiverged { iterations, reactions } => tracing::error!(
            iterations,
            ?reactions,
            "reactions did not converge; aborting flush"
        ),
    }

    DIAGNOSTICS.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        if buffer.len() == MAX_BUFFERED {
            buffer.pop_front();
        }
        buffer.push_back(diagnostic);
    });
}

/// Drain the diagnostics recorded on the current thread.
pub fn take_diagnostics() -> Vec<Diagnostic> {
    DIAGNOSTICS.with(|buffer| buffer.borrow_mut().drain(..).collect())
}

/// What a derivation depends on, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyTree>,
}

impl DependencyTree {
    pub(crate) fn build(name: String, dependencies: &[Dependency]) -> Self {
        Self {
            name,
            dependencies: dependencies
                .iter()
                .map(|dep| {
                    let nested = dep.source.dependencies();
                    Self::build(dep.source.atom().name().to_string(), &nested)
                })
                .collect(),
        }
    }

    /// Names of every node in the tree, depth first.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for dep in &self.dependencies {
            names.extend(dep.names());
        }
        names
    }
}

/// Who observes a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverTree {
    pub name: String,
    pub observers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_drained() {
        report(Diagnostic::EnforceActions {
            observable: "a".into(),
        });
        report(Diagnostic::ComputedRequiresReaction {
            computed: "b".into(),
        });

        let taken = take_diagnostics();
        assert_eq!(taken.len(), 2);
        assert!(take_diagnostics().is_empty());
    }

    #[test]
    fn buffer_is_bounded() {
        for i in 0..(MAX_BUFFERED + 10) {
            report(Diagnostic::EnforceActions {
                observable: format!("o{i}"),
            });
        }

        let taken = take_diagnostics();
        assert_eq!(taken.len(), MAX_BUFFERED);
        assert_eq!(
            taken[0],
            Diagnostic::EnforceActions {
                observable: "o10".into()
            }
        );
    }

    #[test]
    fn diagnostics_serialize_with_kind_tag() {
        let json = serde_json::to_string(&Diagnostic::ReactionDiverged {
            iterations: 101,
            reactions: vec!["loop".into()],
        })
        .unwrap();
        assert!(json.contains(r#""kind":"reaction_diverged""#));
    }
}
