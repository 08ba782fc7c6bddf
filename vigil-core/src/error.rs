//! Error types.
//!
//! Misuse of the annotation layer fails fast with a [`MisuseError`]. Runtime
//! failures of the reactive core (cycles, unknown members) are reported as
//! [`ReactiveError`], which also wraps misuse so callers can use a single
//! `?` chain.

use thiserror::Error;

/// Incorrect use of the API, surfaced synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MisuseError {
    /// An annotation names a member the target does not have.
    #[error("cannot apply '{annotation}' to '{class}.{member}': no such member on the target")]
    MissingMember {
        class: String,
        member: String,
        annotation: String,
    },

    /// An annotation does not fit the kind of member it is applied to.
    #[error("cannot apply '{annotation}' to '{class}.{member}': {reason}")]
    InvalidAnnotation {
        class: String,
        member: String,
        annotation: String,
        reason: &'static str,
    },

    /// A class was annotated differently than a previous instance of it.
    #[error("class '{class}' was annotated inconsistently across instances: {detail}")]
    InconsistentAnnotations { class: String, detail: String },

    /// `extend_observable` tried to add a member that already exists.
    #[error("'{object}.{member}' is already defined")]
    AlreadyDefined { object: String, member: String },

    /// Assignment to a computed or otherwise read-only member.
    #[error("'{object}.{member}' is read-only")]
    ReadOnly { object: String, member: String },

    /// `call` on a member that is not a method.
    #[error("'{object}.{member}' is not callable")]
    NotCallable { object: String, member: String },

    /// `get` on a method.
    #[error("'{object}.{member}' is a method, not a value")]
    NotReadable { object: String, member: String },

    /// A bound action was requested for a member that is not bound.
    #[error("'{object}.{member}' is not a bound action")]
    NotBound { object: String, member: String },

    /// An observable was written while a computed value was being derived.
    #[error("computed values may not change observable state (writing '{observable}')")]
    StateChangeInComputed { observable: String },
}

/// An annotation string that names no known annotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown annotation '{0}'")]
pub struct UnknownAnnotation(pub String);

/// Errors raised by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error(transparent)]
    Misuse(#[from] MisuseError),

    /// A computed value was read while it was computing itself.
    #[error("cycle detected in computation '{name}'")]
    Cycle { name: String },

    /// The member does not exist on the object.
    #[error("'{object}' has no member '{member}'")]
    UnknownMember { object: String, member: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
