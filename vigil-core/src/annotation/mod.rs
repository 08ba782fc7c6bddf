//! Annotation Layer
//!
//! Maps the named members of a [`Target`] onto reactive primitives:
//!
//! | Annotation | Member | Becomes |
//! |---|---|---|
//! | `observable` | field | deep observable value |
//! | `observable.ref` | field | observable reference, never wrapped |
//! | `observable.shallow` | field | observable, one level of wrapping |
//! | `observable.struct` | field | deep observable, structurally compared |
//! | `computed` | getter | computed value |
//! | `computed.struct` | getter | computed value, structurally compared |
//! | `action` | method | action |
//! | `action.bound` | method | action bound to the object |
//! | `autoAction` | method | action, or a tracked read inside a derivation |
//! | `false` | any | left plain |
//!
//! [`make_observable`] applies an explicit [`AnnotationMap`];
//! [`make_auto_observable`] infers annotations from member kinds;
//! [`extend_observable`] adds members to an existing object.

mod make;
mod object;
mod options;
mod target;

pub use make::{extend_observable, make_auto_observable, make_observable, observable};
pub use object::{BoundAction, ObservableObject, UnboundAction};
pub use options::ObservableOptions;
pub use target::{Getter, MemberKind, Method, Target};

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::UnknownAnnotation;
use crate::reactive::ComparerKind;
use crate::value::Enhancer;

/// How a member is made reactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawAnnotation")]
pub enum Annotation {
    Observable,
    ObservableRef,
    ObservableShallow,
    ObservableStruct,
    Computed,
    ComputedStruct,
    Action,
    ActionBound,
    AutoAction,
    /// Leave the member plain.
    Exclude,
}

impl Annotation {
    pub const ALL: [Annotation; 10] = [
        Annotation::Observable,
        Annotation::ObservableRef,
        Annotation::ObservableShallow,
        Annotation::ObservableStruct,
        Annotation::Computed,
        Annotation::ComputedStruct,
        Annotation::Action,
        Annotation::ActionBound,
        Annotation::AutoAction,
        Annotation::Exclude,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Annotation::Observable => "observable",
            Annotation::ObservableRef => "observable.ref",
            Annotation::ObservableShallow => "observable.shallow",
            Annotation::ObservableStruct => "observable.struct",
            Annotation::Computed => "computed",
            Annotation::ComputedStruct => "computed.struct",
            Annotation::Action => "action",
            Annotation::ActionBound => "action.bound",
            Annotation::AutoAction => "autoAction",
            Annotation::Exclude => "false",
        }
    }

    pub fn is_observable(self) -> bool {
        matches!(
            self,
            Annotation::Observable
                | Annotation::ObservableRef
                | Annotation::ObservableShallow
                | Annotation::ObservableStruct
        )
    }

    pub fn is_computed(self) -> bool {
        matches!(self, Annotation::Computed | Annotation::ComputedStruct)
    }

    pub fn is_action(self) -> bool {
        matches!(
            self,
            Annotation::Action | Annotation::ActionBound | Annotation::AutoAction
        )
    }

    /// Wrapping policy for observable annotations.
    pub fn enhancer(self) -> Option<Enhancer> {
        match self {
            Annotation::Observable | Annotation::ObservableStruct => Some(Enhancer::Deep),
            Annotation::ObservableRef => Some(Enhancer::Reference),
            Annotation::ObservableShallow => Some(Enhancer::Shallow),
            _ => None,
        }
    }

    /// Equality policy for observable and computed annotations.
    pub fn comparer_kind(self) -> Option<ComparerKind> {
        match self {
            Annotation::ObservableStruct | Annotation::ComputedStruct => {
                Some(ComparerKind::Structural)
            }
            Annotation::Observable | Annotation::ObservableRef | Annotation::ObservableShallow => {
                Some(ComparerKind::Default)
            }
            Annotation::Computed => Some(ComparerKind::Always),
            _ => None,
        }
    }

    /// Whether the action is tied to its object.
    pub fn is_bound(self) -> bool {
        self == Annotation::ActionBound
    }

    /// Whether this annotation can be applied to a member of `kind`.
    pub(crate) fn fits(self, kind: MemberKind) -> Result<(), &'static str> {
        match kind {
            _ if self == Annotation::Exclude => Ok(()),
            MemberKind::Field if self.is_observable() => Ok(()),
            MemberKind::Getter if self.is_computed() => Ok(()),
            MemberKind::Method if self.is_action() => Ok(()),
            MemberKind::Field => Err("fields take an observable annotation"),
            MemberKind::Getter => Err("getters take a computed annotation"),
            MemberKind::Method => Err("methods take an action annotation"),
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Annotation {
    type Err = UnknownAnnotation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Annotation::ALL
            .into_iter()
            .find(|annotation| annotation.as_str() == s)
            .ok_or_else(|| UnknownAnnotation(s.to_string()))
    }
}

/// Annotations appear in JSON as strings, or as the literal `false`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnnotation {
    Flag(bool),
    Name(String),
}

impl TryFrom<RawAnnotation> for Annotation {
    type Error = UnknownAnnotation;

    fn try_from(raw: RawAnnotation) -> Result<Self, Self::Error> {
        match raw {
            RawAnnotation::Flag(false) => Ok(Annotation::Exclude),
            RawAnnotation::Flag(true) => Err(UnknownAnnotation("true".to_string())),
            RawAnnotation::Name(name) => name.parse(),
        }
    }
}

/// Member name to annotation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AnnotationMap {
    entries: IndexMap<String, Annotation>,
}

impl AnnotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, member: impl Into<String>, annotation: Annotation) -> Self {
        self.insert(member, annotation);
        self
    }

    pub fn insert(&mut self, member: impl Into<String>, annotation: Annotation) {
        self.entries.insert(member.into(), annotation);
    }

    pub fn get(&self, member: &str) -> Option<Annotation> {
        self.entries.get(member).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Annotation)> {
        self.entries.iter().map(|(member, a)| (member.as_str(), *a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from a JSON object such as `{"value": "observable", "cache": false}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl<S: Into<String>> FromIterator<(S, Annotation)> for AnnotationMap {
    fn from_iter<I: IntoIterator<Item = (S, Annotation)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(member, annotation)| (member.into(), annotation))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_names() {
        for annotation in Annotation::ALL {
            assert_eq!(annotation.as_str().parse::<Annotation>(), Ok(annotation));
        }
        assert_eq!(
            "observable.deep".parse::<Annotation>(),
            Err(UnknownAnnotation("observable.deep".into()))
        );
    }

    #[test]
    fn policies() {
        assert_eq!(Annotation::ObservableRef.enhancer(), Some(Enhancer::Reference));
        assert_eq!(Annotation::ObservableShallow.enhancer(), Some(Enhancer::Shallow));
        assert_eq!(
            Annotation::ObservableStruct.comparer_kind(),
            Some(ComparerKind::Structural)
        );
        assert_eq!(Annotation::Computed.comparer_kind(), Some(ComparerKind::Always));
        assert!(Annotation::ActionBound.is_bound());
        assert!(!Annotation::AutoAction.is_bound());
        assert_eq!(Annotation::Action.enhancer(), None);
    }

    #[test]
    fn fits_member_kinds() {
        assert!(Annotation::Observable.fits(MemberKind::Field).is_ok());
        assert!(Annotation::Computed.fits(MemberKind::Field).is_err());
        assert!(Annotation::Action.fits(MemberKind::Getter).is_err());
        assert!(Annotation::Exclude.fits(MemberKind::Method).is_ok());
    }

    #[test]
    fn map_from_json() {
        let map = AnnotationMap::from_json(
            r#"{"value": "observable", "double": "computed.struct", "cache": false}"#,
        )
        .unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("double"), Some(Annotation::ComputedStruct));
        assert_eq!(map.get("cache"), Some(Annotation::Exclude));
        assert_eq!(
            map.iter().map(|(member, _)| member).collect::<Vec<_>>(),
            vec!["value", "double", "cache"]
        );

        assert!(AnnotationMap::from_json(r#"{"value": "observable.deep"}"#).is_err());
        assert!(AnnotationMap::from_json(r#"{"value": true}"#).is_err());
    }
}
