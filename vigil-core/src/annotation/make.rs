//! Applying annotations.
//!
//! Annotations are checked against the target before anything is built:
//! every annotated member must exist and be of a kind the annotation fits.
//! The resolved annotations of each class are remembered per process, and a
//! later instance of the same class annotated differently is rejected.

use std::sync::OnceLock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::object::ObservableObject;
use super::options::ObservableOptions;
use super::target::{MemberKind, Target};
use super::{Annotation, AnnotationMap};
use crate::error::MisuseError;
use crate::reactive::batch;

type Signature = Vec<(String, Annotation)>;

fn signatures() -> &'static DashMap<(String, &'static str), Signature> {
    static SIGNATURES: OnceLock<DashMap<(String, &'static str), Signature>> = OnceLock::new();
    SIGNATURES.get_or_init(DashMap::new)
}

fn check_signature(
    class: &str,
    function: &'static str,
    mut signature: Signature,
) -> Result<(), MisuseError> {
    signature.sort_by(|a, b| a.0.cmp(&b.0));
    match signatures().entry((class.to_string(), function)) {
        Entry::Occupied(entry) if *entry.get() != signature => {
            Err(MisuseError::InconsistentAnnotations {
                class: class.to_string(),
                detail: describe_difference(entry.get(), &signature),
            })
        }
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(entry) => {
            entry.insert(signature);
            Ok(())
        }
    }
}

fn describe_difference(previous: &Signature, current: &Signature) -> String {
    let lookup = |signature: &Signature, member: &str| {
        signature
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, annotation)| *annotation)
    };

    for (member, annotation) in current {
        match lookup(previous, member) {
            Some(before) if before != *annotation => {
                return format!("'{member}' was '{before}', now '{annotation}'")
            }
            None => return format!("'{member}' was not annotated before"),
            Some(_) => {}
        }
    }
    for (member, before) in previous {
        if lookup(current, member).is_none() {
            return format!("'{member}' was '{before}', now not annotated");
        }
    }
    String::from("annotations differ")
}

fn validate(target: &Target, annotations: &AnnotationMap) -> Result<(), MisuseError> {
    for (member, annotation) in annotations.iter() {
        let kind = target
            .kind_of(member)
            .ok_or_else(|| MisuseError::MissingMember {
                class: target.class().to_string(),
                member: member.to_string(),
                annotation: annotation.to_string(),
            })?;
        annotation
            .fits(kind)
            .map_err(|reason| MisuseError::InvalidAnnotation {
                class: target.class().to_string(),
                member: member.to_string(),
                annotation: annotation.to_string(),
                reason,
            })?;
    }
    Ok(())
}

fn infer(kind: MemberKind, options: &ObservableOptions) -> Annotation {
    match kind {
        MemberKind::Field if options.deep => Annotation::Observable,
        MemberKind::Field => Annotation::ObservableRef,
        MemberKind::Getter => Annotation::Computed,
        MemberKind::Method if options.auto_bind => Annotation::ActionBound,
        MemberKind::Method => Annotation::AutoAction,
    }
}

/// Annotation for every member: the override if present, else inferred.
fn resolve_all(
    target: &Target,
    overrides: &AnnotationMap,
    options: &ObservableOptions,
) -> Signature {
    target
        .member_names()
        .into_iter()
        .filter_map(|member| {
            let kind = target.kind_of(member)?;
            let annotation = overrides
                .get(member)
                .unwrap_or_else(|| infer(kind, options));
            Some((member.to_string(), annotation))
        })
        .collect()
}

fn install_all(object: &ObservableObject, target: Target, resolved: &Signature) {
    let (_, members) = target.into_members();
    for (member, value) in members {
        let annotation = resolved
            .iter()
            .find(|(name, _)| *name == member)
            .map(|(_, annotation)| *annotation);
        object.install(member, value, annotation);
    }
}

fn build(target: Target, resolved: &Signature, options: ObservableOptions) -> ObservableObject {
    let object = ObservableObject::empty(target.class().to_string(), options);
    install_all(&object, target, resolved);
    tracing::debug!(
        object = %object.name(),
        annotated = resolved.len(),
        "applied annotations"
    );
    object
}

/// Make the members listed in `annotations` reactive. Unlisted members stay
/// plain.
///
/// ```rust
/// use vigil_core::annotation::{make_observable, Annotation, AnnotationMap, ObservableOptions, Target};
/// use vigil_core::value::Value;
///
/// let target = Target::new("Doc")
///     .field("title", "draft")
///     .field("cache", Value::Null);
/// let annotations = AnnotationMap::new().with("title", Annotation::Observable);
///
/// let doc = make_observable(target, &annotations, ObservableOptions::default()).unwrap();
/// assert_eq!(doc.annotation("title"), Some(Annotation::Observable));
/// assert_eq!(doc.annotation("cache"), None);
/// ```
pub fn make_observable(
    target: Target,
    annotations: &AnnotationMap,
    options: ObservableOptions,
) -> Result<ObservableObject, MisuseError> {
    validate(&target, annotations)?;
    let resolved: Signature = annotations
        .iter()
        .map(|(member, annotation)| (member.to_string(), annotation))
        .collect();
    check_signature(target.class(), "make_observable", resolved.clone())?;
    Ok(build(target, &resolved, options))
}

/// Make every member reactive, inferring annotations from member kinds:
/// fields become `observable` (`observable.ref` without `deep`), getters
/// `computed`, methods `autoAction` (`action.bound` with `auto_bind`).
/// Entries in `overrides` win; `Annotation::Exclude` leaves a member plain.
pub fn make_auto_observable(
    target: Target,
    overrides: &AnnotationMap,
    options: ObservableOptions,
) -> Result<ObservableObject, MisuseError> {
    validate(&target, overrides)?;
    let resolved = resolve_all(&target, overrides, &options);
    check_signature(target.class(), "make_auto_observable", resolved.clone())?;
    Ok(build(target, &resolved, options))
}

/// Like [`make_auto_observable`] for one-off objects: nothing is remembered
/// per class.
pub fn observable(
    target: Target,
    overrides: &AnnotationMap,
    options: ObservableOptions,
) -> Result<ObservableObject, MisuseError> {
    validate(&target, overrides)?;
    let resolved = resolve_all(&target, overrides, &options);
    Ok(build(target, &resolved, options))
}

/// Add the members of `target` to an existing object. Annotations are
/// inferred for members not listed in `annotations`, using the options the
/// object was created with.
pub fn extend_observable(
    object: &ObservableObject,
    target: Target,
    annotations: &AnnotationMap,
) -> Result<(), MisuseError> {
    if let Some(member) = target
        .member_names()
        .into_iter()
        .find(|member| object.contains(member))
    {
        return Err(MisuseError::AlreadyDefined {
            object: object.name().to_string(),
            member: member.to_string(),
        });
    }
    validate(&target, annotations)?;

    let resolved = resolve_all(&target, annotations, object.options());
    batch(|| {
        install_all(object, target, &resolved);
        object.keys_changed();
    });
    tracing::debug!(object = %object.name(), added = resolved.len(), "extended object");
    Ok(())
}
