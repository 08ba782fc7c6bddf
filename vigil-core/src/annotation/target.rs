//! Plain records waiting to be made observable.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::object::ObservableObject;
use crate::value::Value;

/// Derives a value from an object.
pub type Getter = Arc<dyn Fn(&ObservableObject) -> Value + Send + Sync>;

/// A method called with its receiver and arguments.
pub type Method = Arc<dyn Fn(&ObservableObject, &[Value]) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Getter,
    Method,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberKind::Field => "field",
            MemberKind::Getter => "getter",
            MemberKind::Method => "method",
        })
    }
}

#[derive(Clone)]
pub(crate) enum Member {
    Field(Value),
    Getter(Getter),
    Method(Method),
}

impl Member {
    pub(crate) fn kind(&self) -> MemberKind {
        match self {
            Member::Field(_) => MemberKind::Field,
            Member::Getter(_) => MemberKind::Getter,
            Member::Method(_) => MemberKind::Method,
        }
    }
}

/// A record under construction: a class name and its named members.
///
/// ```rust
/// use vigil_core::annotation::Target;
/// use vigil_core::value::Value;
///
/// let target = Target::new("Counter")
///     .field("count", 0)
///     .getter("double", |this| {
///         Value::from(this.get("count").unwrap().as_int().unwrap() * 2)
///     })
///     .method("increment", |this, _| {
///         let count = this.get("count").unwrap().as_int().unwrap();
///         this.set("count", Value::from(count + 1)).unwrap();
///         Value::Null
///     });
/// assert_eq!(target.member_names(), vec!["count", "double", "increment"]);
/// ```
#[derive(Clone)]
pub struct Target {
    class: String,
    members: IndexMap<String, Member>,
}

impl Target {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            members: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), Member::Field(value.into()));
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&ObservableObject) -> Value + Send + Sync + 'static,
    {
        self.members
            .insert(name.into(), Member::Getter(Arc::new(getter)));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&ObservableObject, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.members
            .insert(name.into(), Member::Method(Arc::new(method)));
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn has(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<MemberKind> {
        self.members.get(name).map(Member::kind)
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub(crate) fn into_members(self) -> (String, IndexMap<String, Member>) {
        (self.class, self.members)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("class", &self.class)
            .field(
                "members",
                &self
                    .members
                    .iter()
                    .map(|(name, member)| (name.as_str(), member.kind()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
