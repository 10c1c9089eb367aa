use std::{fmt, str::FromStr};

use serde_yaml::{Mapping, Value};

/// The key holding an object's type discriminator.
pub const OBJECT_TYPE: &str = "object-type";

/// The key holding an object's identifier.
pub const ID: &str = "id";

/// The key of the list of data objects in a matrix definition.
pub const DATA: &str = "data";

/// The closed set of object types in the knowledge base.
///
/// The `object-type` field of every data object selects one of these, and
/// with it the rule set the object is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// A tactic: the adversary's reason for performing an action.
    Tactic,
    /// A technique or sub-technique: how an adversary achieves a tactic.
    Technique,
    /// A mitigation: a countermeasure against one or more techniques.
    Mitigation,
    /// A case study: a documented incident or demonstration.
    CaseStudy,
}

impl ObjectKind {
    /// Every kind, in the default output order of a compiled matrix.
    pub const ALL: [Self; 4] = [
        Self::Tactic,
        Self::Technique,
        Self::Mitigation,
        Self::CaseStudy,
    ];

    /// The value of the `object-type` field for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tactic => "tactic",
            Self::Technique => "technique",
            Self::Mitigation => "mitigation",
            Self::CaseStudy => "case-study",
        }
    }

    /// The key under which objects of this kind are collected in a compiled
    /// matrix.
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::Tactic => "tactics",
            Self::Technique => "techniques",
            Self::Mitigation => "mitigations",
            Self::CaseStudy => "case-studies",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an `object-type` value names no known kind.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown object type '{0}', expected one of tactic, technique, mitigation, case-study")]
pub struct UnknownKindError(pub String);

impl FromStr for ObjectKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKindError(s.to_string()))
    }
}

/// A single record of the knowledge base.
///
/// The fields are kept as an insertion-ordered YAML mapping so that compiled
/// output preserves the key order authors wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    fields: Mapping,
}

impl DataObject {
    /// Wraps a mapping as a data object.
    #[must_use]
    pub const fn new(fields: Mapping) -> Self {
        Self { fields }
    }

    /// The object's `id`, if present and a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID).and_then(Value::as_str)
    }

    /// The raw `object-type` value, if present and a string.
    #[must_use]
    pub fn object_type(&self) -> Option<&str> {
        self.fields.get(OBJECT_TYPE).and_then(Value::as_str)
    }

    /// The object's kind, if `object-type` names a known kind.
    #[must_use]
    pub fn kind(&self) -> Option<ObjectKind> {
        self.object_type().and_then(|s| s.parse().ok())
    }

    /// Looks up a field by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, in source order.
    #[must_use]
    pub const fn fields(&self) -> &Mapping {
        &self.fields
    }

    /// A human readable label for diagnostics: the ID, or a placeholder when
    /// the object has none.
    #[must_use]
    pub fn label(&self) -> String {
        self.id().map_or_else(|| "<no id>".to_string(), str::to_string)
    }

    /// Converts the object back into a YAML value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Mapping(self.fields)
    }
}

impl From<Mapping> for DataObject {
    fn from(fields: Mapping) -> Self {
        Self::new(fields)
    }
}
