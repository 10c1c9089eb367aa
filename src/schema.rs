//! Validation of compiled documents.
//!
//! The [`Validator`] checks every object of a compiled matrix against the rule
//! set selected by its `object-type`, along with a handful of whole-document
//! checks (header fields, cross references and bracket balance). Problems are
//! collected into a [`ValidationReport`] rather than failing on the first one.

use std::{collections::BTreeSet, fmt};

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::domain::{DataObject, FieldPath, ObjectKind, object::ID};

mod rules;

use rules::SUBTECHNIQUE_OF;

const HEADER_FIELDS: [&str; 3] = ["id", "name", "version"];

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The ID of the offending object, or `<no id>`.
    pub object_id: String,
    /// The object's `object-type`, or `<none>`.
    pub object_type: String,
    /// The offending field.
    pub field: FieldPath,
    /// What is wrong with it.
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.object_id, self.object_type, self.field, self.reason
        )
    }
}

/// The outcome of validating a compiled document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Every violation found, grouped by object in document order.
    pub violations: Vec<Violation>,
    /// How many objects were checked.
    pub objects_checked: usize,
}

impl ValidationReport {
    /// Whether no violations were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// The number of distinct objects with at least one violation.
    #[must_use]
    pub fn objects_with_violations(&self) -> usize {
        self.violations
            .iter()
            .map(|v| (&v.object_type, &v.object_id))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} violation(s) in {} of {} object(s)",
            self.violations.len(),
            self.objects_with_violations(),
            self.objects_checked
        )
    }
}

/// Checks compiled documents against the per-kind rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    check_brackets: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Validator {
    /// Creates a validator. `check_brackets` enables the bracket balance check
    /// on every string field.
    #[must_use]
    pub const fn new(check_brackets: bool) -> Self {
        Self { check_brackets }
    }

    /// Validates a compiled document.
    ///
    /// `unassembled` holds objects that could not be placed in any category
    /// because their `object-type` is missing or unknown; each is reported.
    #[must_use]
    pub fn validate(&self, document: &Value, unassembled: &[DataObject]) -> ValidationReport {
        let mut report = ValidationReport::default();

        let Some(document) = document.as_mapping() else {
            report.violations.push(Violation {
                object_id: "<matrix>".to_string(),
                object_type: "matrix".to_string(),
                field: FieldPath::root(),
                reason: "compiled document is not a mapping".to_string(),
            });
            return report;
        };

        report.violations.extend(header(document));

        let mut objects = Vec::new();
        for kind in ObjectKind::ALL {
            let Some(category) = document.get(kind.category()) else {
                continue;
            };
            let Some(items) = category.as_sequence() else {
                report.violations.push(header_violation(
                    document,
                    FieldPath::from(kind.category()),
                    "expected a list of objects",
                ));
                continue;
            };
            for (i, item) in items.iter().enumerate() {
                match item.as_mapping() {
                    Some(fields) => objects.push(DataObject::new(fields.clone())),
                    None => report.violations.push(header_violation(
                        document,
                        FieldPath::from(kind.category()).index(i),
                        "expected an object",
                    )),
                }
            }
        }

        for object in objects.iter().chain(unassembled) {
            report.violations.extend(self.validate_object(object));
        }
        report.violations.extend(cross_references(document, &objects));
        report.objects_checked = objects.len() + unassembled.len();

        tracing::debug!("Validation: {report}");
        report
    }

    /// Validates a single object against its rule set.
    #[must_use]
    pub fn validate_object(&self, object: &DataObject) -> Vec<Violation> {
        let mut violations = rules::check(object);
        if self.check_brackets {
            let mut unbalanced = Vec::new();
            for (key, value) in object.fields() {
                if let Some(key) = key.as_str() {
                    find_unbalanced(value, &FieldPath::from(key), &mut unbalanced);
                }
            }
            violations.extend(unbalanced.into_iter().map(|field| Violation {
                object_id: object.label(),
                object_type: object.object_type().unwrap_or("<none>").to_string(),
                field,
                reason: "unbalanced brackets".to_string(),
            }));
        }
        violations
    }
}

fn header_violation(document: &Mapping, field: FieldPath, reason: &str) -> Violation {
    Violation {
        object_id: document
            .get(ID)
            .and_then(Value::as_str)
            .unwrap_or("<matrix>")
            .to_string(),
        object_type: "matrix".to_string(),
        field,
        reason: reason.to_string(),
    }
}

fn header(document: &Mapping) -> Vec<Violation> {
    HEADER_FIELDS
        .into_iter()
        .filter_map(|key| match document.get(key) {
            None => Some(header_violation(
                document,
                FieldPath::from(key),
                "missing required field",
            )),
            Some(Value::String(_) | Value::Number(_)) => None,
            Some(_) => Some(header_violation(
                document,
                FieldPath::from(key),
                "expected a string or number",
            )),
        })
        .collect()
}

/// Checks that technique references name objects present in the document.
///
/// A reference into a category the document does not carry is not checked.
fn cross_references(document: &Mapping, objects: &[DataObject]) -> Vec<Violation> {
    let tactics = ids_of(document, objects, ObjectKind::Tactic);
    let techniques = ids_of(document, objects, ObjectKind::Technique);

    let mut violations = Vec::new();
    for object in objects
        .iter()
        .filter(|object| object.kind() == Some(ObjectKind::Technique))
    {
        let mut report = |field: FieldPath, reason: String| {
            violations.push(Violation {
                object_id: object.label(),
                object_type: ObjectKind::Technique.to_string(),
                field,
                reason,
            });
        };

        if let (Some(tactics), Some(Value::Sequence(listed))) = (&tactics, object.get("tactics")) {
            for (i, tactic) in listed.iter().enumerate() {
                if let Some(tactic) = tactic.as_str().filter(|t| !tactics.contains(t)) {
                    report(
                        FieldPath::from("tactics").index(i),
                        format!("references unknown tactic '{tactic}'"),
                    );
                }
            }
        }

        if let (Some(techniques), Some(parent)) = (
            &techniques,
            object.get(SUBTECHNIQUE_OF).and_then(Value::as_str),
        ) {
            if !techniques.contains(parent) {
                report(
                    FieldPath::from(SUBTECHNIQUE_OF),
                    format!("references unknown technique '{parent}'"),
                );
            }
        }
    }
    violations
}

/// The IDs of every object of `kind`, or `None` when the document does not
/// carry that category.
fn ids_of<'a>(
    document: &Mapping,
    objects: &'a [DataObject],
    kind: ObjectKind,
) -> Option<BTreeSet<&'a str>> {
    document.get(kind.category())?;
    Some(
        objects
            .iter()
            .filter(|object| object.kind() == Some(kind))
            .filter_map(DataObject::id)
            .collect(),
    )
}

/// Records the path of every string whose brackets do not balance.
fn find_unbalanced(value: &Value, path: &FieldPath, out: &mut Vec<FieldPath>) {
    match value {
        Value::String(text) if !balanced(text) => out.push(path.clone()),
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                find_unbalanced(item, &path.index(i), out);
            }
        }
        Value::Mapping(fields) => {
            for (key, item) in fields {
                if let Some(key) = key.as_str() {
                    find_unbalanced(item, &path.key(key), out);
                }
            }
        }
        _ => {}
    }
}

/// Whether every `(`, `[` and `{` is closed by its partner, properly nested.
fn balanced(text: &str) -> bool {
    let mut open = Vec::new();
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => open.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }
    open.is_empty()
}
