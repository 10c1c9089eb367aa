//! Anchor-based string templating.
//!
//! String values may embed `{{ anchor.property }}` tokens. The anchor names a
//! node declared with `&anchor` anywhere in the source tree, and the dotted
//! path walks into it (numeric segments index sequences). The token is
//! replaced by the text of the scalar it reaches.
//!
//! ```yaml
//! - &reconnaissance
//!   id: AML.TA0002
//!   name: Reconnaissance
//! - id: AML.T0000
//!   description: Used during {{reconnaissance.name}}.
//! ```
//!
//! Substitution is a single pass. A referenced value that itself contains a
//! token is an error rather than being expanded again.

use std::{fmt, sync::LazyLock};

use regex::{Captures, Regex};
use serde_yaml::Value;

use crate::domain::{FieldPath, ReferenceStore};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{\s*(.*?)\s*\}\}").expect("template token pattern is a valid regex")
});

/// Where a template error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// The ID of the object being resolved, or `matrix` for the header.
    pub object: String,
    /// The field holding the offending token.
    pub field: FieldPath,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.object, self.field)
    }
}

/// The reason a token could not be substituted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateErrorKind {
    /// No anchor with this name was declared.
    #[error("unknown anchor '{anchor}'")]
    UnknownAnchor {
        /// The anchor name.
        anchor: String,
    },

    /// The anchored value has no such property.
    #[error("anchor '{anchor}' has no property '{property}'")]
    UnknownProperty {
        /// The anchor name.
        anchor: String,
        /// The dotted property path as written.
        property: String,
    },

    /// The reference resolves to a mapping or sequence.
    #[error("'{expression}' does not refer to a scalar value")]
    NotScalar {
        /// The expression inside the braces.
        expression: String,
    },

    /// The referenced value contains a template token itself.
    #[error("'{expression}' refers to a value that contains a template token")]
    ChainedReference {
        /// The expression inside the braces.
        expression: String,
    },

    /// The expression is empty or has an empty segment.
    #[error("malformed template token '{token}'")]
    Malformed {
        /// The whole token, braces included.
        token: String,
    },
}

/// A template token that could not be substituted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct TemplateError {
    /// Where the token was found.
    pub location: Location,
    /// What went wrong.
    pub kind: TemplateErrorKind,
}

/// Substitutes template tokens using the anchors of a [`ReferenceStore`].
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    store: &'a ReferenceStore,
}

impl<'a> TemplateResolver<'a> {
    /// Creates a resolver over the given store.
    #[must_use]
    pub const fn new(store: &'a ReferenceStore) -> Self {
        Self { store }
    }

    /// Substitutes every token in every string inside `value`, in place.
    ///
    /// Mapping keys are left untouched. `object` names the value in errors.
    ///
    /// # Errors
    ///
    /// Returns the first token that cannot be substituted, in document order.
    pub fn resolve(&self, value: &mut Value, object: &str) -> Result<(), TemplateError> {
        self.walk(value, &FieldPath::root(), object)
    }

    fn walk(&self, value: &mut Value, path: &FieldPath, object: &str) -> Result<(), TemplateError> {
        match value {
            Value::String(text) => {
                if let Some(rendered) = self.render(text).map_err(|kind| TemplateError {
                    location: Location {
                        object: object.to_string(),
                        field: path.clone(),
                    },
                    kind,
                })? {
                    *text = rendered;
                }
                Ok(())
            }
            Value::Sequence(items) => items
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, item)| self.walk(item, &path.index(i), object)),
            Value::Mapping(mapping) => mapping.iter_mut().try_for_each(|(key, item)| {
                let field = key
                    .as_str()
                    .map_or_else(|| path.clone(), |key| path.key(key));
                self.walk(item, &field, object)
            }),
            Value::Tagged(tagged) => self.walk(&mut tagged.value, path, object),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    /// Substitutes the tokens in a single string.
    ///
    /// Returns `None` when the text contains no tokens.
    ///
    /// # Errors
    ///
    /// Returns the reason the first failing token could not be substituted.
    pub fn render(&self, text: &str) -> Result<Option<String>, TemplateErrorKind> {
        if !TOKEN.is_match(text) {
            return Ok(None);
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for captures in TOKEN.captures_iter(text) {
            let Some(token) = captures.get(0) else {
                continue;
            };
            out.push_str(&text[last..token.start()]);
            out.push_str(&self.lookup(&captures)?);
            last = token.end();
        }
        out.push_str(&text[last..]);
        Ok(Some(out))
    }

    fn lookup(&self, captures: &Captures<'_>) -> Result<String, TemplateErrorKind> {
        let token = captures.get(0).map_or("", |m| m.as_str());
        let expression = captures.get(1).map_or("", |m| m.as_str());

        let mut segments = expression.split('.');
        let anchor = segments.next().unwrap_or_default();
        if anchor.is_empty() || expression.split('.').any(str::is_empty) {
            return Err(TemplateErrorKind::Malformed {
                token: token.to_string(),
            });
        }

        let mut current = self
            .store
            .anchor(anchor)
            .ok_or_else(|| TemplateErrorKind::UnknownAnchor {
                anchor: anchor.to_string(),
            })?;

        for segment in segments {
            let child = match current {
                Value::Mapping(mapping) => mapping.get(segment),
                Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = child.ok_or_else(|| TemplateErrorKind::UnknownProperty {
                anchor: anchor.to_string(),
                property: expression[anchor.len() + 1..].to_string(),
            })?;
        }

        let text = scalar_text(current).ok_or_else(|| TemplateErrorKind::NotScalar {
            expression: expression.to_string(),
        })?;
        if TOKEN.is_match(&text) {
            return Err(TemplateErrorKind::ChainedReference {
                expression: expression.to_string(),
            });
        }
        Ok(text)
    }
}

/// The text a scalar contributes when substituted into a string.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use test_case::test_case;

    use super::*;
    use crate::domain::Declarations;

    fn store() -> ReferenceStore {
        let anchors = BTreeMap::from([
            (
                "recon".to_string(),
                serde_yaml::from_str(
                    "id: AML.TA0002\nname: Reconnaissance\nrank: 3\nactive: true\nretired: null\naliases: [Recon, Scouting]\n",
                )
                .unwrap(),
            ),
            ("version".to_string(), Value::String("4.5.0".to_string())),
            (
                "chained".to_string(),
                serde_yaml::from_str("name: See {{recon.name}}").unwrap(),
            ),
        ]);
        ReferenceStore::build(anchors, Vec::new(), &Declarations::default()).unwrap()
    }

    fn render(text: &str) -> Result<Option<String>, TemplateErrorKind> {
        TemplateResolver::new(&store()).render(text)
    }

    #[test_case("{{recon.name}}", "Reconnaissance"; "property")]
    #[test_case("Used in {{ recon.id }} first", "Used in AML.TA0002 first"; "whitespace inside braces")]
    #[test_case("{{recon.rank}}/{{recon.active}}", "3/true"; "numbers and booleans")]
    #[test_case("[{{recon.retired}}]", "[]"; "null is empty")]
    #[test_case("{{recon.aliases.1}}", "Scouting"; "sequence index")]
    #[test_case("v{{version}}", "v4.5.0"; "bare anchor")]
    fn substitutes_scalars(text: &str, expected: &str) {
        assert_eq!(render(text).unwrap().as_deref(), Some(expected));
    }

    #[test]
    fn text_without_tokens_is_untouched() {
        assert_eq!(render("plain { text } with {braces}").unwrap(), None);
    }

    #[test]
    fn unknown_anchor() {
        assert_eq!(
            render("{{missing.name}}").unwrap_err(),
            TemplateErrorKind::UnknownAnchor {
                anchor: "missing".to_string()
            }
        );
    }

    #[test]
    fn unknown_property() {
        assert_eq!(
            render("{{recon.summary}}").unwrap_err(),
            TemplateErrorKind::UnknownProperty {
                anchor: "recon".to_string(),
                property: "summary".to_string()
            }
        );
    }

    #[test]
    fn collections_are_not_scalars() {
        assert!(matches!(
            render("{{recon.aliases}}").unwrap_err(),
            TemplateErrorKind::NotScalar { .. }
        ));
        assert!(matches!(
            render("{{recon}}").unwrap_err(),
            TemplateErrorKind::NotScalar { .. }
        ));
    }

    #[test]
    fn chained_references_are_rejected() {
        assert_eq!(
            render("{{chained.name}}").unwrap_err(),
            TemplateErrorKind::ChainedReference {
                expression: "chained.name".to_string()
            }
        );
    }

    #[test_case("{{}}"; "empty")]
    #[test_case("{{ recon..name }}"; "empty segment")]
    #[test_case("{{.name}}"; "missing anchor")]
    fn malformed_tokens(text: &str) {
        assert!(matches!(
            render(text).unwrap_err(),
            TemplateErrorKind::Malformed { .. }
        ));
    }

    #[test]
    fn resolves_nested_values_in_place() {
        let store = store();
        let mut object: Value = serde_yaml::from_str(
            "id: AML.T0000\nprocedure:\n  - tactic: '{{recon.id}}'\n    description: During {{recon.name}}.\n",
        )
        .unwrap();

        TemplateResolver::new(&store)
            .resolve(&mut object, "AML.T0000")
            .unwrap();

        assert_eq!(object["procedure"][0]["tactic"].as_str(), Some("AML.TA0002"));
        assert_eq!(
            object["procedure"][0]["description"].as_str(),
            Some("During Reconnaissance.")
        );
    }

    #[test]
    fn errors_carry_the_field_path() {
        let store = store();
        let mut object: Value =
            serde_yaml::from_str("procedure:\n  - ok: fine\n  - tactic: '{{nope.id}}'\n").unwrap();

        let error = TemplateResolver::new(&store)
            .resolve(&mut object, "AML.CS0000")
            .unwrap_err();

        assert_eq!(error.location.object, "AML.CS0000");
        assert_eq!(error.location.field.to_string(), "procedure[1].tactic");
        assert_eq!(
            error.to_string(),
            "AML.CS0000 (procedure[1].tactic): unknown anchor 'nope'"
        );
    }
}
