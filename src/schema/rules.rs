//! Per-kind rule sets.
//!
//! Each rule set is a plain function over an [`ObjectCheck`], which records
//! violations as it goes so that every problem with an object is reported,
//! not just the first.

use chrono::NaiveDate;
use serde_yaml::{Mapping, Sequence, Value};

use crate::{
    domain::{
        DataObject, FieldPath, IdPattern, ObjectKind,
        object::{ID, OBJECT_TYPE},
    },
    schema::Violation,
};

const NAME: &str = "name";
const DESCRIPTION: &str = "description";
const TACTICS: &str = "tactics";
const TECHNIQUES: &str = "techniques";
const USE: &str = "use";
const SUMMARY: &str = "summary";
const INCIDENT_DATE: &str = "incident-date";
const GRANULARITY: &str = "incident-date-granularity";
const PROCEDURE: &str = "procedure";
const REPORTED_BY: &str = "reported-by";
const REFERENCES: &str = "references";

/// The key linking a sub-technique to its parent technique.
pub const SUBTECHNIQUE_OF: &str = "subtechnique-of";

const GRANULARITIES: [&str; 3] = ["YEAR", "MONTH", "DATE"];

/// Checks an object against the rule set selected by its `object-type`.
pub(super) fn check(object: &DataObject) -> Vec<Violation> {
    let mut check = ObjectCheck::new(object);
    match object.kind() {
        Some(ObjectKind::Tactic) => tactic(&mut check),
        Some(ObjectKind::Technique) if object.get(SUBTECHNIQUE_OF).is_some() => {
            subtechnique(&mut check);
        }
        Some(ObjectKind::Technique) => technique(&mut check),
        Some(ObjectKind::Mitigation) => mitigation(&mut check),
        Some(ObjectKind::CaseStudy) => case_study(&mut check),
        None => unknown_kind(&mut check),
    }
    check.finish()
}

fn tactic(check: &mut ObjectCheck<'_>) {
    check.id(IdPattern::Tactic);
    check.text(NAME);
    check.text(DESCRIPTION);
    check.only(&[ID, OBJECT_TYPE, NAME, DESCRIPTION]);
}

fn technique(check: &mut ObjectCheck<'_>) {
    check.id(IdPattern::Technique);
    check.text(NAME);
    check.text(DESCRIPTION);

    let root = FieldPath::root();
    if let Some(tactics) = check
        .optional(TACTICS)
        .and_then(|value| check.sequence(value, &root.key(TACTICS)))
    {
        for (i, tactic) in tactics.iter().enumerate() {
            check.id_value(tactic, &root.key(TACTICS).index(i), &[IdPattern::Tactic]);
        }
    }

    check.only(&[ID, OBJECT_TYPE, NAME, DESCRIPTION, TACTICS]);
}

fn subtechnique(check: &mut ObjectCheck<'_>) {
    check.id(IdPattern::Subtechnique);
    check.text(NAME);
    check.text(DESCRIPTION);
    if let Some(parent) = check.required(SUBTECHNIQUE_OF) {
        check.id_value(
            parent,
            &FieldPath::from(SUBTECHNIQUE_OF),
            &[IdPattern::Technique],
        );
    }
    check.only(&[ID, OBJECT_TYPE, NAME, DESCRIPTION, SUBTECHNIQUE_OF]);
}

fn mitigation(check: &mut ObjectCheck<'_>) {
    check.id(IdPattern::Mitigation);
    check.text(NAME);
    check.text(DESCRIPTION);

    let path = FieldPath::from(TECHNIQUES);
    if let Some(techniques) = check
        .optional(TECHNIQUES)
        .and_then(|value| check.sequence(value, &path))
    {
        let patterns = [IdPattern::Technique, IdPattern::Subtechnique];
        for (i, entry) in techniques.iter().enumerate() {
            let entry_path = path.index(i);
            match entry {
                Value::Mapping(usage) => {
                    if let Some(id) = check.required_in(usage, &entry_path, ID) {
                        check.id_value(id, &entry_path.key(ID), &patterns);
                    }
                    if let Some(text) = check.required_in(usage, &entry_path, USE) {
                        check.string(text, &entry_path.key(USE));
                    }
                    check.only_in(usage, &entry_path, &[ID, USE]);
                }
                other => check.id_value(other, &entry_path, &patterns),
            }
        }
    }

    check.only(&[ID, OBJECT_TYPE, NAME, DESCRIPTION, TECHNIQUES]);
}

fn case_study(check: &mut ObjectCheck<'_>) {
    check.id(IdPattern::CaseStudy);
    check.text(NAME);
    check.text(SUMMARY);
    check.text(REPORTED_BY);

    if let Some(date) = check.required(INCIDENT_DATE) {
        let path = FieldPath::from(INCIDENT_DATE);
        if let Some(date) = check.string(date, &path) {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                check.report(path, format!("'{date}' is not a date of the form YYYY-MM-DD"));
            }
        }
    }

    if let Some(granularity) = check.required(GRANULARITY) {
        let path = FieldPath::from(GRANULARITY);
        match check.string(granularity, &path) {
            Some(granularity) if !GRANULARITIES.contains(&granularity) => check.report(
                path,
                format!("'{granularity}' is not one of YEAR, MONTH, DATE"),
            ),
            _ => {}
        }
    }

    procedure(check);
    references(check);

    check.only(&[
        ID,
        OBJECT_TYPE,
        NAME,
        SUMMARY,
        INCIDENT_DATE,
        GRANULARITY,
        PROCEDURE,
        REPORTED_BY,
        REFERENCES,
    ]);
}

fn procedure(check: &mut ObjectCheck<'_>) {
    let path = FieldPath::from(PROCEDURE);
    let Some(steps) = check
        .required(PROCEDURE)
        .and_then(|value| check.sequence(value, &path))
    else {
        return;
    };
    if steps.is_empty() {
        check.report(path, "must contain at least one step");
        return;
    }

    for (i, step) in steps.iter().enumerate() {
        let step_path = path.index(i);
        let Some(step) = check.mapping(step, &step_path) else {
            continue;
        };
        if let Some(tactic) = check.required_in(step, &step_path, "tactic") {
            check.id_value(tactic, &step_path.key("tactic"), &[IdPattern::Tactic]);
        }
        if let Some(technique) = check.required_in(step, &step_path, "technique") {
            check.id_value(
                technique,
                &step_path.key("technique"),
                &[IdPattern::Technique, IdPattern::Subtechnique],
            );
        }
        if let Some(description) = check.required_in(step, &step_path, DESCRIPTION) {
            check.string(description, &step_path.key(DESCRIPTION));
        }
        check.only_in(step, &step_path, &["tactic", "technique", DESCRIPTION]);
    }
}

fn references(check: &mut ObjectCheck<'_>) {
    let path = FieldPath::from(REFERENCES);
    let Some(references) = check.optional(REFERENCES) else {
        return;
    };
    if references.is_null() {
        return;
    }
    let Some(references) = check.sequence(references, &path) else {
        return;
    };

    for (i, reference) in references.iter().enumerate() {
        let reference_path = path.index(i);
        let Some(reference) = check.mapping(reference, &reference_path) else {
            continue;
        };
        for key in ["title", "url"] {
            match check.required_in(reference, &reference_path, key) {
                Some(value) if !value.is_null() => {
                    check.string(value, &reference_path.key(key));
                }
                _ => {}
            }
        }
        check.only_in(reference, &reference_path, &["title", "url"]);
    }
}

fn unknown_kind(check: &mut ObjectCheck<'_>) {
    let path = FieldPath::from(OBJECT_TYPE);
    let Some(value) = check.required(OBJECT_TYPE) else {
        return;
    };
    if let Some(object_type) = check.string(value, &path) {
        check.report(
            path,
            format!(
                "unknown object type '{object_type}', expected one of {}",
                ObjectKind::ALL.map(ObjectKind::as_str).join(", ")
            ),
        );
    }
}

/// Accumulates the violations of a single object.
struct ObjectCheck<'a> {
    fields: &'a Mapping,
    object_id: String,
    object_type: String,
    violations: Vec<Violation>,
}

impl<'a> ObjectCheck<'a> {
    fn new(object: &'a DataObject) -> Self {
        Self {
            fields: object.fields(),
            object_id: object.label(),
            object_type: object.object_type().unwrap_or("<none>").to_string(),
            violations: Vec::new(),
        }
    }

    fn finish(self) -> Vec<Violation> {
        self.violations
    }

    fn report(&mut self, field: FieldPath, reason: impl Into<String>) {
        self.violations.push(Violation {
            object_id: self.object_id.clone(),
            object_type: self.object_type.clone(),
            field,
            reason: reason.into(),
        });
    }

    fn optional(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key)
    }

    fn required(&mut self, key: &str) -> Option<&'a Value> {
        let fields = self.fields;
        self.required_in(fields, &FieldPath::root(), key)
    }

    fn required_in(&mut self, map: &'a Mapping, base: &FieldPath, key: &str) -> Option<&'a Value> {
        let value = map.get(key);
        if value.is_none() {
            self.report(base.key(key), "missing required field");
        }
        value
    }

    /// A required string field at the top level of the object.
    fn text(&mut self, key: &str) {
        if let Some(value) = self.required(key) {
            self.string(value, &FieldPath::from(key));
        }
    }

    /// The object's own `id`, which must match `pattern`.
    fn id(&mut self, pattern: IdPattern) {
        if let Some(value) = self.required(ID) {
            self.id_value(value, &FieldPath::from(ID), &[pattern]);
        }
    }

    fn id_value(&mut self, value: &'a Value, path: &FieldPath, patterns: &[IdPattern]) {
        let Some(id) = self.string(value, path) else {
            return;
        };
        if !patterns.iter().any(|pattern| pattern.matches(id)) {
            let expected = patterns
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or ");
            self.report(path.clone(), format!("'{id}' is not a valid {expected}"));
        }
    }

    fn string(&mut self, value: &'a Value, path: &FieldPath) -> Option<&'a str> {
        let text = value.as_str();
        if text.is_none() {
            self.report(
                path.clone(),
                format!("expected a string, found {}", describe(value)),
            );
        }
        text
    }

    fn sequence(&mut self, value: &'a Value, path: &FieldPath) -> Option<&'a Sequence> {
        let items = value.as_sequence();
        if items.is_none() {
            self.report(
                path.clone(),
                format!("expected a list, found {}", describe(value)),
            );
        }
        items
    }

    fn mapping(&mut self, value: &'a Value, path: &FieldPath) -> Option<&'a Mapping> {
        let map = value.as_mapping();
        if map.is_none() {
            self.report(
                path.clone(),
                format!("expected a mapping, found {}", describe(value)),
            );
        }
        map
    }

    /// Reports every top-level field not in `allowed`.
    fn only(&mut self, allowed: &[&str]) {
        let fields = self.fields;
        self.only_in(fields, &FieldPath::root(), allowed);
    }

    fn only_in(&mut self, map: &'a Mapping, base: &FieldPath, allowed: &[&str]) {
        for key in map.keys() {
            match key.as_str() {
                Some(name) if allowed.contains(&name) => {}
                Some(name) => self.report(base.key(name), "unexpected field"),
                None => self.report(
                    base.clone(),
                    format!("unexpected non-string key {}", describe(key)),
                ),
            }
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn violations(yaml: &str) -> Vec<Violation> {
        check(&DataObject::new(serde_yaml::from_str(yaml).unwrap()))
    }

    fn fields(violations: &[Violation]) -> Vec<String> {
        violations.iter().map(|v| v.field.to_string()).collect()
    }

    const TACTIC: &str = "id: AML.TA0002\nobject-type: tactic\nname: Reconnaissance\ndescription: Gathering information.\n";

    const CASE_STUDY: &str = "\
id: AML.CS0000
object-type: case-study
name: Evasion of a Malware Classifier
summary: Researchers bypassed a deployed model.
incident-date: 2019-06-01
incident-date-granularity: MONTH
procedure:
  - tactic: AML.TA0002
    technique: AML.T0000.001
    description: Looked up public papers.
reported-by: A Researcher
references:
  - title: Write-up
    url: https://example.com/write-up
  - title: Talk
    url: null
";

    #[test_case(TACTIC; "tactic")]
    #[test_case("id: AML.T0000\nobject-type: technique\nname: Search\ndescription: Searching.\ntactics:\n  - AML.TA0002\n"; "technique")]
    #[test_case("id: AML.T0000.001\nobject-type: technique\nname: Papers\ndescription: Papers.\nsubtechnique-of: AML.T0000\n"; "sub-technique")]
    #[test_case("id: AML.M0000\nobject-type: mitigation\nname: Limit\ndescription: Limit it.\ntechniques:\n  - AML.T0000\n  - id: AML.T0000.001\n    use: Restrict access.\n"; "mitigation")]
    #[test_case(CASE_STUDY; "case study")]
    fn valid_objects_have_no_violations(yaml: &str) {
        let found = violations(yaml);
        assert!(found.is_empty(), "unexpected violations: {found:?}");
    }

    #[test]
    fn one_missing_field_is_one_violation() {
        let found = violations("id: AML.TA0002\nobject-type: tactic\nname: Reconnaissance\n");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object_id, "AML.TA0002");
        assert_eq!(found[0].object_type, "tactic");
        assert_eq!(found[0].field.to_string(), "description");
        assert_eq!(found[0].reason, "missing required field");
    }

    #[test]
    fn collects_every_violation_of_an_object() {
        let found = violations(
            "id: AML.T0000\nobject-type: tactic\nname: [not, text]\ndescription: Fine.\nextra: true\n",
        );

        assert_eq!(fields(&found), ["id", "name", "extra"]);
    }

    #[test]
    fn sub_techniques_may_not_list_tactics() {
        let found = violations(
            "id: AML.T0000.001\nobject-type: technique\nname: Papers\ndescription: Papers.\nsubtechnique-of: AML.T0000.000\ntactics: [AML.TA0002]\n",
        );

        assert_eq!(fields(&found), ["subtechnique-of", "tactics"]);
    }

    #[test]
    fn technique_ids_are_checked_against_the_top_level_pattern() {
        let found = violations(
            "id: AML.T0000.001\nobject-type: technique\nname: Papers\ndescription: Papers.\n",
        );

        assert_eq!(fields(&found), ["id"]);
        assert!(found[0].reason.contains("technique ID"));
    }

    #[test]
    fn mitigation_usages_are_checked() {
        let found = violations(
            "id: AML.M0000\nobject-type: mitigation\nname: Limit\ndescription: Limit it.\ntechniques:\n  - AML.TA0001\n  - id: AML.T0001\n    note: wrong key\n",
        );

        assert_eq!(
            fields(&found),
            ["techniques[0]", "techniques[1].use", "techniques[1].note"]
        );
    }

    #[test_case("incident-date: 2019-13-40", "incident-date"; "impossible date")]
    #[test_case("incident-date: June 2019", "incident-date"; "free text date")]
    #[test_case("incident-date-granularity: WEEK", "incident-date-granularity"; "unknown granularity")]
    #[test_case("procedure: []", "procedure"; "empty procedure")]
    #[test_case("references: [{title: Write-up}]", "references[0].url"; "reference without url")]
    #[test_case("references: {title: Write-up}", "references"; "references not a list")]
    fn case_study_field_errors(replacement: &str, field: &str) {
        let key = replacement.split(':').next().unwrap();
        let mut object: Mapping = serde_yaml::from_str(CASE_STUDY).unwrap();
        let patch: Mapping = serde_yaml::from_str(replacement).unwrap();
        object.insert(Value::from(key), patch[key].clone());

        let found = check(&DataObject::new(object));

        assert_eq!(fields(&found), [field]);
    }

    #[test]
    fn null_references_are_allowed() {
        let yaml = CASE_STUDY.split("references:").next().unwrap().to_string() + "references:\n";
        assert!(violations(&yaml).is_empty());
    }

    #[test]
    fn procedure_steps_are_checked() {
        let yaml = CASE_STUDY.replace("technique: AML.T0000.001", "technique: AML.TA0002");

        let found = violations(&yaml);

        assert_eq!(fields(&found), ["procedure[0].technique"]);
    }

    #[test_case("name: Orphan\n", "missing required field"; "missing object type")]
    #[test_case("object-type: case_study\n", "unknown object type 'case_study', expected one of tactic, technique, mitigation, case-study"; "unknown object type")]
    fn unknown_kinds(yaml: &str, reason: &str) {
        let found = violations(yaml);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field.to_string(), "object-type");
        assert_eq!(found[0].reason, reason);
        assert_eq!(found[0].object_id, "<no id>");
    }
}
