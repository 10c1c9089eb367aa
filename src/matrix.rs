//! Compilation of a matrix definition into a single distributable document.
//!
//! A matrix definition is the root of a source tree:
//!
//! ```yaml
//! ---
//! id: ATLAS
//! name: Adversarial Threat Landscape for AI Systems
//! version: 4.5.0
//! tactics:
//!   - "{{reconnaissance.id}}"
//!   - "{{resource_development.id}}"
//! data:
//!   - !include tactics.yaml
//!   - !include techniques.yaml
//!   - !include case-studies/*.yaml
//! ```
//!
//! Compiling it expands every include, resolves every template token, sorts
//! the objects into categories (`tactics`, `techniques`, `mitigations`,
//! `case-studies`) and validates the result. The compiled document is written
//! as `<id>.yaml` and `<id>.json`.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_yaml::{Mapping, Value};

use crate::{
    domain::{
        Config, DataObject, DuplicateIdError, FieldPath, ObjectKind, ReferenceStore,
        object::{DATA, ID},
    },
    schema::{ValidationReport, Validator},
    storage::{IncludeError, IncludeExpander, directory},
    template::{TemplateError, TemplateResolver},
};

const TACTICS: &str = "tactics";
const CATEGORIES: &str = "categories";
const HEADER_FIELDS: [&str; 3] = ["id", "name", "version"];

/// The location used for template errors in the matrix definition itself.
const MATRIX_LOCATION: &str = "matrix";

/// Errors that abort compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Include expansion failed.
    #[error(transparent)]
    Include(#[from] IncludeError),

    /// A template token could not be substituted.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// An object ID is declared more than once.
    #[error(transparent)]
    DuplicateId(#[from] DuplicateIdError),

    /// The matrix `tactics` list names a tactic that no object declares.
    #[error("matrix lists tactic '{0}' but no tactic object declares it")]
    UnknownTactic(String),

    /// The matrix definition is structurally wrong.
    #[error("invalid matrix definition: {0}")]
    InvalidMatrix(String),

    /// The compiled document could not be written.
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// The compiled document has schema violations and was not written.
    #[error("compiled matrix has schema violations: {0}")]
    Invalid(ValidationReport),
}

/// Errors that occur while serializing or writing compiled output.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// An output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The file or directory being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The document could not be serialized as YAML.
    #[error("failed to serialize YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document could not be serialized as JSON.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Compiles a matrix definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixCompiler {
    matrix: PathBuf,
    max_include_depth: usize,
    check_brackets: bool,
}

/// A compiled, validated (but not necessarily valid) matrix.
#[derive(Debug, Clone)]
pub struct CompiledMatrix {
    id: String,
    document: Value,
    report: ValidationReport,
    files: Vec<PathBuf>,
    source_root: PathBuf,
}

/// The files written for a compiled matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// The YAML artifact.
    pub yaml: PathBuf,
    /// The JSON artifact.
    pub json: PathBuf,
}

/// The header of a matrix definition, after template resolution.
#[derive(Debug)]
struct MatrixDefinition {
    id: String,
    header: Mapping,
    tactics: Option<Vec<String>>,
    categories: Vec<ObjectKind>,
}

impl MatrixCompiler {
    /// Creates a compiler for the matrix definition at `matrix`, with the
    /// default include depth and bracket checking enabled.
    #[must_use]
    pub fn new(matrix: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            matrix: matrix.into(),
            max_include_depth: defaults.max_include_depth(),
            check_brackets: defaults.check_brackets,
        }
    }

    /// Creates a compiler from the settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            matrix: config.matrix().to_path_buf(),
            max_include_depth: config.max_include_depth(),
            check_brackets: config.check_brackets,
        }
    }

    /// Sets how deeply includes may nest.
    #[must_use]
    pub const fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Enables or disables the bracket balance check.
    #[must_use]
    pub const fn with_bracket_check(mut self, enabled: bool) -> Self {
        self.check_brackets = enabled;
        self
    }

    /// The matrix definition this compiler reads.
    #[must_use]
    pub fn matrix(&self) -> &Path {
        &self.matrix
    }

    /// Compiles the matrix in memory and validates the result.
    ///
    /// Schema violations do not cause an error here; they are returned in the
    /// [`CompiledMatrix::report`].
    ///
    /// # Errors
    ///
    /// Fails on any structural problem: include errors, unresolvable
    /// templates, duplicate IDs, an invalid matrix definition, or a listed
    /// tactic that is never declared.
    pub fn compile(&self) -> Result<CompiledMatrix, CompileError> {
        let expansion = IncludeExpander::new(self.max_include_depth).expand(&self.matrix)?;

        let Value::Mapping(mut root) = expansion.document else {
            return Err(CompileError::InvalidMatrix(
                "the matrix definition must be a mapping".to_string(),
            ));
        };
        let source_root = expansion
            .files
            .first()
            .and_then(|path| path.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let data = root.remove(DATA).ok_or_else(|| {
            CompileError::InvalidMatrix("the matrix definition has no 'data' list".to_string())
        })?;
        let mut objects = Vec::new();
        flatten(data, &FieldPath::from(DATA), &mut objects)?;

        let store = ReferenceStore::build(expansion.anchors, objects, &expansion.declarations)?;
        let resolver = TemplateResolver::new(&store);

        let mut header = Value::Mapping(root);
        resolver.resolve(&mut header, MATRIX_LOCATION)?;
        let definition = MatrixDefinition::parse(header)?;

        let resolved = store
            .objects()
            .map(|object| -> Result<DataObject, CompileError> {
                let mut value = Value::Mapping(object.fields().clone());
                resolver.resolve(&mut value, &object.label())?;
                Ok(match value {
                    Value::Mapping(fields) => DataObject::new(fields),
                    _ => object.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        store.check_resolved(&resolved, &expansion.declarations)?;

        let (document, unassembled) = assemble(&definition, resolved)?;
        let report = Validator::new(self.check_brackets).validate(&document, &unassembled);

        tracing::debug!(
            "Compiled matrix '{}' from {} files ({})",
            definition.id,
            expansion.files.len(),
            report
        );

        Ok(CompiledMatrix {
            id: definition.id,
            document,
            report,
            files: expansion.files,
            source_root,
        })
    }

    /// Compiles the matrix and writes it to `output`.
    ///
    /// Nothing is written if validation finds any violation.
    ///
    /// # Errors
    ///
    /// Fails for the reasons [`compile`](Self::compile) does, with
    /// [`CompileError::Invalid`] when the compiled document has violations,
    /// or when the artifacts cannot be written.
    pub fn build(&self, output: &Path) -> Result<Artifacts, CompileError> {
        let compiled = self.compile()?;
        if !compiled.report.is_clean() {
            return Err(CompileError::Invalid(compiled.report));
        }
        Ok(compiled.write(output)?)
    }
}

impl CompiledMatrix {
    /// The matrix ID, which names the output files.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The compiled document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// The validation report for the compiled document.
    #[must_use]
    pub const fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Every source file read, in load order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// YAML files next to or below the matrix definition that no include
    /// directive reached.
    #[must_use]
    pub fn unreferenced_sources(&self) -> Vec<PathBuf> {
        directory::unreferenced(&self.source_root, &self.files)
    }

    /// Renders the document as YAML with an explicit document start marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn to_yaml(&self) -> Result<String, EmitError> {
        Ok(format!("---\n{}", serde_yaml::to_string(&self.document)?))
    }

    /// Renders the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn to_json(&self) -> Result<String, EmitError> {
        let mut json = serde_json::to_string_pretty(&self.document)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes `<id>.yaml` and `<id>.json` into `dir`, creating it if needed.
    ///
    /// Both documents are rendered before either file is written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem operation fails.
    pub fn write(&self, dir: &Path) -> Result<Artifacts, EmitError> {
        let yaml = self.to_yaml()?;
        let json = self.to_json()?;

        fs::create_dir_all(dir).map_err(|source| EmitError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let artifacts = Artifacts {
            yaml: dir.join(format!("{}.yaml", self.id)),
            json: dir.join(format!("{}.json", self.id)),
        };
        for (path, content) in [(&artifacts.yaml, yaml), (&artifacts.json, json)] {
            fs::write(path, content).map_err(|source| EmitError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Wrote {}", path.display());
        }
        Ok(artifacts)
    }
}

impl MatrixDefinition {
    fn parse(header: Value) -> Result<Self, CompileError> {
        let invalid = |message: String| CompileError::InvalidMatrix(message);

        let Value::Mapping(mut root) = header else {
            return Err(invalid("the matrix definition must be a mapping".to_string()));
        };

        let id = match root.get(ID) {
            Some(Value::String(id)) if is_file_stem(id) => id.clone(),
            Some(Value::String(id)) => {
                return Err(invalid(format!("'{id}' cannot be used as a file name")));
            }
            Some(_) => return Err(invalid("'id' must be a string".to_string())),
            None => return Err(invalid("missing 'id'".to_string())),
        };

        let tactics = root
            .remove(TACTICS)
            .map(|tactics| {
                strings(&tactics).ok_or_else(|| invalid("'tactics' must be a list of IDs".to_string()))
            })
            .transpose()?;
        if let Some(id) = tactics.as_deref().and_then(repeated) {
            return Err(invalid(format!("tactic '{id}' listed twice")));
        }

        let categories = match root.remove(CATEGORIES) {
            None => ObjectKind::ALL.to_vec(),
            Some(value) => strings(&value)
                .ok_or_else(|| invalid("'categories' must be a list of object types".to_string()))?
                .iter()
                .map(|kind| kind.parse::<ObjectKind>().map_err(|e| invalid(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if let Some(kind) = repeated(&categories) {
            return Err(invalid(format!("category '{kind}' listed twice")));
        }

        let mut header = Mapping::new();
        for key in HEADER_FIELDS {
            if let Some(value) = root.remove(key) {
                header.insert(Value::from(key), value);
            }
        }
        for (key, _) in root {
            tracing::debug!("Ignoring matrix field {key:?}");
        }

        Ok(Self {
            id,
            header,
            tactics,
            categories,
        })
    }
}

fn is_file_stem(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}

fn repeated<T: PartialEq>(items: &[T]) -> Option<&T> {
    items
        .iter()
        .enumerate()
        .find(|(i, item)| items[..*i].contains(item))
        .map(|(_, item)| item)
}

fn strings(value: &Value) -> Option<Vec<String>> {
    value
        .as_sequence()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Collects the data objects of the `data` list, flattening nested lists.
fn flatten(value: Value, path: &FieldPath, out: &mut Vec<DataObject>) -> Result<(), CompileError> {
    match value {
        Value::Sequence(items) => {
            for (i, item) in items.into_iter().enumerate() {
                flatten(item, &path.index(i), out)?;
            }
            Ok(())
        }
        Value::Mapping(fields) => {
            out.push(DataObject::new(fields));
            Ok(())
        }
        Value::Null => Ok(()),
        _ => Err(CompileError::InvalidMatrix(format!(
            "{path} must be an object or a list of objects"
        ))),
    }
}

/// Builds the compiled document from resolved objects.
///
/// Returns the document and the objects whose kind is unknown, which belong
/// in no category.
fn assemble(
    definition: &MatrixDefinition,
    objects: Vec<DataObject>,
) -> Result<(Value, Vec<DataObject>), CompileError> {
    let mut document = definition.header.clone();
    let mut unassembled = Vec::new();
    let mut by_kind: Vec<(ObjectKind, Vec<DataObject>)> =
        ObjectKind::ALL.iter().map(|&kind| (kind, Vec::new())).collect();

    for object in objects {
        match object.kind() {
            Some(kind) => {
                if let Some((_, bucket)) = by_kind.iter_mut().find(|(k, _)| *k == kind) {
                    bucket.push(object);
                }
            }
            None => unassembled.push(object),
        }
    }

    for kind in &definition.categories {
        let Some((_, bucket)) = by_kind.iter_mut().find(|(k, _)| k == kind) else {
            continue;
        };
        let members = std::mem::take(bucket);
        let members = match (kind, &definition.tactics) {
            (ObjectKind::Tactic, Some(order)) => order_tactics(order, members)?,
            _ => members,
        };
        document.insert(
            Value::from(kind.category()),
            Value::Sequence(members.into_iter().map(DataObject::into_value).collect()),
        );
    }

    for (kind, leftover) in by_kind {
        if !leftover.is_empty() {
            tracing::debug!(
                "Dropping {} {kind} object(s): category not selected",
                leftover.len()
            );
        }
    }

    Ok((Value::Mapping(document), unassembled))
}

/// Orders tactics as the matrix lists them, dropping unlisted ones.
fn order_tactics(order: &[String], tactics: Vec<DataObject>) -> Result<Vec<DataObject>, CompileError> {
    let mut remaining: Vec<Option<DataObject>> = tactics.into_iter().map(Some).collect();

    let mut ordered = Vec::with_capacity(order.len());
    for id in order {
        let slot = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().and_then(DataObject::id) == Some(id.as_str()))
            .and_then(Option::take)
            .ok_or_else(|| CompileError::UnknownTactic(id.clone()))?;
        ordered.push(slot);
    }

    for tactic in remaining.into_iter().flatten() {
        tracing::warn!(
            "Tactic {} is not listed in the matrix and will be dropped",
            tactic.label()
        );
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    const MATRIX: &str = r#"---
id: ATLAS
name: Adversarial Threat Landscape for AI Systems
version: 4.5.0
tactics:
  - "{{t2.id}}"
  - "{{t1.id}}"
data:
  - !include data/tactics.yaml
  - !include data/techniques.yaml
  - !include data/case-studies/*.yaml
"#;

    const TACTICS: &str = "\
- &t1
  id: AML.TA0099
  object-type: tactic
  name: Test Tactic
  description: A tactic used in tests.
- &t2
  id: AML.TA0002
  object-type: tactic
  name: Reconnaissance
  description: Gathering information.
";

    const TECHNIQUES: &str = r#"- &search
  id: AML.T0000
  object-type: technique
  name: Search
  description: Performed during {{t1.name}}.
  tactics:
    - "{{t1.id}}"
"#;

    const CASE_STUDY: &str = r#"id: AML.CS0000
object-type: case-study
name: Searching in the open
summary: An actor used {{search.name}} to find targets.
incident-date: 2021-03-01
incident-date-granularity: MONTH
procedure:
  - tactic: "{{t2.id}}"
    technique: "{{search.id}}"
    description: Looked around.
reported-by: A Researcher
"#;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: TempDir::new().unwrap(),
            };
            fixture.write("matrix.yaml", MATRIX);
            fixture.write("data/tactics.yaml", TACTICS);
            fixture.write("data/techniques.yaml", TECHNIQUES);
            fixture.write("data/case-studies/AML.CS0000.yaml", CASE_STUDY);
            fixture
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn compiler(&self) -> MatrixCompiler {
            MatrixCompiler::new(self.dir.path().join("matrix.yaml"))
        }

        fn compile(&self) -> Result<CompiledMatrix, CompileError> {
            self.compiler().compile()
        }
    }

    fn ids(document: &Value, category: &str) -> Vec<String> {
        document[category]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|object| object["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn templates_resolve_into_both_artifacts() {
        let fixture = Fixture::new();
        let out = TempDir::new().unwrap();

        let artifacts = fixture.compiler().build(out.path()).unwrap();

        assert_eq!(artifacts.yaml, out.path().join("ATLAS.yaml"));
        let yaml = fs::read_to_string(&artifacts.yaml).unwrap();
        let json = fs::read_to_string(&artifacts.json).unwrap();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("description: Performed during Test Tactic."));
        assert!(json.contains(r#""description": "Performed during Test Tactic.""#));
        assert!(!yaml.contains("{{"));
        assert!(!json.contains("{{"));

        let reparsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            reparsed["techniques"][0]["tactics"][0].as_str(),
            Some("AML.TA0099")
        );
        assert_eq!(
            reparsed["case-studies"][0]["summary"].as_str(),
            Some("An actor used Search to find targets.")
        );
    }

    #[test]
    fn document_layout_follows_the_definition() {
        let compiled = Fixture::new().compile().unwrap();
        let document = compiled.document().as_mapping().unwrap();

        let keys: Vec<_> = document.keys().filter_map(Value::as_str).collect();
        assert_eq!(
            keys,
            ["id", "name", "version", "tactics", "techniques", "mitigations", "case-studies"]
        );
        assert_eq!(compiled.id(), "ATLAS");
        assert!(compiled.report().is_clean(), "{:?}", compiled.report());
    }

    #[test]
    fn tactics_follow_the_listed_order() {
        let compiled = Fixture::new().compile().unwrap();

        assert_eq!(
            ids(compiled.document(), "tactics"),
            ["AML.TA0002", "AML.TA0099"]
        );
    }

    #[test]
    fn unlisted_tactics_are_dropped() {
        let fixture = Fixture::new();
        fixture.write("matrix.yaml", &MATRIX.replace("  - \"{{t2.id}}\"\n", ""));

        let compiled = fixture.compile().unwrap();

        assert_eq!(ids(compiled.document(), "tactics"), ["AML.TA0099"]);
    }

    #[test]
    fn listed_tactic_must_exist() {
        let fixture = Fixture::new();
        fixture.write(
            "matrix.yaml",
            &MATRIX.replace("  - \"{{t2.id}}\"\n", "  - AML.TA0404\n"),
        );

        let error = fixture.compile().unwrap_err();

        assert!(matches!(error, CompileError::UnknownTactic(id) if id == "AML.TA0404"));
    }

    #[test_case("tactics:\n  - \"{{t2.id}}\"\n  - \"{{t1.id}}\"\n", "tactics:\n  - \"{{t2.id}}\"\n  - \"{{t2.id}}\"\n", "tactic 'AML.TA0002' listed twice"; "tactic")]
    #[test_case("data:\n", "categories: [technique, tactic, technique]\ndata:\n", "category 'technique' listed twice"; "category")]
    fn repeated_matrix_entries_are_rejected(from: &str, to: &str, message: &str) {
        let fixture = Fixture::new();
        fixture.write("matrix.yaml", &MATRIX.replace(from, to));

        let error = fixture.compile().unwrap_err();

        assert!(
            matches!(&error, CompileError::InvalidMatrix(m) if m == message),
            "{error:?}"
        );
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let fixture = Fixture::new();
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let a = fixture.compiler().build(first.path()).unwrap();
        let b = fixture.compiler().build(second.path()).unwrap();

        assert_eq!(fs::read(a.yaml).unwrap(), fs::read(b.yaml).unwrap());
        assert_eq!(fs::read(a.json).unwrap(), fs::read(b.json).unwrap());
    }

    #[test]
    fn duplicate_ids_abort_compilation() {
        let fixture = Fixture::new();
        fixture.write(
            "data/case-studies/AML.CS0001.yaml",
            &CASE_STUDY.replace("name: Searching in the open", "name: Copy"),
        );

        let error = fixture.compile().unwrap_err();

        let CompileError::DuplicateId(error) = error else {
            panic!("expected a duplicate ID error, got {error:?}");
        };
        assert_eq!(error.id, "AML.CS0000");
        assert_eq!(error.sources.len(), 2);
    }

    #[test]
    fn including_the_same_file_twice_is_a_duplicate() {
        let fixture = Fixture::new();
        fixture.write(
            "matrix.yaml",
            &MATRIX.replace(
                "  - !include data/techniques.yaml\n",
                "  - !include data/techniques.yaml\n  - !include data/techniques.yaml\n",
            ),
        );

        let error = fixture.compile().unwrap_err();

        let CompileError::DuplicateId(error) = error else {
            panic!("expected a duplicate ID error, got {error:?}");
        };
        assert_eq!(error.sources[0], error.sources[1]);
        assert!(error.sources[0].ends_with("techniques.yaml"));
    }

    #[test]
    fn templated_id_colliding_after_resolution_is_a_duplicate() {
        let fixture = Fixture::new();
        fixture.write(
            "data/techniques.yaml",
            &format!(
                "{TECHNIQUES}- id: \"{{{{search.id}}}}\"\n  object-type: technique\n  name: Copy\n  description: A copy.\n"
            ),
        );

        let error = fixture.compile().unwrap_err();

        let CompileError::DuplicateId(error) = error else {
            panic!("expected a duplicate ID error, got {error:?}");
        };
        assert_eq!(error.id, "AML.T0000");
        assert_eq!(error.sources.len(), 1);
        assert!(error.sources[0].ends_with("techniques.yaml"));
    }

    #[test]
    fn unknown_anchor_names_the_object() {
        let fixture = Fixture::new();
        fixture.write(
            "data/techniques.yaml",
            &TECHNIQUES.replace("{{t1.name}}", "{{t9.name}}"),
        );

        let error = fixture.compile().unwrap_err();

        let CompileError::Template(error) = error else {
            panic!("expected a template error, got {error:?}");
        };
        assert_eq!(error.location.object, "AML.T0000");
        assert_eq!(error.location.field.to_string(), "description");
    }

    #[test]
    fn violations_prevent_emission() {
        let fixture = Fixture::new();
        fixture.write(
            "data/techniques.yaml",
            &TECHNIQUES.replace("  name: Search\n", ""),
        );
        fixture.write(
            "data/case-studies/AML.CS0000.yaml",
            &CASE_STUDY.replace("{{search.name}}", "searching"),
        );
        let out = TempDir::new().unwrap();

        let error = fixture.compiler().build(out.path()).unwrap_err();

        let CompileError::Invalid(report) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].object_id, "AML.T0000");
        assert!(!out.path().join("ATLAS.yaml").exists());
    }

    #[test]
    fn objects_of_unknown_kind_are_reported() {
        let fixture = Fixture::new();
        fixture.write(
            "data/case-studies/AML.CS0001.yaml",
            "id: AML.CS0001\nobject-type: case_study\n",
        );

        let compiled = fixture.compile().unwrap();

        assert_eq!(ids(compiled.document(), "case-studies"), ["AML.CS0000"]);
        assert_eq!(compiled.report().violations.len(), 1);
        assert_eq!(compiled.report().violations[0].object_id, "AML.CS0001");
    }

    #[test]
    fn categories_select_what_is_assembled() {
        let fixture = Fixture::new();
        fixture.write(
            "matrix.yaml",
            &MATRIX.replace("data:\n", "categories: [technique, tactic]\ndata:\n"),
        );

        let compiled = fixture.compile().unwrap();
        let keys: Vec<_> = compiled
            .document()
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Value::as_str)
            .collect();

        assert_eq!(keys, ["id", "name", "version", "techniques", "tactics"]);
    }

    #[test]
    fn reports_sources_no_include_reaches() {
        let fixture = Fixture::new();
        let forgotten = fixture.write("data/forgotten.yaml", "- id: AML.T0009\n");

        let compiled = fixture.compile().unwrap();

        assert_eq!(
            compiled.unreferenced_sources(),
            [forgotten.canonicalize().unwrap()]
        );
    }
}
