//! Loading individual YAML source files.
//!
//! Anchors (`&name`) are part of the authoring model: templates refer to
//! anchored objects by name, and aliases (`*name`) may point at anchors
//! declared in files loaded earlier in the same compilation. A YAML parser
//! discards anchor names once aliases are resolved, so each file is parsed
//! inside a small wrapper document that re-exposes them:
//!
//! ```yaml
//! __atlas_imports:       # anchors from earlier files that this file aliases
//!   - &reconnaissance
//!     id: AML.TA0002
//! __atlas_document:      # the file itself, indented
//!   - id: AML.T0000
//!     tactics:
//!       - *reconnaissance
//! __atlas_anchors:       # every anchor the file declares
//!   'reconnaissance': *reconnaissance
//! ```
//!
//! Every `&name` that starts a line or follows whitespace or a flow indicator
//! is a candidate anchor. Candidates that turn out to be running text (`Tom
//! &Jerry`, a line inside a block scalar) make the wrapper fail to parse; each
//! is then confirmed on its own and only real anchors are kept.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde_yaml::{Mapping, Value};

const IMPORTS_KEY: &str = "__atlas_imports";
const DOCUMENT_KEY: &str = "__atlas_document";
const ANCHORS_KEY: &str = "__atlas_anchors";

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s\[{,])&([^\s\[\]{},]+)").expect("anchor pattern is a valid regex")
});

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*([^\s\[\]{},]+)").expect("alias pattern is a valid regex")
});

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// The file the content was read from.
    pub path: PathBuf,
    /// The parsed document. Tags such as `!include` are still in place.
    pub value: Value,
    /// Anchors declared by this file, in declaration order, with the value of
    /// the anchored node.
    pub anchors: Vec<(String, Value)>,
}

/// Errors that can occur while loading a source file.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The file is not valid YAML.
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parser error.
        source: serde_yaml::Error,
    },

    /// The file holds more than one YAML document.
    #[error("{} contains more than one YAML document", path.display())]
    MultipleDocuments {
        /// The offending file.
        path: PathBuf,
    },
}

/// Reads and parses the YAML file at `path`.
///
/// `known` holds the anchors declared by previously loaded files; aliases in
/// this file may refer to any of them.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid YAML, or holds
/// more than one document.
pub fn load(path: &Path, known: &BTreeMap<String, Value>) -> Result<SourceFile, SourceError> {
    let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &text, known)
}

/// Parses YAML `text` as if it had been read from `path`.
///
/// # Errors
///
/// Returns an error if the text is not valid YAML or holds more than one
/// document.
pub fn parse(
    path: &Path,
    text: &str,
    known: &BTreeMap<String, Value>,
) -> Result<SourceFile, SourceError> {
    let yaml_error = |source| SourceError::Yaml {
        path: path.to_path_buf(),
        source,
    };

    let body = document_body(path, text)?;
    let declared = declared_anchors(&body);
    // A file may alias an earlier file's anchor and redeclare the name later
    // on; the wrapper keeps YAML's most-recent-anchor rule for both.
    let imports: Vec<(&str, &Value)> = aliased_names(&body)
        .into_iter()
        .filter_map(|name| known.get_key_value(name))
        .map(|(name, value)| (name.as_str(), value))
        .collect();

    let root = match parse_wrapped(&body, &declared, &imports) {
        Ok(root) => root,
        Err(wrapped_error) => {
            // The wrapper shifts line numbers, so prefer the file's own error.
            if let Err(own) = serde_yaml::from_str::<Value>(text) {
                return Err(yaml_error(own));
            }
            // The file is fine on its own, so some candidates are not anchors.
            let confirmed: Vec<String> = declared
                .iter()
                .filter(|name| parse_wrapped(&body, std::slice::from_ref(*name), &imports).is_ok())
                .cloned()
                .collect();
            parse_wrapped(&body, &confirmed, &imports).map_err(|_| yaml_error(wrapped_error))?
        }
    };

    let (value, anchors) = unwrap(root);
    tracing::trace!(
        "Parsed {} ({} anchors, {} imported)",
        path.display(),
        anchors.len(),
        imports.len()
    );

    Ok(SourceFile {
        path: path.to_path_buf(),
        value,
        anchors,
    })
}

/// Strips the document start marker and directives, rejecting streams with
/// more than one document.
fn document_body(path: &Path, text: &str) -> Result<String, SourceError> {
    let multiple = || SourceError::MultipleDocuments {
        path: path.to_path_buf(),
    };

    let mut body = String::with_capacity(text.len());
    let mut started = false;
    let mut has_content = false;
    let mut ended = false;

    for line in text.lines() {
        let trimmed = line.trim_end();
        let blank = trimmed.trim_start().is_empty() || trimmed.trim_start().starts_with('#');

        if trimmed.starts_with('%') && !started && !has_content {
            continue;
        }
        if trimmed == "---" || trimmed.starts_with("--- ") {
            if started || has_content {
                return Err(multiple());
            }
            started = true;
            let rest = trimmed[3..].trim_start();
            if !rest.is_empty() {
                body.push_str(rest);
                body.push('\n');
                has_content = true;
            }
            continue;
        }
        if trimmed == "..." {
            ended = true;
            continue;
        }
        if !blank {
            if ended {
                return Err(multiple());
            }
            has_content = true;
        }
        body.push_str(line);
        body.push('\n');
    }

    Ok(body)
}

/// Candidate anchor names, in first-declaration order.
fn declared_anchors(body: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ANCHOR
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Every name that could be an alias. Over-approximates: emphasis markers in
/// running text are included, but only names that match a known anchor are
/// ever imported.
fn aliased_names(body: &str) -> BTreeSet<&str> {
    ALIAS
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .collect()
}

fn wrap(
    body: &str,
    declared: &[String],
    imports: &[(&str, &Value)],
) -> Result<String, serde_yaml::Error> {
    let mut out = String::with_capacity(body.len() + 64);

    if !imports.is_empty() {
        out.push_str(IMPORTS_KEY);
        out.push_str(":\n");
        for (name, value) in imports {
            out.push_str("  - &");
            out.push_str(name);
            out.push('\n');
            indent_into(&mut out, &serde_yaml::to_string(value)?, "    ");
        }
    }

    out.push_str(DOCUMENT_KEY);
    out.push_str(":\n");
    indent_into(&mut out, body, "  ");

    if !declared.is_empty() {
        out.push_str(ANCHORS_KEY);
        out.push_str(":\n");
        for name in declared {
            out.push_str("  '");
            out.push_str(&name.replace('\'', "''"));
            out.push_str("': *");
            out.push_str(name);
            out.push('\n');
        }
    }

    Ok(out)
}

fn parse_wrapped(
    body: &str,
    declared: &[String],
    imports: &[(&str, &Value)],
) -> Result<Mapping, serde_yaml::Error> {
    match serde_yaml::from_str::<Value>(&wrap(body, declared, imports)?)? {
        Value::Mapping(root) => Ok(root),
        _ => Ok(Mapping::new()),
    }
}

fn indent_into(out: &mut String, text: &str, prefix: &str) {
    for line in text.lines() {
        if !line.is_empty() {
            out.push_str(prefix);
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn unwrap(mut root: Mapping) -> (Value, Vec<(String, Value)>) {
    let value = root.remove(DOCUMENT_KEY).unwrap_or(Value::Null);
    let anchors = match root.remove(ANCHORS_KEY) {
        Some(Value::Mapping(anchors)) => anchors
            .into_iter()
            .filter_map(|(name, value)| name.as_str().map(|name| (name.to_string(), value)))
            .collect(),
        _ => Vec::new(),
    };
    (value, anchors)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn parse_str(text: &str) -> SourceFile {
        parse(Path::new("test.yaml"), text, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn parses_plain_document() {
        let file = parse_str("---\nid: ATLAS\nname: Example\n");

        assert_eq!(file.value.get("id").and_then(Value::as_str), Some("ATLAS"));
        assert!(file.anchors.is_empty());
    }

    #[test]
    fn captures_sequence_item_anchors() {
        let file = parse_str(
            "- &recon\n  id: AML.TA0002\n  object-type: tactic\n  name: Reconnaissance\n- &access\n  id: AML.TA0000\n  object-type: tactic\n  name: Access\n",
        );

        let names: Vec<_> = file.anchors.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["recon", "access"]);
        assert_eq!(
            file.anchors[0].1.get("name").and_then(Value::as_str),
            Some("Reconnaissance")
        );
        assert_eq!(file.value.as_sequence().map(Vec::len), Some(2));
    }

    #[test]
    fn captures_anchor_after_mapping_key() {
        let file = parse_str("release: &version 4.5.0\nname: ATLAS\n");

        assert_eq!(file.anchors.len(), 1);
        assert_eq!(file.anchors[0].0, "version");
        assert_eq!(file.anchors[0].1.as_str(), Some("4.5.0"));
    }

    #[test]
    fn ampersands_in_text_are_not_anchors() {
        let file = parse_str(
            "- name: R&D lab\n  summary: Tom &Jerry went out\n  quote: \"see: &nothing\"\n  owner: AT&T\n",
        );

        assert!(file.anchors.is_empty());
        assert_eq!(
            file.value[0].get("summary").and_then(Value::as_str),
            Some("Tom &Jerry went out")
        );
    }

    #[test]
    fn aliases_may_refer_to_anchors_from_earlier_files() {
        let known = BTreeMap::from([(
            "recon".to_string(),
            serde_yaml::from_str::<Value>("id: AML.TA0002\nname: Reconnaissance").unwrap(),
        )]);

        let file = parse(
            Path::new("techniques.yaml"),
            "- id: AML.T0000\n  tactic: *recon\n  note: this is *emphasised* text\n",
            &known,
        )
        .unwrap();

        assert_eq!(
            file.value[0]["tactic"].get("name").and_then(Value::as_str),
            Some("Reconnaissance")
        );
        assert!(file.anchors.is_empty());
    }

    #[test]
    fn include_tags_are_preserved() {
        let file = parse_str("data:\n  - !include tactics.yaml\n");

        let Value::Tagged(tagged) = &file.value["data"][0] else {
            panic!("expected a tagged value, got {:?}", file.value);
        };
        assert_eq!(tagged.tag, "!include");
        assert_eq!(tagged.value.as_str(), Some("tactics.yaml"));
    }

    #[test]
    fn block_scalars_survive_the_wrapper() {
        let file = parse_str("description: |\n  First line.\n\n  Second paragraph.\n");

        assert_eq!(
            file.value.get("description").and_then(Value::as_str),
            Some("First line.\n\nSecond paragraph.\n")
        );
    }

    #[test]
    fn anchor_lookalikes_in_block_scalars_are_ignored() {
        let file = parse_str(
            "- &real\n  id: AML.T0001\n  description: |\n    Usage:\n    flag: &not_an_anchor\n",
        );

        let names: Vec<_> = file.anchors.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["real"]);
        assert_eq!(
            file.value[0]["description"].as_str(),
            Some("Usage:\nflag: &not_an_anchor\n")
        );
    }

    #[test_case("tactics: [&flow AML.TA0001]\n", "flow", "AML.TA0001"; "inside a flow sequence")]
    #[test_case("tactic: {id: &inner AML.TA0001}\n", "inner", "AML.TA0001"; "inside a flow mapping")]
    #[test_case("\"quoted\": &q AML.TA0001\n", "q", "AML.TA0001"; "after a quoted key")]
    #[test_case("? &complex key\n: value\n", "complex", "key"; "on a complex key")]
    fn captures_anchors_in_any_node_position(text: &str, name: &str, value: &str) {
        let file = parse_str(text);

        assert_eq!(file.anchors.len(), 1, "{:?}", file.anchors);
        assert_eq!(file.anchors[0].0, name);
        assert_eq!(file.anchors[0].1.as_str(), Some(value));
    }

    #[test]
    fn file_may_redeclare_an_anchor_it_aliases() {
        let known = BTreeMap::from([("recon".to_string(), Value::from("earlier"))]);

        let file = parse(
            Path::new("later.yaml"),
            "before: *recon\nmine: &recon later\nafter: *recon\n",
            &known,
        )
        .unwrap();

        assert_eq!(file.value["before"].as_str(), Some("earlier"));
        assert_eq!(file.value["after"].as_str(), Some("later"));
        assert_eq!(file.anchors, [("recon".to_string(), Value::from("later"))]);
    }

    #[test]
    fn empty_file_is_null() {
        assert_eq!(parse_str("").value, Value::Null);
        assert_eq!(parse_str("---\n# nothing here\n").value, Value::Null);
    }

    #[test]
    fn rejects_multiple_documents() {
        let error = parse(
            Path::new("two.yaml"),
            "---\na: 1\n---\nb: 2\n",
            &BTreeMap::new(),
        )
        .unwrap_err();

        assert!(matches!(error, SourceError::MultipleDocuments { .. }));
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let error = parse(Path::new("broken.yaml"), "a: [1, 2\n", &BTreeMap::new()).unwrap_err();

        assert!(matches!(error, SourceError::Yaml { .. }));
        assert!(error.to_string().starts_with("invalid YAML in broken.yaml"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let error = load(&tmp.path().join("absent.yaml"), &BTreeMap::new()).unwrap_err();

        assert!(matches!(error, SourceError::Io { .. }));
    }
}
