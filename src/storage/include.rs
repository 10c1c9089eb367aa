//! Include directive expansion.
//!
//! A source tree is stitched together with `!include` tags. The argument is a
//! path relative to the directory of the file containing the directive, and
//! may be a glob:
//!
//! ```yaml
//! data:
//!   - !include tactics.yaml          # replaced by the file's content
//!   - !include case-studies/*.yaml   # replaced by one element per file
//! ```
//!
//! Glob matches are expanded in lexicographic path order so that output is
//! reproducible. Files are loaded depth-first in document order, and every
//! anchor a file declares is visible to the files loaded after it.

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
};

use serde_yaml::{Mapping, Value, value::TaggedValue};

use crate::{
    domain::{
        Declarations,
        object::{DATA, ID, OBJECT_TYPE},
    },
    storage::source::{self, SourceError},
};

const INCLUDE_TAG: &str = "!include";

/// Expands include directives starting from a root file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeExpander {
    max_depth: usize,
}

/// The result of expanding a root file.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// The root document with every include directive replaced.
    pub document: Value,
    /// Every anchor declared across all loaded files. A later declaration of
    /// the same name replaces an earlier one.
    pub anchors: BTreeMap<String, Value>,
    /// Where each object ID was declared.
    pub declarations: Declarations,
    /// Every file loaded, in load order. A file included twice appears twice.
    pub files: Vec<PathBuf>,
}

/// Errors that can occur while expanding include directives.
#[derive(Debug, thiserror::Error)]
pub enum IncludeError {
    /// A single-file include names a file that does not exist.
    #[error("{}: included file '{}' not found", from.display(), target.display())]
    NotFound {
        /// The file containing the directive.
        from: PathBuf,
        /// The path the directive resolved to.
        target: PathBuf,
    },

    /// A file transitively includes itself.
    #[error("include cycle: {}", Chain(chain))]
    Cycle {
        /// The files forming the cycle, starting and ending with the same
        /// file.
        chain: Vec<PathBuf>,
    },

    /// Includes are nested deeper than the configured limit.
    #[error("{}: includes nested deeper than {limit} levels", from.display())]
    TooDeep {
        /// The file containing the directive that exceeded the limit.
        from: PathBuf,
        /// The configured limit.
        limit: usize,
    },

    /// The include target does not end in `.yaml` or `.yml`.
    #[error("{}: expected include path to end in .yaml or .yml, got '{target}'", from.display())]
    InvalidExtension {
        /// The file containing the directive.
        from: PathBuf,
        /// The include argument as written.
        target: String,
    },

    /// The include argument is not a string.
    #[error("{}: !include expects a path string", from.display())]
    InvalidDirective {
        /// The file containing the directive.
        from: PathBuf,
    },

    /// A custom tag other than `!include` was found.
    #[error("{}: unsupported tag '{tag}'", from.display())]
    UnknownTag {
        /// The file containing the tag.
        from: PathBuf,
        /// The tag as written.
        tag: String,
    },

    /// The include argument is not a valid glob pattern.
    #[error("{}: invalid glob pattern '{pattern}': {source}", from.display())]
    Pattern {
        /// The file containing the directive.
        from: PathBuf,
        /// The include argument as written.
        pattern: String,
        /// The underlying pattern error.
        source: glob::PatternError,
    },

    /// A glob match could not be read.
    #[error("{}: failed to read glob match: {source}", from.display())]
    Glob {
        /// The file containing the directive.
        from: PathBuf,
        /// The underlying glob error.
        source: glob::GlobError,
    },

    /// A file could not be loaded.
    #[error(transparent)]
    Source(#[from] SourceError),
}

struct Chain<'a>(&'a [PathBuf]);

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

/// Mutable state threaded through a single expansion.
#[derive(Default)]
struct State {
    stack: Vec<PathBuf>,
    expansion: Expansion,
}

impl IncludeExpander {
    /// Creates an expander that allows includes to nest `max_depth` levels
    /// below the root file.
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Loads `root` and recursively expands every include directive in it.
    ///
    /// # Errors
    ///
    /// Fails on the first missing include target, include cycle, nesting
    /// beyond the depth limit, malformed directive, or unloadable file.
    pub fn expand(&self, root: &Path) -> Result<Expansion, IncludeError> {
        let root = root.canonicalize().map_err(|source| SourceError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut state = State::default();
        let document = self.expand_file(&root, &mut state)?;

        let mut expansion = state.expansion;
        expansion.document = document;
        tracing::debug!("Expanded {} source files", expansion.files.len());
        Ok(expansion)
    }

    fn expand_file(&self, path: &Path, state: &mut State) -> Result<Value, IncludeError> {
        if let Some(start) = state.stack.iter().position(|p| p == path) {
            let mut chain = state.stack[start..].to_vec();
            chain.push(path.to_path_buf());
            return Err(IncludeError::Cycle { chain });
        }
        if state.stack.len() > self.max_depth {
            return Err(IncludeError::TooDeep {
                from: state.stack.last().cloned().unwrap_or_default(),
                limit: self.max_depth,
            });
        }

        tracing::debug!("Loading {}", path.display());
        let file = source::load(path, &state.expansion.anchors)?;
        state.expansion.files.push(path.to_path_buf());

        record_declarations(&file.value, path, &mut state.expansion.declarations);
        for (name, value) in file.anchors {
            if state.expansion.anchors.insert(name.clone(), value).is_some() {
                tracing::warn!("Anchor '{name}' redefined in {}", path.display());
            }
        }

        state.stack.push(path.to_path_buf());
        let value = self.expand_value(file.value, path, state);
        state.stack.pop();
        value
    }

    fn expand_value(
        &self,
        value: Value,
        file: &Path,
        state: &mut State,
    ) -> Result<Value, IncludeError> {
        match value {
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                if tag == INCLUDE_TAG {
                    self.include(value, file, state)
                } else {
                    Err(IncludeError::UnknownTag {
                        from: file.to_path_buf(),
                        tag: tag.to_string(),
                    })
                }
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.expand_value(item, file, state))
                .collect::<Result<_, _>>()
                .map(Value::Sequence),
            Value::Mapping(mapping) => {
                let mut expanded = Mapping::with_capacity(mapping.len());
                for (key, item) in mapping {
                    expanded.insert(key, self.expand_value(item, file, state)?);
                }
                Ok(Value::Mapping(expanded))
            }
            scalar => Ok(scalar),
        }
    }

    fn include(
        &self,
        argument: Value,
        file: &Path,
        state: &mut State,
    ) -> Result<Value, IncludeError> {
        let Value::String(target) = argument else {
            return Err(IncludeError::InvalidDirective {
                from: file.to_path_buf(),
            });
        };

        let extension = Path::new(&target).extension().and_then(OsStr::to_str);
        if !matches!(extension, Some("yaml" | "yml")) {
            return Err(IncludeError::InvalidExtension {
                from: file.to_path_buf(),
                target,
            });
        }

        let base = file.parent().unwrap_or_else(|| Path::new("."));

        if is_glob(&target) {
            let paths = glob_sorted(base, &target, file)?;
            tracing::debug!("'{target}' matched {} files", paths.len());
            paths
                .iter()
                .map(|path| self.expand_file(path, state))
                .collect::<Result<_, _>>()
                .map(Value::Sequence)
        } else {
            let path = base.join(&target);
            let canonical = path.canonicalize().map_err(|_| IncludeError::NotFound {
                from: file.to_path_buf(),
                target: path.clone(),
            })?;
            self.expand_file(&canonical, state)
        }
    }
}

/// Records the objects a file declares: the file itself, the items of a
/// top-level list, or the items of a `data` list. Aliased copies nested inside
/// other objects are not declarations.
fn record_declarations(value: &Value, file: &Path, declarations: &mut Declarations) {
    match value {
        Value::Sequence(items) => {
            for item in items {
                record_declarations(item, file, declarations);
            }
        }
        Value::Mapping(mapping) if mapping.contains_key(OBJECT_TYPE) => {
            if let Some(id) = mapping.get(ID).and_then(Value::as_str) {
                declarations.record(id, file);
            }
        }
        Value::Mapping(mapping) => {
            if let Some(data) = mapping.get(DATA) {
                record_declarations(data, file, declarations);
            }
        }
        _ => {}
    }
}

fn is_glob(target: &str) -> bool {
    target.contains(['*', '?', '['])
}

/// Resolves a glob relative to `base`, returning canonical file paths in
/// lexicographic order.
fn glob_sorted(base: &Path, pattern: &str, from: &Path) -> Result<Vec<PathBuf>, IncludeError> {
    let escaped_base = glob::Pattern::escape(&base.to_string_lossy());
    let full = format!("{escaped_base}/{pattern}");

    let entries = glob::glob(&full).map_err(|source| IncludeError::Pattern {
        from: from.to_path_buf(),
        pattern: pattern.to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|source| IncludeError::Glob {
            from: from.to_path_buf(),
            source,
        })?;
        if !path.is_file() {
            continue;
        }
        let canonical = path.canonicalize().map_err(|_| IncludeError::NotFound {
            from: from.to_path_buf(),
            target: path.clone(),
        })?;
        paths.push(canonical);
    }
    paths.sort();
    Ok(paths)
}
