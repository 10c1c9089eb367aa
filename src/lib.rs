//! Knowledge-base compiler for adversarial AI threat matrices.
//!
//! Tactics, techniques, mitigations and case studies are authored as YAML
//! files stitched together with `!include` directives and `{{anchor.field}}`
//! templates. This crate expands and resolves a source tree into a single
//! matrix document, validates every object against the rule set for its
//! `object-type`, and emits the result as YAML and JSON. ATT&CK Navigator
//! layers can be derived from a compiled matrix.
//!
//! ```no_run
//! use atlas::MatrixCompiler;
//!
//! let compiled = MatrixCompiler::new("data/matrix.yaml").compile()?;
//! for violation in &compiled.report().violations {
//!     eprintln!("{violation}");
//! }
//! compiled.write("dist".as_ref())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod domain;
pub use domain::{
    Config, DataObject, Declarations, DuplicateIdError, FieldPath, IdPattern, ObjectKind,
    ReferenceStore,
};

/// Loading source files and expanding include directives.
pub mod storage;
pub use storage::{Expansion, IncludeError, IncludeExpander, SourceError};

pub mod template;
pub use template::{TemplateError, TemplateErrorKind, TemplateResolver};

pub mod matrix;
pub use matrix::{Artifacts, CompileError, CompiledMatrix, EmitError, MatrixCompiler};

pub mod schema;
pub use schema::{ValidationReport, Validator, Violation};

pub mod navigator;
pub use navigator::{LayerError, LayerSelection, LayerSet};
