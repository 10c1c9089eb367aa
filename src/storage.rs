/// Discovery of YAML source files on disk.
pub mod directory;
/// Recursive expansion of `!include` directives.
pub mod include;
/// Parsing of individual YAML source files.
pub mod source;

pub use include::{Expansion, IncludeError, IncludeExpander};
pub use source::{SourceError, SourceFile};
