//! Domain models for the knowledge base.
//!
//! This module contains the core domain types including data objects, their
//! identifiers, the per-compilation reference store, and configuration.

/// Data objects and the closed set of object kinds.
pub mod object;
pub use object::{DataObject, ObjectKind, UnknownKindError};

mod config;
pub use config::Config;

/// Identifier patterns for each object kind.
pub mod id;
pub use id::IdPattern;

mod field_path;
pub use field_path::FieldPath;

/// The immutable per-compilation store of anchors and data objects.
pub mod store;
pub use store::{Declarations, DuplicateIdError, ReferenceStore};
