//! The per-compilation reference store.
//!
//! The [`ReferenceStore`] is built once from the anchors and data objects
//! produced by include expansion and is read-only afterwards. Each compilation
//! builds its own store and passes it by reference to the resolution steps, so
//! independent compilations never share state.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
};

use serde_yaml::Value;

use crate::domain::DataObject;

/// Where each object ID was declared in the source tree.
///
/// Include expansion records one entry per declaration, in load order, so an
/// ID declared twice (including by the same file being included twice) lists
/// both sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations(BTreeMap<String, Vec<PathBuf>>);

impl Declarations {
    /// Records that `id` was declared in `source`.
    pub fn record(&mut self, id: impl Into<String>, source: &Path) {
        self.0
            .entry(id.into())
            .or_default()
            .push(source.to_path_buf());
    }

    /// The files declaring `id`, in load order.
    #[must_use]
    pub fn sources(&self, id: &str) -> &[PathBuf] {
        self.0.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Error returned when the same object ID is declared more than once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct DuplicateIdError {
    /// The repeated ID.
    pub id: String,
    /// The files declaring it, in load order.
    pub sources: Vec<PathBuf>,
}

impl fmt::Display for DuplicateIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate ID '{}'", self.id)?;
        if !self.sources.is_empty() {
            write!(f, " declared in ")?;
            for (i, path) in self.sources.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", path.display())?;
            }
        }
        Ok(())
    }
}

/// An immutable mapping from anchor names to their values, holding the data
/// objects of one compilation.
///
/// Objects are kept in source declaration order. Objects without a string
/// `id` are retained so they can be reported by validation.
#[derive(Debug, Default)]
pub struct ReferenceStore {
    anchors: BTreeMap<String, Value>,
    objects: Vec<DataObject>,
}

impl ReferenceStore {
    /// Builds a store from anchored values and data objects.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateIdError`] for the first ID (in source order) that is
    /// declared more than once. The error names every file that declares it.
    pub fn build(
        anchors: BTreeMap<String, Value>,
        objects: Vec<DataObject>,
        declarations: &Declarations,
    ) -> Result<Self, DuplicateIdError> {
        if let Some(id) = first_duplicate(&objects) {
            return Err(DuplicateIdError {
                id: id.to_string(),
                sources: declarations.sources(id).to_vec(),
            });
        }

        tracing::debug!(
            "Reference store holds {} anchors and {} objects",
            anchors.len(),
            objects.len()
        );

        Ok(Self { anchors, objects })
    }

    /// Checks that the objects produced by template resolution still carry
    /// distinct IDs.
    ///
    /// `resolved` holds one object per stored object, in the same order. A
    /// templated `id` can resolve to an ID that another object declares
    /// literally, which [`build`](Self::build) cannot see.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateIdError`] for the first resolved ID that repeats,
    /// naming the files that declare every object resolving to it.
    pub fn check_resolved(
        &self,
        resolved: &[DataObject],
        declarations: &Declarations,
    ) -> Result<(), DuplicateIdError> {
        let Some(id) = first_duplicate(resolved) else {
            return Ok(());
        };

        let mut sources = Vec::new();
        for (object, stored) in resolved.iter().zip(&self.objects) {
            if object.id() != Some(id) {
                continue;
            }
            if let Some(declared) = stored.id() {
                for source in declarations.sources(declared) {
                    if !sources.contains(source) {
                        sources.push(source.clone());
                    }
                }
            }
        }

        Err(DuplicateIdError {
            id: id.to_string(),
            sources,
        })
    }

    /// Looks up an anchored value by name.
    #[must_use]
    pub fn anchor(&self, name: &str) -> Option<&Value> {
        self.anchors.get(name)
    }

    /// All data objects, in source declaration order.
    pub fn objects(&self) -> impl Iterator<Item = &DataObject> {
        self.objects.iter()
    }

    /// The number of data objects in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no data objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// The first ID, in source order, carried by more than one object.
fn first_duplicate(objects: &[DataObject]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    objects
        .iter()
        .filter_map(DataObject::id)
        .find(|id| !seen.insert(*id))
}
