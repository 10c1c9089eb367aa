use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Key(String),
    Index(usize),
}

/// The location of a field inside a data object.
///
/// Paths render the way authors write them when talking about the source
/// files, for example `procedure[2].tactic`. The empty path refers to the
/// object itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The path referring to the object as a whole.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a new path extended by a mapping key.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Returns a new path extended by a sequence index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }
}

impl From<&str> for FieldPath {
    fn from(key: &str) -> Self {
        Self::root().key(key)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<object>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_names_the_object() {
        assert_eq!(FieldPath::root().to_string(), "<object>");
    }

    #[test]
    fn nested_path_renders_keys_and_indices() {
        let path = FieldPath::from("procedure").index(2).key("tactic");
        assert_eq!(path.to_string(), "procedure[2].tactic");
    }

    #[test]
    fn extending_a_path_leaves_the_original_untouched() {
        let base = FieldPath::from("references");
        let child = base.index(0);
        assert_eq!(base.to_string(), "references");
        assert_eq!(child.to_string(), "references[0]");
    }
}
