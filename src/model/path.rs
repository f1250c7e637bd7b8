//! InventoryPath: an entity's position in the containment hierarchy.

use std::fmt;

use serde::{Serialize, Serializer};
use smallvec::SmallVec;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

type Segments = SmallVec<[String; 8]>;

/// Root-to-leaf sequence of name segments.
///
/// Derived from parent references, never stored. Rendered absolute:
/// `/dc1/host/prod`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryPath {
    segments: Segments,
}

impl InventoryPath {
    pub fn new(segments: impl IntoIterator<Item = String>) -> Self {
        Self { segments: segments.into_iter().collect() }
    }

    /// Build from segments collected while walking leaf → root.
    pub fn from_leaf_up(segments: impl IntoIterator<Item = String>) -> Self {
        let mut segments: Segments = segments.into_iter().collect();
        segments.reverse();
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Does this path satisfy the fragment?
    ///
    /// The fragment's segments must equal this path's trailing segments.
    /// A root-anchored fragment must additionally cover the whole path.
    pub fn matches(&self, fragment: &PathFragment) -> bool {
        let n = fragment.segments.len();
        if n == 0 || n > self.segments.len() {
            return false;
        }
        if fragment.anchored && n != self.segments.len() {
            return false;
        }
        self.segments[self.segments.len() - n..] == fragment.segments[..]
    }
}

impl fmt::Display for InventoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "{SEPARATOR}");
        }
        for segment in &self.segments {
            write!(f, "{SEPARATOR}{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for InventoryPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A name or partial path supplied by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFragment {
    /// Leading separator: the fragment names an absolute path.
    pub anchored: bool,
    pub segments: Segments,
}

impl PathFragment {
    pub fn parse(raw: &str) -> Self {
        Self {
            anchored: raw.starts_with(SEPARATOR),
            segments: raw
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Last segment: the bare entity name the fragment ends in.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Raw input split on the separator yields two or more parts,
    /// i.e. it looks like a partial path rather than a bare name.
    pub fn is_path_like(raw: &str) -> bool {
        raw.split(SEPARATOR).nth(1).is_some()
    }
}
