use std::fmt;
use std::sync::Arc;

use crate::error::{TypeError, TypeResult};

/// Ordered, non-empty sequence of segments addressing a node in a document.
///
/// Segments are shared behind an `Arc`, so cloning a path (and therefore a
/// key) is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataPath {
    segments: Arc<[String]>,
}

impl DataPath {
    /// Build a path from its segments.
    ///
    /// Fails if there are no segments or any segment is empty.
    pub fn new<I, S>(segments: I) -> TypeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(TypeError::EmptyPath);
        }
        if let Some(index) = segments.iter().position(|s| s.is_empty()) {
            return Err(TypeError::EmptySegment { index });
        }
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Parse a dotted path such as `"homes.base"`.
    pub fn parse(dotted: &str) -> TypeResult<Self> {
        if dotted.is_empty() {
            return Err(TypeError::EmptyPath);
        }
        Self::new(dotted.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment, i.e. the field name within its parent map.
    pub fn leaf(&self) -> &str {
        // Construction guarantees at least one segment.
        &self.segments[self.segments.len() - 1]
    }

    /// All segments except the leaf.
    pub fn parents(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> TypeResult<Self> {
        let mut segments = self.segments.to_vec();
        segments.push(segment.into());
        Self::new(segments)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataPath({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        let err = DataPath::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, TypeError::EmptyPath);
        assert_eq!(DataPath::parse("").unwrap_err(), TypeError::EmptyPath);
    }

    #[test]
    fn rejects_empty_segment() {
        let err = DataPath::parse("homes..base").unwrap_err();
        assert_eq!(err, TypeError::EmptySegment { index: 1 });
    }

    #[test]
    fn parse_splits_on_dots() {
        let path = DataPath::parse("homes.base").unwrap();
        assert_eq!(path.segments(), &["homes".to_string(), "base".to_string()]);
        assert_eq!(path.leaf(), "base");
        assert_eq!(path.parents(), &["homes".to_string()]);
        assert_eq!(path.to_string(), "homes.base");
    }

    #[test]
    fn child_extends_path() {
        let path = DataPath::parse("homes").unwrap().child("base").unwrap();
        assert_eq!(path, DataPath::parse("homes.base").unwrap());
        assert!(DataPath::parse("homes").unwrap().child("").is_err());
    }
}
