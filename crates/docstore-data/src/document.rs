//! The mutable node tree behind a data object.

use std::collections::BTreeMap;

use docstore_types::{DataPath, Node};

use crate::error::{DataError, DataResult};

/// A schema-less tree of nested string-keyed maps.
///
/// Reads never create anything: a path that does not resolve is simply
/// absent. Writes create intermediate maps as needed, and either apply in
/// full or not at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    root: BTreeMap<String, Node>,
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: BTreeMap<String, Node>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &BTreeMap<String, Node> {
        &self.root
    }

    pub fn into_root(self) -> BTreeMap<String, Node> {
        self.root
    }

    /// `true` if no top-level field holds a value.
    pub fn is_empty(&self) -> bool {
        self.root.values().all(Node::is_null)
    }

    /// Resolve `path`. `Null` nodes count as absent.
    pub fn node(&self, path: &DataPath) -> Option<&Node> {
        let mut map = &self.root;
        for segment in path.parents() {
            map = map.get(segment)?.as_map()?;
        }
        map.get(path.leaf()).filter(|node| !node.is_null())
    }

    pub fn contains(&self, path: &DataPath) -> bool {
        self.node(path).is_some()
    }

    /// Write `node` at `path`, creating intermediate maps.
    ///
    /// Writing [`Node::Null`] removes the subtree. Fails without modifying the
    /// document if an intermediate segment holds something other than a map.
    pub fn insert(&mut self, path: &DataPath, node: Node) -> DataResult<()> {
        if node.is_null() {
            self.remove(path);
            return Ok(());
        }
        self.check_writable(path)?;

        let mut map = &mut self.root;
        for segment in path.parents() {
            let slot = map.entry(segment.clone()).or_insert(Node::Null);
            if slot.is_null() {
                *slot = Node::empty_map();
            }
            map = match slot {
                Node::Map(inner) => inner,
                other => return Err(conflict(path, segment, other)),
            };
        }
        map.insert(path.leaf().to_string(), node);
        Ok(())
    }

    /// Delete the subtree at `path`. Returns `true` if a value was removed.
    pub fn remove(&mut self, path: &DataPath) -> bool {
        let mut map = &mut self.root;
        for segment in path.parents() {
            map = match map.get_mut(segment) {
                Some(Node::Map(inner)) => inner,
                _ => return false,
            };
        }
        map.remove(path.leaf()).is_some_and(|node| !node.is_null())
    }

    fn check_writable(&self, path: &DataPath) -> DataResult<()> {
        let mut map = &self.root;
        for segment in path.parents() {
            match map.get(segment) {
                None | Some(Node::Null) => return Ok(()),
                Some(Node::Map(inner)) => map = inner,
                Some(other) => return Err(conflict(path, segment, other)),
            }
        }
        Ok(())
    }
}

fn conflict(path: &DataPath, segment: &str, found: &Node) -> DataError {
    DataError::PathConflict {
        path: path.to_string(),
        segment: segment.to_string(),
        found: found.kind(),
    }
}
