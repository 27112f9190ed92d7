use std::fmt;
use std::marker::PhantomData;

use docstore_types::{DataKey, NodeValue};

use crate::document::Document;
use crate::error::{DataError, DataResult};
use crate::handle::ValueHandle;
use crate::kind::DataKind;

/// Typed accessor façade over one [`Document`].
///
/// The object exclusively owns its document and is its only mutator. Keys
/// must be declared for the same kind `O`; a user key will not type-check
/// against a world object.
///
/// Objects are plain values: storage services hand out clones, so two callers
/// never mutate the same instance.
pub struct DataObject<O> {
    document: Document,
    _kind: PhantomData<fn() -> O>,
}

impl<O: DataKind> DataObject<O> {
    /// A blank object with no stored values.
    pub fn new() -> Self {
        Self::from_document(Document::new())
    }

    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            _kind: PhantomData,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// `true` if the key's path resolves to a value.
    pub fn has<R: NodeValue>(&self, key: &DataKey<R, O>) -> bool {
        self.document.contains(key.path())
    }

    /// Read the stored value, ignoring the key's default.
    ///
    /// Returns `Ok(None)` if the field is absent and an error if the stored
    /// node does not have the key's shape.
    pub fn get<R: NodeValue>(&self, key: &DataKey<R, O>) -> DataResult<Option<R>> {
        self.document
            .node(key.path())
            .map(|node| {
                R::from_node(node).map_err(|source| DataError::Read {
                    path: key.path().to_string(),
                    expected: key.shape().to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Read the stored value, falling back to the key's default.
    ///
    /// `Ok(None)` only if the field is absent and the key declares no default.
    pub fn get_or_default<R: NodeValue>(&self, key: &DataKey<R, O>) -> DataResult<Option<R>> {
        Ok(self.get(key)?.or_else(|| key.default_value().cloned()))
    }

    /// Write `value` at the key's path, creating intermediate maps.
    ///
    /// On failure nothing is written.
    pub fn set<R: NodeValue>(&mut self, key: &DataKey<R, O>, value: R) -> DataResult<()> {
        let node = value.to_node().map_err(|source| DataError::Write {
            path: key.path().to_string(),
            source,
        })?;
        self.document.insert(key.path(), node)
    }

    /// Delete the key's subtree. Removing an absent key is a no-op.
    ///
    /// Returns `true` if a value was removed.
    pub fn remove<R: NodeValue>(&mut self, key: &DataKey<R, O>) -> bool {
        self.document.remove(key.path())
    }

    /// Open a scoped read-modify-write handle on `key`.
    ///
    /// The handle snapshots the current value and writes its final value back
    /// when it is closed or dropped.
    pub fn get_and_set<'a, R: NodeValue>(
        &'a mut self,
        key: &'a DataKey<R, O>,
    ) -> DataResult<ValueHandle<'a, R, O>> {
        let snapshot = self.get(key)?;
        Ok(ValueHandle::new(self, key, snapshot))
    }

    /// Run `f` against the current value of `key` and write the result back.
    ///
    /// The value is written back even if `f` fails; whatever `f` set before
    /// failing is kept. `f`'s error takes precedence over a write-back error.
    pub fn update<R, T, E, F>(&mut self, key: &DataKey<R, O>, f: F) -> Result<T, E>
    where
        R: NodeValue,
        E: From<DataError>,
        F: FnOnce(&mut Option<R>) -> Result<T, E>,
    {
        let mut handle = self.get_and_set(key)?;
        let result = f(handle.value_mut());
        let written = handle.close();
        let value = result?;
        written?;
        Ok(value)
    }
}

impl<O: DataKind> Default for DataObject<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for DataObject<O> {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            _kind: PhantomData,
        }
    }
}

impl<O> PartialEq for DataObject<O> {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

impl<O: DataKind> fmt::Debug for DataObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject")
            .field("kind", &O::NAME)
            .field("document", &self.document)
            .finish()
    }
}
