//! Mapping between data objects and their persisted form.

use std::marker::PhantomData;

use docstore_types::{node_from_json, node_to_json, JsonObject};

use crate::document::Document;
use crate::error::{DataError, DataResult};
use crate::kind::DataKind;
use crate::object::DataObject;

/// Bidirectional mapping between an in-memory object and a backend-neutral
/// form a repository can store.
///
/// Implementations must satisfy the round-trip law: for every key a caller
/// might query, `from_backend(to_backend(d))` reads back the same value as
/// `d`. The backend form itself need not be byte-identical across writes.
pub trait DataTranslator: Send + Sync + 'static {
    type Object: Clone + Send + Sync + 'static;
    type Backend: Send + 'static;

    fn to_backend(&self, object: &Self::Object) -> DataResult<Self::Backend>;

    fn from_backend(&self, backend: Self::Backend) -> DataResult<Self::Object>;

    /// A blank object with no stored values, used by "get or create".
    fn create_new(&self) -> Self::Object;
}

/// Translates [`DataObject`]s to and from JSON objects.
pub struct JsonTranslator<O> {
    _kind: PhantomData<fn() -> O>,
}

impl<O: DataKind> JsonTranslator<O> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<O: DataKind> Default for JsonTranslator<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: DataKind> std::fmt::Debug for JsonTranslator<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTranslator").field("kind", &O::NAME).finish()
    }
}

impl<O: DataKind> DataTranslator for JsonTranslator<O> {
    type Object = DataObject<O>;
    type Backend = JsonObject;

    fn to_backend(&self, object: &DataObject<O>) -> DataResult<JsonObject> {
        let mut json = JsonObject::new();
        for (field, node) in object.document().root() {
            if node.is_null() {
                continue;
            }
            let value = node_to_json(node).map_err(|source| DataError::Translation {
                field: field.clone(),
                source,
            })?;
            json.insert(field.clone(), value);
        }
        Ok(json)
    }

    fn from_backend(&self, backend: JsonObject) -> DataResult<DataObject<O>> {
        let root = backend
            .iter()
            .map(|(field, value)| (field.clone(), node_from_json(value)))
            .collect();
        Ok(DataObject::from_document(Document::from_root(root)))
    }

    fn create_new(&self) -> DataObject<O> {
        DataObject::new()
    }
}
