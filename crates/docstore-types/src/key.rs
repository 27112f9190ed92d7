//! Typed, path-addressed keys.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::TypeResult;
use crate::path::DataPath;
use crate::value::{NodeValue, ValueShape};

/// Describes one field of a document owned by `O`, holding values of type `R`.
///
/// Both type parameters are part of the key's static type: a
/// `DataKey<String, UserData>` can only be used with user documents, and only
/// ever reads and writes `String`s. `O` is a marker; it is never constructed.
pub struct DataKey<R, O> {
    path: DataPath,
    default: Option<R>,
    _owner: PhantomData<fn() -> O>,
}

/// A key whose value is a list of `R`.
pub type ListKey<R, O> = DataKey<Vec<R>, O>;

/// A key whose value is a map from `K` to `V`.
pub type MapKey<K, V, O> = DataKey<BTreeMap<K, V>, O>;

impl<R: NodeValue, O> DataKey<R, O> {
    /// Create a key without a default value.
    pub fn new<I, S>(segments: I) -> TypeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::from_path(DataPath::new(segments)?))
    }

    /// Create a key that falls back to `default` when the field is absent.
    pub fn with_default<I, S>(segments: I, default: R) -> TypeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::from_path(DataPath::new(segments)?).default_to(default))
    }

    pub fn from_path(path: DataPath) -> Self {
        Self {
            path,
            default: None,
            _owner: PhantomData,
        }
    }

    /// Replace this key's default value.
    pub fn default_to(mut self, default: R) -> Self {
        self.default = Some(default);
        self
    }

    pub fn path(&self) -> &DataPath {
        &self.path
    }

    /// Runtime description of `R`.
    pub fn shape(&self) -> ValueShape {
        R::shape()
    }

    pub fn default_value(&self) -> Option<&R> {
        self.default.as_ref()
    }
}

impl<R: Clone, O> Clone for DataKey<R, O> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            default: self.default.clone(),
            _owner: PhantomData,
        }
    }
}

impl<R: NodeValue, O> fmt::Debug for DataKey<R, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("path", &self.path)
            .field("shape", &R::shape())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}
