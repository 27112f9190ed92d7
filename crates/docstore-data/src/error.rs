use docstore_types::{NodeKind, TypeError};
use thiserror::Error;

/// Errors from data object operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    /// A write would have to descend through a non-map node.
    #[error("cannot write {path}: segment {segment:?} holds a {found}, not a map")]
    PathConflict {
        path: String,
        segment: String,
        found: NodeKind,
    },

    /// The stored node cannot be converted to the key's value type.
    #[error("cannot read {path} as {expected}: {source}")]
    Read {
        path: String,
        expected: String,
        #[source]
        source: TypeError,
    },

    /// The value cannot be converted to a node.
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: TypeError,
    },

    /// The document cannot be mapped to or from its persisted form.
    #[error("cannot translate field {field:?}: {source}")]
    Translation {
        field: String,
        #[source]
        source: TypeError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for data object operations.
pub type DataResult<T> = Result<T, DataError>;
