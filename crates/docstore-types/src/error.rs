use thiserror::Error;

use crate::node::NodeKind;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("data path must contain at least one segment")]
    EmptyPath,

    #[error("data path segment {index} is empty")]
    EmptySegment { index: usize },

    #[error("expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: NodeKind },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("invalid map key {key:?}: expected {expected}")]
    InvalidKey { key: String, expected: &'static str },

    #[error("floating point value {0} cannot be represented in JSON")]
    NonFiniteFloat(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TypeError {
    pub(crate) fn mismatch(expected: impl ToString, found: NodeKind) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            found,
        }
    }
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
