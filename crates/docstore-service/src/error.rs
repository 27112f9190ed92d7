use std::fmt;
use std::sync::Arc;

use docstore_data::DataError;
use docstore_repo::{DataQuery, RepositoryError};
use uuid::Uuid;

/// What a failed service operation was addressing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// The singleton document.
    Singleton,
    /// One keyed document.
    Id(Uuid),
    /// A bulk query.
    Query(DataQuery),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Id(id) => write!(f, "id {id}"),
            Self::Query(query) => write!(f, "query ({query})"),
        }
    }
}

/// Errors from storage service operations.
///
/// Every variant names the operation and its target. The type is `Clone` so
/// one coalesced load can hand the same failure to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// The repository failed to read or write.
    #[error("{op} {target}: {source}")]
    Repository {
        op: &'static str,
        target: Target,
        #[source]
        source: Arc<RepositoryError>,
    },

    /// The stored form could not be translated to or from a document.
    #[error("{op} {target}: {source}")]
    Translation {
        op: &'static str,
        target: Target,
        #[source]
        source: DataError,
    },

    /// A query expected to select at most one record selected several.
    #[error("{op} {target}: query matched {count} records, expected at most one")]
    AmbiguousQuery {
        op: &'static str,
        target: Target,
        count: usize,
    },

    /// The background task running the operation did not complete.
    #[error("{op} {target}: background task failed: {reason}")]
    Worker {
        op: &'static str,
        target: Target,
        reason: String,
    },
}

impl ServiceError {
    pub(crate) fn repository(op: &'static str, target: Target, source: RepositoryError) -> Self {
        Self::Repository {
            op,
            target,
            source: Arc::new(source),
        }
    }

    pub(crate) fn translation(op: &'static str, target: Target, source: DataError) -> Self {
        Self::Translation { op, target, source }
    }

    pub(crate) fn worker(op: &'static str, target: Target, reason: impl fmt::Display) -> Self {
        Self::Worker {
            op,
            target,
            reason: reason.to_string(),
        }
    }

    /// Name of the operation that failed.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Repository { op, .. }
            | Self::Translation { op, .. }
            | Self::AmbiguousQuery { op, .. }
            | Self::Worker { op, .. } => op,
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            Self::Repository { target, .. }
            | Self::Translation { target, .. }
            | Self::AmbiguousQuery { target, .. }
            | Self::Worker { target, .. } => target,
        }
    }
}

/// Result alias for storage service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_and_target() {
        let id = Uuid::nil();
        let err = ServiceError::repository("get", Target::Id(id), RepositoryError::Shutdown);
        assert_eq!(
            err.to_string(),
            format!("get id {id}: repository is shut down")
        );
        assert_eq!(err.op(), "get");
        assert_eq!(err.target(), &Target::Id(id));
    }

    #[test]
    fn errors_are_cloneable() {
        let err = ServiceError::worker("save", Target::Singleton, "task panicked");
        let copy = err.clone();
        assert_eq!(
            copy.to_string(),
            "save singleton: background task failed: task panicked"
        );

        let ambiguous = ServiceError::AmbiguousQuery {
            op: "get_one",
            target: Target::Query(DataQuery::All),
            count: 2,
        };
        assert_eq!(
            ambiguous.to_string(),
            "get_one query (all): query matched 2 records, expected at most one"
        );
    }
}
