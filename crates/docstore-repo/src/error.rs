use std::io;
use std::path::PathBuf;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// I/O error from the underlying storage.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored record exists but cannot be decoded.
    #[error("corrupt record {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// A record cannot be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Another thread panicked while holding the repository lock.
    #[error("repository lock poisoned")]
    LockPoisoned,

    /// The repository has been shut down and accepts no further operations.
    #[error("repository is shut down")]
    Shutdown,
}

impl RepositoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
