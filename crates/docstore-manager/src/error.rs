use std::path::PathBuf;

use docstore_repo::RepositoryError;
use docstore_service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
