//! Pluggable persistence backends for docstore.
//!
//! A repository stores documents in their backend form (for the JSON
//! translator, a [`JsonObject`](docstore_types::JsonObject)) and knows
//! nothing about keys, caching, or what a document means. Two shapes exist:
//!
//! - [`SingleRepository`] -- exactly one document (the global record)
//! - [`KeyedRepository`] -- a collection of documents addressed by UUID,
//!   with [`DataQuery`]-based bulk retrieval
//!
//! # Backends
//!
//! - [`InMemorySingleRepository`] / [`InMemoryKeyedRepository`] -- for tests
//!   and ephemeral deployments
//! - [`FlatFileSingleRepository`] / [`FlatFileKeyedRepository`] -- one JSON
//!   file per document, laid out by [`FlatFileLayout`]
//!
//! # Design Rules
//!
//! 1. A missing record is `Ok(None)`, never an error.
//! 2. I/O and decoding failures are returned, never swallowed or panicked on.
//! 3. Flat-file writes are atomic: a reader sees the old or the new file.
//! 4. After `shutdown`, every operation fails with [`RepositoryError::Shutdown`].

pub mod cell;
pub mod error;
pub mod flatfile;
pub mod memory;
pub mod query;
pub mod traits;

pub use cell::RepositoryCell;
pub use error::{RepositoryError, RepositoryResult};
pub use flatfile::{
    FlatFileKeyedRepository, FlatFileLayout, FlatFileSingleRepository, GENERAL_FILE,
    USER_DATA_DIRECTORY, WORLD_DATA_DIRECTORY,
};
pub use memory::{InMemoryKeyedRepository, InMemorySingleRepository};
pub use query::DataQuery;
pub use traits::{KeyedRepository, SingleRepository};
