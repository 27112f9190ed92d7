use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::RepositoryResult;
use crate::query::DataQuery;

/// Persistence backend for exactly one document.
///
/// All implementations must satisfy these invariants:
/// - A missing record is `Ok(None)`, not an error.
/// - `save` replaces the record in full; there are no partial writes.
/// - All I/O errors are propagated, never silently ignored.
pub trait SingleRepository<B>: Send + Sync {
    /// Read the record. Returns `Ok(None)` if nothing has been saved yet.
    fn get(&self) -> RepositoryResult<Option<B>>;

    /// Write the record, replacing any previous one.
    fn save(&self, value: &B) -> RepositoryResult<()>;

    /// Whether the backend keeps its own cache in front of storage.
    fn has_cache(&self) -> bool {
        false
    }

    /// Drop the backend's own cache, if it has one.
    fn clear_cache(&self) -> RepositoryResult<()> {
        Ok(())
    }

    /// Flush and close. Later operations fail with `Shutdown`.
    fn shutdown(&self) -> RepositoryResult<()>;
}

/// Persistence backend for a collection of documents addressed by UUID.
///
/// Same invariants as [`SingleRepository`], per id.
pub trait KeyedRepository<B>: Send + Sync {
    /// Read one record. Returns `Ok(None)` if the id has no record.
    fn get(&self, id: Uuid) -> RepositoryResult<Option<B>>;

    /// Check whether the id has a record.
    fn exists(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Read every record the query selects, keyed by id.
    fn get_all(&self, query: &DataQuery) -> RepositoryResult<BTreeMap<Uuid, B>>;

    /// Number of records the query selects.
    ///
    /// Default implementation loads them. Backends may override to avoid
    /// decoding.
    fn count(&self, query: &DataQuery) -> RepositoryResult<usize> {
        Ok(self.get_all(query)?.len())
    }

    /// Write one record, replacing any previous one.
    fn save(&self, id: Uuid, value: &B) -> RepositoryResult<()>;

    /// Delete one record. Returns `true` if it existed.
    fn delete(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Whether the backend keeps its own cache in front of storage.
    fn has_cache(&self) -> bool {
        false
    }

    /// Drop the backend's own cache, if it has one.
    fn clear_cache(&self) -> RepositoryResult<()> {
        Ok(())
    }

    /// Flush and close. Later operations fail with `Shutdown`.
    fn shutdown(&self) -> RepositoryResult<()>;
}
