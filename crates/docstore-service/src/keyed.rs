use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use docstore_data::DataTranslator;
use docstore_repo::{DataQuery, KeyedRepository, RepositoryCell};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{wait_for_load, CacheSlots, LoadOutcome, Lookup, PendingLoad};
use crate::error::{ServiceError, ServiceResult, Target};
use crate::task::run_blocking;

/// Shared handle to a keyed repository for translator `T`.
pub type KeyedRepositoryRef<T> = Arc<dyn KeyedRepository<<T as DataTranslator>::Backend>>;

/// Cached storage service for documents addressed by UUID.
///
/// Cache entries are populated on the first successful load or save of an id
/// and evicted only by [`delete`](Self::delete) or
/// [`clear_cache`](Self::clear_cache). Concurrent [`get`](Self::get)s of one
/// uncached id share a single repository read.
///
/// Cloning the service is cheap; clones share one cache and repository.
pub struct KeyedService<T: DataTranslator> {
    inner: Arc<KeyedInner<T>>,
}

struct KeyedInner<T: DataTranslator> {
    name: &'static str,
    translator: T,
    repository: RepositoryCell<dyn KeyedRepository<T::Backend>>,
    cache: Arc<CacheSlots<Uuid, T::Object>>,
}

impl<T: DataTranslator> KeyedService<T> {
    pub fn new(name: &'static str, translator: T, repository: KeyedRepositoryRef<T>) -> Self {
        Self {
            inner: Arc::new(KeyedInner {
                name,
                translator,
                repository: RepositoryCell::new(repository),
                cache: Arc::new(CacheSlots::new()),
            }),
        }
    }

    /// Name of the entity kind this service stores.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// A blank document. Nothing is cached or persisted.
    pub fn create_new(&self) -> T::Object {
        self.inner.translator.create_new()
    }

    /// The cached document for `id`, without touching the repository.
    pub fn get_cached(&self, id: Uuid) -> Option<T::Object> {
        self.inner.cache.get(&id)
    }

    /// `true` if `id`'s cached document has a write that has not been
    /// persisted.
    pub fn is_dirty(&self, id: Uuid) -> bool {
        self.inner.cache.is_dirty(&id)
    }

    /// Number of cached documents.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.len()
    }

    /// Fetch `id`'s document, loading it on the blocking pool on a cache miss.
    ///
    /// `Ok(None)` means no record exists.
    pub async fn get(&self, id: Uuid) -> ServiceResult<Option<T::Object>> {
        let target = Target::Id(id);
        match self.inner.cache.lookup(&id) {
            Lookup::Hit(doc) => {
                debug!(kind = self.inner.name, %id, "cache hit");
                Ok(Some(doc))
            }
            Lookup::Wait(rx) => {
                debug!(kind = self.inner.name, %id, "joining in-flight load");
                wait_for_load(rx, "get", target).await
            }
            Lookup::Lead => {
                debug!(kind = self.inner.name, %id, "cache miss");
                let cache = Arc::clone(&self.inner.cache);
                let pending = PendingLoad::new(cache, id, "get", target.clone());
                let inner = Arc::clone(&self.inner);
                run_blocking("get", target, move || pending.finish(inner.load(id, "get"))).await
            }
        }
    }

    /// [`get`](Self::get), blocking the calling thread.
    pub fn get_on_calling_thread(&self, id: Uuid) -> ServiceResult<Option<T::Object>> {
        self.inner.get_blocking(id, "get")
    }

    /// The stored document, or a new blank one if `id` has no record.
    ///
    /// A new document is neither cached nor persisted until it is saved.
    pub async fn get_or_new(&self, id: Uuid) -> ServiceResult<T::Object> {
        Ok(self.get(id).await?.unwrap_or_else(|| self.create_new()))
    }

    /// [`get_or_new`](Self::get_or_new), blocking the calling thread.
    pub fn get_or_new_on_calling_thread(&self, id: Uuid) -> ServiceResult<T::Object> {
        Ok(self
            .get_on_calling_thread(id)?
            .unwrap_or_else(|| self.create_new()))
    }

    /// `true` if `id` is cached or has a record.
    pub async fn exists(&self, id: Uuid) -> ServiceResult<bool> {
        if self.inner.cache.get(&id).is_some() {
            return Ok(true);
        }
        let repository = self.inner.repository.current();
        run_blocking("exists", Target::Id(id), move || {
            repository
                .exists(id)
                .map_err(|e| ServiceError::repository("exists", Target::Id(id), e))
        })
        .await
    }

    /// Load every record the query selects and cache each one.
    ///
    /// An id whose cached document has an unsaved write yields that document
    /// instead of the stored one.
    pub async fn get_all(&self, query: &DataQuery) -> ServiceResult<BTreeMap<Uuid, T::Object>> {
        let inner = Arc::clone(&self.inner);
        let owned = query.clone();
        run_blocking("get_all", Target::Query(query.clone()), move || {
            inner.load_all(&owned, "get_all")
        })
        .await
    }

    /// The single record the query selects, if any.
    ///
    /// Fails with [`ServiceError::AmbiguousQuery`] if it selects more than one.
    pub async fn get_one(&self, query: &DataQuery) -> ServiceResult<Option<T::Object>> {
        let inner = Arc::clone(&self.inner);
        let owned = query.clone();
        let mut found = run_blocking("get_one", Target::Query(query.clone()), move || {
            inner.load_all(&owned, "get_one")
        })
        .await?;
        match found.len() {
            0 | 1 => Ok(found.pop_first().map(|(_, doc)| doc)),
            count => Err(ServiceError::AmbiguousQuery {
                op: "get_one",
                target: Target::Query(query.clone()),
                count,
            }),
        }
    }

    /// Number of stored records the query selects.
    pub async fn count(&self, query: &DataQuery) -> ServiceResult<usize> {
        let repository = self.inner.repository.current();
        let owned = query.clone();
        let target = Target::Query(query.clone());
        run_blocking("count", target.clone(), move || {
            repository
                .count(&owned)
                .map_err(|e| ServiceError::repository("count", target, e))
        })
        .await
    }

    /// Persist `doc` as `id`'s record.
    ///
    /// A document that cannot be translated is rejected before the cache is
    /// touched. Otherwise the cache is replaced with `doc` immediately; if
    /// the repository write fails the cached copy stays marked unsaved until
    /// [`ensure_saved`](Self::ensure_saved) succeeds.
    pub async fn save(&self, id: Uuid, doc: T::Object) -> ServiceResult<()> {
        let backend = self.inner.translate(id, &doc, "save")?;
        let version = self.inner.cache.store_written(id, doc);
        let inner = Arc::clone(&self.inner);
        run_blocking("save", Target::Id(id), move || {
            inner.write(id, &backend, version, "save")
        })
        .await
    }

    /// [`save`](Self::save), blocking the calling thread.
    pub fn save_on_calling_thread(&self, id: Uuid, doc: T::Object) -> ServiceResult<()> {
        let backend = self.inner.translate(id, &doc, "save")?;
        let version = self.inner.cache.store_written(id, doc);
        self.inner.write(id, &backend, version, "save")
    }

    /// Drop `id` from the cache and delete its record.
    ///
    /// Returns `true` if a record existed.
    pub async fn delete(&self, id: Uuid) -> ServiceResult<bool> {
        if let Some((_, true)) = self.inner.cache.remove(&id) {
            debug!(kind = self.inner.name, %id, "deleting document with unsaved changes");
        }
        let repository = self.inner.repository.current();
        run_blocking("delete", Target::Id(id), move || {
            repository
                .delete(id)
                .map_err(|e| ServiceError::repository("delete", Target::Id(id), e))
        })
        .await
    }

    /// Persist every cached document with an unsaved write.
    ///
    /// Every dirty document is attempted; the first failure is returned.
    /// Returns the number of documents written.
    pub async fn ensure_saved(&self) -> ServiceResult<usize> {
        let inner = Arc::clone(&self.inner);
        run_blocking("ensure_saved", Target::Query(DataQuery::All), move || {
            inner.flush_dirty()
        })
        .await
    }

    /// [`ensure_saved`](Self::ensure_saved), blocking the calling thread.
    pub fn ensure_saved_on_calling_thread(&self) -> ServiceResult<usize> {
        self.inner.flush_dirty()
    }

    /// Drop every cached document and ask the repository to drop its own
    /// cache.
    pub async fn clear_cache(&self) -> ServiceResult<()> {
        let dropped = self.inner.cache.clear();
        if dropped > 0 {
            warn!(kind = self.inner.name, dropped, "cleared cache with unsaved changes");
        }
        let repository = self.inner.repository.current();
        if !repository.has_cache() {
            return Ok(());
        }
        run_blocking("clear_cache", Target::Query(DataQuery::All), move || {
            repository
                .clear_cache()
                .map_err(|e| ServiceError::repository("clear_cache", Target::Query(DataQuery::All), e))
        })
        .await
    }

    /// The repository currently in use.
    pub fn repository(&self) -> KeyedRepositoryRef<T> {
        self.inner.repository.current()
    }

    /// Install a new repository and return the previous one.
    ///
    /// The cache is not touched; callers decide whether to flush or clear it.
    pub fn replace_repository(&self, repository: KeyedRepositoryRef<T>) -> KeyedRepositoryRef<T> {
        self.inner.repository.replace(repository)
    }
}

impl<T: DataTranslator> KeyedInner<T> {
    fn load(&self, id: Uuid, op: &'static str) -> LoadOutcome<T::Object> {
        let backend = self
            .repository
            .current()
            .get(id)
            .map_err(|e| ServiceError::repository(op, Target::Id(id), e))?;
        debug!(kind = self.name, %id, found = backend.is_some(), "loaded from repository");
        backend
            .map(|b| self.translator.from_backend(b))
            .transpose()
            .map_err(|e| ServiceError::translation(op, Target::Id(id), e))
    }

    fn get_blocking(&self, id: Uuid, op: &'static str) -> LoadOutcome<T::Object> {
        match self.cache.lookup(&id) {
            Lookup::Hit(doc) => Ok(Some(doc)),
            Lookup::Lead => {
                let pending = PendingLoad::new(Arc::clone(&self.cache), id, op, Target::Id(id));
                pending.finish(self.load(id, op))
            }
            // Blocking on another caller's load is not possible from every
            // thread, so read independently.
            Lookup::Wait(_) => Ok(self
                .load(id, op)?
                .map(|doc| self.cache.store_loaded(id, doc))),
        }
    }

    fn load_all(
        &self,
        query: &DataQuery,
        op: &'static str,
    ) -> ServiceResult<BTreeMap<Uuid, T::Object>> {
        let records = self
            .repository
            .current()
            .get_all(query)
            .map_err(|e| ServiceError::repository(op, Target::Query(query.clone()), e))?;
        let mut docs = BTreeMap::new();
        for (id, backend) in records {
            let doc = self
                .translator
                .from_backend(backend)
                .map_err(|e| ServiceError::translation(op, Target::Id(id), e))?;
            docs.insert(id, self.cache.store_loaded(id, doc));
        }
        debug!(kind = self.name, %query, loaded = docs.len(), "bulk load");
        Ok(docs)
    }

    fn translate(&self, id: Uuid, doc: &T::Object, op: &'static str) -> ServiceResult<T::Backend> {
        self.translator
            .to_backend(doc)
            .map_err(|e| ServiceError::translation(op, Target::Id(id), e))
    }

    fn write(&self, id: Uuid, backend: &T::Backend, version: u64, op: &'static str) -> ServiceResult<()> {
        self.repository
            .current()
            .save(id, backend)
            .map_err(|e| ServiceError::repository(op, Target::Id(id), e))?;
        self.cache.mark_clean(&id, version);
        debug!(kind = self.name, %id, "saved to repository");
        Ok(())
    }

    fn persist(&self, id: Uuid, doc: &T::Object, version: u64, op: &'static str) -> ServiceResult<()> {
        let backend = self.translate(id, doc, op)?;
        self.write(id, &backend, version, op)
    }

    fn flush_dirty(&self) -> ServiceResult<usize> {
        let mut saved = 0;
        let mut first_error = None;
        for slot in self.cache.dirty() {
            match self.persist(slot.key, &slot.doc, slot.version, "ensure_saved") {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(kind = self.name, id = %slot.key, error = %e, "failed to flush document");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }
}

impl<T: DataTranslator> Clone for KeyedService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: DataTranslator> fmt::Debug for KeyedService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedService")
            .field("name", &self.inner.name)
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}
