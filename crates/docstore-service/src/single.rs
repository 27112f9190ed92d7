use std::fmt;
use std::sync::Arc;

use docstore_data::DataTranslator;
use docstore_repo::{RepositoryCell, SingleRepository};
use tracing::{debug, warn};

use crate::cache::{wait_for_load, CacheSlots, LoadOutcome, Lookup, PendingLoad};
use crate::error::{ServiceError, ServiceResult, Target};
use crate::task::run_blocking;

/// Shared handle to a singleton repository for translator `T`.
pub type SingleRepositoryRef<T> = Arc<dyn SingleRepository<<T as DataTranslator>::Backend>>;

const TARGET: Target = Target::Singleton;

/// Cached storage service for the singleton document.
///
/// At most one document is cached. It is created lazily by the first
/// successful load or save and dropped only by [`clear_cache`](Self::clear_cache)
/// or a [`reload`](Self::reload) that finds no record.
///
/// Cloning the service is cheap; clones share one cache and repository.
pub struct SingleCachedService<T: DataTranslator> {
    inner: Arc<SingleInner<T>>,
}

struct SingleInner<T: DataTranslator> {
    name: &'static str,
    translator: T,
    repository: RepositoryCell<dyn SingleRepository<T::Backend>>,
    cache: Arc<CacheSlots<(), T::Object>>,
}

impl<T: DataTranslator> SingleCachedService<T> {
    pub fn new(name: &'static str, translator: T, repository: SingleRepositoryRef<T>) -> Self {
        Self {
            inner: Arc::new(SingleInner {
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

    /// The cached document, without touching the repository.
    pub fn get_cached(&self) -> Option<T::Object> {
        self.inner.cache.get(&())
    }

    /// `true` if the cached document has a write that has not been persisted.
    pub fn is_dirty(&self) -> bool {
        self.inner.cache.is_dirty(&())
    }

    /// Fetch the document, loading it on the blocking pool on a cache miss.
    ///
    /// Concurrent calls during a load share that load. `Ok(None)` means no
    /// record exists.
    pub async fn get(&self) -> ServiceResult<Option<T::Object>> {
        match self.inner.cache.lookup(&()) {
            Lookup::Hit(doc) => {
                debug!(kind = self.inner.name, "cache hit");
                Ok(Some(doc))
            }
            Lookup::Wait(rx) => wait_for_load(rx, "get", TARGET).await,
            Lookup::Lead => {
                let pending = PendingLoad::new(Arc::clone(&self.inner.cache), (), "get", TARGET);
                let inner = Arc::clone(&self.inner);
                run_blocking("get", TARGET, move || pending.finish(inner.load("get"))).await
            }
        }
    }

    /// [`get`](Self::get), blocking the calling thread.
    pub fn get_on_calling_thread(&self) -> ServiceResult<Option<T::Object>> {
        self.inner.get_blocking("get")
    }

    /// The stored document, or a new blank one if no record exists.
    ///
    /// A new document is neither cached nor persisted until it is saved.
    pub async fn get_or_new(&self) -> ServiceResult<T::Object> {
        Ok(self.get().await?.unwrap_or_else(|| self.create_new()))
    }

    /// [`get_or_new`](Self::get_or_new), blocking the calling thread.
    pub fn get_or_new_on_calling_thread(&self) -> ServiceResult<T::Object> {
        Ok(self
            .get_on_calling_thread()?
            .unwrap_or_else(|| self.create_new()))
    }

    /// Persist `doc`.
    ///
    /// A document that cannot be translated is rejected before the cache is
    /// touched. Otherwise the cache is replaced with `doc` immediately; if
    /// the repository write fails the cached copy stays marked unsaved until
    /// [`ensure_saved`](Self::ensure_saved) succeeds.
    pub async fn save(&self, doc: T::Object) -> ServiceResult<()> {
        let backend = self.inner.translate(&doc, "save")?;
        let version = self.inner.cache.store_written((), doc);
        let inner = Arc::clone(&self.inner);
        run_blocking("save", TARGET, move || inner.write(&backend, version, "save")).await
    }

    /// [`save`](Self::save), blocking the calling thread.
    pub fn save_on_calling_thread(&self, doc: T::Object) -> ServiceResult<()> {
        let backend = self.inner.translate(&doc, "save")?;
        let version = self.inner.cache.store_written((), doc);
        self.inner.write(&backend, version, "save")
    }

    /// Persist the cached document, whether or not it changed.
    ///
    /// Returns `false` if nothing is cached.
    pub async fn save_cached(&self) -> ServiceResult<bool> {
        match self.get_cached() {
            Some(doc) => self.save(doc).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Persist the cached document if it has an unsaved write.
    ///
    /// Returns the number of documents written.
    pub async fn ensure_saved(&self) -> ServiceResult<usize> {
        let inner = Arc::clone(&self.inner);
        run_blocking("ensure_saved", TARGET, move || inner.flush_dirty()).await
    }

    /// [`ensure_saved`](Self::ensure_saved), blocking the calling thread.
    pub fn ensure_saved_on_calling_thread(&self) -> ServiceResult<usize> {
        self.inner.flush_dirty()
    }

    /// Re-read the document from the repository.
    ///
    /// On success the cache reflects the repository, including a missing
    /// record. On failure the cache is left as it was.
    pub async fn reload(&self) -> ServiceResult<Option<T::Object>> {
        let inner = Arc::clone(&self.inner);
        let loaded = run_blocking("reload", TARGET, move || inner.load("reload")).await?;
        if self.inner.cache.replace((), loaded.clone()) {
            warn!(kind = self.inner.name, "reload discarded unsaved changes");
        }
        Ok(loaded)
    }

    /// Drop the cached document and ask the repository to drop its own cache.
    pub async fn clear_cache(&self) -> ServiceResult<()> {
        let dropped = self.inner.cache.clear();
        if dropped > 0 {
            warn!(kind = self.inner.name, dropped, "cleared cache with unsaved changes");
        }
        let repository = self.inner.repository.current();
        if !repository.has_cache() {
            return Ok(());
        }
        run_blocking("clear_cache", TARGET, move || {
            repository
                .clear_cache()
                .map_err(|e| ServiceError::repository("clear_cache", TARGET, e))
        })
        .await
    }

    /// The repository currently in use.
    pub fn repository(&self) -> SingleRepositoryRef<T> {
        self.inner.repository.current()
    }

    /// Install a new repository and return the previous one.
    ///
    /// The cache is not touched; callers decide whether to flush or clear it.
    pub fn replace_repository(&self, repository: SingleRepositoryRef<T>) -> SingleRepositoryRef<T> {
        self.inner.repository.replace(repository)
    }
}

impl<T: DataTranslator> SingleInner<T> {
    fn load(&self, op: &'static str) -> LoadOutcome<T::Object> {
        let backend = self
            .repository
            .current()
            .get()
            .map_err(|e| ServiceError::repository(op, TARGET, e))?;
        debug!(kind = self.name, found = backend.is_some(), "loaded from repository");
        backend
            .map(|b| self.translator.from_backend(b))
            .transpose()
            .map_err(|e| ServiceError::translation(op, TARGET, e))
    }

    fn get_blocking(&self, op: &'static str) -> LoadOutcome<T::Object> {
        match self.cache.lookup(&()) {
            Lookup::Hit(doc) => Ok(Some(doc)),
            Lookup::Lead => {
                let pending = PendingLoad::new(Arc::clone(&self.cache), (), op, TARGET);
                pending.finish(self.load(op))
            }
            // Blocking on another caller's load is not possible from every
            // thread, so read independently.
            Lookup::Wait(_) => Ok(self.load(op)?.map(|doc| self.cache.store_loaded((), doc))),
        }
    }

    fn translate(&self, doc: &T::Object, op: &'static str) -> ServiceResult<T::Backend> {
        self.translator
            .to_backend(doc)
            .map_err(|e| ServiceError::translation(op, TARGET, e))
    }

    fn write(&self, backend: &T::Backend, version: u64, op: &'static str) -> ServiceResult<()> {
        self.repository
            .current()
            .save(backend)
            .map_err(|e| ServiceError::repository(op, TARGET, e))?;
        self.cache.mark_clean(&(), version);
        debug!(kind = self.name, "saved to repository");
        Ok(())
    }

    fn persist(&self, doc: &T::Object, version: u64, op: &'static str) -> ServiceResult<()> {
        let backend = self.translate(doc, op)?;
        self.write(&backend, version, op)
    }

    fn flush_dirty(&self) -> ServiceResult<usize> {
        let mut saved = 0;
        for slot in self.cache.dirty() {
            self.persist(&slot.doc, slot.version, "ensure_saved")?;
            saved += 1;
        }
        Ok(saved)
    }
}

impl<T: DataTranslator> Clone for SingleCachedService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: DataTranslator> fmt::Debug for SingleCachedService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleCachedService")
            .field("name", &self.inner.name)
            .field("cached", &(self.inner.cache.len() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use docstore_data::{GeneralData, GeneralKey, JsonTranslator};
    use docstore_types::Node;

    use super::*;
    use crate::testing::CountingSingleRepository;

    type Service = SingleCachedService<JsonTranslator<GeneralData>>;

    fn service() -> (Service, Arc<CountingSingleRepository>) {
        let repo = Arc::new(CountingSingleRepository::new());
        let svc = Service::new("general", JsonTranslator::new(), repo.clone());
        (svc, repo)
    }

    fn motd() -> GeneralKey<String> {
        GeneralKey::new(["motd"]).unwrap()
    }

    // ---- Test 1: Missing record is absent, get_or_new is blank and uncached ----

    #[tokio::test]
    async fn get_or_new_on_empty_repository() {
        let (svc, repo) = service();
        assert!(svc.get().await.unwrap().is_none());

        let doc = svc.get_or_new().await.unwrap();
        assert!(doc.document().is_empty());
        assert!(svc.get_cached().is_none());
        assert_eq!(repo.writes.load(Ordering::SeqCst), 0);
    }

    // ---- Test 2: Read-your-writes without a repository round trip ----

    #[tokio::test]
    async fn save_then_get_hits_cache() {
        let (svc, repo) = service();
        let mut doc = svc.create_new();
        doc.set(&motd(), "welcome".to_string()).unwrap();
        svc.save(doc.clone()).await.unwrap();

        let reads_before = repo.reads.load(Ordering::SeqCst);
        let fetched = svc.get().await.unwrap().unwrap();
        assert_eq!(fetched.get(&motd()).unwrap(), doc.get(&motd()).unwrap());
        assert_eq!(repo.reads.load(Ordering::SeqCst), reads_before);
        assert!(!svc.is_dirty());
    }

    // ---- Test 3: Concurrent gets share one load ----

    #[tokio::test]
    async fn concurrent_gets_coalesce() {
        let (svc, repo) = service();
        let mut doc = svc.create_new();
        doc.set(&motd(), "hi".to_string()).unwrap();
        svc.save_on_calling_thread(doc).unwrap();
        svc.clear_cache().await.unwrap();

        let (a, b) = tokio::join!(svc.get(), svc.get());
        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert_eq!(repo.reads.load(Ordering::SeqCst), 1);
    }

    // ---- Test 4: Blocking variants share the cache ----

    #[test]
    fn calling_thread_variants() {
        let (svc, repo) = service();
        let mut doc = svc.get_or_new_on_calling_thread().unwrap();
        doc.set(&motd(), "sync".to_string()).unwrap();
        svc.save_on_calling_thread(doc).unwrap();

        let fetched = svc.get_on_calling_thread().unwrap().unwrap();
        assert_eq!(fetched.get(&motd()).unwrap().as_deref(), Some("sync"));
        assert_eq!(repo.reads.load(Ordering::SeqCst), 1);
        assert_eq!(repo.writes.load(Ordering::SeqCst), 1);
    }

    // ---- Test 5: Failed save keeps the write cached and dirty ----

    #[tokio::test]
    async fn failed_save_is_retried_by_ensure_saved() {
        let (svc, repo) = service();
        repo.fail_writes.store(true, Ordering::SeqCst);

        let mut doc = svc.create_new();
        doc.set(&motd(), "pending".to_string()).unwrap();
        let err = svc.save(doc).await.unwrap_err();
        assert!(matches!(err, ServiceError::Repository { op: "save", .. }));
        assert!(svc.is_dirty());
        assert!(svc.get_cached().is_some());

        repo.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(svc.ensure_saved().await.unwrap(), 1);
        assert!(!svc.is_dirty());
        assert_eq!(svc.ensure_saved().await.unwrap(), 0);
    }

    // ---- Test 6: Read failures propagate and are not cached ----

    #[tokio::test]
    async fn read_failure_propagates() {
        let (svc, repo) = service();
        repo.fail_reads.store(true, Ordering::SeqCst);
        let err = svc.get().await.unwrap_err();
        assert!(matches!(err, ServiceError::Repository { op: "get", .. }));
        assert!(svc.get_or_new().await.is_err());

        repo.fail_reads.store(false, Ordering::SeqCst);
        assert!(svc.get().await.unwrap().is_none());
    }

    // ---- Test 7: Reload replaces the cache from the repository ----

    #[tokio::test]
    async fn reload_reads_through() {
        let (svc, repo) = service();
        let mut doc = svc.create_new();
        doc.set(&motd(), "old".to_string()).unwrap();
        svc.save(doc).await.unwrap();

        let mut external = svc.create_new();
        external.set(&motd(), "edited on disk".to_string()).unwrap();
        let backend = JsonTranslator::<GeneralData>::new()
            .to_backend(&external)
            .unwrap();
        repo.save(&backend).unwrap();

        let cached = svc.get().await.unwrap().unwrap();
        assert_eq!(cached.get(&motd()).unwrap().as_deref(), Some("old"));

        let reloaded = svc.reload().await.unwrap().unwrap();
        assert_eq!(
            reloaded.get(&motd()).unwrap().as_deref(),
            Some("edited on disk")
        );
        assert_eq!(svc.get_cached(), Some(reloaded));
    }

    // ---- Test 8: save_cached persists whatever is cached ----

    #[tokio::test]
    async fn save_cached_writes_cached_document() {
        let (svc, repo) = service();
        assert!(!svc.save_cached().await.unwrap());

        svc.save(svc.create_new()).await.unwrap();
        assert!(svc.save_cached().await.unwrap());
        assert_eq!(repo.writes.load(Ordering::SeqCst), 2);
    }

    // ---- Test 9: Replacing the repository redirects I/O ----

    #[tokio::test]
    async fn replace_repository_redirects_io() {
        let (svc, old) = service();
        let new = Arc::new(CountingSingleRepository::new());
        svc.replace_repository(new.clone());
        svc.save(svc.create_new()).await.unwrap();
        assert_eq!(old.writes.load(Ordering::SeqCst), 0);
        assert_eq!(new.writes.load(Ordering::SeqCst), 1);
    }

    // ---- Test 10: Untranslatable documents are rejected before caching ----

    #[tokio::test]
    async fn translation_failure_leaves_cache_untouched() {
        let (svc, repo) = service();
        let rate = GeneralKey::<Node>::new(["economy", "rate"]).unwrap();
        let mut doc = svc.create_new();
        doc.set(&rate, Node::Float(f64::NEG_INFINITY)).unwrap();

        let err = svc.save(doc.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Translation { op: "save", .. }));
        assert!(svc.save_on_calling_thread(doc).is_err());
        assert!(svc.get_cached().is_none());
        assert!(!svc.is_dirty());
        assert_eq!(svc.ensure_saved().await.unwrap(), 0);
        assert!(!svc.save_cached().await.unwrap());
        assert_eq!(repo.writes.load(Ordering::SeqCst), 0);
    }
}
