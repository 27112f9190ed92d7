//! Repository doubles that count calls and fail on demand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use docstore_repo::{
    DataQuery, InMemoryKeyedRepository, InMemorySingleRepository, KeyedRepository,
    RepositoryError, RepositoryResult, SingleRepository,
};
use docstore_types::JsonObject;
use uuid::Uuid;

fn injected(what: &str) -> RepositoryError {
    RepositoryError::Corrupt {
        location: "test double".into(),
        reason: format!("injected {what} failure"),
    }
}

#[derive(Default)]
pub(crate) struct CountingSingleRepository {
    inner: InMemorySingleRepository<JsonObject>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl CountingSingleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SingleRepository<JsonObject> for CountingSingleRepository {
    fn get(&self) -> RepositoryResult<Option<JsonObject>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        self.inner.get()
    }

    fn save(&self, value: &JsonObject) -> RepositoryResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }
        self.inner.save(value)
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.inner.shutdown()
    }
}

#[derive(Default)]
pub(crate) struct CountingKeyedRepository {
    inner: InMemoryKeyedRepository<JsonObject>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl CountingKeyedRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedRepository<JsonObject> for CountingKeyedRepository {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<JsonObject>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        self.inner.get(id)
    }

    fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        self.inner.exists(id)
    }

    fn get_all(&self, query: &DataQuery) -> RepositoryResult<BTreeMap<Uuid, JsonObject>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        self.inner.get_all(query)
    }

    fn count(&self, query: &DataQuery) -> RepositoryResult<usize> {
        self.inner.count(query)
    }

    fn save(&self, id: Uuid, value: &JsonObject) -> RepositoryResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }
        self.inner.save(id, value)
    }

    fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id)
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.inner.shutdown()
    }
}
