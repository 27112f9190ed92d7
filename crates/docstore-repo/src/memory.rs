use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::query::DataQuery;
use crate::traits::{KeyedRepository, SingleRepository};

/// In-memory repository for the singleton document.
///
/// Intended for tests and ephemeral deployments. Records are cloned on read
/// and write.
pub struct InMemorySingleRepository<B> {
    value: RwLock<Option<B>>,
    shut_down: AtomicBool,
}

impl<B> InMemorySingleRepository<B> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RepositoryError::Shutdown);
        }
        Ok(())
    }
}

impl<B> Default for InMemorySingleRepository<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Clone + Send + Sync> SingleRepository<B> for InMemorySingleRepository<B> {
    fn get(&self) -> RepositoryResult<Option<B>> {
        self.ensure_open()?;
        let value = self.value.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(value.clone())
    }

    fn save(&self, value: &B) -> RepositoryResult<()> {
        self.ensure_open()?;
        let mut slot = self.value.write().map_err(|_| RepositoryError::LockPoisoned)?;
        *slot = Some(value.clone());
        Ok(())
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.shut_down.store(true, Ordering::Release);
        debug!("in-memory single repository shut down");
        Ok(())
    }
}

impl<B> std::fmt::Debug for InMemorySingleRepository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = self.value.read().map(|v| v.is_some()).unwrap_or(false);
        f.debug_struct("InMemorySingleRepository")
            .field("present", &present)
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}

/// In-memory, `BTreeMap`-based keyed repository.
///
/// Intended for tests and ephemeral deployments. All records are held behind
/// a `RwLock` for safe concurrent access.
pub struct InMemoryKeyedRepository<B> {
    records: RwLock<BTreeMap<Uuid, B>>,
    shut_down: AtomicBool,
}

impl<B> InMemoryKeyedRepository<B> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, BTreeMap<Uuid, B>>> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RepositoryError::Shutdown);
        }
        self.records.read().map_err(|_| RepositoryError::LockPoisoned)
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, BTreeMap<Uuid, B>>> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RepositoryError::Shutdown);
        }
        self.records.write().map_err(|_| RepositoryError::LockPoisoned)
    }
}

impl<B> Default for InMemoryKeyedRepository<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Clone + Send + Sync> KeyedRepository<B> for InMemoryKeyedRepository<B> {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<B>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.read()?.contains_key(&id))
    }

    fn get_all(&self, query: &DataQuery) -> RepositoryResult<BTreeMap<Uuid, B>> {
        let records = self.read()?;
        let selected = match query.key_set() {
            None => records.clone(),
            Some(ids) => ids
                .iter()
                .filter_map(|id| records.get(id).map(|r| (*id, r.clone())))
                .collect(),
        };
        Ok(selected)
    }

    fn count(&self, query: &DataQuery) -> RepositoryResult<usize> {
        let records = self.read()?;
        Ok(match query.key_set() {
            None => records.len(),
            Some(ids) => ids.iter().filter(|id| records.contains_key(id)).count(),
        })
    }

    fn save(&self, id: Uuid, value: &B) -> RepositoryResult<()> {
        self.write()?.insert(id, value.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.write()?.remove(&id).is_some())
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.shut_down.store(true, Ordering::Release);
        debug!(records = self.len(), "in-memory keyed repository shut down");
        Ok(())
    }
}

impl<B> std::fmt::Debug for InMemoryKeyedRepository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyedRepository")
            .field("record_count", &self.len())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Test 1: Single repository starts empty and keeps the last save ----

    #[test]
    fn single_get_after_save() {
        let repo = InMemorySingleRepository::<String>::new();
        assert_eq!(repo.get().unwrap(), None);
        repo.save(&"first".to_string()).unwrap();
        repo.save(&"second".to_string()).unwrap();
        assert_eq!(repo.get().unwrap().as_deref(), Some("second"));
        assert!(!repo.has_cache());
    }

    // ---- Test 2: Keyed CRUD ----

    #[test]
    fn keyed_crud() {
        let repo = InMemoryKeyedRepository::<i64>::new();
        let id = Uuid::new_v4();

        assert_eq!(repo.get(id).unwrap(), None);
        assert!(!repo.exists(id).unwrap());

        repo.save(id, &7).unwrap();
        assert_eq!(repo.get(id).unwrap(), Some(7));
        assert!(repo.exists(id).unwrap());
        assert_eq!(repo.len(), 1);

        assert!(repo.delete(id).unwrap());
        assert!(!repo.delete(id).unwrap());
        assert!(repo.is_empty());
    }

    // ---- Test 3: Queries select and count ----

    #[test]
    fn keyed_queries() {
        let repo = InMemoryKeyedRepository::<i64>::new();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            repo.save(*id, &(n as i64)).unwrap();
        }

        assert_eq!(repo.get_all(&DataQuery::All).unwrap().len(), 4);
        assert_eq!(repo.count(&DataQuery::All).unwrap(), 4);

        let missing = Uuid::new_v4();
        let query = DataQuery::keys([ids[1], ids[3], missing]);
        let selected = repo.get_all(&query).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.get(&ids[3]), Some(&3));
        assert_eq!(repo.count(&query).unwrap(), 2);
    }

    // ---- Test 4: Shutdown rejects further operations ----

    #[test]
    fn shutdown_rejects_operations() {
        let single = InMemorySingleRepository::<i64>::new();
        single.shutdown().unwrap();
        assert!(matches!(single.get(), Err(RepositoryError::Shutdown)));
        assert!(matches!(single.save(&1), Err(RepositoryError::Shutdown)));

        let keyed = InMemoryKeyedRepository::<i64>::new();
        keyed.shutdown().unwrap();
        assert!(matches!(
            keyed.save(Uuid::new_v4(), &1),
            Err(RepositoryError::Shutdown)
        ));
        assert!(matches!(
            keyed.get_all(&DataQuery::All),
            Err(RepositoryError::Shutdown)
        ));
    }
}
