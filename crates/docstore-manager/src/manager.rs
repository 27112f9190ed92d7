use std::fmt;
use std::sync::Arc;

use docstore_data::{
    GeneralData, GeneralDataObject, JsonTranslator, UserData, UserDataObject, WorldData,
    WorldDataObject,
};
use docstore_repo::{FlatFileLayout, InMemoryKeyedRepository, InMemorySingleRepository};
use docstore_service::{
    KeyedRepositoryRef, KeyedService, ServiceError, ServiceResult, SingleCachedService,
    SingleRepositoryRef,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{ManagerError, ManagerResult};

pub type GeneralTranslator = JsonTranslator<GeneralData>;
pub type UserTranslator = JsonTranslator<UserData>;
pub type WorldTranslator = JsonTranslator<WorldData>;

pub type GeneralService = SingleCachedService<GeneralTranslator>;
pub type UserService = KeyedService<UserTranslator>;
pub type WorldService = KeyedService<WorldTranslator>;

/// One repository per entity kind.
pub struct Repositories {
    pub general: SingleRepositoryRef<GeneralTranslator>,
    pub users: KeyedRepositoryRef<UserTranslator>,
    pub worlds: KeyedRepositoryRef<WorldTranslator>,
}

impl Repositories {
    /// Flat-file repositories rooted at `config.data_dir`.
    pub fn flat_file(config: &StorageConfig) -> Self {
        let layout = FlatFileLayout::new(&config.data_dir).pretty(config.pretty_json);
        Self {
            general: Arc::new(layout.general()),
            users: Arc::new(layout.users()),
            worlds: Arc::new(layout.worlds()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            general: Arc::new(InMemorySingleRepository::new()),
            users: Arc::new(InMemoryKeyedRepository::new()),
            worlds: Arc::new(InMemoryKeyedRepository::new()),
        }
    }

    /// The repositories `config.backend` names.
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.backend {
            BackendKind::FlatFile => Self::flat_file(config),
            BackendKind::Memory => Self::in_memory(),
        }
    }
}

impl fmt::Debug for Repositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

/// Composition root binding the general, user and world services to their
/// repositories.
#[derive(Debug)]
pub struct StorageManager {
    config: StorageConfig,
    general: GeneralService,
    users: UserService,
    worlds: WorldService,
    // Serializes reconfigure and shutdown.
    lifecycle: Mutex<()>,
}

impl StorageManager {
    /// Build the repositories `config` selects.
    pub fn new(config: StorageConfig) -> ManagerResult<Self> {
        let repositories = match config.backend {
            BackendKind::Memory => Some(Repositories::in_memory()),
            BackendKind::FlatFile => None,
        };
        Self::with_repositories(config, repositories)
    }

    /// Use `repositories`, or flat files under `config.data_dir` if `None`.
    pub fn with_repositories(
        config: StorageConfig,
        repositories: Option<Repositories>,
    ) -> ManagerResult<Self> {
        config.validate()?;
        let repositories = repositories.unwrap_or_else(|| {
            info!(
                data_dir = %config.data_dir.display(),
                "no repository configured, using flat-file fallback"
            );
            Repositories::flat_file(&config)
        });
        Ok(Self {
            general: SingleCachedService::new(
                "general",
                GeneralTranslator::new(),
                repositories.general,
            ),
            users: KeyedService::new("user", UserTranslator::new(), repositories.users),
            worlds: KeyedService::new("world", WorldTranslator::new(), repositories.worlds),
            config,
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn general_service(&self) -> &GeneralService {
        &self.general
    }

    pub fn user_service(&self) -> &UserService {
        &self.users
    }

    pub fn world_service(&self) -> &WorldService {
        &self.worlds
    }

    // ---- Conveniences ----

    /// The general document: cached, stored, or a new blank one.
    pub async fn general(&self) -> ManagerResult<GeneralDataObject> {
        Ok(self.general.get_or_new().await?)
    }

    pub async fn save_general(&self, doc: GeneralDataObject) -> ManagerResult<()> {
        Ok(self.general.save(doc).await?)
    }

    pub async fn get_user(&self, id: Uuid) -> ManagerResult<Option<UserDataObject>> {
        Ok(self.users.get(id).await?)
    }

    /// The stored user document, or a blank one that is not persisted until
    /// saved.
    pub async fn get_or_create_user(&self, id: Uuid) -> ManagerResult<UserDataObject> {
        Ok(self.users.get_or_new(id).await?)
    }

    pub async fn save_user(&self, id: Uuid, doc: UserDataObject) -> ManagerResult<()> {
        Ok(self.users.save(id, doc).await?)
    }

    pub async fn get_world(&self, id: Uuid) -> ManagerResult<Option<WorldDataObject>> {
        Ok(self.worlds.get(id).await?)
    }

    pub async fn get_or_create_world(&self, id: Uuid) -> ManagerResult<WorldDataObject> {
        Ok(self.worlds.get_or_new(id).await?)
    }

    pub async fn save_world(&self, id: Uuid, doc: WorldDataObject) -> ManagerResult<()> {
        Ok(self.worlds.save(id, doc).await?)
    }

    // ---- Lifecycle ----

    /// Persist every unsaved document in every service.
    ///
    /// All three services are flushed even if one fails; the first failure
    /// is returned. Returns the number of documents written.
    pub async fn save_all(&self) -> ManagerResult<usize> {
        let (general, users, worlds) = tokio::join!(
            self.general.ensure_saved(),
            self.users.ensure_saved(),
            self.worlds.ensure_saved(),
        );
        Ok(general? + users? + worlds?)
    }

    /// Flush then clear every service cache.
    ///
    /// Each cache is cleared even if its flush failed, discarding the
    /// documents that could not be written. The first failure is returned.
    pub async fn save_and_invalidate_all_caches(&self) -> ManagerResult<usize> {
        let (general, users, worlds) = tokio::join!(
            async { (self.general.ensure_saved().await, self.general.clear_cache().await) },
            async { (self.users.ensure_saved().await, self.users.clear_cache().await) },
            async { (self.worlds.ensure_saved().await, self.worlds.clear_cache().await) },
        );
        settle([general, users, worlds])
    }

    /// Swap in new repositories.
    ///
    /// Unsaved documents are flushed to the current repositories first; if
    /// that fails nothing is swapped. The old repositories are then shut down
    /// and every cache is cleared, so later reads come from the new backend.
    pub async fn reconfigure(&self, repositories: Repositories) -> ManagerResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let flushed = self.save_all().await?;
        let old_general = self.general.replace_repository(repositories.general);
        let old_users = self.users.replace_repository(repositories.users);
        let old_worlds = self.worlds.replace_repository(repositories.worlds);

        let shutdown = [
            ("general", old_general.shutdown()),
            ("user", old_users.shutdown()),
            ("world", old_worlds.shutdown()),
        ];
        let mut first_error = None;
        for (kind, result) in shutdown {
            if let Err(e) = result {
                warn!(kind, error = %e, "old repository failed to shut down");
                first_error.get_or_insert(ManagerError::Repository(e));
            }
        }

        let (general, users, worlds) = tokio::join!(
            self.general.clear_cache(),
            self.users.clear_cache(),
            self.worlds.clear_cache(),
        );
        general?;
        users?;
        worlds?;

        info!(flushed, "storage reconfigured");
        first_error.map_or(Ok(()), Err)
    }

    /// Flush every service and shut the repositories down.
    ///
    /// Services keep their caches; reads that miss the cache fail afterwards.
    pub async fn shutdown(&self) -> ManagerResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let flushed = self.save_all().await?;
        self.general.repository().shutdown()?;
        self.users.repository().shutdown()?;
        self.worlds.repository().shutdown()?;
        info!(flushed, "storage shut down");
        Ok(())
    }
}

fn settle(results: [(ServiceResult<usize>, ServiceResult<()>); 3]) -> ManagerResult<usize> {
    let mut saved = 0;
    let mut first_error: Option<ServiceError> = None;
    for (flushed, cleared) in results {
        match flushed {
            Ok(n) => saved += n,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = cleared {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(saved),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use docstore_data::{GeneralKey, UserKey};
    use docstore_repo::{
        DataQuery, KeyedRepository, RepositoryError, RepositoryResult, GENERAL_FILE,
    };
    use docstore_types::{JsonObject, Node};

    use super::*;

    fn name_key() -> UserKey<String> {
        UserKey::new(["name"]).unwrap()
    }

    fn memory_config() -> StorageConfig {
        StorageConfig::default().with_backend(BackendKind::Memory)
    }

    /// Keyed repository whose writes can be made to fail. Shutdown is only
    /// recorded so the stored records stay readable.
    #[derive(Default)]
    struct FlakyKeyedRepository {
        inner: InMemoryKeyedRepository<JsonObject>,
        fail_writes: AtomicBool,
        shut_down: AtomicBool,
    }

    impl KeyedRepository<JsonObject> for FlakyKeyedRepository {
        fn get(&self, id: Uuid) -> RepositoryResult<Option<JsonObject>> {
            self.inner.get(id)
        }

        fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
            self.inner.exists(id)
        }

        fn get_all(&self, query: &DataQuery) -> RepositoryResult<BTreeMap<Uuid, JsonObject>> {
            self.inner.get_all(query)
        }

        fn save(&self, id: Uuid, value: &JsonObject) -> RepositoryResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Corrupt {
                    location: "flaky".into(),
                    reason: "write refused".into(),
                });
            }
            self.inner.save(id, value)
        }

        fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
            self.inner.delete(id)
        }

        fn shutdown(&self) -> RepositoryResult<()> {
            self.shut_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // ---- Test 1: Memory backend round trip ----

    #[tokio::test]
    async fn memory_backend_round_trip() {
        let manager = StorageManager::new(memory_config()).unwrap();
        let id = Uuid::new_v4();

        assert!(manager.get_user(id).await.unwrap().is_none());
        let mut user = manager.get_or_create_user(id).await.unwrap();
        assert!(user.document().is_empty());
        // A new document is not cached until saved.
        assert!(manager.user_service().get_cached(id).is_none());

        user.set(&name_key(), "alex".to_string()).unwrap();
        manager.save_user(id, user.clone()).await.unwrap();
        assert_eq!(manager.get_user(id).await.unwrap(), Some(user));
    }

    // ---- Test 2: Fallback writes flat files under data_dir ----

    #[tokio::test]
    async fn fallback_uses_flat_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::default().with_data_dir(dir.path());
        let manager = StorageManager::with_repositories(config, None).unwrap();

        let motd: GeneralKey<String> = GeneralKey::new(["motd"]).unwrap();
        let mut general = manager.general().await.unwrap();
        general.set(&motd, "hello".to_string()).unwrap();
        manager.save_general(general).await.unwrap();

        assert!(dir.path().join(GENERAL_FILE).is_file());
        manager.general_service().clear_cache().await.unwrap();
        let reloaded = manager.general().await.unwrap();
        assert_eq!(reloaded.get(&motd).unwrap().as_deref(), Some("hello"));
    }

    // ---- Test 3: Reconfigure switches backend and clears caches ----

    #[tokio::test]
    async fn reconfigure_clears_caches_and_shuts_down_old() {
        let old = Repositories::in_memory();
        let old_users = Arc::clone(&old.users);
        let manager = StorageManager::with_repositories(memory_config(), Some(old)).unwrap();

        let id = Uuid::new_v4();
        let mut user = manager.get_or_create_user(id).await.unwrap();
        user.set(&name_key(), "sam".to_string()).unwrap();
        manager.save_user(id, user).await.unwrap();
        assert!(old_users.exists(id).unwrap());

        manager.reconfigure(Repositories::in_memory()).await.unwrap();

        assert!(manager.user_service().get_cached(id).is_none());
        assert!(manager.get_user(id).await.unwrap().is_none());
        assert!(matches!(old_users.get(id), Err(RepositoryError::Shutdown)));
    }

    // ---- Test 4: Reconfigure flushes unsaved documents to the old backend ----

    #[tokio::test]
    async fn reconfigure_flushes_unsaved_documents() {
        let flaky = Arc::new(FlakyKeyedRepository::default());
        let repositories = Repositories {
            users: flaky.clone(),
            ..Repositories::in_memory()
        };
        let manager =
            StorageManager::with_repositories(memory_config(), Some(repositories)).unwrap();

        let id = Uuid::new_v4();
        let mut user = manager.get_or_create_user(id).await.unwrap();
        user.set(&name_key(), "kim".to_string()).unwrap();

        flaky.fail_writes.store(true, Ordering::SeqCst);
        assert!(manager.save_user(id, user).await.is_err());
        assert!(manager.user_service().is_dirty(id));

        // Flush fails: nothing is swapped.
        assert!(manager.reconfigure(Repositories::in_memory()).await.is_err());
        assert!(!flaky.shut_down.load(Ordering::SeqCst));
        assert!(manager.user_service().is_dirty(id));

        flaky.fail_writes.store(false, Ordering::SeqCst);
        manager.reconfigure(Repositories::in_memory()).await.unwrap();
        assert!(flaky.shut_down.load(Ordering::SeqCst));
        assert!(flaky.inner.exists(id).unwrap());
        assert!(!manager.user_service().is_dirty(id));
    }

    // ---- Test 5: Save-and-invalidate persists then empties caches ----

    #[tokio::test]
    async fn save_and_invalidate_all_caches() {
        let repositories = Repositories::in_memory();
        let users = Arc::clone(&repositories.users);
        let flaky = Arc::new(FlakyKeyedRepository::default());
        let repositories = Repositories {
            worlds: flaky.clone(),
            ..repositories
        };
        let manager =
            StorageManager::with_repositories(memory_config(), Some(repositories)).unwrap();

        let user_id = Uuid::new_v4();
        let world_id = Uuid::new_v4();
        let user = manager.get_or_create_user(user_id).await.unwrap();
        manager.save_user(user_id, user).await.unwrap();

        flaky.fail_writes.store(true, Ordering::SeqCst);
        let world = manager.get_or_create_world(world_id).await.unwrap();
        assert!(manager.save_world(world_id, world).await.is_err());

        let err = manager.save_and_invalidate_all_caches().await.unwrap_err();
        assert!(matches!(err, ManagerError::Service(_)));
        assert_eq!(manager.user_service().cached_count(), 0);
        assert_eq!(manager.world_service().cached_count(), 0);
        assert!(users.exists(user_id).unwrap());

        flaky.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(manager.save_and_invalidate_all_caches().await.unwrap(), 0);
    }

    // ---- Test 6: Save-all counts flushed documents ----

    #[tokio::test]
    async fn save_all_flushes_dirty_documents() {
        let flaky = Arc::new(FlakyKeyedRepository::default());
        let repositories = Repositories {
            users: flaky.clone(),
            ..Repositories::in_memory()
        };
        let manager =
            StorageManager::with_repositories(memory_config(), Some(repositories)).unwrap();

        flaky.fail_writes.store(true, Ordering::SeqCst);
        for _ in 0..2 {
            let id = Uuid::new_v4();
            let user = manager.get_or_create_user(id).await.unwrap();
            assert!(manager.save_user(id, user).await.is_err());
        }
        assert!(manager.save_all().await.is_err());

        flaky.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(manager.save_all().await.unwrap(), 2);
        assert_eq!(manager.save_all().await.unwrap(), 0);
        assert_eq!(flaky.inner.len(), 2);
    }

    // ---- Test 7: Shutdown stops repository access ----

    #[tokio::test]
    async fn shutdown_closes_repositories() {
        let manager = StorageManager::new(memory_config()).unwrap();
        let id = Uuid::new_v4();
        let user = manager.get_or_create_user(id).await.unwrap();
        manager.save_user(id, user.clone()).await.unwrap();

        manager.shutdown().await.unwrap();

        // Cached documents are still served; the repository is closed.
        assert_eq!(manager.get_user(id).await.unwrap(), Some(user));
        assert!(manager.get_user(Uuid::new_v4()).await.is_err());
    }

    // ---- Test 9: An unsavable document does not block reconfigure or shutdown ----

    #[tokio::test]
    async fn rejected_save_leaves_nothing_to_flush() {
        let manager = StorageManager::new(memory_config()).unwrap();
        let id = Uuid::new_v4();
        let speed = UserKey::<Node>::new(["stats", "speed"]).unwrap();
        let mut user = manager.get_or_create_user(id).await.unwrap();
        user.set(&speed, Node::Float(f64::INFINITY)).unwrap();

        let err = manager.save_user(id, user).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Service(ServiceError::Translation { .. })
        ));
        assert!(manager.user_service().get_cached(id).is_none());

        manager.reconfigure(Repositories::in_memory()).await.unwrap();
        manager.shutdown().await.unwrap();
    }

    // ---- Test 8: Invalid config is rejected ----

    #[test]
    fn invalid_config_is_rejected() {
        let config = StorageConfig::default().with_data_dir("");
        assert!(matches!(
            StorageManager::new(config),
            Err(ManagerError::InvalidConfig(_))
        ));
    }
}
