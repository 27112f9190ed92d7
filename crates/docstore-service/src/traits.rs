use std::collections::BTreeMap;

use async_trait::async_trait;
use docstore_data::DataTranslator;
use docstore_repo::DataQuery;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::keyed::KeyedService;
use crate::single::SingleCachedService;

/// Storage surface for the singleton document, as seen by feature code.
#[async_trait]
pub trait SingleStorage: Send + Sync {
    type Object: Clone + Send + Sync + 'static;

    fn create_new(&self) -> Self::Object;
    fn get_cached(&self) -> Option<Self::Object>;
    async fn get(&self) -> ServiceResult<Option<Self::Object>>;
    fn get_on_calling_thread(&self) -> ServiceResult<Option<Self::Object>>;
    async fn get_or_new(&self) -> ServiceResult<Self::Object>;
    async fn save(&self, doc: Self::Object) -> ServiceResult<()>;
    fn save_on_calling_thread(&self, doc: Self::Object) -> ServiceResult<()>;
    async fn clear_cache(&self) -> ServiceResult<()>;
}

/// Storage surface for documents addressed by UUID, as seen by feature code.
#[async_trait]
pub trait KeyedStorage: Send + Sync {
    type Object: Clone + Send + Sync + 'static;

    fn create_new(&self) -> Self::Object;
    fn get_cached(&self, id: Uuid) -> Option<Self::Object>;
    async fn get(&self, id: Uuid) -> ServiceResult<Option<Self::Object>>;
    fn get_on_calling_thread(&self, id: Uuid) -> ServiceResult<Option<Self::Object>>;
    async fn get_or_new(&self, id: Uuid) -> ServiceResult<Self::Object>;
    async fn exists(&self, id: Uuid) -> ServiceResult<bool>;
    async fn get_all(&self, query: &DataQuery) -> ServiceResult<BTreeMap<Uuid, Self::Object>>;
    async fn save(&self, id: Uuid, doc: Self::Object) -> ServiceResult<()>;
    fn save_on_calling_thread(&self, id: Uuid, doc: Self::Object) -> ServiceResult<()>;
    async fn delete(&self, id: Uuid) -> ServiceResult<bool>;
    async fn clear_cache(&self) -> ServiceResult<()>;
}

#[async_trait]
impl<T: DataTranslator> SingleStorage for SingleCachedService<T> {
    type Object = T::Object;

    fn create_new(&self) -> T::Object {
        SingleCachedService::create_new(self)
    }

    fn get_cached(&self) -> Option<T::Object> {
        SingleCachedService::get_cached(self)
    }

    async fn get(&self) -> ServiceResult<Option<T::Object>> {
        SingleCachedService::get(self).await
    }

    fn get_on_calling_thread(&self) -> ServiceResult<Option<T::Object>> {
        SingleCachedService::get_on_calling_thread(self)
    }

    async fn get_or_new(&self) -> ServiceResult<T::Object> {
        SingleCachedService::get_or_new(self).await
    }

    async fn save(&self, doc: T::Object) -> ServiceResult<()> {
        SingleCachedService::save(self, doc).await
    }

    fn save_on_calling_thread(&self, doc: T::Object) -> ServiceResult<()> {
        SingleCachedService::save_on_calling_thread(self, doc)
    }

    async fn clear_cache(&self) -> ServiceResult<()> {
        SingleCachedService::clear_cache(self).await
    }
}

#[async_trait]
impl<T: DataTranslator> KeyedStorage for KeyedService<T> {
    type Object = T::Object;

    fn create_new(&self) -> T::Object {
        KeyedService::create_new(self)
    }

    fn get_cached(&self, id: Uuid) -> Option<T::Object> {
        KeyedService::get_cached(self, id)
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Option<T::Object>> {
        KeyedService::get(self, id).await
    }

    fn get_on_calling_thread(&self, id: Uuid) -> ServiceResult<Option<T::Object>> {
        KeyedService::get_on_calling_thread(self, id)
    }

    async fn get_or_new(&self, id: Uuid) -> ServiceResult<T::Object> {
        KeyedService::get_or_new(self, id).await
    }

    async fn exists(&self, id: Uuid) -> ServiceResult<bool> {
        KeyedService::exists(self, id).await
    }

    async fn get_all(&self, query: &DataQuery) -> ServiceResult<BTreeMap<Uuid, T::Object>> {
        KeyedService::get_all(self, query).await
    }

    async fn save(&self, id: Uuid, doc: T::Object) -> ServiceResult<()> {
        KeyedService::save(self, id, doc).await
    }

    fn save_on_calling_thread(&self, id: Uuid, doc: T::Object) -> ServiceResult<()> {
        KeyedService::save_on_calling_thread(self, id, doc)
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<bool> {
        KeyedService::delete(self, id).await
    }

    async fn clear_cache(&self) -> ServiceResult<()> {
        KeyedService::clear_cache(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use docstore_data::{JsonTranslator, UserData, UserDataObject, UserKey};

    use super::*;
    use crate::testing::CountingKeyedRepository;

    async fn bump_level(storage: &dyn KeyedStorage<Object = UserDataObject>, id: Uuid) -> i64 {
        let key = UserKey::<i64>::with_default(["stats", "level"], 0).unwrap();
        let mut doc = storage.get_or_new(id).await.unwrap();
        let level = doc.get_or_default(&key).unwrap().unwrap_or_default() + 1;
        doc.set(&key, level).unwrap();
        storage.save(id, doc).await.unwrap();
        level
    }

    #[tokio::test]
    async fn feature_code_works_through_trait_object() {
        let repo = Arc::new(CountingKeyedRepository::new());
        let service =
            KeyedService::<JsonTranslator<UserData>>::new("user", JsonTranslator::new(), repo);
        let storage: Arc<dyn KeyedStorage<Object = UserDataObject>> = Arc::new(service);

        let id = Uuid::new_v4();
        assert_eq!(bump_level(storage.as_ref(), id).await, 1);
        assert_eq!(bump_level(storage.as_ref(), id).await, 2);
        assert!(storage.exists(id).await.unwrap());
        assert!(storage.delete(id).await.unwrap());
    }
}
