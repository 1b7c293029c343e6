//! Offline-first saved meals repository.

use crate::db::{
    CacheError, CachedEntity, LocalCache, LocalStore, Mutation, PendingQueue, QueueError,
};
use crate::models::{CollectionItem, SavedMeal, SavedMealUpdate};
use crate::remote::{HttpRemoteStore, RemoteError, RemoteStore};
use crate::sync::remote_only::RemoteOnly;

/// Error type for sync saved meal operations.
#[derive(Debug)]
pub enum SyncMealError {
    Cache(CacheError),
    Queue(QueueError),
    Remote(RemoteError),
    /// Meal not found in the local cache.
    NotFound(String),
}

impl std::fmt::Display for SyncMealError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMealError::Cache(e) => write!(f, "{}", e),
            SyncMealError::Queue(e) => write!(f, "{}", e),
            SyncMealError::Remote(e) => write!(f, "{}", e),
            SyncMealError::NotFound(id) => write!(f, "Saved meal not found: {}", id),
        }
    }
}

impl std::error::Error for SyncMealError {}

impl From<CacheError> for SyncMealError {
    fn from(e: CacheError) -> Self {
        SyncMealError::Cache(e)
    }
}

impl From<QueueError> for SyncMealError {
    fn from(e: QueueError) -> Self {
        SyncMealError::Queue(e)
    }
}

impl From<RemoteError> for SyncMealError {
    fn from(e: RemoteError) -> Self {
        SyncMealError::Remote(e)
    }
}

impl From<serde_json::Error> for SyncMealError {
    fn from(e: serde_json::Error) -> Self {
        SyncMealError::Queue(QueueError::Serialize(e))
    }
}

pub struct SyncMealRepository<R = HttpRemoteStore> {
    cache: LocalCache,
    queue: PendingQueue,
    fallback: Option<RemoteOnly<R>>,
}

impl SyncMealRepository {
    pub fn new(store: &LocalStore) -> Self {
        Self {
            cache: store.cache(),
            queue: store.queue(),
            fallback: None,
        }
    }
}

impl<R: RemoteStore> SyncMealRepository<R> {
    pub fn with_fallback(store: &LocalStore, remote: R) -> Self {
        Self {
            cache: store.cache(),
            queue: store.queue(),
            fallback: Some(RemoteOnly::new(remote)),
        }
    }

    fn remote_only(&self) -> Option<&RemoteOnly<R>> {
        if self.queue.is_available() {
            None
        } else {
            self.fallback.as_ref()
        }
    }

    /// Saves a meal and returns its local id.
    pub async fn save_meal(&self, meal: &SavedMeal) -> Result<String, SyncMealError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.create(meal).await?);
        }

        let id = self
            .queue
            .enqueue(SavedMeal::COLLECTION, &Mutation::add(meal)?)
            .await?;
        self.cache
            .put(
                SavedMeal::COLLECTION,
                &[CachedEntity::pending(id.clone(), meal.clone())],
            )
            .await?;
        Ok(id)
    }

    pub async fn update_meal(
        &self,
        id: &str,
        update: &SavedMealUpdate,
    ) -> Result<SavedMeal, SyncMealError> {
        if !self.queue.is_available() && self.fallback.is_none() {
            return Err(QueueError::StorageUnavailable.into());
        }
        let mut meal = self
            .get(id)
            .await?
            .ok_or_else(|| SyncMealError::NotFound(id.to_string()))?
            .payload;
        if update.is_empty() {
            return Ok(meal);
        }

        update.apply_to(&mut meal);
        if let Some(remote) = self.remote_only() {
            remote
                .update(SavedMeal::COLLECTION, id, &serde_json::to_value(update)?)
                .await?;
            return Ok(meal);
        }

        self.queue
            .enqueue(SavedMeal::COLLECTION, &Mutation::update(id, update)?)
            .await?;
        self.cache
            .put(
                SavedMeal::COLLECTION,
                &[CachedEntity::pending(id, meal.clone())],
            )
            .await?;
        Ok(meal)
    }

    pub async fn delete_meal(&self, id: &str) -> Result<(), SyncMealError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.delete(SavedMeal::COLLECTION, id).await?);
        }

        self.queue
            .enqueue(SavedMeal::COLLECTION, &Mutation::delete(id))
            .await?;
        self.cache.delete(SavedMeal::COLLECTION, id).await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<CachedEntity<SavedMeal>>, SyncMealError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.list().await?);
        }

        let snapshot = self
            .cache
            .get_all::<SavedMeal>(SavedMeal::COLLECTION)
            .await?;
        Ok(snapshot.iter().collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<CachedEntity<SavedMeal>>, SyncMealError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.get(id).await?);
        }

        Ok(self.cache.get(SavedMeal::COLLECTION, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Action;
    use crate::models::Collection;
    use crate::remote::memory::InMemoryRemoteStore;
    use tempfile::TempDir;

    struct TestContext {
        repo: SyncMealRepository,
        store: LocalStore,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("meals.db"))
            .await
            .unwrap();
        TestContext {
            repo: SyncMealRepository::new(&store),
            store,
            _temp_dir: temp_dir,
        }
    }

    fn chili() -> SavedMeal {
        SavedMeal::new("Chili")
            .with_ingredients(vec!["beans".into(), "tomatoes".into()])
            .with_servings(4)
    }

    #[tokio::test]
    async fn test_save_update_delete_queue_in_order() {
        let ctx = setup().await;

        let id = ctx.repo.save_meal(&chili()).await.unwrap();
        let updated = ctx
            .repo
            .update_meal(
                &id,
                &SavedMealUpdate {
                    servings: Some(6),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.servings, Some(6));
        ctx.repo.delete_meal(&id).await.unwrap();

        let actions: Vec<Action> = ctx
            .store
            .queue()
            .list_by_collection(Collection::SavedMeals)
            .await
            .unwrap()
            .iter()
            .map(|op| op.action())
            .collect();
        assert_eq!(actions, vec![Action::Add, Action::Update, Action::Delete]);
        assert!(ctx.repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_shows_latest_first() {
        let ctx = setup().await;

        ctx.repo.save_meal(&chili()).await.unwrap();
        ctx.repo.save_meal(&SavedMeal::new("Tacos")).await.unwrap();

        let names: Vec<String> = ctx
            .repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.payload.name)
            .collect();
        assert_eq!(names, vec!["Tacos", "Chili"]);
    }

    #[tokio::test]
    async fn test_update_missing_meal() {
        let ctx = setup().await;
        let result = ctx
            .repo
            .update_meal("nope", &SavedMealUpdate::default())
            .await;
        assert!(matches!(result, Err(SyncMealError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unavailable_storage_writes_remote_directly() {
        let remote = InMemoryRemoteStore::new().with_next_ids(&["m1"]);
        let repo = SyncMealRepository::with_fallback(&LocalStore::unavailable(), remote);

        let id = repo.save_meal(&chili()).await.unwrap();
        assert_eq!(id, "m1");

        let meal = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(meal.payload.servings, Some(4));

        repo.delete_meal(&id).await.unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_without_storage_reports_unavailable() {
        let repo = SyncMealRepository::new(&LocalStore::unavailable());

        let update = SavedMealUpdate {
            servings: Some(2),
            ..Default::default()
        };
        let result = repo.update_meal("m1", &update).await;
        assert!(matches!(
            result,
            Err(SyncMealError::Queue(QueueError::StorageUnavailable))
        ));
    }
}
