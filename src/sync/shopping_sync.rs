//! Offline-first shopping list repository.
//!
//! Every write lands in the local cache as a pending entry and is queued for
//! the sync engine. Nothing here talks to the network, unless the local store
//! is unavailable and a remote fallback was given.

use crate::db::{
    CacheError, CachedEntity, LocalCache, LocalStore, Mutation, PendingQueue, QueueError,
};
use crate::models::{CollectionItem, ShoppingItem, ShoppingItemUpdate};
use crate::remote::{HttpRemoteStore, RemoteError, RemoteStore};
use crate::sync::remote_only::RemoteOnly;

/// Error type for sync shopping list operations.
#[derive(Debug)]
pub enum SyncShoppingError {
    /// Cache read/write failed.
    Cache(CacheError),
    /// Queue write failed.
    Queue(QueueError),
    /// Remote-only write failed.
    Remote(RemoteError),
    /// Item not found in the local list.
    NotFound(String),
}

impl std::fmt::Display for SyncShoppingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncShoppingError::Cache(e) => write!(f, "{}", e),
            SyncShoppingError::Queue(e) => write!(f, "{}", e),
            SyncShoppingError::Remote(e) => write!(f, "{}", e),
            SyncShoppingError::NotFound(id) => write!(f, "Shopping item not found: {}", id),
        }
    }
}

impl std::error::Error for SyncShoppingError {}

impl From<CacheError> for SyncShoppingError {
    fn from(e: CacheError) -> Self {
        SyncShoppingError::Cache(e)
    }
}

impl From<QueueError> for SyncShoppingError {
    fn from(e: QueueError) -> Self {
        SyncShoppingError::Queue(e)
    }
}

impl From<RemoteError> for SyncShoppingError {
    fn from(e: RemoteError) -> Self {
        SyncShoppingError::Remote(e)
    }
}

impl From<serde_json::Error> for SyncShoppingError {
    fn from(e: serde_json::Error) -> Self {
        SyncShoppingError::Queue(QueueError::Serialize(e))
    }
}

pub struct SyncShoppingRepository<R = HttpRemoteStore> {
    cache: LocalCache,
    queue: PendingQueue,
    fallback: Option<RemoteOnly<R>>,
}

impl SyncShoppingRepository {
    pub fn new(store: &LocalStore) -> Self {
        Self {
            cache: store.cache(),
            queue: store.queue(),
            fallback: None,
        }
    }
}

impl<R: RemoteStore> SyncShoppingRepository<R> {
    /// Like `new`, but talks to `remote` directly while `store` is unavailable.
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

    /// Adds an item and returns its local id.
    ///
    /// The id is replaced by the remote one once the add syncs.
    pub async fn add_item(&self, item: &ShoppingItem) -> Result<String, SyncShoppingError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.create(item).await?);
        }

        let id = self
            .queue
            .enqueue(ShoppingItem::COLLECTION, &Mutation::add(item)?)
            .await?;
        self.cache
            .put(
                ShoppingItem::COLLECTION,
                &[CachedEntity::pending(id.clone(), item.clone())],
            )
            .await?;
        Ok(id)
    }

    /// Applies a partial update and returns the updated item.
    pub async fn update_item(
        &self,
        id: &str,
        update: &ShoppingItemUpdate,
    ) -> Result<ShoppingItem, SyncShoppingError> {
        if !self.queue.is_available() && self.fallback.is_none() {
            return Err(QueueError::StorageUnavailable.into());
        }
        let mut item = self
            .get(id)
            .await?
            .ok_or_else(|| SyncShoppingError::NotFound(id.to_string()))?
            .payload;
        if update.is_empty() {
            return Ok(item);
        }

        update.apply_to(&mut item);
        if let Some(remote) = self.remote_only() {
            remote
                .update(ShoppingItem::COLLECTION, id, &serde_json::to_value(update)?)
                .await?;
            return Ok(item);
        }

        self.queue
            .enqueue(ShoppingItem::COLLECTION, &Mutation::update(id, update)?)
            .await?;
        self.cache
            .put(
                ShoppingItem::COLLECTION,
                &[CachedEntity::pending(id, item.clone())],
            )
            .await?;
        Ok(item)
    }

    pub async fn set_checked(
        &self,
        id: &str,
        checked: bool,
    ) -> Result<ShoppingItem, SyncShoppingError> {
        self.update_item(id, &ShoppingItemUpdate::checked(checked))
            .await
    }

    /// Removes an item. Removing an unknown id still queues the delete.
    pub async fn remove_item(&self, id: &str) -> Result<(), SyncShoppingError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.delete(ShoppingItem::COLLECTION, id).await?);
        }

        self.queue
            .enqueue(ShoppingItem::COLLECTION, &Mutation::delete(id))
            .await?;
        self.cache.delete(ShoppingItem::COLLECTION, id).await?;
        Ok(())
    }

    /// Cached items, most recently touched first.
    pub async fn list(&self) -> Result<Vec<CachedEntity<ShoppingItem>>, SyncShoppingError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.list().await?);
        }

        let snapshot = self
            .cache
            .get_all::<ShoppingItem>(ShoppingItem::COLLECTION)
            .await?;
        Ok(snapshot.iter().collect())
    }

    pub async fn get(
        &self,
        id: &str,
    ) -> Result<Option<CachedEntity<ShoppingItem>>, SyncShoppingError> {
        if let Some(remote) = self.remote_only() {
            return Ok(remote.get(id).await?);
        }

        Ok(self.cache.get(ShoppingItem::COLLECTION, id).await?)
    }
}
