//! Direct remote access used when the local store cannot be opened.
//!
//! Reads come straight from the remote store and writes are sent immediately.
//! Nothing is cached or queued, so a failed write is reported to the caller.

use crate::db::CachedEntity;
use crate::models::{Collection, CollectionItem};
use crate::remote::{RemoteError, RemoteStore};

pub struct RemoteOnly<R> {
    remote: R,
}

impl<R: RemoteStore> RemoteOnly<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    #[cfg(test)]
    pub(crate) fn remote(&self) -> &R {
        &self.remote
    }

    /// Remote documents, newest first, as synced entities.
    ///
    /// Documents that do not deserialize as `T` are skipped.
    pub async fn list<T: CollectionItem>(&self) -> Result<Vec<CachedEntity<T>>, RemoteError> {
        let documents = self.remote.query_ordered_desc(T::COLLECTION).await?;
        Ok(documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<T>(doc.data) {
                Ok(payload) => Some(CachedEntity::synced(doc.id, payload)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable remote document {}: {}", doc.id, e);
                    None
                }
            })
            .collect())
    }

    pub async fn get<T: CollectionItem>(
        &self,
        id: &str,
    ) -> Result<Option<CachedEntity<T>>, RemoteError> {
        Ok(self.list::<T>().await?.into_iter().find(|e| e.id == id))
    }

    pub async fn create<T: CollectionItem>(&self, item: &T) -> Result<String, RemoteError> {
        let document =
            serde_json::to_value(item).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.remote.create(T::COLLECTION, &document, None).await
    }

    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        updates: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        self.remote.update(collection, id, updates).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        match self.remote.delete(collection, id).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
