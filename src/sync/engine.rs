//! Replays queued mutations against the remote store.
//!
//! Operations for one collection are replayed strictly in creation order.
//! A failed operation stays queued and the drain moves on to the next one.
//! Collections are independent and can drain concurrently.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::db::{
    Action, CacheError, CachedEntity, LocalCache, LocalStore, Mutation, PendingOperation,
    PendingQueue, QueueEntry, QueueError,
};
use crate::models::Collection;
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::status::SyncIndicator;

/// Why a single queued operation did not sync.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncFailure {
    /// The remote store rejected or never received the write.
    RemoteWriteFailed {
        operation_id: String,
        action: Action,
        error: RemoteError,
    },
    /// The stored record could not be decoded.
    QueueCorrupt {
        operation_id: String,
        reason: String,
    },
    /// The remote write went through but the local cache could not record it.
    /// The operation stays queued and replays.
    CacheUpdateFailed {
        operation_id: String,
        error: String,
    },
}

impl SyncFailure {
    pub fn operation_id(&self) -> &str {
        match self {
            SyncFailure::RemoteWriteFailed { operation_id, .. } => operation_id,
            SyncFailure::QueueCorrupt { operation_id, .. } => operation_id,
            SyncFailure::CacheUpdateFailed { operation_id, .. } => operation_id,
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncFailure::RemoteWriteFailed {
                operation_id,
                action,
                error,
            } => write!(f, "{} {} failed: {}", action, operation_id, error),
            SyncFailure::QueueCorrupt {
                operation_id,
                reason,
            } => write!(f, "operation {} is corrupt: {}", operation_id, reason),
            SyncFailure::CacheUpdateFailed {
                operation_id,
                error,
            } => write!(
                f,
                "operation {} synced but the cache update failed: {}",
                operation_id, error
            ),
        }
    }
}

/// Outcome of one or more drains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn merge(&mut self, other: SyncSummary) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    /// True when nothing was left behind.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Errors that stop a drain or hydration as a whole.
#[derive(Debug)]
pub enum SyncError {
    Queue(QueueError),
    Cache(CacheError),
    Remote(RemoteError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Queue(e) => write!(f, "{}", e),
            SyncError::Cache(e) => write!(f, "{}", e),
            SyncError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Queue(e) => Some(e),
            SyncError::Cache(e) => Some(e),
            SyncError::Remote(e) => Some(e),
        }
    }
}

impl From<QueueError> for SyncError {
    fn from(e: QueueError) -> Self {
        SyncError::Queue(e)
    }
}

impl From<CacheError> for SyncError {
    fn from(e: CacheError) -> Self {
        SyncError::Cache(e)
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        SyncError::Remote(e)
    }
}

/// Counts in-flight drains for the indicator.
struct ActiveDrain<'a>(&'a AtomicUsize);

impl<'a> ActiveDrain<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveDrain<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SyncEngine<R> {
    queue: PendingQueue,
    cache: LocalCache,
    remote: R,
    shopping_lock: Mutex<()>,
    meals_lock: Mutex<()>,
    active_drains: AtomicUsize,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(store: &LocalStore, remote: R) -> Self {
        Self {
            queue: store.queue(),
            cache: store.cache(),
            remote,
            shopping_lock: Mutex::new(()),
            meals_lock: Mutex::new(()),
            active_drains: AtomicUsize::new(0),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn lock_for(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::ShoppingList => &self.shopping_lock,
            Collection::SavedMeals => &self.meals_lock,
        }
    }

    /// Replays every queued operation for `collection`, oldest first.
    ///
    /// Per-operation failures are collected in the summary. A second drain of
    /// the same collection waits for the first to finish.
    pub async fn drain(&self, collection: Collection) -> Result<SyncSummary, SyncError> {
        let _flight = self.lock_for(collection).lock().await;
        let _active = ActiveDrain::start(&self.active_drains);

        let entries = self.queue.scan(collection).await?;
        let mut summary = SyncSummary::default();
        if entries.is_empty() {
            return Ok(summary);
        }

        tracing::info!(
            "Draining {} pending operation(s) for {}",
            entries.len(),
            collection
        );

        for entry in entries {
            let op = match entry {
                QueueEntry::Valid(op) => op,
                QueueEntry::Corrupt { id, reason } => {
                    tracing::warn!("Skipping corrupt pending operation {}: {}", id, reason);
                    summary.failed += 1;
                    summary.errors.push(SyncFailure::QueueCorrupt {
                        operation_id: id,
                        reason,
                    });
                    continue;
                }
            };

            match self.replay(&op).await {
                Ok(target) => {
                    // The op leaves the queue only once the cache knows its remote id
                    if let Err(e) = self.reconcile(&op, target.as_deref()).await {
                        tracing::warn!(
                            "Synced {} but could not update the cache: {}",
                            op.id,
                            e
                        );
                        summary.failed += 1;
                        summary.errors.push(SyncFailure::CacheUpdateFailed {
                            operation_id: op.id.clone(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                    if let Err(e) = self.queue.dequeue(&op.id).await {
                        // The operation will replay on the next drain
                        tracing::warn!("Synced {} but could not dequeue it: {}", op.id, e);
                    }
                    summary.synced += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "Failed to sync {} {} on {}: {}",
                        op.action(),
                        op.id,
                        collection,
                        error
                    );
                    summary.failed += 1;
                    summary.errors.push(SyncFailure::RemoteWriteFailed {
                        operation_id: op.id.clone(),
                        action: op.action(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Drained {}: {} synced, {} failed",
            collection,
            summary.synced,
            summary.failed
        );
        Ok(summary)
    }

    /// Drains all collections concurrently and merges the results.
    pub async fn drain_all(&self) -> Result<SyncSummary, SyncError> {
        let drains: Vec<_> = Collection::ALL
            .iter()
            .map(|collection| self.drain(*collection))
            .collect();
        let results = join_all(drains).await;

        let mut summary = SyncSummary::default();
        for result in results {
            summary.merge(result?);
        }
        Ok(summary)
    }

    /// Refreshes the cache for `collection` from the remote store.
    ///
    /// Waits for any drain of the same collection to finish first. Returns the
    /// number of remote documents received.
    pub async fn hydrate(&self, collection: Collection) -> Result<usize, SyncError> {
        let _flight = self.lock_for(collection).lock().await;
        let documents = self.remote.query_ordered_desc(collection).await?;
        let entities: Vec<CachedEntity<serde_json::Value>> = documents
            .into_iter()
            .map(|doc| CachedEntity::synced(doc.id, doc.data))
            .collect();

        let count = self.cache.replace_synced(collection, &entities).await?;
        tracing::debug!("Hydrated {} with {} document(s)", collection, count);
        Ok(count)
    }

    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(self.queue.count().await?)
    }

    pub async fn indicator(&self) -> Result<SyncIndicator, SyncError> {
        if self.active_drains.load(Ordering::SeqCst) > 0 {
            return Ok(SyncIndicator::Syncing);
        }
        Ok(SyncIndicator::from_pending(self.pending_count().await?))
    }

    /// Sends one operation to the remote store.
    ///
    /// Returns the remote id the cache entry should end up under, if any.
    async fn replay(&self, op: &PendingOperation) -> Result<Option<String>, RemoteError> {
        match &op.mutation {
            Mutation::Add(data) => {
                let id = self
                    .remote
                    .create(op.collection, &data.item, Some(&op.id))
                    .await?;
                Ok(Some(id))
            }
            Mutation::Update(data) => {
                let target = self.resolve(op.collection, &data.item_id).await;
                self.remote
                    .update(op.collection, &target, &data.updates)
                    .await?;
                Ok(Some(target))
            }
            Mutation::Delete(data) => {
                let target = self.resolve(op.collection, &data.item_id).await;
                match self.remote.delete(op.collection, &target).await {
                    Ok(()) | Err(RemoteError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Follows the id an offline-created document was given remotely.
    async fn resolve(&self, collection: Collection, id: &str) -> String {
        match self.cache.resolve_id(collection, id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Could not resolve id {}: {}", id, e);
                id.to_string()
            }
        }
    }

    async fn reconcile(
        &self,
        op: &PendingOperation,
        target: Option<&str>,
    ) -> Result<(), CacheError> {
        match (&op.mutation, target) {
            (Mutation::Add(_), Some(remote_id)) => {
                self.cache.rekey(op.collection, &op.id, remote_id).await
            }
            (Mutation::Update(_), Some(id)) => self.cache.mark_synced(op.collection, id).await,
            _ => Ok(()),
        }
    }
}
