//! # Queue Store
//!
//! Durable, ordered collection of sync items.
//!
//! ## Persistence Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Store                                     │
//! │                                                                         │
//! │   enqueue ──┐                                                           │
//! │   update  ──┼──► items: Vec<SyncItem> (insertion order)                 │
//! │   remove  ──┘          │                                                │
//! │                        │ every mutation                                 │
//! │                        ▼                                                │
//! │              serde_json::to_string(&items)                              │
//! │                        │                                                │
//! │                        ▼                                                │
//! │     QueueStorage::save("omaa_offline_queue", blob)                      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │           depth listener(count of items != SUCCESS)                     │
//! │                                                                         │
//! │   startup: QueueStorage::load → decode → PROCESSING items → QUEUED      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed write during enqueue is returned to the caller and the new item
//! is dropped, so a successful enqueue always means the item is on disk.
//! Failed writes after updates and removals are logged and the in-memory
//! queue stays authoritative; the next successful write carries every change
//! since.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use omaa_core::{CoreError, SyncItem};

use crate::error::{SyncError, SyncResult};
use crate::storage::QueueStorage;

/// Callback receiving the queue depth after every mutation.
pub type DepthListener = Box<dyn Fn(usize) + Send + Sync>;

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The item was added.
    Queued,
    /// An item with the same id is already queued; nothing changed.
    Duplicate,
}

/// Ordered, persisted queue of [`SyncItem`]s.
pub struct QueueStore {
    items: Vec<SyncItem>,
    storage: Arc<dyn QueueStorage>,
    key: String,
    listener: Option<DepthListener>,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("key", &self.key)
            .field("len", &self.items.len())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl QueueStore {
    /// Creates an empty store writing to `storage` under `key`.
    pub fn new(storage: Arc<dyn QueueStorage>, key: impl Into<String>) -> Self {
        QueueStore {
            items: Vec::new(),
            storage,
            key: key.into(),
            listener: None,
        }
    }

    /// Creates a store and restores it from the last persisted blob.
    pub async fn open(storage: Arc<dyn QueueStorage>, key: impl Into<String>) -> SyncResult<Self> {
        let mut store = Self::new(storage, key);
        store.restore().await?;
        Ok(store)
    }

    /// Replaces the in-memory queue with the persisted one.
    ///
    /// Missing key → empty queue. Items left PROCESSING by a crashed
    /// process are released back to QUEUED. Returns the restored count.
    ///
    /// ## Errors
    /// `SyncError::CorruptQueue` if the blob does not decode. The blob is
    /// copied to `<key>_corrupt` first so it can be inspected.
    pub async fn restore(&mut self) -> SyncResult<usize> {
        let Some(blob) = self.storage.load(&self.key).await? else {
            debug!(key = %self.key, "No persisted queue, starting empty");
            self.items.clear();
            return Ok(0);
        };

        let mut items: Vec<SyncItem> = match serde_json::from_str(&blob) {
            Ok(items) => items,
            Err(e) => {
                let backup = format!("{}_corrupt", self.key);
                if let Err(save_err) = self.storage.save(&backup, &blob).await {
                    warn!(key = %backup, error = %save_err, "Could not back up corrupt queue");
                }
                return Err(SyncError::CorruptQueue {
                    key: self.key.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let released = items
            .iter_mut()
            .map(SyncItem::release_orphaned)
            .filter(|released| *released)
            .count();
        self.items = items;

        info!(
            key = %self.key,
            restored = self.items.len(),
            released,
            "Restored persisted queue"
        );

        if released > 0 {
            self.commit().await;
        }

        Ok(self.items.len())
    }

    /// Sets the depth listener, replacing any previous one.
    pub fn set_depth_listener(&mut self, listener: DepthListener) {
        self.listener = Some(listener);
    }

    /// Appends `item` unless an item with the same id is present.
    ///
    /// ## Errors
    /// Returns the storage error if the grown queue cannot be written. The
    /// item is not kept, so the caller can retry the enqueue.
    pub async fn enqueue(&mut self, item: SyncItem) -> SyncResult<EnqueueOutcome> {
        if self.find_by_id(&item.id).is_some() {
            debug!(id = %item.id, "Duplicate sync item ignored");
            return Ok(EnqueueOutcome::Duplicate);
        }

        self.items.push(item);
        if let Err(e) = self.persist().await {
            if let Some(dropped) = self.items.pop() {
                error!(key = %self.key, id = %dropped.id, error = %e, "Failed to persist new item");
            }
            return Err(e);
        }
        self.notify();
        Ok(EnqueueOutcome::Queued)
    }

    /// Removes the item with `id`.
    pub async fn remove(&mut self, id: &str) -> Option<SyncItem> {
        let index = self.items.iter().position(|i| i.id == id)?;
        let item = self.items.remove(index);
        self.commit().await;
        Some(item)
    }

    /// Applies `f` to the item with `id` and persists the result.
    pub async fn update<F, R>(&mut self, id: &str, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut SyncItem) -> R,
    {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CoreError::ItemNotFound(id.to_string()))?;

        let result = f(item);
        self.commit().await;
        Ok(result)
    }

    /// Looks up an item by id.
    pub fn find_by_id(&self, id: &str) -> Option<&SyncItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Items with status other than SUCCESS, in insertion order.
    pub fn all_pending(&self) -> Vec<SyncItem> {
        self.items.iter().filter(|i| i.is_pending()).cloned().collect()
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[SyncItem] {
        &self.items
    }

    /// Count of items with status other than SUCCESS.
    pub fn depth(&self) -> usize {
        self.items.iter().filter(|i| i.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Storage key of the persisted blob.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes the whole queue to storage.
    pub async fn persist(&self) -> SyncResult<()> {
        let blob = serde_json::to_string(&self.items)?;
        self.storage.save(&self.key, &blob).await
    }

    /// Persists and notifies the listener. Write failures are logged only.
    async fn commit(&self) {
        if let Err(e) = self.persist().await {
            error!(key = %self.key, error = %e, "Failed to persist queue");
        }
        self.notify();
    }

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener(self.depth());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{DateTime, Utc};
    use omaa_core::{Endpoint, ItemStatus, Priority};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Memory storage whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing: AtomicBool,
    }

    #[async_trait]
    impl QueueStorage for FlakyStorage {
        async fn load(&self, key: &str) -> SyncResult<Option<String>> {
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, blob: &str) -> SyncResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SyncError::StorageFailed("disk full".into()));
            }
            self.inner.save(key, blob).await
        }
    }

    fn item(id: &str) -> SyncItem {
        SyncItem::new(
            id,
            Endpoint::ExpenseCreate,
            json!({"id": id, "amount": 1200}),
            Priority::Low,
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    fn storage() -> (MemoryStorage, Arc<dyn QueueStorage>) {
        let mem = MemoryStorage::new();
        let shared: Arc<dyn QueueStorage> = Arc::new(mem.clone());
        (mem, shared)
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_noop() {
        let (_, storage) = storage();
        let mut queue = QueueStore::new(storage, "q");

        assert_eq!(queue.enqueue(item("a")).await.unwrap(), EnqueueOutcome::Queued);

        let mut dup = item("a");
        dup.payload = json!({"id": "a", "amount": 9999});
        assert_eq!(queue.enqueue(dup).await.unwrap(), EnqueueOutcome::Duplicate);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.find_by_id("a").unwrap().payload["amount"], json!(1200));
    }

    #[tokio::test]
    async fn test_every_mutation_persists() {
        let (mem, storage) = storage();
        let mut queue = QueueStore::new(storage, "q");

        queue.enqueue(item("a")).await.unwrap();
        queue.enqueue(item("b")).await.unwrap();
        let blob = mem.load("q").await.unwrap().unwrap();
        let stored: Vec<SyncItem> = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored.len(), 2);

        queue.update("a", |i| i.attempts = 3).await.unwrap();
        queue.remove("b").await.unwrap();
        let blob = mem.load("q").await.unwrap().unwrap();
        let stored: Vec<SyncItem> = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_depth_listener_fires_on_mutation() {
        let (_, storage) = storage();
        let mut queue = QueueStore::new(storage, "q");

        let last = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = last.clone();
        queue.set_depth_listener(Box::new(move |depth| seen.store(depth, Ordering::SeqCst)));

        queue.enqueue(item("a")).await.unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 1);
        queue.enqueue(item("b")).await.unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 2);
        queue.remove("a").await;
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_releases_orphaned_items() {
        let (mem, storage) = storage();
        {
            let mut queue = QueueStore::new(storage.clone(), "q");
            queue.enqueue(item("a")).await.unwrap();
            queue.enqueue(item("b")).await.unwrap();
            queue.update("a", |i| i.begin_attempt()).await.unwrap().unwrap();
        }

        let queue = QueueStore::open(storage, "q").await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.find_by_id("a").unwrap().status, ItemStatus::Queued);
        assert_eq!(queue.items()[0].id, "a");

        let blob = mem.load("q").await.unwrap().unwrap();
        assert!(!blob.contains("PROCESSING"));
    }

    #[tokio::test]
    async fn test_restore_missing_key_is_empty() {
        let (_, storage) = storage();
        let queue = QueueStore::open(storage, "nothing-here").await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_restore_corrupt_blob() {
        let (mem, storage) = storage();
        mem.save("q", "{not json").await.unwrap();

        let err = QueueStore::open(storage, "q").await.unwrap_err();
        assert!(matches!(err, SyncError::CorruptQueue { .. }));
        assert_eq!(mem.load("q_corrupt").await.unwrap().as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_update_missing_item() {
        let (_, storage) = storage();
        let mut queue = QueueStore::new(storage, "q");
        let err = queue.update("ghost", |_| ()).await.unwrap_err();
        assert!(matches!(err, SyncError::Domain(CoreError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_enqueue_surfaces_write_failure() {
        let flaky = Arc::new(FlakyStorage::default());
        let mut queue = QueueStore::new(flaky.clone(), "q");

        let notified = Arc::new(AtomicUsize::new(0));
        let count = notified.clone();
        queue.set_depth_listener(Box::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        queue.enqueue(item("a")).await.unwrap();
        flaky.failing.store(true, Ordering::SeqCst);

        let err = queue.enqueue(item("b")).await.unwrap_err();
        assert!(err.is_storage_error());
        assert!(queue.find_by_id("b").is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // Once storage recovers the same item can be queued again.
        flaky.failing.store(false, Ordering::SeqCst);
        assert_eq!(queue.enqueue(item("b")).await.unwrap(), EnqueueOutcome::Queued);
        let blob = flaky.inner.load("q").await.unwrap().unwrap();
        assert!(blob.contains("\"b\""));
    }
}
