//! # Queue Storage Backends
//!
//! Key-value persistence for the serialized queue.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     QueueStorage implementations                        │
//! │                                                                         │
//! │  SqliteStorage   omaa-db sync_kv table, WAL mode (default)             │
//! │  FileStorage     <dir>/<key>.json, written via temp file + rename       │
//! │  MemoryStorage   HashMap, clone-shared (tests, restore scenarios)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every backend stores whole values: `save` replaces the previous blob.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use omaa_db::Database;

use crate::error::{SyncError, SyncResult};

/// Durable string storage keyed by name.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Reads the blob under `key`, if any.
    async fn load(&self, key: &str) -> SyncResult<Option<String>>;

    /// Replaces the blob under `key`.
    async fn save(&self, key: &str, blob: &str) -> SyncResult<()>;
}

// =============================================================================
// Memory
// =============================================================================

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl QueueStorage for MemoryStorage {
    async fn load(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &str) -> SyncResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

// =============================================================================
// File
// =============================================================================

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "File storage ready");
        Ok(FileStorage { dir })
    }

    /// Directory holding the blobs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> SyncResult<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(SyncError::StorageFailed(format!(
                "Key '{}' is not a valid file name",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl QueueStorage for FileStorage {
    async fn load(&self, key: &str) -> SyncResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, blob: &str) -> SyncResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");

        // Rename is atomic on the same filesystem; readers see old or new, never half.
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

// =============================================================================
// SQLite
// =============================================================================

/// Storage on top of the omaa-db key-value table.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Wraps an open database.
    pub fn new(db: Database) -> Self {
        SqliteStorage { db }
    }

    /// Underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl QueueStorage for SqliteStorage {
    async fn load(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.db.kv().get(key).await?)
    }

    async fn save(&self, key: &str, blob: &str) -> SyncResult<()> {
        self.db.kv().put(key, blob).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omaa_db::DbConfig;

    #[tokio::test]
    async fn test_memory_storage_is_shared_between_clones() {
        let a = MemoryStorage::new();
        let b = a.clone();

        a.save("q", "[]").await.unwrap();
        assert_eq!(b.load("q").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("queue")).await.unwrap();

        assert_eq!(storage.load("omaa_offline_queue").await.unwrap(), None);

        storage.save("omaa_offline_queue", "[1]").await.unwrap();
        storage.save("omaa_offline_queue", "[1,2]").await.unwrap();

        assert_eq!(
            storage.load("omaa_offline_queue").await.unwrap().as_deref(),
            Some("[1,2]")
        );
        assert!(!storage.dir().join("omaa_offline_queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        assert!(storage.save("../escape", "x").await.is_err());
        assert!(storage.load("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_sqlite_storage_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let storage = SqliteStorage::new(db);

        storage.save("omaa_offline_queue", "[]").await.unwrap();
        assert_eq!(
            storage.load("omaa_offline_queue").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(storage.database().health_check().await);
    }
}
