//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OMAA_STORAGE_BACKEND=file                                          │
//! │     OMAA_MAX_RETRIES=5                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/transport/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.omaa.transport/sync.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     2s tick, 30s telemetry flush, 10 retries, SQLite queue             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [engine]
//! tick_interval_ms = 2000
//! telemetry_flush_interval_secs = 30
//! max_buffered_pings = 1000
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_secs = 3600
//! max_retries = 10
//!
//! [audit]
//! capacity = 1000
//! recent_display = 5
//!
//! [storage]
//! backend = "sqlite"   # sqlite | file | memory
//! queue_key = "omaa_offline_queue"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use omaa_core::{
    RetryPolicy, BASE_DELAY_MS, MAX_DELAY_SECS, MAX_RETRIES, QUEUE_STORAGE_KEY,
    RECENT_AUDIT_DISPLAY, SCHEDULER_TICK_MS, TELEMETRY_FLUSH_INTERVAL_SECS,
};
use omaa_db::{Database, DbConfig};

use crate::error::{SyncError, SyncResult};
use crate::storage::{FileStorage, MemoryStorage, QueueStorage, SqliteStorage};

// =============================================================================
// Engine Settings
// =============================================================================

/// Timer and buffering settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Interval between scheduler ticks (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Interval between telemetry flushes (seconds).
    #[serde(default = "default_telemetry_flush_interval")]
    pub telemetry_flush_interval_secs: u64,

    /// Buffered ping count that forces an early flush. 0 disables the limit.
    #[serde(default = "default_max_buffered_pings")]
    pub max_buffered_pings: usize,
}

fn default_tick_interval() -> u64 {
    SCHEDULER_TICK_MS
}

fn default_telemetry_flush_interval() -> u64 {
    TELEMETRY_FLUSH_INTERVAL_SECS
}

fn default_max_buffered_pings() -> usize {
    1000
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            tick_interval_ms: default_tick_interval(),
            telemetry_flush_interval_secs: default_telemetry_flush_interval(),
            max_buffered_pings: default_max_buffered_pings(),
        }
    }
}

impl EngineSettings {
    /// Scheduler tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Telemetry flush period.
    pub fn telemetry_flush_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_flush_interval_secs)
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff parameters, see [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay after the first retryable failure (milliseconds).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Cap on any single delay (seconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Attempt count at which an item is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_delay() -> u64 {
    BASE_DELAY_MS
}
fn default_max_delay() -> u64 {
    MAX_DELAY_SECS
}
fn default_max_retries() -> u32 {
    MAX_RETRIES
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            base_delay_ms: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_retries: default_max_retries(),
        }
    }
}

// =============================================================================
// Audit Settings
// =============================================================================

/// Audit log retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Entries kept in memory before the oldest are evicted.
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,

    /// Entries returned by `stats()`.
    #[serde(default = "default_recent_display")]
    pub recent_display: usize,
}

fn default_audit_capacity() -> usize {
    1000
}

fn default_recent_display() -> usize {
    RECENT_AUDIT_DISPLAY
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            capacity: default_audit_capacity(),
            recent_display: default_recent_display(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the queue blob lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite key-value table (omaa-db).
    #[default]
    Sqlite,
    /// One JSON file per key in a directory.
    File,
    /// Process memory only. Nothing survives a restart.
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "db" => Ok(StorageBackend::Sqlite),
            "file" | "json" => Ok(StorageBackend::File),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown storage backend: '{}'. Valid options: sqlite, file, memory",
                other
            ))),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Backend kind.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file (sqlite) or directory (file). Defaults under the
    /// platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Key the queue blob is stored under.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
}

fn default_queue_key() -> String {
    QUEUE_STORAGE_KEY.to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            backend: StorageBackend::default(),
            path: None,
            queue_key: default_queue_key(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Timers and buffering.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Backoff and dead-letter policy.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Audit log retention.
    #[serde(default)]
    pub audit: AuditSettings,

    /// Queue persistence.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for tests and throwaway runs: in-memory queue, defaults otherwise.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.engine.tick_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }

        if self.engine.telemetry_flush_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "telemetry_flush_interval_secs must be greater than 0".into(),
            ));
        }

        if self.retry.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be greater than 0".into(),
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "base_delay_ms must be greater than 0".into(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_secs.saturating_mul(1000) {
            return Err(SyncError::InvalidConfig(format!(
                "base_delay_ms ({}) exceeds max_delay_secs ({})",
                self.retry.base_delay_ms, self.retry.max_delay_secs
            )));
        }

        if self.audit.capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "audit capacity must be greater than 0".into(),
            ));
        }

        if self.storage.queue_key.trim().is_empty() {
            return Err(SyncError::InvalidConfig("queue_key must not be empty".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("OMAA_TICK_INTERVAL_MS") {
            match value.parse::<u64>() {
                Ok(ms) => {
                    debug!(tick_interval_ms = ms, "Overriding tick interval from environment");
                    self.engine.tick_interval_ms = ms;
                }
                Err(_) => warn!(value = %value, "Ignoring unparseable OMAA_TICK_INTERVAL_MS"),
            }
        }

        if let Ok(value) = std::env::var("OMAA_TELEMETRY_FLUSH_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.engine.telemetry_flush_interval_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring unparseable OMAA_TELEMETRY_FLUSH_SECS"),
            }
        }

        if let Ok(value) = std::env::var("OMAA_MAX_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => {
                    debug!(max_retries = n, "Overriding max retries from environment");
                    self.retry.max_retries = n;
                }
                Err(_) => warn!(value = %value, "Ignoring unparseable OMAA_MAX_RETRIES"),
            }
        }

        if let Ok(value) = std::env::var("OMAA_STORAGE_BACKEND") {
            match value.parse() {
                Ok(backend) => {
                    debug!(backend = %value, "Overriding storage backend from environment");
                    self.storage.backend = backend;
                }
                Err(_) => warn!(backend = %value, "Unknown storage backend in environment"),
            }
        }

        if let Ok(path) = std::env::var("OMAA_STORAGE_PATH") {
            debug!(path = %path, "Overriding storage path from environment");
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(key) = std::env::var("OMAA_QUEUE_KEY") {
            self.storage.queue_key = key;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "omaa", "transport")
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// Backoff policy built from `[retry]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_secs(self.retry.max_delay_secs),
            self.retry.max_retries,
        )
    }

    /// Resolved storage location for file-backed backends.
    pub fn storage_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }

        let data_dir = Self::project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))?;

        Ok(match self.storage.backend {
            StorageBackend::Sqlite => data_dir.join("queue.db"),
            StorageBackend::File | StorageBackend::Memory => data_dir.join("queue"),
        })
    }

    /// Opens the configured storage backend.
    pub async fn open_storage(&self) -> SyncResult<Arc<dyn QueueStorage>> {
        match self.storage.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
            StorageBackend::File => {
                let dir = self.storage_path()?;
                Ok(Arc::new(FileStorage::open(dir).await?))
            }
            StorageBackend::Sqlite => {
                let path = self.storage_path()?;
                let db = Database::new(DbConfig::new(path)).await?;
                Ok(Arc::new(SqliteStorage::new(db)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqlite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.engine.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.engine.telemetry_flush_interval(), Duration::from_secs(30));
        assert_eq!(config.storage.queue_key, "omaa_offline_queue");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.retry.max_retries = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.retry.max_retries = 3;
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_secs = 5;
        assert!(config.validate().is_err());

        config.retry.max_delay_secs = 10;
        assert!(config.validate().is_ok());

        config.storage.queue_key = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [retry]
            max_retries = 4

            [storage]
            backend = "file"
            path = "/var/lib/omaa/queue"
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage_path().unwrap(), PathBuf::from("/var/lib/omaa/queue"));
        assert_eq!(config.engine, EngineSettings::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");

        let mut config = SyncConfig::in_memory();
        config.audit.capacity = 50;
        config.save(Some(path.clone())).unwrap();

        let loaded = SyncConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.audit.capacity, 50);
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&SyncConfig::default()).unwrap();
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("[retry]"));
        assert!(toml_str.contains("backend = \"sqlite\""));
    }

    #[tokio::test]
    async fn test_open_memory_storage() {
        let storage = SyncConfig::in_memory().open_storage().await.unwrap();
        assert_eq!(storage.load("k").await.unwrap(), None);
    }
}
