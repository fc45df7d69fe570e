//! # Sync Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Queue               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  StorageFailed  │  │  CorruptQueue           │ │
//! │  │  ConfigLoad...  │  │  Serialization  │  │  Domain (CoreError)     │ │
//! │  │  ConfigSave...  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Lifecycle    │   Delivery failures are NOT errors: they are      │
//! │  │                 │   DeliveryOutcome values, handled by the retry    │
//! │  │  ChannelError   │   policy and surfaced through the audit log.      │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use omaa_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure the engine can report.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The persistence backend rejected a read or write.
    #[error("Storage error: {0}")]
    StorageFailed(String),

    /// Failed to serialize the queue.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The persisted queue blob could not be decoded.
    #[error("Persisted queue under '{key}' is corrupt: {reason}")]
    CorruptQueue { key: String, reason: String },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Rejected at enqueue time.
    #[error("Invalid item: {0}")]
    InvalidItem(#[from] ValidationError),

    /// Item state machine violation or missing item.
    #[error(transparent)]
    Domain(#[from] CoreError),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<omaa_db::DbError> for SyncError {
    fn from(err: omaa_db::DbError) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::StorageFailed(_) | SyncError::ChannelError(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came from the persistence layer.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SyncError::StorageFailed(_)
                | SyncError::SerializationFailed(_)
                | SyncError::CorruptQueue { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::StorageFailed("disk full".into()).is_retryable());
        assert!(SyncError::StorageFailed("disk full".into()).is_storage_error());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());

        let corrupt = SyncError::CorruptQueue {
            key: "omaa_offline_queue".into(),
            reason: "expected value".into(),
        };
        assert!(corrupt.is_storage_error());
        assert!(!corrupt.is_retryable());
    }

    #[test]
    fn test_conversions() {
        let err: SyncError = ValidationError::Required { field: "id".into() }.into();
        assert!(matches!(err, SyncError::InvalidItem(_)));
        assert_eq!(err.to_string(), "Invalid item: id is required");

        let err: SyncError = omaa_db::DbError::PoolExhausted.into();
        assert!(err.is_storage_error());

        let err: SyncError = CoreError::ItemNotFound("x".into()).into();
        assert_eq!(err.to_string(), "Sync item not found: x");
    }
}
