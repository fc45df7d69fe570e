//! # Error Types
//!
//! Domain-specific error types for omaa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  omaa-core errors (this file)                                          │
//! │  ├── CoreError        - Item state machine violations                  │
//! │  └── ValidationError  - Rejected idempotency keys at enqueue time      │
//! │                                                                         │
//! │  omaa-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  omaa-sync errors                                                      │
//! │  └── SyncError        - Engine, storage and config failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller of enqueue     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An item was moved through a transition its lifecycle does not allow.
    ///
    /// ## When This Occurs
    /// - Selecting an item that is already PROCESSING
    /// - Recording an outcome for an item that was never claimed
    #[error("Item {id} cannot move from {from} to {to}")]
    InvalidStatusTransition { id: String, from: String, to: String },

    /// Item not present in the queue.
    #[error("Sync item not found: {0}")]
    ItemNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before an item is queued.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
