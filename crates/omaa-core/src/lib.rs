//! # omaa-core: Pure Domain Logic for the Omaa Sync Engine
//!
//! This crate holds the types and rules of the offline sync engine as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Omaa Sync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Driver / Manager screens (producers)               │   │
//! │  │     trip events ──► expenses ──► float requests ──► pings       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ enqueue / buffer_telemetry             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    omaa-sync (engine)                           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ omaa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  backoff  │  │ telemetry │  │ validation│  │   │
//! │  │   │ SyncItem  │  │RetryPolicy│  │   Ping    │  │ item ids  │  │   │
//! │  │   │ AuditLog  │  │           │  │ GeoLoc.   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue items, audit entries, delivery outcomes
//! - [`backoff`] - Exponential backoff and dead-letter decisions
//! - [`telemetry`] - Typed telemetry pings
//! - [`validation`] - Idempotency key checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use omaa_core::{Endpoint, Priority, SyncItem};
//! use omaa_core::backoff::{RetryDecision, RetryPolicy};
//! use serde_json::json;
//!
//! let mut item = SyncItem::new(
//!     "trip-evt-1",
//!     Endpoint::TripEvent,
//!     json!({"type": "TRIP_START", "tripId": "trip-42"}),
//!     Priority::High,
//!     Utc::now(),
//! );
//!
//! item.begin_attempt().unwrap();
//! let attempts = item.record_failure("Network Timeout").unwrap();
//!
//! let policy = RetryPolicy::default();
//! assert!(matches!(policy.decide(attempts), RetryDecision::RetryAfter(_)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod error;
pub mod telemetry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use backoff::{RetryDecision, RetryPolicy};
pub use error::{CoreError, CoreResult, ValidationError};
pub use telemetry::{GeoLocation, Ping, PingTrigger, PingType};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Attempt count at which an item is dead-lettered.
pub const MAX_RETRIES: u32 = 10;

/// Delay after the first retryable failure (milliseconds).
pub const BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on any single backoff delay (seconds).
pub const MAX_DELAY_SECS: u64 = 3_600;

/// Interval between scheduler ticks (milliseconds).
pub const SCHEDULER_TICK_MS: u64 = 2_000;

/// Interval between telemetry flushes (seconds).
pub const TELEMETRY_FLUSH_INTERVAL_SECS: u64 = 30;

/// Storage key the serialized queue lives under.
///
/// Kept identical to the key the web client used so an exported
/// local-storage dump can be imported as-is.
pub const QUEUE_STORAGE_KEY: &str = "omaa_offline_queue";

/// Number of audit entries shown by `stats()`.
pub const RECENT_AUDIT_DISPLAY: usize = 5;
