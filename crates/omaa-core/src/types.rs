//! # Domain Types
//!
//! Core domain types used throughout the Omaa sync engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    SyncItem     │   │  AuditLogEntry  │   │ TelemetryBatch  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (idem. key) │   │  id (UUID)      │   │  batch_id       │       │
//! │  │  endpoint       │   │  action         │   │  timestamp      │       │
//! │  │  priority       │   │  status         │   │  pings[]        │       │
//! │  │  attempts       │   │  details        │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Endpoint     │   │   ItemStatus    │   │ DeliveryOutcome │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  TELEMETRY_BATCH│   │  QUEUED         │   │  Success        │       │
//! │  │  TRIP_EVENT     │   │  PROCESSING     │   │  Retryable(..)  │       │
//! │  │  EXPENSE_*      │   │  FAILED         │   │  Conflict(..)   │       │
//! │  │  FLOAT_REQUEST  │   │  SUCCESS        │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persisted Layout
//! `SyncItem` serializes with camelCase keys, SCREAMING_SNAKE_CASE enum values
//! and epoch-millisecond timestamps. This is the record format stored under
//! the queue's storage key, so field renames here are breaking changes for
//! queues already on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Endpoint
// =============================================================================

/// Logical destination of a queued item.
///
/// The payload shape is determined by the endpoint; the engine itself never
/// looks inside payloads except to validate the minimum structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Endpoint {
    /// Coalesced location/event pings. Append-only on the remote side.
    TelemetryBatch,
    /// Trip lifecycle event (start, stop, checkpoint, ...).
    TripEvent,
    /// New expense submission.
    ExpenseCreate,
    /// Receipt/attachment upload for an expense.
    ExpenseUpload,
    /// Cash float request.
    FloatRequest,
}

impl Endpoint {
    /// All endpoints, in declaration order.
    pub const ALL: [Endpoint; 5] = [
        Endpoint::TelemetryBatch,
        Endpoint::TripEvent,
        Endpoint::ExpenseCreate,
        Endpoint::ExpenseUpload,
        Endpoint::FloatRequest,
    ];

    /// REST route the real network client posts this endpoint to.
    pub const fn path(&self) -> &'static str {
        match self {
            Endpoint::TelemetryBatch => "/api/v1/sync/telemetry",
            Endpoint::TripEvent => "/api/v1/trips/events",
            Endpoint::ExpenseCreate => "/api/v1/expenses",
            Endpoint::ExpenseUpload => "/api/v1/upload",
            Endpoint::FloatRequest => "/api/v1/floats",
        }
    }

    /// Wire name, identical to the serialized form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Endpoint::TelemetryBatch => "TELEMETRY_BATCH",
            Endpoint::TripEvent => "TRIP_EVENT",
            Endpoint::ExpenseCreate => "EXPENSE_CREATE",
            Endpoint::ExpenseUpload => "EXPENSE_UPLOAD",
            Endpoint::FloatRequest => "FLOAT_REQUEST",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Scheduling priority. HIGH strictly precedes LOW regardless of age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    #[default]
    Low,
}

impl Priority {
    /// Sort rank: lower runs first.
    #[inline]
    pub const fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

// =============================================================================
// Item Status
// =============================================================================

/// Lifecycle state of a queued item.
///
/// ```text
/// QUEUED/FAILED ──(selected)──► PROCESSING ──► removed (success / conflict / dead letter)
///                                    │
///                                    └──(retryable failure)──► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Queued,
    Processing,
    Failed,
    /// Transient marker; delivered items are pruned rather than retained.
    Success,
}

impl ItemStatus {
    /// Returns true if the scheduler may pick an item in this state.
    #[inline]
    pub const fn is_schedulable(&self) -> bool {
        matches!(self, ItemStatus::Queued | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Queued => write!(f, "QUEUED"),
            ItemStatus::Processing => write!(f, "PROCESSING"),
            ItemStatus::Failed => write!(f, "FAILED"),
            ItemStatus::Success => write!(f, "SUCCESS"),
        }
    }
}

// =============================================================================
// Sync Item
// =============================================================================

/// Unit of queued work.
///
/// `id` doubles as the idempotency key: at most one item with a given id is
/// present in a queue, and the remote side treats repeated delivery of the
/// same id as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    /// Idempotency key (caller-supplied or generated UUID v4).
    pub id: String,

    /// Logical destination.
    pub endpoint: Endpoint,

    /// Opaque structured data, shape determined by `endpoint`.
    #[ts(type = "unknown")]
    pub payload: Value,

    /// Scheduling priority.
    pub priority: Priority,

    /// Delivery attempts so far.
    pub attempts: u32,

    /// When the item was enqueued.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,

    /// Earliest time the scheduler may pick the item again.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub next_retry_time: DateTime<Utc>,

    /// Lifecycle state.
    pub status: ItemStatus,

    /// Diagnostic from the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncItem {
    /// Creates a fresh QUEUED item, eligible immediately.
    pub fn new(
        id: impl Into<String>,
        endpoint: Endpoint,
        payload: Value,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        SyncItem {
            id: id.into(),
            endpoint,
            payload,
            priority,
            attempts: 0,
            created_at: now,
            next_retry_time: now,
            status: ItemStatus::Queued,
            last_error: None,
        }
    }

    /// Counts toward queue depth (everything except the SUCCESS marker).
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status != ItemStatus::Success
    }

    /// Returns true if the scheduler may select this item at `now`.
    #[inline]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status.is_schedulable() && self.next_retry_time <= now
    }

    /// Claims the item for a delivery attempt (QUEUED/FAILED → PROCESSING).
    pub fn begin_attempt(&mut self) -> CoreResult<()> {
        if !self.status.is_schedulable() {
            return Err(CoreError::InvalidStatusTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: ItemStatus::Processing.to_string(),
            });
        }
        self.status = ItemStatus::Processing;
        Ok(())
    }

    /// Records a failed attempt (PROCESSING → FAILED) and bumps `attempts`.
    ///
    /// Returns the new attempt count.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> CoreResult<u32> {
        if self.status != ItemStatus::Processing {
            return Err(CoreError::InvalidStatusTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: ItemStatus::Failed.to_string(),
            });
        }
        self.attempts = self.attempts.saturating_add(1);
        self.status = ItemStatus::Failed;
        self.last_error = Some(reason.into());
        Ok(self.attempts)
    }

    /// Marks the item delivered (PROCESSING → SUCCESS).
    pub fn mark_delivered(&mut self) -> CoreResult<()> {
        if self.status != ItemStatus::Processing {
            return Err(CoreError::InvalidStatusTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: ItemStatus::Success.to_string(),
            });
        }
        self.status = ItemStatus::Success;
        Ok(())
    }

    /// Releases an item orphaned in PROCESSING by a process that died
    /// mid-delivery. Returns true if the status changed.
    pub fn release_orphaned(&mut self) -> bool {
        if self.status == ItemStatus::Processing {
            self.status = ItemStatus::Queued;
            true
        } else {
            false
        }
    }
}

// =============================================================================
// Delivery Outcome
// =============================================================================

/// Result of one delivery attempt, as reported by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Remote side accepted the item.
    Success,
    /// Transient failure (timeout, 5xx, offline). Governed by backoff.
    RetryableFailure(String),
    /// Remote state supersedes the local intent. Terminal, never retried.
    Conflict(String),
}

impl DeliveryOutcome {
    /// Maps an HTTP status code to an outcome.
    ///
    /// ```rust
    /// use omaa_core::DeliveryOutcome;
    ///
    /// assert_eq!(DeliveryOutcome::from_http_status(201, "created"), DeliveryOutcome::Success);
    /// assert!(matches!(DeliveryOutcome::from_http_status(409, "gone"), DeliveryOutcome::Conflict(_)));
    /// assert!(matches!(DeliveryOutcome::from_http_status(503, "busy"), DeliveryOutcome::RetryableFailure(_)));
    /// ```
    pub fn from_http_status(status: u16, reason: impl Into<String>) -> Self {
        match status {
            200..=299 => DeliveryOutcome::Success,
            409 => DeliveryOutcome::Conflict(format!("{} Conflict: {}", status, reason.into())),
            _ => DeliveryOutcome::RetryableFailure(format!("HTTP {}: {}", status, reason.into())),
        }
    }

    /// Returns true for the success outcome.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

// =============================================================================
// Audit Log Entry
// =============================================================================

/// Outcome class of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Conflict,
    Error,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "SUCCESS"),
            AuditStatus::Conflict => write!(f, "CONFLICT"),
            AuditStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// What the engine was doing when it wrote an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Item accepted into the queue.
    Enqueue,
    /// Terminal delivery outcome (success or conflict).
    Sync,
    /// Retryable failure, item rescheduled.
    Retry,
    /// Retry budget exhausted, item dropped.
    DeadLetter,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Enqueue => write!(f, "ENQUEUE"),
            AuditAction::Sync => write!(f, "SYNC"),
            AuditAction::Retry => write!(f, "RETRY"),
            AuditAction::DeadLetter => write!(f, "DEAD_LETTER"),
        }
    }
}

/// Immutable record of one engine outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Fresh UUID per entry (not the item id).
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub status: AuditStatus,
    /// `"[<item id>] <message>"`.
    pub details: String,
}

impl AuditLogEntry {
    /// Builds an entry for `item_id`, prefixing the details with the id.
    pub fn new(
        item_id: &str,
        timestamp: DateTime<Utc>,
        action: AuditAction,
        status: AuditStatus,
        message: &str,
    ) -> Self {
        AuditLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            action,
            status,
            details: format!("[{}] {}", item_id, message),
        }
    }

    /// Returns true if the details refer to `item_id`.
    pub fn concerns(&self, item_id: &str) -> bool {
        self.details.starts_with(&format!("[{}]", item_id))
    }
}

// =============================================================================
// Queue Stats
// =============================================================================

/// Snapshot rendered by the "items pending" / "sync failed" indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Items with status other than SUCCESS.
    pub pending_count: usize,
    /// Most recent audit entries, oldest first.
    pub recent_audit: Vec<AuditLogEntry>,
}

// =============================================================================
// Telemetry Batch
// =============================================================================

/// Payload of a TELEMETRY_BATCH item: all pings buffered since the last flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryBatch {
    pub batch_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    /// Raw ping records in insertion order.
    #[ts(type = "Array<unknown>")]
    pub pings: Vec<Value>,
}

impl TelemetryBatch {
    /// Wraps `pings` in a batch with a fresh id.
    pub fn new(pings: Vec<Value>, timestamp: DateTime<Utc>) -> Self {
        TelemetryBatch {
            batch_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            pings,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_priority_default_and_rank() {
        assert_eq!(Priority::default(), Priority::Low);
        assert!(Priority::High.rank() < Priority::Low.rank());
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::TripEvent.path(), "/api/v1/trips/events");
        assert_eq!(Endpoint::TelemetryBatch.path(), "/api/v1/sync/telemetry");
        assert_eq!(Endpoint::FloatRequest.to_string(), "FLOAT_REQUEST");
    }

    #[test]
    fn test_item_serializes_in_persisted_layout() {
        let item = SyncItem::new(
            "trip-1",
            Endpoint::TripEvent,
            json!({"tripId": "t-9"}),
            Priority::High,
            at(1_700_000_000_000),
        );
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "trip-1",
                "endpoint": "TRIP_EVENT",
                "payload": {"tripId": "t-9"},
                "priority": "HIGH",
                "attempts": 0,
                "createdAt": 1_700_000_000_000i64,
                "nextRetryTime": 1_700_000_000_000i64,
                "status": "QUEUED"
            })
        );

        let back: SyncItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_item_state_machine() {
        let mut item = SyncItem::new("a", Endpoint::FloatRequest, json!({}), Priority::Low, at(0));
        assert!(item.is_eligible(at(0)));

        item.begin_attempt().unwrap();
        assert_eq!(item.status, ItemStatus::Processing);
        assert!(!item.is_eligible(at(10)));
        assert!(item.begin_attempt().is_err());

        assert_eq!(item.record_failure("Network Timeout").unwrap(), 1);
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("Network Timeout"));

        item.begin_attempt().unwrap();
        item.mark_delivered().unwrap();
        assert!(!item.is_pending());
        assert!(item.mark_delivered().is_err());
    }

    #[test]
    fn test_release_orphaned() {
        let mut item = SyncItem::new("a", Endpoint::FloatRequest, json!({}), Priority::Low, at(0));
        assert!(!item.release_orphaned());
        item.begin_attempt().unwrap();
        assert!(item.release_orphaned());
        assert_eq!(item.status, ItemStatus::Queued);
    }

    #[test]
    fn test_not_yet_due_item_is_not_eligible() {
        let mut item = SyncItem::new("a", Endpoint::FloatRequest, json!({}), Priority::Low, at(0));
        item.next_retry_time = at(5_000);
        assert!(!item.is_eligible(at(4_999)));
        assert!(item.is_eligible(at(5_000)));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(DeliveryOutcome::from_http_status(204, ""), DeliveryOutcome::Success);
        assert_eq!(
            DeliveryOutcome::from_http_status(409, "Trip is Cancelled on Server"),
            DeliveryOutcome::Conflict("409 Conflict: Trip is Cancelled on Server".into())
        );
        assert!(matches!(
            DeliveryOutcome::from_http_status(500, "boom"),
            DeliveryOutcome::RetryableFailure(_)
        ));
    }

    #[test]
    fn test_audit_entry_details_prefix() {
        let entry = AuditLogEntry::new("x-1", at(0), AuditAction::Sync, AuditStatus::Success, "Synced");
        assert_eq!(entry.details, "[x-1] Synced");
        assert!(entry.concerns("x-1"));
        assert!(!entry.concerns("x-2"));
    }
}
