//! # Outcome Resolution
//!
//! Applies a [`DeliveryOutcome`] to the item that was attempted.
//!
//! ```text
//! PROCESSING ──Success──────────────────────────► Delivered     (remove)
//!            ──Conflict─────────────────────────► Conflicted    (remove)
//!            ──RetryableFailure, attempts < MAX─► Rescheduled   (FAILED, nextRetryTime = now + delay)
//!            ──RetryableFailure, attempts ≥ MAX─► DeadLettered  (remove)
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

use omaa_core::{
    AuditAction, AuditLogEntry, AuditStatus, CoreResult, DeliveryOutcome, RetryDecision,
    RetryPolicy, SyncItem,
};

/// What happened to an item after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Accepted by the remote side.
    Delivered,
    /// Remote state supersedes the local intent.
    Conflicted { reason: String },
    /// Eligible again at `next_retry_time`.
    Rescheduled {
        attempts: u32,
        delay: Duration,
        next_retry_time: DateTime<Utc>,
        reason: String,
    },
    /// Retry budget exhausted.
    DeadLettered { attempts: u32, reason: String },
}

impl Resolution {
    /// Returns true if the item leaves the queue.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resolution::Rescheduled { .. })
    }

    /// Audit record for this resolution.
    pub fn audit_entry(&self, item: &SyncItem, timestamp: DateTime<Utc>) -> AuditLogEntry {
        let (action, status, message) = match self {
            Resolution::Delivered => (
                AuditAction::Sync,
                AuditStatus::Success,
                format!("Synced to {}", item.endpoint),
            ),
            Resolution::Conflicted { reason } => (
                AuditAction::Sync,
                AuditStatus::Conflict,
                format!("Server rejected: {}", reason),
            ),
            Resolution::Rescheduled { delay, reason, .. } => (
                AuditAction::Retry,
                AuditStatus::Error,
                format!("Failed, retry in {}s: {}", delay.as_secs_f64(), reason),
            ),
            Resolution::DeadLettered { attempts, reason } => (
                AuditAction::DeadLetter,
                AuditStatus::Error,
                format!("Max retries reached after {} attempts, dropped: {}", attempts, reason),
            ),
        };
        AuditLogEntry::new(&item.id, timestamp, action, status, &message)
    }
}

/// Moves `item` out of PROCESSING according to `outcome`.
///
/// Conflicts are terminal on any attempt and do not count as an attempt.
pub fn apply_outcome(
    item: &mut SyncItem,
    outcome: DeliveryOutcome,
    now: DateTime<Utc>,
    policy: &RetryPolicy,
) -> CoreResult<Resolution> {
    match outcome {
        DeliveryOutcome::Success => {
            item.mark_delivered()?;
            Ok(Resolution::Delivered)
        }
        DeliveryOutcome::Conflict(reason) => {
            item.last_error = Some(reason.clone());
            Ok(Resolution::Conflicted { reason })
        }
        DeliveryOutcome::RetryableFailure(reason) => {
            let attempts = item.record_failure(reason.clone())?;
            match policy.decide(attempts) {
                RetryDecision::RetryAfter(delay) => {
                    let step = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
                    let next_retry_time = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
                    item.next_retry_time = next_retry_time;
                    Ok(Resolution::Rescheduled {
                        attempts,
                        delay,
                        next_retry_time,
                        reason,
                    })
                }
                RetryDecision::DeadLetter => Ok(Resolution::DeadLettered { attempts, reason }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omaa_core::{Endpoint, ItemStatus, Priority};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn claimed(id: &str) -> SyncItem {
        let mut item = SyncItem::new(
            id,
            Endpoint::TripEvent,
            json!({"type": "TRIP_START", "tripId": "t-1"}),
            Priority::High,
            DateTime::<Utc>::UNIX_EPOCH,
        );
        item.begin_attempt().unwrap();
        item
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_success() {
        let mut item = claimed("x");
        let resolution =
            apply_outcome(&mut item, DeliveryOutcome::Success, at(0), &RetryPolicy::default()).unwrap();
        assert_eq!(resolution, Resolution::Delivered);
        assert!(resolution.is_terminal());
        assert_eq!(item.status, ItemStatus::Success);

        let entry = resolution.audit_entry(&item, at(0));
        assert_eq!(entry.details, "[x] Synced to TRIP_EVENT");
        assert_eq!(entry.status, AuditStatus::Success);
    }

    #[test]
    fn test_conflict_is_terminal_on_first_attempt() {
        let mut item = claimed("x");
        let resolution = apply_outcome(
            &mut item,
            DeliveryOutcome::Conflict("409 Conflict: Trip is Cancelled on Server".into()),
            at(0),
            &RetryPolicy::default(),
        )
        .unwrap();

        assert!(resolution.is_terminal());
        assert_eq!(item.attempts, 0);
        let entry = resolution.audit_entry(&item, at(0));
        assert_eq!(entry.status, AuditStatus::Conflict);
        assert_eq!(
            entry.details,
            "[x] Server rejected: 409 Conflict: Trip is Cancelled on Server"
        );
    }

    #[test]
    fn test_retryable_failure_reschedules() {
        let mut item = claimed("x");
        let resolution = apply_outcome(
            &mut item,
            DeliveryOutcome::RetryableFailure("Network Timeout".into()),
            at(10_000),
            &RetryPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            resolution,
            Resolution::Rescheduled {
                attempts: 1,
                delay: Duration::from_secs(1),
                next_retry_time: at(11_000),
                reason: "Network Timeout".into(),
            }
        );
        assert!(!resolution.is_terminal());
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.next_retry_time, at(11_000));

        let entry = resolution.audit_entry(&item, at(10_000));
        assert_eq!(entry.action, AuditAction::Retry);
        assert_eq!(entry.details, "[x] Failed, retry in 1s: Network Timeout");
    }

    #[test]
    fn test_dead_letter_at_budget() {
        let policy = RetryPolicy::default();
        let mut item = claimed("x");
        item.attempts = 9;

        let resolution = apply_outcome(
            &mut item,
            DeliveryOutcome::RetryableFailure("HTTP 503: busy".into()),
            at(0),
            &policy,
        )
        .unwrap();

        assert_eq!(
            resolution,
            Resolution::DeadLettered {
                attempts: 10,
                reason: "HTTP 503: busy".into()
            }
        );
        let entry = resolution.audit_entry(&item, at(0));
        assert_eq!(entry.action, AuditAction::DeadLetter);
        assert_eq!(entry.status, AuditStatus::Error);
    }

    #[test]
    fn test_outcome_for_unclaimed_item_is_rejected() {
        let mut item = claimed("x");
        item.release_orphaned();
        assert!(apply_outcome(&mut item, DeliveryOutcome::Success, at(0), &RetryPolicy::default()).is_err());
    }
}
