//! # In-Memory Remote Authority
//!
//! A fake of the server side the engine talks to, enforcing the contract a
//! real backend must honour:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rule                                       Outcome                     │
//! │  ─────────────────────────────────────────  ──────────────────────────  │
//! │  id already accepted                        Success (no-op upsert)      │
//! │  TRIP_EVENT without tripId                  RetryableFailure (422)      │
//! │  TELEMETRY_BATCH without batchId / pings    RetryableFailure (422)      │
//! │  TRIP_EVENT for a terminal trip             Conflict (409)              │
//! │  EXPENSE_CREATE for an approved expense     Conflict (409)              │
//! │  TELEMETRY_BATCH                            Success, pings appended     │
//! │  scripted failure pending                   RetryableFailure            │
//! │  anything else                              Success, stored by id       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clones share state, so a test can keep one handle for assertions while
//! the engine owns another.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use omaa_core::{DeliveryOutcome, Endpoint, SyncItem};

use super::Transport;

/// Trip event types after which a trip accepts no further events.
const TERMINAL_TRIP_EVENTS: [&str; 2] = ["TRIP_END", "TRIP_CANCEL"];

/// One call to `attempt_delivery`, as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub id: String,
    pub endpoint: Endpoint,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Default)]
struct BackendState {
    accepted: HashMap<String, Value>,
    terminal_trips: HashSet<String>,
    approved_expenses: HashSet<String>,
    telemetry: Vec<Value>,
    fail_any: u32,
    fail_item: HashMap<String, u32>,
    failure_reason: Option<String>,
    log: Vec<DeliveryRecord>,
    in_flight: usize,
    max_in_flight: usize,
}

fn lock(state: &Mutex<BackendState>) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counts one delivery as in flight until dropped, including when the
/// caller abandons the future part way through.
struct InFlight {
    state: Arc<Mutex<BackendState>>,
}

impl InFlight {
    fn enter(state: &Arc<Mutex<BackendState>>) -> Self {
        let mut guard = lock(state);
        guard.in_flight += 1;
        guard.max_in_flight = guard.max_in_flight.max(guard.in_flight);
        InFlight {
            state: Arc::clone(state),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.state).in_flight -= 1;
    }
}

/// Fake remote authority implementing [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
    latency: Duration,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery waits `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        InMemoryBackend {
            latency,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        lock(&self.state)
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// The next `n` deliveries of any item fail as retryable.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_any = n;
    }

    /// The next `n` deliveries of item `id` fail as retryable.
    pub fn fail_item(&self, id: &str, n: u32) {
        self.state().fail_item.insert(id.to_string(), n);
    }

    /// Reason reported for scripted failures (default "Network Timeout").
    pub fn set_failure_reason(&self, reason: &str) {
        self.state().failure_reason = Some(reason.to_string());
    }

    /// Puts a trip in a terminal state remotely.
    pub fn end_trip(&self, trip_id: &str) {
        self.state().terminal_trips.insert(trip_id.to_string());
    }

    /// Approves an expense remotely.
    pub fn approve_expense(&self, expense_id: &str) {
        self.state().approved_expenses.insert(expense_id.to_string());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every delivery attempt, in call order.
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.state().log.clone()
    }

    /// Number of attempts made for `id`.
    pub fn attempts_for(&self, id: &str) -> usize {
        self.state().log.iter().filter(|r| r.id == id).count()
    }

    /// Payload stored for `id`, if the backend accepted it.
    pub fn accepted(&self, id: &str) -> Option<Value> {
        self.state().accepted.get(id).cloned()
    }

    pub fn accepted_count(&self) -> usize {
        self.state().accepted.len()
    }

    /// All telemetry pings received, in arrival order.
    pub fn telemetry_pings(&self) -> Vec<Value> {
        self.state().telemetry.clone()
    }

    /// Deliveries currently in flight.
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Highest number of deliveries observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    // =========================================================================
    // Contract
    // =========================================================================

    fn decide(state: &mut BackendState, item: &SyncItem) -> DeliveryOutcome {
        let scripted = match state.fail_item.get_mut(&item.id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ if state.fail_any > 0 => {
                state.fail_any -= 1;
                true
            }
            _ => false,
        };
        if scripted {
            let reason = state
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Network Timeout".to_string());
            return DeliveryOutcome::RetryableFailure(reason);
        }

        if state.accepted.contains_key(&item.id) {
            return DeliveryOutcome::Success;
        }

        if let Some(field) = Self::missing_field(item) {
            return DeliveryOutcome::from_http_status(422, format!("{} is required", field));
        }

        let payload_str = |field: &str| item.payload.get(field).and_then(Value::as_str);

        match item.endpoint {
            Endpoint::TripEvent => {
                let trip_id = payload_str("tripId").unwrap_or_default();
                if state.terminal_trips.contains(trip_id) {
                    return DeliveryOutcome::from_http_status(
                        409,
                        format!("Trip {} is already closed", trip_id),
                    );
                }
                if payload_str("type").is_some_and(|t| TERMINAL_TRIP_EVENTS.contains(&t)) {
                    state.terminal_trips.insert(trip_id.to_string());
                }
            }
            Endpoint::ExpenseCreate => {
                let expense_id = payload_str("expenseId")
                    .or_else(|| payload_str("id"))
                    .unwrap_or(&item.id);
                if state.approved_expenses.contains(expense_id) {
                    return DeliveryOutcome::from_http_status(
                        409,
                        format!("Expense {} is already approved", expense_id),
                    );
                }
            }
            Endpoint::TelemetryBatch => {
                if let Some(pings) = item.payload.get("pings").and_then(Value::as_array) {
                    state.telemetry.extend(pings.iter().cloned());
                }
            }
            Endpoint::ExpenseUpload | Endpoint::FloatRequest => {}
        }

        state.accepted.insert(item.id.clone(), item.payload.clone());
        DeliveryOutcome::Success
    }

    /// First field the endpoint contract needs that the payload lacks.
    /// Other endpoints take any payload, including non-objects.
    fn missing_field(item: &SyncItem) -> Option<&'static str> {
        let has_str = |field: &str| {
            item.payload
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        };
        match item.endpoint {
            Endpoint::TripEvent if !has_str("tripId") => Some("tripId"),
            Endpoint::TelemetryBatch if !has_str("batchId") => Some("batchId"),
            Endpoint::TelemetryBatch if !item.payload.get("pings").is_some_and(Value::is_array) => {
                Some("pings")
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Transport for InMemoryBackend {
    async fn attempt_delivery(&self, item: &SyncItem) -> DeliveryOutcome {
        let _in_flight = InFlight::enter(&self.state);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state();
        let outcome = Self::decide(&mut state, item);
        state.log.push(DeliveryRecord {
            id: item.id.clone(),
            endpoint: item.endpoint,
            outcome: outcome.clone(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::WithTimeout;
    use chrono::Utc;
    use omaa_core::Priority;
    use serde_json::json;

    fn item(id: &str, endpoint: Endpoint, payload: Value) -> SyncItem {
        SyncItem::new(id, endpoint, payload, Priority::Low, Utc::now())
    }

    #[tokio::test]
    async fn test_repeat_delivery_is_noop() {
        let backend = InMemoryBackend::new();
        let expense = item("exp-1", Endpoint::ExpenseCreate, json!({"id": "exp-1", "amount": 10}));

        assert!(backend.attempt_delivery(&expense).await.is_success());
        assert!(backend.attempt_delivery(&expense).await.is_success());
        assert_eq!(backend.accepted_count(), 1);
        assert_eq!(backend.attempts_for("exp-1"), 2);
    }

    #[tokio::test]
    async fn test_terminal_trip_conflicts() {
        let backend = InMemoryBackend::new();
        let end = item("e1", Endpoint::TripEvent, json!({"type": "TRIP_END", "tripId": "t-9"}));
        let late = item("e2", Endpoint::TripEvent, json!({"type": "CHECKPOINT", "tripId": "t-9"}));

        assert!(backend.attempt_delivery(&end).await.is_success());
        assert!(matches!(
            backend.attempt_delivery(&late).await,
            DeliveryOutcome::Conflict(reason) if reason.starts_with("409 Conflict")
        ));
    }

    #[tokio::test]
    async fn test_approved_expense_conflicts() {
        let backend = InMemoryBackend::new();
        backend.approve_expense("exp-2");
        let expense = item("q-1", Endpoint::ExpenseCreate, json!({"expenseId": "exp-2"}));

        assert!(matches!(
            backend.attempt_delivery(&expense).await,
            DeliveryOutcome::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_telemetry_is_append_only() {
        let backend = InMemoryBackend::new();
        backend.end_trip("t-1");
        let batch = item(
            "b-1",
            Endpoint::TelemetryBatch,
            json!({"batchId": "b-1", "pings": [{"tripId": "t-1"}, {"tripId": "t-1"}]}),
        );

        assert!(backend.attempt_delivery(&batch).await.is_success());
        assert_eq!(backend.telemetry_pings().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let backend = InMemoryBackend::new();
        backend.fail_item("a", 1);
        backend.fail_next(1);
        backend.set_failure_reason("HTTP 503: busy");

        let a = item("a", Endpoint::FloatRequest, json!({}));
        let b = item("b", Endpoint::FloatRequest, json!({}));

        assert_eq!(
            backend.attempt_delivery(&a).await,
            DeliveryOutcome::RetryableFailure("HTTP 503: busy".into())
        );
        assert!(!backend.attempt_delivery(&b).await.is_success());
        assert!(backend.attempt_delivery(&a).await.is_success());
        assert!(backend.attempt_delivery(&b).await.is_success());
        assert_eq!(backend.deliveries().len(), 4);
        assert_eq!(backend.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_missing_contract_fields_are_rejected() {
        let backend = InMemoryBackend::new();
        let untagged = item("e1", Endpoint::TripEvent, json!({"type": "TRIP_START", "trip": "t1"}));
        let no_pings = item("b-1", Endpoint::TelemetryBatch, json!({"batchId": "b-1"}));
        let receipt = item("u-1", Endpoint::ExpenseUpload, json!("base64receipt"));

        assert_eq!(
            backend.attempt_delivery(&untagged).await,
            DeliveryOutcome::RetryableFailure("HTTP 422: tripId is required".into())
        );
        assert!(matches!(
            backend.attempt_delivery(&no_pings).await,
            DeliveryOutcome::RetryableFailure(reason) if reason.ends_with("pings is required")
        ));
        assert!(backend.attempt_delivery(&receipt).await.is_success());
        assert_eq!(backend.accepted("u-1"), Some(json!("base64receipt")));
        assert!(backend.accepted("e1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_delivery_leaves_nothing_in_flight() {
        let backend = InMemoryBackend::with_latency(Duration::from_secs(60));
        let transport = WithTimeout::new(backend.clone(), Duration::from_secs(1));
        let float = item("f1", Endpoint::FloatRequest, json!({"amount": 5}));

        assert!(matches!(
            transport.attempt_delivery(&float).await,
            DeliveryOutcome::RetryableFailure(reason) if reason.contains("timed out")
        ));
        assert_eq!(backend.in_flight(), 0);
        assert_eq!(backend.max_in_flight(), 1);
        assert!(backend.deliveries().is_empty());
    }
}
