//! Flaky network stand-in used by the simulator binary and demos.
//!
//! Every call waits `latency`, then fails with "Network Timeout" with
//! probability `failure_rate`. Starting a trip whose id contains
//! `cancelled` is rejected with a 409, the one business rule the driver
//! app's demo backend enforced.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use omaa_core::{DeliveryOutcome, Endpoint, SyncItem};

use super::Transport;

/// Default per-call latency.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(800);

/// Default probability of a simulated timeout.
pub const DEFAULT_FAILURE_RATE: f64 = 0.3;

/// Simulated transport with random failures.
#[derive(Debug)]
pub struct SimulatedTransport {
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY, DEFAULT_FAILURE_RATE)
    }
}

impl SimulatedTransport {
    /// `failure_rate` is clamped to `[0, 1]`.
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self::with_rng(latency, failure_rate, StdRng::from_entropy())
    }

    /// Deterministic variant for reproducible runs.
    pub fn seeded(latency: Duration, failure_rate: f64, seed: u64) -> Self {
        Self::with_rng(latency, failure_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(latency: Duration, failure_rate: f64, rng: StdRng) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        SimulatedTransport {
            latency,
            failure_rate,
            rng: Mutex::new(rng),
        }
    }

    fn roll_failure(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_bool(self.failure_rate)
    }
}

/// TRIP_START against a trip the server already cancelled.
fn is_cancelled_trip_start(item: &SyncItem) -> bool {
    item.endpoint == Endpoint::TripEvent
        && item.payload.get("type").and_then(|v| v.as_str()) == Some("TRIP_START")
        && item
            .payload
            .get("tripId")
            .and_then(|v| v.as_str())
            .is_some_and(|trip| trip.contains("cancelled"))
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn attempt_delivery(&self, item: &SyncItem) -> DeliveryOutcome {
        debug!(id = %item.id, endpoint = %item.endpoint, path = item.endpoint.path(), "Simulated delivery");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.roll_failure() {
            return DeliveryOutcome::RetryableFailure("Network Timeout".to_string());
        }

        if is_cancelled_trip_start(item) {
            return DeliveryOutcome::from_http_status(409, "Trip is Cancelled on Server");
        }

        DeliveryOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use omaa_core::Priority;
    use serde_json::json;

    fn trip_start(trip_id: &str) -> SyncItem {
        SyncItem::new(
            "evt",
            Endpoint::TripEvent,
            json!({"type": "TRIP_START", "tripId": trip_id}),
            Priority::High,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_reliable_network_delivers() {
        let transport = SimulatedTransport::new(Duration::ZERO, 0.0);
        assert_eq!(transport.attempt_delivery(&trip_start("t-1")).await, DeliveryOutcome::Success);
    }

    #[tokio::test]
    async fn test_cancelled_trip_conflicts() {
        let transport = SimulatedTransport::new(Duration::ZERO, 0.0);
        assert_eq!(
            transport.attempt_delivery(&trip_start("trip-cancelled-7")).await,
            DeliveryOutcome::Conflict("409 Conflict: Trip is Cancelled on Server".into())
        );
    }

    #[tokio::test]
    async fn test_always_failing_network() {
        let transport = SimulatedTransport::new(Duration::ZERO, 1.0);
        assert_eq!(
            transport.attempt_delivery(&trip_start("t-1")).await,
            DeliveryOutcome::RetryableFailure("Network Timeout".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let transport = SimulatedTransport::seeded(DEFAULT_LATENCY, 0.0, 7);
        let started = tokio::time::Instant::now();
        transport.attempt_delivery(&trip_start("t-1")).await;
        assert!(started.elapsed() >= DEFAULT_LATENCY);
    }

    #[test]
    fn test_failure_rate_is_clamped() {
        assert_eq!(SimulatedTransport::new(Duration::ZERO, 4.0).failure_rate, 1.0);
        assert_eq!(SimulatedTransport::new(Duration::ZERO, f64::NAN).failure_rate, 0.0);
    }
}
