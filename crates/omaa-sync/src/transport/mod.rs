//! # Transport Adapter
//!
//! The seam between the engine and whatever actually delivers items.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transport::attempt_delivery                        │
//! │                                                                         │
//! │  SyncItem ──► [ HTTP client | SimulatedTransport | InMemoryBackend ]    │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │   Success             remote accepted (repeat deliveries are no-ops)   │
//! │   RetryableFailure    timeout, 5xx, offline        → backoff            │
//! │   Conflict            remote state supersedes     → dropped, audited    │
//! │                                                                         │
//! │  The engine never inspects how delivery happens. Transport errors are   │
//! │  outcomes, not Rust errors: the adapter maps everything it sees into    │
//! │  one of the three variants.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connectivity is a separate, caller-supplied check: when it reports
//! offline the scheduler skips the tick without calling the transport.

pub mod backend;
pub mod simulated;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use omaa_core::{DeliveryOutcome, SyncItem};

pub use backend::{DeliveryRecord, InMemoryBackend};
pub use simulated::SimulatedTransport;

// =============================================================================
// Transport
// =============================================================================

/// Delivers one item to the remote authority.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempts delivery. Must not panic; every failure maps to an outcome.
    async fn attempt_delivery(&self, item: &SyncItem) -> DeliveryOutcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn attempt_delivery(&self, item: &SyncItem) -> DeliveryOutcome {
        (**self).attempt_delivery(item).await
    }
}

/// Bounds another transport's call time; an expired call is a retryable
/// failure.
#[derive(Debug, Clone)]
pub struct WithTimeout<T> {
    inner: T,
    limit: Duration,
}

impl<T: Transport> WithTimeout<T> {
    pub fn new(inner: T, limit: Duration) -> Self {
        WithTimeout { inner, limit }
    }
}

#[async_trait]
impl<T: Transport> Transport for WithTimeout<T> {
    async fn attempt_delivery(&self, item: &SyncItem) -> DeliveryOutcome {
        match timeout(self.limit, self.inner.attempt_delivery(item)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(id = %item.id, limit_ms = self.limit.as_millis() as u64, "Delivery timed out");
                DeliveryOutcome::RetryableFailure(format!(
                    "Request timed out after {}ms",
                    self.limit.as_millis()
                ))
            }
        }
    }
}

// =============================================================================
// Connectivity
// =============================================================================

/// Caller-supplied online check.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Always reports online.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Online flag flipped by the host application (OS network callbacks).
/// Clones share the flag.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    online: Arc<AtomicBool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        NetworkMonitor {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use omaa_core::{Endpoint, Priority};
    use serde_json::json;

    struct Stalls;

    #[async_trait]
    impl Transport for Stalls {
        async fn attempt_delivery(&self, _item: &SyncItem) -> DeliveryOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            DeliveryOutcome::Success
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_retryable_failure() {
        let transport = WithTimeout::new(Stalls, Duration::from_secs(5));
        let item = SyncItem::new("x", Endpoint::FloatRequest, json!({}), Priority::Low, Utc::now());

        let outcome = transport.attempt_delivery(&item).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::RetryableFailure("Request timed out after 5000ms".into())
        );
    }

    #[test]
    fn test_network_monitor_is_shared() {
        let monitor = NetworkMonitor::default();
        let view = monitor.clone();
        assert!(view.is_online());

        monitor.set_online(false);
        assert!(!view.is_online());
        assert!(AlwaysOnline.is_online());
    }
}
