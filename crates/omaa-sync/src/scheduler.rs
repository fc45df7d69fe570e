//! # Scheduler
//!
//! Picks the next item to deliver and guarantees a single in-flight attempt.
//!
//! ## Selection Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates = status ∈ {QUEUED, FAILED}  AND  nextRetryTime ≤ now       │
//! │                                                                         │
//! │  order by:  1. priority     HIGH before LOW (regardless of age)         │
//! │             2. createdAt    oldest first (FIFO)                         │
//! │             3. position     insertion order breaks exact ties           │
//! │                                                                         │
//! │  B(HIGH, t=5) ─┐                                                        │
//! │  A(LOW,  t=0) ─┼──► B, A                                                │
//! │  C(LOW,  t=1) ─┘     then C                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

use omaa_core::SyncItem;

/// Index of the best eligible item at `now`, if any.
pub fn select_next(items: &[SyncItem], now: DateTime<Utc>) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_eligible(now))
        .min_by_key(|(index, item)| (item.priority.rank(), item.created_at, *index))
        .map(|(index, _)| index)
}

// =============================================================================
// Single Flight
// =============================================================================

/// Processing flag: at most one delivery attempt at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the flag, or returns `None` if an attempt is already running.
    /// The flag is released when the guard drops.
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    /// Returns true while a guard is held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one delivery attempt.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}
