//! # Audit Log
//!
//! Append-only history of engine outcomes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Audit Log                                     │
//! │                                                                         │
//! │   record(entry) ──┬──► ring buffer (capacity, oldest evicted first)     │
//! │                   │         └── recent(n) → stats() / dashboard         │
//! │                   │                                                     │
//! │                   └──► tracing event, target "omaa_sync::audit"         │
//! │                             └── durable sink is the subscriber's job    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never modified. Eviction only trims the in-memory view; every
//! entry has already been emitted to the tracing sink when it is recorded.

use std::collections::VecDeque;
use tracing::{info, warn};

use omaa_core::{AuditLogEntry, AuditStatus};

/// Target used for audit tracing events.
pub const AUDIT_TARGET: &str = "omaa_sync::audit";

/// Bounded in-memory audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: VecDeque<AuditLogEntry>,
    capacity: usize,
    total_recorded: u64,
}

impl AuditLog {
    /// Creates a log that keeps at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        AuditLog {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_recorded: 0,
        }
    }

    /// Appends an entry, evicting the oldest one when full.
    pub fn record(&mut self, entry: AuditLogEntry) {
        match entry.status {
            AuditStatus::Success => info!(
                target: AUDIT_TARGET,
                audit_id = %entry.id,
                action = %entry.action,
                status = %entry.status,
                details = %entry.details,
                "audit"
            ),
            AuditStatus::Conflict | AuditStatus::Error => warn!(
                target: AUDIT_TARGET,
                audit_id = %entry.id,
                action = %entry.action,
                status = %entry.status,
                details = %entry.details,
                "audit"
            ),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_recorded += 1;
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<AuditLogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Retained entries concerning `item_id`, oldest first.
    pub fn for_item(&self, item_id: &str) -> Vec<AuditLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.concerns(item_id))
            .cloned()
            .collect()
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AuditLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries recorded since creation, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use omaa_core::AuditAction;

    fn entry(item: &str, message: &str) -> AuditLogEntry {
        AuditLogEntry::new(
            item,
            DateTime::<Utc>::UNIX_EPOCH,
            AuditAction::Sync,
            AuditStatus::Success,
            message,
        )
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut log = AuditLog::new(10);
        for n in 0..7 {
            log.record(entry("x", &n.to_string()));
        }

        let recent: Vec<String> = log.recent(3).into_iter().map(|e| e.details).collect();
        assert_eq!(recent, vec!["[x] 4", "[x] 5", "[x] 6"]);
        assert_eq!(log.recent(100).len(), 7);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = AuditLog::new(2);
        log.record(entry("a", "1"));
        log.record(entry("b", "2"));
        log.record(entry("c", "3"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.total_recorded(), 3);
        assert!(log.for_item("a").is_empty());
        assert_eq!(log.iter().next().unwrap().details, "[b] 2");
    }

    #[test]
    fn test_entries_have_unique_ids() {
        let mut log = AuditLog::default();
        log.record(entry("a", "same"));
        log.record(entry("a", "same"));

        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_ne!(ids[0], ids[1]);
        assert_eq!(log.for_item("a").len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = AuditLog::new(0);
        log.record(entry("a", "1"));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
    }
}
