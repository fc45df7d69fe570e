//! # Telemetry Batcher
//!
//! Buffers high-frequency pings in memory and hands them out as one batch.
//!
//! ```text
//!   ping ─┐
//!   ping ─┼──► buffer: Vec<Value> ──(30s timer or limit)──► TelemetryBatch
//!   ping ─┘                                                 {batchId, timestamp, pings[]}
//!                                                                │
//!                                                                ▼
//!                                           enqueue(TELEMETRY_BATCH, LOW)
//! ```
//!
//! Pings are disposable until batched: nothing here is persisted.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use omaa_core::TelemetryBatch;

/// In-memory ping buffer.
#[derive(Debug, Default)]
pub struct TelemetryBatcher {
    buffer: Vec<Value>,
    max_buffered: usize,
}

impl TelemetryBatcher {
    /// `max_buffered` pings trigger an early flush; 0 means no limit.
    pub fn new(max_buffered: usize) -> Self {
        TelemetryBatcher {
            buffer: Vec::new(),
            max_buffered,
        }
    }

    /// Appends a ping. Returns true when the buffer has reached its limit
    /// and should be flushed now.
    pub fn buffer(&mut self, ping: Value) -> bool {
        self.buffer.push(ping);

        let full = self.max_buffered > 0 && self.buffer.len() >= self.max_buffered;
        if full {
            warn!(count = self.buffer.len(), "Telemetry buffer full - forcing flush");
        }
        full
    }

    /// Swaps the buffer for an empty one. Returns `None` if it was empty.
    pub fn take_batch(&mut self, now: DateTime<Utc>) -> Option<TelemetryBatch> {
        if self.buffer.is_empty() {
            return None;
        }
        let pings = std::mem::take(&mut self.buffer);
        Some(TelemetryBatch::new(pings, now))
    }

    /// Returns pings from a batch that could not be queued to the front of
    /// the buffer, ahead of anything buffered since.
    pub fn put_back(&mut self, mut pings: Vec<Value>) {
        pings.append(&mut self.buffer);
        self.buffer = pings;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_batch_preserves_order_and_clears() {
        let mut batcher = TelemetryBatcher::new(0);
        for n in 0..5 {
            assert!(!batcher.buffer(json!({"seq": n})));
        }

        let batch = batcher.take_batch(DateTime::<Utc>::UNIX_EPOCH).unwrap();
        let seqs: Vec<i64> = batch.pings.iter().map(|p| p["seq"].as_i64().unwrap()).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert!(!batch.batch_id.is_empty());
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let mut batcher = TelemetryBatcher::new(10);
        assert!(batcher.take_batch(Utc::now()).is_none());
    }

    #[test]
    fn test_put_back_keeps_order() {
        let mut batcher = TelemetryBatcher::new(0);
        batcher.buffer(json!(1));
        batcher.buffer(json!(2));
        let batch = batcher.take_batch(Utc::now()).unwrap();
        batcher.buffer(json!(3));

        batcher.put_back(batch.pings);

        let again = batcher.take_batch(Utc::now()).unwrap();
        assert_eq!(again.pings, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_limit_signals_flush() {
        let mut batcher = TelemetryBatcher::new(3);
        assert!(!batcher.buffer(json!(1)));
        assert!(!batcher.buffer(json!(2)));
        assert!(batcher.buffer(json!(3)));
        assert_eq!(batcher.len(), 3);
    }
}
