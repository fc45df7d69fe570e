//! # Sync Engine
//!
//! Owns the queue, the audit log and the telemetry buffer, and drives
//! delivery through two periodic tasks.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Sync Engine                                   │
//! │                                                                         │
//! │  SyncEngine::builder(config)                                            │
//! │      .transport(..) .storage(..) .connectivity(..) .clock(..)           │
//! │      .build().await ──► restore persisted queue (PROCESSING → QUEUED)   │
//! │                                                                         │
//! │  engine.start() ──┬──► scheduler task   every tick_interval  → tick()   │
//! │                   └──► telemetry task   every flush_interval → flush()  │
//! │                                                                         │
//! │  handle.shutdown().await ──► both tasks stop, pings flushed to queue    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Tick
//! ```text
//!   offline? ──yes──► Offline
//!      │no
//!   single-flight taken? ──yes──► Busy
//!      │no
//!   [queue lock] select_next → begin_attempt (PROCESSING) → persist  [unlock]
//!      │
//!   transport.attempt_delivery(item)          (queue unlocked: enqueue runs)
//!      │
//!   [queue lock] apply_outcome → remove or reschedule → persist      [unlock]
//!      │
//!   audit.record(..)
//! ```
//!
//! Producers never see delivery errors: once `enqueue` returns, every later
//! outcome is visible only through the audit log and the depth listener.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use omaa_core::validation::{payload_item_id, validate_item_id};
use omaa_core::{
    AuditAction, AuditLogEntry, AuditStatus, Endpoint, Ping, Priority, QueueStats, RetryPolicy,
    SyncItem,
};

use crate::audit::AuditLog;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::{EnqueueOutcome, QueueStore};
use crate::retry::{apply_outcome, Resolution};
use crate::scheduler::{select_next, SingleFlight};
use crate::storage::QueueStorage;
use crate::telemetry::TelemetryBatcher;
use crate::transport::{AlwaysOnline, Connectivity, Transport};

// =============================================================================
// Tick Report
// =============================================================================

/// What a single scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// Connectivity reported offline; nothing attempted.
    Offline,
    /// Another attempt is in flight.
    Busy,
    /// No item is eligible.
    Idle,
    /// One item was attempted.
    Attempted { id: String, resolution: Resolution },
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    storage: Option<Arc<dyn QueueStorage>>,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
}

impl SyncEngineBuilder {
    /// Overrides the storage backend chosen by `config.storage`.
    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the delivery transport. Required.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the online check (default: always online).
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Sets the time source (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the config, opens storage and restores the queue.
    ///
    /// A queue blob that does not decode is logged and the engine starts
    /// empty; the blob is kept under `<key>_corrupt`.
    pub async fn build(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;

        let transport = self
            .transport
            .ok_or_else(|| SyncError::InvalidConfig("No transport configured".into()))?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => self.config.open_storage().await?,
        };

        let mut queue = QueueStore::new(storage, self.config.storage.queue_key.clone());
        match queue.restore().await {
            Ok(restored) => debug!(restored, "Queue ready"),
            Err(e @ SyncError::CorruptQueue { .. }) => {
                error!(error = %e, "Failed to restore queue, starting empty");
            }
            Err(e) => return Err(e),
        }

        let audit = AuditLog::new(self.config.audit.capacity);
        let telemetry = TelemetryBatcher::new(self.config.engine.max_buffered_pings);
        let policy = self.config.retry_policy();

        info!(
            backend = %self.config.storage.backend,
            pending = queue.depth(),
            tick_ms = self.config.engine.tick_interval_ms,
            max_retries = policy.max_retries,
            "Sync engine initialized"
        );

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                policy,
                queue: Mutex::new(queue),
                audit: RwLock::new(audit),
                telemetry: Mutex::new(telemetry),
                transport,
                connectivity: self.connectivity,
                clock: self.clock,
                flight: SingleFlight::new(),
            }),
        })
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

struct EngineInner {
    config: SyncConfig,
    policy: RetryPolicy,
    queue: Mutex<QueueStore>,
    audit: RwLock<AuditLog>,
    telemetry: Mutex<TelemetryBatcher>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
    flight: SingleFlight,
}

/// Offline-first sync engine. Clones share the same state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("backend", &self.inner.config.storage.backend)
            .field("busy", &self.inner.flight.is_busy())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Starts building an engine from `config`.
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder {
            config,
            storage: None,
            transport: None,
            connectivity: Arc::new(AlwaysOnline),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // =========================================================================
    // Producers
    // =========================================================================

    /// Queues `payload` for delivery to `endpoint`.
    ///
    /// The payload is opaque to the engine and stored as given. The
    /// idempotency key is `payload.id` when it is a non-empty string,
    /// otherwise a fresh UUID. Enqueueing an id that is already queued is a
    /// no-op reported as [`EnqueueOutcome::Duplicate`].
    ///
    /// ## Errors
    /// - `SyncError::InvalidItem` if an explicit id is empty
    /// - `SyncError::StorageFailed` if the queue cannot be written
    ///
    /// Nothing is queued in either case.
    pub async fn enqueue(
        &self,
        endpoint: Endpoint,
        payload: Value,
        priority: Priority,
    ) -> SyncResult<EnqueueOutcome> {
        let id = payload_item_id(&payload)
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.enqueue_with_id(id, endpoint, payload, priority).await
    }

    /// Like [`enqueue`](Self::enqueue) with an explicit idempotency key.
    pub async fn enqueue_with_id(
        &self,
        id: impl Into<String>,
        endpoint: Endpoint,
        payload: Value,
        priority: Priority,
    ) -> SyncResult<EnqueueOutcome> {
        let id = id.into();
        validate_item_id(&id)?;

        let now = self.inner.clock.now();
        let item = SyncItem::new(id.clone(), endpoint, payload, priority, now);

        let outcome = self.inner.queue.lock().await.enqueue(item).await?;
        if outcome == EnqueueOutcome::Queued {
            debug!(id = %id, endpoint = %endpoint, priority = %priority, "Item queued");
            self.record(AuditLogEntry::new(
                &id,
                now,
                AuditAction::Enqueue,
                AuditStatus::Success,
                &format!("Added to {} queue", priority),
            ))
            .await;
        }
        Ok(outcome)
    }

    /// Buffers one raw telemetry ping. Flushes early when the buffer is full.
    pub async fn buffer_telemetry(&self, ping: Value) -> SyncResult<()> {
        let full = self.inner.telemetry.lock().await.buffer(ping);
        if full {
            self.flush_telemetry().await?;
        }
        Ok(())
    }

    /// Buffers a typed [`Ping`].
    pub async fn buffer_ping(&self, ping: &Ping) -> SyncResult<()> {
        self.buffer_telemetry(serde_json::to_value(ping)?).await
    }

    /// Wraps all buffered pings into one LOW priority TELEMETRY_BATCH item.
    /// Returns the new item id, or `None` when nothing was buffered.
    pub async fn flush_telemetry(&self) -> SyncResult<Option<String>> {
        let now = self.inner.clock.now();
        let Some(batch) = self.inner.telemetry.lock().await.take_batch(now) else {
            return Ok(None);
        };

        let count = batch.pings.len();
        let id = batch.batch_id.clone();
        let payload = serde_json::to_value(&batch)?;

        if let Err(e) = self
            .enqueue_with_id(id.clone(), Endpoint::TelemetryBatch, payload, Priority::Low)
            .await
        {
            warn!(batch_id = %id, pings = count, error = %e, "Telemetry batch not queued, keeping pings");
            self.inner.telemetry.lock().await.put_back(batch.pings);
            return Err(e);
        }
        info!(batch_id = %id, pings = count, "Telemetry batch queued");
        Ok(Some(id))
    }

    /// Number of pings waiting for the next flush.
    pub async fn buffered_pings(&self) -> usize {
        self.inner.telemetry.lock().await.len()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Runs one scheduling step: picks the best eligible item, attempts it
    /// and applies the outcome.
    ///
    /// Concurrent calls never attempt two items at once; the loser returns
    /// [`TickReport::Busy`].
    pub async fn tick(&self) -> SyncResult<TickReport> {
        if !self.inner.connectivity.is_online() {
            debug!("Offline, skipping tick");
            return Ok(TickReport::Offline);
        }

        let Some(_flight) = self.inner.flight.try_acquire() else {
            debug!("Delivery in flight, skipping tick");
            return Ok(TickReport::Busy);
        };

        let now = self.inner.clock.now();
        let claimed = {
            let mut queue = self.inner.queue.lock().await;
            let Some(index) = select_next(queue.items(), now) else {
                return Ok(TickReport::Idle);
            };
            let id = queue.items()[index].id.clone();
            queue
                .update(&id, |item| item.begin_attempt().map(|_| item.clone()))
                .await??
        };

        debug!(
            id = %claimed.id,
            endpoint = %claimed.endpoint,
            priority = %claimed.priority,
            attempt = claimed.attempts + 1,
            "Attempting delivery"
        );

        let outcome = self.inner.transport.attempt_delivery(&claimed).await;

        let resolved_at = self.inner.clock.now();
        let mut item = claimed;
        let resolution = apply_outcome(&mut item, outcome, resolved_at, &self.inner.policy)?;

        {
            let mut queue = self.inner.queue.lock().await;
            if resolution.is_terminal() {
                queue.remove(&item.id).await;
            } else {
                let updated = item.clone();
                queue.update(&item.id, move |slot| *slot = updated).await?;
            }
        }

        match &resolution {
            Resolution::Delivered => info!(id = %item.id, endpoint = %item.endpoint, "Item synced"),
            Resolution::Conflicted { reason } => {
                warn!(id = %item.id, reason = %reason, "Item rejected by server")
            }
            Resolution::Rescheduled { attempts, delay, .. } => warn!(
                id = %item.id,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Delivery failed, rescheduled"
            ),
            Resolution::DeadLettered { attempts, .. } => {
                error!(id = %item.id, attempts, "Retry budget exhausted, item dropped")
            }
        }

        self.record(resolution.audit_entry(&item, resolved_at)).await;

        Ok(TickReport::Attempted {
            id: item.id,
            resolution,
        })
    }

    /// Returns true while a delivery attempt is in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.flight.is_busy()
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Registers a callback receiving the queue depth after every change.
    pub async fn set_queue_depth_listener<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.inner
            .queue
            .lock()
            .await
            .set_depth_listener(Box::new(listener));
    }

    /// Pending count plus the most recent audit entries.
    pub async fn stats(&self) -> QueueStats {
        let pending_count = self.inner.queue.lock().await.depth();
        let recent_audit = self
            .inner
            .audit
            .read()
            .await
            .recent(self.inner.config.audit.recent_display);
        QueueStats {
            pending_count,
            recent_audit,
        }
    }

    /// Items still awaiting delivery, in insertion order.
    pub async fn pending_items(&self) -> Vec<SyncItem> {
        self.inner.queue.lock().await.all_pending()
    }

    /// Snapshot of a queued item.
    pub async fn find(&self, id: &str) -> Option<SyncItem> {
        self.inner.queue.lock().await.find_by_id(id).cloned()
    }

    /// Every retained audit entry, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.inner.audit.read().await.iter().cloned().collect()
    }

    /// Retained audit entries for one item, oldest first.
    pub async fn audit_for(&self, id: &str) -> Vec<AuditLogEntry> {
        self.inner.audit.read().await.for_item(id)
    }

    async fn record(&self, entry: AuditLogEntry) {
        self.inner.audit.write().await.record(entry);
    }

    // =========================================================================
    // Periodic Tasks
    // =========================================================================

    /// Spawns the scheduler and telemetry tasks.
    ///
    /// Dropping the returned handle without calling
    /// [`EngineHandle::shutdown`] also stops both tasks.
    pub fn start(&self) -> EngineHandle {
        let (scheduler_tx, scheduler_rx) = mpsc::channel(1);
        let (telemetry_tx, telemetry_rx) = mpsc::channel(1);

        let scheduler = tokio::spawn(self.clone().run_scheduler(scheduler_rx));
        let telemetry = tokio::spawn(self.clone().run_telemetry(telemetry_rx));

        EngineHandle {
            shutdown_tx: vec![scheduler_tx, telemetry_tx],
            tasks: vec![scheduler, telemetry],
        }
    }

    /// Scheduler loop.
    async fn run_scheduler(self, mut shutdown_rx: mpsc::Receiver<()>) {
        let period = self.inner.config.engine.tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Sync scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Scheduler tick failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Telemetry flush loop.
    async fn run_telemetry(self, mut shutdown_rx: mpsc::Receiver<()>) {
        let period = self.inner.config.engine.telemetry_flush_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Telemetry flusher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_telemetry().await {
                        error!(error = %e, "Telemetry flush failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Telemetry flusher shutting down");
                    // Buffered pings become a queued batch rather than being lost.
                    if let Err(e) = self.flush_telemetry().await {
                        error!(error = %e, "Final telemetry flush failed");
                    }
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle to the running periodic tasks.
#[derive(Debug)]
pub struct EngineHandle {
    shutdown_tx: Vec<mpsc::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Stops both tasks and waits for them to exit. An attempt already in
    /// flight completes first.
    pub async fn shutdown(self) -> SyncResult<()> {
        for tx in &self.shutdown_tx {
            if tx.send(()).await.is_err() {
                debug!("Engine task already stopped");
            }
        }

        for task in self.tasks {
            task.await
                .map_err(|e| SyncError::ChannelError(format!("Engine task failed: {}", e)))?;
        }

        info!("Sync engine stopped");
        Ok(())
    }

    /// Returns true once every task has exited.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }
}
