//! # omaa-sync: Offline Sync Engine for Omaa Transport
//!
//! Durable, prioritized outbound queue for the driver app. Trip events,
//! expenses, float requests and batched GPS telemetry are queued locally and
//! delivered when the network allows, with backoff, conflict handling and an
//! audit trail.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │   enqueue(endpoint, payload, priority)        buffer_telemetry(ping)    │
//! │            │                                          │                 │
//! │            │                                          ▼                 │
//! │            │                              ┌────────────────────────┐    │
//! │            │                              │   TelemetryBatcher     │    │
//! │            │                              │   (30s flush timer)    │    │
//! │            │                              └───────────┬────────────┘    │
//! │            ▼                                          │ LOW batch       │
//! │   ┌──────────────────────────────────────────────────▼──────────────┐  │
//! │   │                         QueueStore                              │  │
//! │   │   Vec<SyncItem> ──persist──► QueueStorage (SQLite | file | mem) │  │
//! │   └──────────────────────────────┬──────────────────────────────────┘  │
//! │                                  │ select_next (2s tick)                │
//! │                                  ▼                                      │
//! │   ┌────────────────┐    ┌────────────────┐    ┌────────────────────┐   │
//! │   │   Scheduler    │───►│   Transport    │───►│   apply_outcome    │   │
//! │   │  single-flight │    │ (adapter seam) │    │  retry / conflict  │   │
//! │   └────────────────┘    └────────────────┘    └─────────┬──────────┘   │
//! │                                                          ▼              │
//! │                                               ┌────────────────────┐   │
//! │                                               │     AuditLog       │   │
//! │                                               │ ring + tracing     │   │
//! │                                               └────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine` driver, builder and periodic tasks
//! - [`queue`] - Persisted queue store
//! - [`scheduler`] - Item selection and the single-flight guard
//! - [`transport`] - Delivery seam, simulated network, in-memory backend
//! - [`retry`] - Outcome resolution and backoff application
//! - [`audit`] - Bounded audit log
//! - [`telemetry`] - Ping buffer
//! - [`storage`] - Queue persistence backends
//! - [`config`] - Engine configuration
//! - [`clock`] - Injectable time source
//! - [`error`] - Sync error types
//!
//! ## Usage
//! ```ignore
//! let engine = SyncEngine::builder(SyncConfig::load_or_default(None))
//!     .transport(Arc::new(SimulatedTransport::default()))
//!     .build()
//!     .await?;
//!
//! let handle = engine.start();
//! engine.enqueue(Endpoint::TripEvent, payload, Priority::High).await?;
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use audit::{AuditLog, AUDIT_TARGET};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StorageBackend, SyncConfig};
pub use engine::{EngineHandle, SyncEngine, SyncEngineBuilder, TickReport};
pub use error::{SyncError, SyncResult};
pub use queue::{EnqueueOutcome, QueueStore};
pub use retry::{apply_outcome, Resolution};
pub use scheduler::{select_next, SingleFlight};
pub use storage::{FileStorage, MemoryStorage, QueueStorage, SqliteStorage};
pub use telemetry::TelemetryBatcher;
pub use transport::{
    AlwaysOnline, Connectivity, InMemoryBackend, NetworkMonitor, SimulatedTransport, Transport,
    WithTimeout,
};
