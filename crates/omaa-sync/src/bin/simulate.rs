//! # Sync Simulator
//!
//! Runs the engine against a flaky simulated network so queue behaviour can
//! be watched from a terminal.
//!
//! ## Usage
//! ```bash
//! # Defaults: sync.toml from the platform config dir, 30% failure rate
//! cargo run -p omaa-sync --bin omaa-sync-sim
//!
//! # Custom config and failure rate, reproducible run
//! cargo run -p omaa-sync --bin omaa-sync-sim -- --config ./sync.toml --failure-rate 0.5 --seed 42
//!
//! # More engine detail
//! RUST_LOG=debug cargo run -p omaa-sync --bin omaa-sync-sim
//! ```
//!
//! The simulator queues a short trip (start, checkpoints, end), one expense,
//! a float request and a start event for a trip the server has cancelled,
//! then streams GPS pings until Ctrl-C.

use chrono::Utc;
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use omaa_core::{Endpoint, GeoLocation, Ping, PingTrigger, PingType, Priority};
use omaa_sync::transport::simulated::{DEFAULT_FAILURE_RATE, DEFAULT_LATENCY};
use omaa_sync::{SimulatedTransport, SyncConfig, SyncEngine};

const PING_INTERVAL: Duration = Duration::from_secs(5);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn print_help() {
    println!("Omaa Sync Simulator");
    println!();
    println!("Usage: omaa-sync-sim [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>        Config file (default: platform config dir)");
    println!("  -f, --failure-rate <RATE>  Simulated failure probability (default: 0.3)");
    println!("  -s, --seed <N>             Seed for reproducible failures");
    println!("  -h, --help                 Show this help message");
}

fn sample_location(step: u32) -> GeoLocation {
    GeoLocation {
        latitude: -1.2921 + f64::from(step) * 0.001,
        longitude: 36.8219 + f64::from(step) * 0.0015,
        timestamp: Utc::now(),
        accuracy: Some(8.0),
        speed: Some(42.0),
        heading: Some(75.0),
        is_mock: false,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,omaa_sync=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut failure_rate = DEFAULT_FAILURE_RATE;
    let mut seed: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--failure-rate" | "-f" => {
                if i + 1 < args.len() {
                    failure_rate = args[i + 1].parse().unwrap_or(DEFAULT_FAILURE_RATE);
                    i += 1;
                }
            }
            "--seed" | "-s" => {
                if i + 1 < args.len() {
                    seed = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => SyncConfig::load(Some(path.clone()))?,
        None => SyncConfig::load_or_default(None),
    };

    let transport = match seed {
        Some(seed) => SimulatedTransport::seeded(DEFAULT_LATENCY, failure_rate, seed),
        None => SimulatedTransport::new(DEFAULT_LATENCY, failure_rate),
    };

    println!("Omaa Sync Simulator");
    println!("===================");
    println!("Storage:      {}", config.storage.backend);
    println!("Failure rate: {:.0}%", failure_rate * 100.0);
    println!();

    let engine = SyncEngine::builder(config)
        .transport(Arc::new(transport))
        .build()
        .await?;

    engine
        .set_queue_depth_listener(|depth| println!("  queue depth: {}", depth))
        .await;

    let trip_id = format!("trip-{}", Utc::now().timestamp());
    let run_id = Utc::now().timestamp_millis();

    let trip_events = [
        ("TRIP_START", Priority::High),
        ("CHECKPOINT", Priority::Low),
        ("CHECKPOINT", Priority::Low),
        ("TRIP_END", Priority::High),
    ];
    for (n, (kind, priority)) in trip_events.into_iter().enumerate() {
        engine
            .enqueue(
                Endpoint::TripEvent,
                json!({
                    "id": format!("{}-evt-{}", trip_id, n),
                    "type": kind,
                    "tripId": trip_id,
                    "timestamp": Utc::now().timestamp_millis(),
                }),
                priority,
            )
            .await?;
    }

    engine
        .enqueue(
            Endpoint::ExpenseCreate,
            json!({"id": format!("exp-{}", run_id), "tripId": trip_id, "category": "FUEL", "amount": 4500}),
            Priority::High,
        )
        .await?;
    engine
        .enqueue(
            Endpoint::FloatRequest,
            json!({"id": format!("float-{}", run_id), "amount": 10000, "reason": "Tolls"}),
            Priority::Low,
        )
        .await?;
    engine
        .enqueue(
            Endpoint::TripEvent,
            json!({"type": "TRIP_START", "tripId": "trip-cancelled-001"}),
            Priority::High,
        )
        .await?;

    let handle = engine.start();

    let mut pings = tokio::time::interval(PING_INTERVAL);
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    let mut step = 0u32;

    loop {
        tokio::select! {
            _ = pings.tick() => {
                let ping = Ping::new(PingType::Checkpoint, PingTrigger::Timer, sample_location(step));
                engine.buffer_ping(&ping).await?;
                step += 1;
            }
            _ = stats.tick() => {
                let snapshot = engine.stats().await;
                println!();
                println!("Pending: {}  Buffered pings: {}", snapshot.pending_count, engine.buffered_pings().await);
                for entry in &snapshot.recent_audit {
                    println!("  {} {} {} {}", entry.timestamp.format("%H:%M:%S"), entry.action, entry.status, entry.details);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Shutting down...");
                break;
            }
        }
    }

    handle.shutdown().await?;

    let remaining = engine.stats().await.pending_count;
    println!("Stopped with {} item(s) still queued", remaining);
    Ok(())
}
