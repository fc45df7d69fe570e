//! # Telemetry Pings
//!
//! Typed form of the location/event pings the driver app produces. The
//! engine buffers pings as raw JSON, so anything serializable can be batched;
//! these types are the shape the driver app actually sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What triggered the ping's event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingType {
    Start,
    Stop,
    Checkpoint,
    Traffic,
    FuelStop,
    StopCheckin,
    DeviationAlert,
    Sos,
    BiometricVerify,
}

/// Why the ping was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingTrigger {
    Manual,
    Distance,
    Timer,
    Geofence,
    SystemForce,
}

/// A GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Set by the device when the fix came from a mock location provider.
    #[serde(default)]
    pub is_mock: bool,
}

/// One telemetry ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PingType,
    pub trigger: PingTrigger,
    pub location: GeoLocation,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Battery percentage (0-100) at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
}

impl Ping {
    /// Creates a ping at `location` with a fresh id.
    pub fn new(kind: PingType, trigger: PingTrigger, location: GeoLocation) -> Self {
        Ping {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            trigger,
            timestamp: location.timestamp,
            location,
            note: None,
            battery_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_wire_format() {
        let ts = DateTime::from_timestamp_millis(1_000).unwrap();
        let mut ping = Ping::new(
            PingType::FuelStop,
            PingTrigger::Manual,
            GeoLocation {
                latitude: 6.5,
                longitude: 3.4,
                timestamp: ts,
                accuracy: None,
                speed: None,
                heading: None,
                is_mock: false,
            },
        );
        ping.id = "p-1".into();

        let value = serde_json::to_value(&ping).unwrap();
        assert_eq!(value["type"], json!("FUEL_STOP"));
        assert_eq!(value["trigger"], json!("MANUAL"));
        assert_eq!(value["timestamp"], json!(1_000));
        assert_eq!(value["location"]["isMock"], json!(false));
        assert!(value.get("note").is_none());
    }
}
