//! # Validation Module
//!
//! The few checks the engine itself makes before an item is queued.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Producer (driver app screens)                                │
//! │  └── Builds payloads from form state                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: SyncEngine::enqueue                                          │
//! │  └── THIS MODULE: non-empty idempotency key                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote authority (transport)                                 │
//! │  └── Payload shape per endpoint, business rules (409 conflicts)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payloads are opaque to the engine. Whatever reads a field is the one that
//! rejects a payload missing it.

use serde_json::Value;

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates an idempotency key. Any non-empty string is accepted.
///
/// ## Example
/// ```rust
/// use omaa_core::validation::validate_item_id;
///
/// assert!(validate_item_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_item_id("exp 7").is_ok());
/// assert!(validate_item_id("").is_err());
/// ```
pub fn validate_item_id(id: &str) -> ValidationResult<()> {
    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }
    Ok(())
}

/// Returns the payload's own `id` when it can serve as the idempotency key.
///
/// Producers that already assign ids to their records (trip events,
/// expenses) get replay protection for free; everything else gets a fresh
/// UUID from the caller.
pub fn payload_item_id(payload: &Value) -> Option<&str> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_item_id() {
        assert!(validate_item_id("trip-evt-001").is_ok());
        assert!(validate_item_id("exp 7").is_ok());
        assert!(validate_item_id(&"x".repeat(500)).is_ok());
        assert!(matches!(
            validate_item_id(""),
            Err(ValidationError::Required { field }) if field == "id"
        ));
    }

    #[test]
    fn test_payload_item_id() {
        assert_eq!(payload_item_id(&json!({"id": "exp-7"})), Some("exp-7"));
        assert_eq!(payload_item_id(&json!({"id": ""})), None);
        assert_eq!(payload_item_id(&json!({"id": 7})), None);
        assert_eq!(payload_item_id(&json!({})), None);
        assert_eq!(payload_item_id(&json!("base64receipt")), None);
    }
}
