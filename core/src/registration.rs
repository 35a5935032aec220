//! The `user.vendor.registered` topic contract.
//!
//! Wire format: a UTF-8 JSON object `{"user_id": <integer>, "email": <string>}`.
//! Extra fields are ignored. A decimal string is accepted for `user_id`
//! because older producers stringified identifiers.

use crate::event::{Event, EventError, SerializedEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Topic carrying vendor registrations.
pub const VENDOR_REGISTERED_TOPIC: &str = "user.vendor.registered";

/// Consumer group of the vendors service.
pub const VENDORS_CONSUMER_GROUP: &str = "vendors-service-group";

/// Type name carried next to the payload.
pub const VENDOR_REGISTERED_EVENT_TYPE: &str = "user.vendor.registered.v1";

/// "A user registered with the vendor role."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    /// Identity-service user id.
    pub user_id: i64,
    /// Email the user registered with.
    pub email: String,
}

/// Why a message on the topic could not be turned into a [`RegistrationEvent`].
///
/// Malformed messages are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
    /// Body is not UTF-8 JSON, or not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    InvalidJson(String),

    /// `user_id` is absent or null.
    #[error("missing user_id")]
    MissingUserId,

    /// `user_id` is present but not a positive integer.
    #[error("invalid user_id: {0}")]
    InvalidUserId(String),

    /// `email` is absent, null, not a string, or blank.
    #[error("missing email")]
    MissingEmail,
}

impl Event for RegistrationEvent {
    fn event_type(&self) -> &'static str {
        VENDOR_REGISTERED_EVENT_TYPE
    }
}

impl RegistrationEvent {
    /// Create a new registration event.
    #[must_use]
    pub fn new(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
        }
    }

    /// The user id in the form the vendor store keeps it.
    #[must_use]
    pub fn user_ref(&self) -> String {
        self.user_id.to_string()
    }

    /// Encode for the bus, keyed by user id.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if JSON encoding fails.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        Ok(SerializedEvent::from_event(self, None)?.with_key(self.user_ref()))
    }

    /// Decode a message body.
    ///
    /// # Errors
    ///
    /// Returns a [`MalformedEvent`] describing the first problem found.
    pub fn decode(payload: &[u8]) -> Result<Self, MalformedEvent> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(MalformedEvent::InvalidJson(format!("expected object, got {value}")));
        };

        let user_id = match fields.get("user_id") {
            None | Some(Value::Null) => return Err(MalformedEvent::MissingUserId),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| MalformedEvent::InvalidUserId(n.to_string()))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| MalformedEvent::InvalidUserId(s.clone()))?,
            Some(other) => return Err(MalformedEvent::InvalidUserId(other.to_string())),
        };
        if user_id <= 0 {
            return Err(MalformedEvent::InvalidUserId(user_id.to_string()));
        }

        let email = match fields.get("email") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(MalformedEvent::MissingEmail),
        };

        Ok(Self { user_id, email })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_documented_wire_format() {
        let event = RegistrationEvent::new(42, "v@test.com").to_serialized().unwrap();
        assert_eq!(event.payload_str(), Some(r#"{"user_id":42,"email":"v@test.com"}"#));
        assert_eq!(event.key.as_deref(), Some("42"));
        assert_eq!(event.event_type, VENDOR_REGISTERED_EVENT_TYPE);
    }

    #[test]
    fn decodes_integer_and_string_ids() {
        let a = RegistrationEvent::decode(br#"{"user_id": 42, "email": "v@test.com"}"#).unwrap();
        let b = RegistrationEvent::decode(br#"{"user_id": "42", "email": "v@test.com"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.user_ref(), "42");
    }

    #[test]
    fn ignores_unknown_fields() {
        let event =
            RegistrationEvent::decode(br#"{"user_id": 1, "email": "a@b.c", "role": "vendor"}"#)
                .unwrap();
        assert_eq!(event, RegistrationEvent::new(1, "a@b.c"));
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cases: [(&[u8], MalformedEvent); 6] = [
            (br#"{"email": "a@b.c"}"#, MalformedEvent::MissingUserId),
            (br#"{"user_id": null, "email": "a@b.c"}"#, MalformedEvent::MissingUserId),
            (br#"{"user_id": 7}"#, MalformedEvent::MissingEmail),
            (br#"{"user_id": 7, "email": "  "}"#, MalformedEvent::MissingEmail),
            (br#"{"user_id": 7, "email": 9}"#, MalformedEvent::MissingEmail),
            (br#"{"user_id": "abc", "email": "a@b.c"}"#, MalformedEvent::InvalidUserId("abc".into())),
        ];
        for (payload, expected) in cases {
            assert_eq!(RegistrationEvent::decode(payload).unwrap_err(), expected);
        }
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert!(matches!(
            RegistrationEvent::decode(b"[1,2]"),
            Err(MalformedEvent::InvalidJson(_))
        ));
        assert!(matches!(
            RegistrationEvent::decode(&[0xff, 0xfe]),
            Err(MalformedEvent::InvalidJson(_))
        ));
        assert!(matches!(
            RegistrationEvent::decode(br#"{"user_id": 1.5, "email": "a@b.c"}"#),
            Err(MalformedEvent::InvalidUserId(_))
        ));
    }
}
