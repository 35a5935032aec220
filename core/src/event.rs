//! Event envelope shared by the bus, the outbox and the dead-letter store.
//!
//! Payloads travel as UTF-8 JSON. Topic contracts are consumed by services
//! that do not share Rust types with the producer, so the envelope never
//! wraps the payload in a Rust-specific binary format: what goes on the wire
//! is exactly [`SerializedEvent::data`].
//!
//! # Example
//!
//! ```
//! use eventhub_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct BoothAssigned {
//!     vendor_id: i64,
//!     booth: String,
//! }
//!
//! impl Event for BoothAssigned {
//!     fn event_type(&self) -> &'static str {
//!         "BoothAssigned.v1"
//!     }
//! }
//!
//! let event = BoothAssigned { vendor_id: 7, booth: "A12".to_string() };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "BoothAssigned.v1");
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A typed event with a stable, versioned type name.
///
/// The type name is carried next to the payload (as a Kafka header on the
/// bus, as a column in the outbox) so consumers can route without decoding.
/// Use a descriptive name with a version suffix, e.g. `"VendorLinked.v1"`.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not valid
    /// JSON for this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for publishing or storage.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"user.vendor.registered.v1"`).
    pub event_type: String,

    /// The JSON payload. This is the exact message body on the bus.
    pub data: Vec<u8>,

    /// Partition key. Events sharing a key keep their relative order on
    /// brokers that partition by key.
    pub key: Option<String>,

    /// Optional metadata (correlation ids and the like).
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event without a partition key.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            key: None,
            metadata,
        }
    }

    /// Set the partition key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Serialize a typed event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E>(event: &E, metadata: Option<serde_json::Value>) -> Result<Self, EventError>
    where
        E: Event + Serialize,
    {
        Ok(Self::new(event.event_type().to_string(), event.to_bytes()?, metadata))
    }

    /// The payload as text, if it is valid UTF-8.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.event_type, self.data.len())
    }
}
