//! Event bus abstraction for cross-service communication.
//!
//! Services own their stores; the only coupling between them is a topic on
//! the bus. The producer writes its own state first and publishes second, the
//! consumer applies the event locally and only then acknowledges it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   auth service   │
//! │  users + outbox  │◄─── Source of truth for identities
//! └────────┬─────────┘
//!          │ publish
//!          ▼
//! ┌──────────────────┐
//! │    Event Bus     │◄─── At-least-once, partitioned
//! └────────┬─────────┘
//!          │ Delivery
//!          ▼
//! ┌──────────────────┐
//! │ vendors service  │
//! │ apply, then ack  │◄─── Offset committed after local commit
//! └──────────────────┘
//! ```
//!
//! # Acknowledgement
//!
//! Every item on an [`EventStream`] is a [`Delivery`]. Calling
//! [`Delivery::ack`] tells the bus the message was applied and its offset may
//! be committed. Dropping a delivery without acknowledging it leaves the offset
//! uncommitted: the subscription ends and the message is delivered again to
//! the next subscription of the same consumer group.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `eventhub-testing` - for tests, with consumer group offsets
//! - `RedpandaEventBus` in `eventhub-redpanda` - for production (Kafka-compatible)

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// One message handed to a subscriber, together with its acknowledgement handle.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset of the message within its partition.
    pub offset: i64,
    /// The message itself.
    pub event: SerializedEvent,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// Create a delivery and the receiver the bus waits on before committing.
    ///
    /// The receiver resolves to `Ok(())` when the subscriber calls
    /// [`Delivery::ack`] and to an error when the delivery is dropped unacknowledged.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        event: SerializedEvent,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let delivery = Self {
            topic: topic.into(),
            partition,
            offset,
            event,
            ack: Some(tx),
        };
        (delivery, rx)
    }

    /// Mark the message as applied. The bus may now commit its offset.
    pub fn ack(mut self) {
        if let Some(tx) = self.ack.take() {
            // The bus side may already be gone (subscription torn down); the
            // message will then be redelivered, which consumers tolerate.
            let _ = tx.send(());
        }
    }

    /// Give the message back without committing it.
    ///
    /// Equivalent to dropping the delivery; spelled out for readability at
    /// call sites that abandon work on purpose.
    pub fn release(self) {
        drop(self);
    }
}

/// Stream of deliveries from a subscription.
///
/// Errors on the stream are transport-level; the subscription stays usable
/// after an `Err` item.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Publish/subscribe access to a durable, partitioned event log.
///
/// # Delivery guarantees
///
/// - At-least-once: a message can be delivered any number of times.
/// - Within a consumer group, a message is not handed out past an
///   unacknowledged one on the same partition.
/// - Ordering holds within a partition only.
///
/// # Thread safety
///
/// Implementations are shared across tasks behind an `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or times
    /// out the message, and [`EventBusError::ConnectionFailed`] if no broker
    /// is reachable.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics as part of the bus's consumer group.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the consumer cannot be
    /// created or the topics cannot be joined.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SerializedEvent {
        SerializedEvent::new("Sample.v1".into(), b"{}".to_vec(), None)
    }

    #[tokio::test]
    async fn ack_resolves_receiver() {
        let (delivery, rx) = Delivery::new("topic", 0, 5, sample());
        delivery.ack();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropped_delivery_is_not_acknowledged() {
        let (delivery, rx) = Delivery::new("topic", 0, 5, sample());
        delivery.release();
        assert!(rx.await.is_err());
    }

    #[test]
    fn error_messages_name_the_topic() {
        let err = EventBusError::PublishFailed {
            topic: "user.vendor.registered".into(),
            reason: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "Publish failed for topic 'user.vendor.registered': timeout"
        );
    }
}
