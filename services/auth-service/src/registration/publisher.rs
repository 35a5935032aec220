//! Registration event producer.
//!
//! [`RegistrationPublisher`] owns the path from a vendor registration to the
//! `user.vendor.registered` topic. It is constructed once, started before the
//! HTTP server accepts traffic and stopped after it drains.
//!
//! Publishing never fails a registration: [`RegistrationPublisher::announce`]
//! runs in the background and only logs a warning when the bus is
//! unavailable. The outbox relay uses [`RegistrationPublisher::publish_serialized`]
//! and keeps the row when it fails.

use eventhub_core::event::{EventError, SerializedEvent};
use eventhub_core::event_bus::{EventBus, EventBusError};
use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC};
use eventhub_runtime::metrics::PublishMetrics;
use eventhub_runtime::{Lifecycle, LifecycleError, LifecycleState};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Why an event did not reach the bus.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The publisher is not running.
    #[error("registration publisher is {0}")]
    NotRunning(LifecycleState),

    /// The event could not be encoded.
    #[error(transparent)]
    Encode(#[from] EventError),

    /// The bus rejected the event or could not be reached.
    #[error(transparent)]
    Bus(#[from] EventBusError),
}

/// Publishes vendor registrations to the event bus.
pub struct RegistrationPublisher {
    bus: Arc<dyn EventBus>,
    lifecycle: Lifecycle,
}

impl RegistrationPublisher {
    /// Create a stopped publisher over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            lifecycle: Lifecycle::new("registration_publisher"),
        }
    }

    /// Lifecycle handle, for readiness reporting.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Start accepting events.
    ///
    /// The producer connection is owned by the bus, so there is nothing to
    /// acquire beyond the state change.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStarted`] unless the publisher is stopped.
    pub fn start(&self) -> Result<(), LifecycleError> {
        self.lifecycle.begin_start()?;
        self.lifecycle.mark_running();
        Ok(())
    }

    /// Stop accepting events. Background announcements already in flight
    /// complete or fail on their own.
    pub fn stop(&self) {
        if self.lifecycle.begin_stop() {
            self.lifecycle.mark_stopped();
        }
    }

    /// Publish one registration and wait for the bus to accept it.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the publisher is not running, the event
    /// cannot be encoded, or the bus does not accept it.
    pub async fn publish(&self, event: &RegistrationEvent) -> Result<(), PublishError> {
        let serialized = event.to_serialized()?;
        self.publish_serialized(VENDOR_REGISTERED_TOPIC, &serialized).await
    }

    /// Publish an already encoded event to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the publisher is not running or the bus
    /// does not accept the event.
    pub async fn publish_serialized(&self, topic: &str, event: &SerializedEvent) -> Result<(), PublishError> {
        let state = self.lifecycle.state();
        if state != LifecycleState::Running {
            return Err(PublishError::NotRunning(state));
        }

        let started = Instant::now();
        match self.bus.publish(topic, event).await {
            Ok(()) => {
                PublishMetrics::record_publish(started.elapsed());
                debug!(topic, key = ?event.key, "Registration event published");
                Ok(())
            }
            Err(e) => {
                PublishMetrics::record_failure();
                Err(e.into())
            }
        }
    }

    /// Publish in the background; failures are logged and dropped.
    pub fn announce(self: &Arc<Self>, event: RegistrationEvent) {
        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&event).await {
                warn!(
                    user_id = event.user_id,
                    email = %event.email,
                    error = %e,
                    "Vendor registration event not published"
                );
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use eventhub_testing::InMemoryEventBus;

    fn publisher(bus: &InMemoryEventBus) -> RegistrationPublisher {
        RegistrationPublisher::new(Arc::new(bus.clone()))
    }

    #[tokio::test]
    async fn publishes_keyed_by_user_id() {
        let bus = InMemoryEventBus::new();
        let publisher = publisher(&bus);
        publisher.start().unwrap();

        publisher.publish(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        let published = bus.published(VENDOR_REGISTERED_TOPIC);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key.as_deref(), Some("42"));
        assert_eq!(
            RegistrationEvent::decode(&published[0].data).unwrap(),
            RegistrationEvent::new(42, "v@test.com")
        );
    }

    #[tokio::test]
    async fn refuses_to_publish_unless_running() {
        let bus = InMemoryEventBus::new();
        let publisher = publisher(&bus);

        let err = publisher.publish(&RegistrationEvent::new(1, "a@test.com")).await.unwrap_err();
        assert!(matches!(err, PublishError::NotRunning(LifecycleState::Stopped)));

        publisher.start().unwrap();
        publisher.stop();
        assert_eq!(publisher.lifecycle().state(), LifecycleState::Stopped);
        assert!(publisher.publish(&RegistrationEvent::new(1, "a@test.com")).await.is_err());
        assert!(bus.published(VENDOR_REGISTERED_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn bus_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        let publisher = publisher(&bus);
        publisher.start().unwrap();
        bus.fail_next_publishes(1);

        let err = publisher.publish(&RegistrationEvent::new(1, "a@test.com")).await.unwrap_err();
        assert!(matches!(err, PublishError::Bus(_)));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let publisher = publisher(&InMemoryEventBus::new());
        publisher.start().unwrap();
        assert!(matches!(
            publisher.start(),
            Err(LifecycleError::AlreadyStarted { .. })
        ));
    }
}
