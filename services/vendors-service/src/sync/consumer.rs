//! Vendor sync consumer.
//!
//! Subscribes to `user.vendor.registered` in the vendors consumer group and
//! reconciles every message against the vendor store. A message is
//! acknowledged only once it has been applied, discarded as malformed, or
//! parked in the dead-letter store, so the bus redelivers anything the
//! consumer did not finish.
//!
//! Per message:
//!
//! 1. Decode. Malformed → warn, ack, next.
//! 2. Reconcile. Store failure → back off and retry, up to the policy's limit.
//! 3. Still failing → park in the dead-letter store and ack.
//! 4. Parking fails too → release; the subscription is reopened and the
//!    message comes back.
//!
//! Stopping interrupts the backoff sleep and releases the message being
//! retried; a reconciliation already talking to the store is let finish.

use crate::sync::reconcile::{Reconciler, SyncError};
use eventhub_core::dead_letter::{DeadLetterStore, NewFailedEvent};
use eventhub_core::event_bus::{Delivery, EventBus, EventStream};
use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC};
use eventhub_runtime::metrics::SyncMetrics;
use eventhub_runtime::{Lifecycle, LifecycleError, RetryPolicy};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How a subscription ended.
enum StreamEnd {
    /// Stop was requested.
    Stopped,
    /// The stream closed or a message was released; resubscribe.
    Closed,
}

/// What happened to one delivery.
enum Handled {
    /// Acknowledged; keep reading.
    Acked,
    /// Released for redelivery; the subscription must be reopened.
    Released,
    /// Released because stop was requested.
    Stopped,
}

/// Long-lived consumer keeping vendor records in sync with registrations.
pub struct VendorSyncConsumer {
    name: String,
    bus: Arc<dyn EventBus>,
    reconciler: Reconciler,
    dead_letters: Arc<dyn DeadLetterStore>,
    retry: RetryPolicy,
    reconnect_delay: Duration,
    lifecycle: Lifecycle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VendorSyncConsumer {
    /// Create a stopped consumer with the default retry policy and a 5 second
    /// reconnect delay.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, reconciler: Reconciler, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self {
            name: "vendor_sync".to_string(),
            bus,
            reconciler,
            dead_letters,
            retry: RetryPolicy::default(),
            reconnect_delay: Duration::from_secs(5),
            lifecycle: Lifecycle::new("vendor_sync"),
            task: Mutex::new(None),
        }
    }

    /// Retry policy for messages whose reconciliation fails.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Delay before resubscribing after the subscription ends.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Lifecycle handle, for readiness reporting.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Subscribe and spawn the consume loop.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStarted`] unless stopped, and
    /// [`LifecycleError::StartFailed`] if the first subscription fails.
    pub async fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        self.lifecycle.begin_start()?;

        let stream = match self.bus.subscribe(&[VENDOR_REGISTERED_TOPIC]).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.lifecycle.fail_start(e)),
        };
        info!(consumer = %self.name, topic = VENDOR_REGISTERED_TOPIC, "Subscribed");

        let consumer = Arc::clone(self);
        let handle = tokio::spawn(async move { consumer.run(stream).await });
        *self.task.lock().await = Some(handle);
        self.lifecycle.mark_running();
        Ok(())
    }

    /// Stop reading and wait for the loop to exit.
    pub async fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!(consumer = %self.name, error = %e, "Consumer task ended abnormally");
            }
        }
        self.lifecycle.mark_stopped();
    }

    async fn run(&self, initial: EventStream) {
        let mut next_stream = Some(initial);

        loop {
            let mut stream = match next_stream.take() {
                Some(stream) => stream,
                None => match self.resubscribe().await {
                    Some(stream) => stream,
                    None => break,
                },
            };

            match self.consume(&mut stream).await {
                StreamEnd::Stopped => break,
                StreamEnd::Closed => {
                    drop(stream);
                    warn!(
                        consumer = %self.name,
                        retry_in_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                        "Subscription ended, resubscribing"
                    );
                    if !self.pause(self.reconnect_delay).await {
                        break;
                    }
                }
            }
        }

        info!(consumer = %self.name, "Consumer loop exited");
    }

    /// Subscribe again, backing off between failures. `None` once stop is requested.
    async fn resubscribe(&self) -> Option<EventStream> {
        loop {
            let result = tokio::select! {
                biased;
                () = self.lifecycle.stop_requested() => return None,
                result = self.bus.subscribe(&[VENDOR_REGISTERED_TOPIC]) => result,
            };

            match result {
                Ok(stream) => {
                    info!(consumer = %self.name, topic = VENDOR_REGISTERED_TOPIC, "Resubscribed");
                    return Some(stream);
                }
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Failed to subscribe");
                    if !self.pause(self.reconnect_delay).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn consume(&self, stream: &mut EventStream) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                () = self.lifecycle.stop_requested() => return StreamEnd::Stopped,
                next = stream.next() => next,
            };

            match next {
                None => return StreamEnd::Closed,
                Some(Err(e)) => {
                    error!(consumer = %self.name, error = %e, "Error receiving event");
                }
                Some(Ok(delivery)) => match self.handle(delivery).await {
                    Handled::Acked => {}
                    Handled::Released => return StreamEnd::Closed,
                    Handled::Stopped => return StreamEnd::Stopped,
                },
            }
        }
    }

    async fn handle(&self, delivery: Delivery) -> Handled {
        let event = match RegistrationEvent::decode(&delivery.event.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    consumer = %self.name,
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    payload = delivery.event.payload_str().unwrap_or("<binary>"),
                    error = %e,
                    "Discarding malformed registration event"
                );
                SyncMetrics::record_malformed();
                delivery.ack();
                return Handled::Acked;
            }
        };

        let mut retries = 0;
        loop {
            let started = Instant::now();
            match self.reconciler.apply(&event).await {
                Ok(outcome) => {
                    SyncMetrics::record_outcome(outcome.as_str(), started.elapsed());
                    delivery.ack();
                    return Handled::Acked;
                }
                Err(e) if e.is_retryable() && retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(retries);
                    retries += 1;
                    SyncMetrics::record_retry();
                    warn!(
                        consumer = %self.name,
                        user_id = event.user_id,
                        offset = delivery.offset,
                        attempt = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        outcome = "error",
                        "Reconciliation failed, retrying"
                    );
                    if !self.pause(delay).await {
                        info!(
                            consumer = %self.name,
                            offset = delivery.offset,
                            "Stop requested during backoff, releasing message"
                        );
                        delivery.release();
                        return Handled::Stopped;
                    }
                }
                Err(e) => return self.park(delivery, &event, &e, retries).await,
            }
        }
    }

    async fn park(&self, delivery: Delivery, event: &RegistrationEvent, err: &SyncError, retries: usize) -> Handled {
        let entry = NewFailedEvent {
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            event: delivery.event.clone(),
            error_message: err.to_string(),
            error_details: Some(format!("{err:?}")),
            retry_count: i32::try_from(retries).unwrap_or(i32::MAX),
        };

        match self.dead_letters.park(entry).await {
            Ok(dead_letter_id) => {
                error!(
                    consumer = %self.name,
                    dead_letter_id,
                    user_id = event.user_id,
                    email = %event.email,
                    offset = delivery.offset,
                    retries,
                    error = %err,
                    outcome = "error",
                    "Registration event parked after exhausting retries"
                );
                SyncMetrics::record_parked();
                delivery.ack();
                Handled::Acked
            }
            Err(park_err) => {
                error!(
                    consumer = %self.name,
                    user_id = event.user_id,
                    offset = delivery.offset,
                    error = %err,
                    park_error = %park_err,
                    "Could not park registration event, releasing for redelivery"
                );
                delivery.release();
                Handled::Released
            }
        }
    }

    /// Sleep for `delay`; `false` if stop was requested first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.lifecycle.stop_requested() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
