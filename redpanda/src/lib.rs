//! Redpanda event bus for eventhub.
//!
//! Implements [`EventBus`] on top of rdkafka, so any Kafka-compatible broker
//! works (Redpanda in development, Kafka or a managed service in production).
//!
//! # Wire format
//!
//! The Kafka message body is exactly [`SerializedEvent::data`] (JSON for the
//! eventhub topics). The event type travels in the `event-type` header and the
//! partition key in the message key. Consumers that only know the topic
//! contract can read the body without any envelope.
//!
//! # Delivery semantics
//!
//! **At-least-once with acknowledgement-driven commits**:
//! - Auto-commit is disabled.
//! - Each message is handed to the subscriber as a [`Delivery`]; the consumer
//!   task waits for [`Delivery::ack`] before committing its offset and reading
//!   the next message.
//! - A delivery dropped without ack ends the subscription with the offset
//!   uncommitted. The next subscription in the same consumer group re-reads it.
//!
//! # Example
//!
//! ```no_run
//! use eventhub_core::event_bus::EventBus;
//! use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC};
//! use eventhub_redpanda::RedpandaEventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("vendors-service-group")
//!     .auto_offset_reset("earliest")
//!     .build()?;
//!
//! let event = RegistrationEvent::new(42, "v@test.com").to_serialized()?;
//! bus.publish(VENDOR_REGISTERED_TOPIC, &event).await?;
//!
//! let mut stream = bus.subscribe(&[VENDOR_REGISTERED_TOPIC]).await?;
//! if let Some(Ok(delivery)) = stream.next().await {
//!     println!("offset {}: {}", delivery.offset, delivery.event);
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

use eventhub_core::event::SerializedEvent;
use eventhub_core::event_bus::{Delivery, EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Header carrying [`SerializedEvent::event_type`].
pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Redpanda event bus implementation.
///
/// Holds one producer for the lifetime of the bus; each call to
/// [`EventBus::subscribe`] creates a fresh consumer in the configured group.
///
/// # Example
///
/// ```no_run
/// use eventhub_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Consumer session timeout
    session_timeout: Duration,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn group_id(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("eventhub-{}", sorted.join("-"))
        })
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`, so a registration announced as published survives a
    /// broker failover.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group ID for subscriptions.
    ///
    /// If not set, one is derived from the subscribed topics. Instances
    /// sharing a group split the partitions between them.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Where a group with no committed offset starts: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Consumer session timeout.
    ///
    /// Default: 6 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            consumer_group = ?self.consumer_group,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            auto_offset_reset,
            session_timeout: self.session_timeout.unwrap_or(Duration::from_secs(6)),
        })
    }
}

/// Event type named by the `event-type` header, if present and UTF-8.
fn event_type_from_headers<H: Headers>(headers: &H) -> Option<String> {
    headers
        .iter()
        .find(|header| header.key == EVENT_TYPE_HEADER)
        .and_then(|header| header.value)
        .and_then(|value| std::str::from_utf8(value).ok())
        .map(str::to_string)
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let headers = OwnedHeaders::new().insert(Header {
                key: EVENT_TYPE_HEADER,
                value: Some(event.event_type.as_str()),
            });
            let mut record = FutureRecord::<str, [u8]>::to(&topic)
                .payload(&event.data)
                .headers(headers);
            if let Some(key) = event.key.as_deref() {
                record = record.key(key);
            }

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => Err(EventBusError::PublishFailed {
                    topic,
                    reason: kafka_error.to_string(),
                }),
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let group_id = self.group_id(&topics);

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", self.session_timeout.as_millis().to_string())
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group_id,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topics"
            );

            // One message in flight: the next one is read only after the
            // current one is acknowledged, which keeps commits in order.
            let (tx, rx) = tokio::sync::mpsc::channel(1);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                loop {
                    let next = tokio::select! {
                        next = stream.next() => next,
                        () = tx.closed() => break,
                    };
                    let Some(msg_result) = next else { break };

                    let message = match msg_result {
                        Ok(message) => message,
                        Err(e) => {
                            let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    let event_type = message
                        .headers()
                        .and_then(event_type_from_headers)
                        .unwrap_or_else(|| message.topic().to_string());
                    let mut event = SerializedEvent::new(
                        event_type,
                        message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        None,
                    );
                    event.key = message
                        .key()
                        .and_then(|k| std::str::from_utf8(k).ok())
                        .map(str::to_string);

                    tracing::trace!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );

                    let (delivery, acked) =
                        Delivery::new(message.topic(), message.partition(), message.offset(), event);
                    if tx.send(Ok(delivery)).await.is_err() {
                        tracing::debug!("Subscriber dropped, exiting consumer task");
                        break;
                    }

                    if acked.await.is_err() {
                        tracing::info!(
                            topic = message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            "Delivery released without ack, leaving offset uncommitted"
                        );
                        break;
                    }

                    // Commits are queued; one that never lands leaves the
                    // message to be redelivered.
                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            topic = message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
