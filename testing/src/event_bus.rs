//! In-memory [`EventBus`] with consumer-group offsets.
//!
//! Every topic is an append-only log in a single partition (partition `0`).
//! Each bus handle belongs to one consumer group; handles created with
//! [`InMemoryEventBus::for_group`] share the logs but track their own offsets.
//!
//! A subscription hands out one delivery at a time and waits for it:
//! [`Delivery::ack`] advances the group's committed offset, dropping the
//! delivery ends the stream with the offset untouched. A fresh subscription
//! of the same group starts again at the first unacknowledged message, which
//! is how redelivery after a crash looks from the consumer's side.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use eventhub_core::event::SerializedEvent;
use eventhub_core::event_bus::{Delivery, EventBus, EventBusError, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const DEFAULT_GROUP: &str = "test-group";

#[derive(Debug, Default)]
struct BusState {
    logs: HashMap<String, Vec<SerializedEvent>>,
    committed: HashMap<(String, String), usize>,
    failing_publishes: usize,
}

impl BusState {
    /// Next message the group has not acknowledged on any of `topics`.
    fn next_pending(&self, group: &str, topics: &[String]) -> Option<(String, usize, SerializedEvent)> {
        topics.iter().find_map(|topic| {
            let offset = self
                .committed
                .get(&(group.to_string(), topic.clone()))
                .copied()
                .unwrap_or(0);
            self.logs
                .get(topic)
                .and_then(|log| log.get(offset))
                .map(|event| (topic.clone(), offset, event.clone()))
        })
    }
}

/// In-memory event bus for tests.
///
/// # Example
///
/// ```
/// use eventhub_core::event::SerializedEvent;
/// use eventhub_core::event_bus::EventBus;
/// use eventhub_testing::InMemoryEventBus;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["orders"]).await?;
///
/// bus.publish("orders", &SerializedEvent::new("Placed.v1".into(), b"{}".to_vec(), None))
///     .await?;
///
/// let delivery = stream.next().await.unwrap()?;
/// assert_eq!(delivery.offset, 0);
/// delivery.ack();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    group: Arc<str>,
    state: Arc<Mutex<BusState>>,
    published: Arc<Notify>,
}

impl InMemoryEventBus {
    /// Create an empty bus whose handle belongs to the `test-group` group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::from(DEFAULT_GROUP),
            state: Arc::new(Mutex::new(BusState::default())),
            published: Arc::new(Notify::new()),
        }
    }

    /// A handle on the same logs that consumes as `group`.
    #[must_use]
    pub fn for_group(&self, group: &str) -> Self {
        Self {
            group: Arc::from(group),
            state: Arc::clone(&self.state),
            published: Arc::clone(&self.published),
        }
    }

    /// Make the next `count` publishes fail with [`EventBusError::PublishFailed`].
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.lock().unwrap().failing_publishes = count;
    }

    /// Everything ever published to `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of messages this handle's group has acknowledged on `topic`.
    #[must_use]
    pub fn committed_offset(&self, topic: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(&(self.group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Messages on `topic` this handle's group has not acknowledged yet.
    #[must_use]
    pub fn lag(&self, topic: &str) -> usize {
        self.published(topic).len() - self.committed_offset(topic)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            {
                let mut state = self.state.lock().unwrap();
                if state.failing_publishes > 0 {
                    state.failing_publishes -= 1;
                    return Err(EventBusError::PublishFailed {
                        topic,
                        reason: "injected failure".to_string(),
                    });
                }
                state.logs.entry(topic).or_default().push(event);
            }
            self.published.notify_waiters();
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let group = self.group.to_string();
        let state = Arc::clone(&self.state);
        let published = Arc::clone(&self.published);

        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    // Registered before the check so a publish in between is not missed.
                    let notified = published.notified();
                    let next = state.lock().unwrap().next_pending(&group, &topics);

                    let Some((topic, offset, event)) = next else {
                        notified.await;
                        continue;
                    };

                    let position = i64::try_from(offset).unwrap_or(i64::MAX);
                    let (delivery, acked) = Delivery::new(topic.clone(), 0, position, event);
                    yield Ok(delivery);

                    if acked.await.is_err() {
                        // Released: leave the offset where it is and end the subscription.
                        break;
                    }
                    state
                        .lock()
                        .unwrap()
                        .committed
                        .insert((group.clone(), topic), offset + 1);
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn event(n: u8) -> SerializedEvent {
        SerializedEvent::new("Sample.v1".into(), vec![n], None)
    }

    #[tokio::test]
    async fn ack_advances_the_group_offset() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &event(1)).await.expect("publish");
        bus.publish("t", &event(2)).await.expect("publish");

        let mut stream = bus.subscribe(&["t"]).await.expect("subscribe");
        let first = stream.next().await.expect("item").expect("delivery");
        assert_eq!(first.event.data, vec![1]);
        first.ack();

        let second = stream.next().await.expect("item").expect("delivery");
        assert_eq!(second.offset, 1);
        assert_eq!(bus.committed_offset("t"), 1);
        second.ack();

        // Stream resumes to record the second ack before waiting for more.
        let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err());
        assert_eq!(bus.committed_offset("t"), 2);
        assert_eq!(bus.lag("t"), 0);
    }

    #[tokio::test]
    async fn released_delivery_is_redelivered_to_next_subscription() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &event(1)).await.expect("publish");

        let mut stream = bus.subscribe(&["t"]).await.expect("subscribe");
        stream.next().await.expect("item").expect("delivery").release();
        assert!(stream.next().await.is_none());

        let mut again = bus.subscribe(&["t"]).await.expect("resubscribe");
        let delivery = again.next().await.expect("item").expect("delivery");
        assert_eq!(delivery.offset, 0);
    }

    #[tokio::test]
    async fn subscriber_wakes_on_later_publish() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["t"]).await.expect("subscribe");

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish("t", &event(9)).await.expect("publish");
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("woken")
            .expect("item")
            .expect("delivery");
        assert_eq!(delivery.event.data, vec![9]);
    }

    #[tokio::test]
    async fn groups_track_offsets_independently() {
        let bus = InMemoryEventBus::new();
        let other = bus.for_group("other");
        bus.publish("t", &event(1)).await.expect("publish");

        let mut stream = bus.subscribe(&["t"]).await.expect("subscribe");
        stream.next().await.expect("item").expect("delivery").ack();
        let _ = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;

        assert_eq!(bus.committed_offset("t"), 1);
        assert_eq!(other.committed_offset("t"), 0);
    }

    #[tokio::test]
    async fn injected_publish_failures() {
        let bus = InMemoryEventBus::new();
        bus.fail_next_publishes(1);

        assert!(matches!(
            bus.publish("t", &event(1)).await,
            Err(EventBusError::PublishFailed { .. })
        ));
        bus.publish("t", &event(2)).await.expect("second publish");
        assert_eq!(bus.published("t").len(), 1);
    }
}
