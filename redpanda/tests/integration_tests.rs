//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Marked `#[ignore]` because they need Docker (testcontainers) and take tens
//! of seconds to start the broker. Run explicitly with:
//!
//! ```bash
//! cargo test -p eventhub-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use eventhub_core::event_bus::{Delivery, EventBus, EventStream};
use eventhub_core::registration::RegistrationEvent;
use eventhub_redpanda::RedpandaEventBus;
use futures::StreamExt;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn bus(brokers: &str, group: &str) -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus")
}

/// Publish until the topic has been auto-created and accepts writes.
async fn publish_with_warmup(bus: &RedpandaEventBus, topic: &str, event: &RegistrationEvent) {
    let serialized = event.to_serialized().expect("encode");
    for attempt in 1..=60 {
        if bus.publish(topic, &serialized).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka never accepted a publish on {topic}");
    }
}

async fn next_delivery(stream: &mut EventStream) -> Delivery {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match stream.next().await {
                Some(Ok(delivery)) => return delivery,
                Some(Err(_)) => continue,
                None => panic!("stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for a delivery")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn body_is_the_plain_json_contract() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "wire-format-test");

    publish_with_warmup(&bus, "user.vendor.registered", &RegistrationEvent::new(42, "v@test.com")).await;

    let mut stream = bus.subscribe(&["user.vendor.registered"]).await.expect("subscribe");
    let delivery = next_delivery(&mut stream).await;

    let decoded = RegistrationEvent::decode(&delivery.event.data).expect("decode");
    assert_eq!(decoded, RegistrationEvent::new(42, "v@test.com"));
    assert_eq!(delivery.event.event_type, "user.vendor.registered.v1");
    assert_eq!(delivery.event.key.as_deref(), Some("42"));
    delivery.ack();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn released_delivery_is_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "redelivery-test");

    publish_with_warmup(&bus, "redelivery", &RegistrationEvent::new(1, "a@test.com")).await;
    publish_with_warmup(&bus, "redelivery", &RegistrationEvent::new(2, "b@test.com")).await;

    // First subscription acks the first message and abandons the second.
    {
        let mut stream = bus.subscribe(&["redelivery"]).await.expect("subscribe");
        let first = next_delivery(&mut stream).await;
        assert_eq!(RegistrationEvent::decode(&first.event.data).expect("decode").user_id, 1);
        first.ack();
        let second = next_delivery(&mut stream).await;
        assert_eq!(RegistrationEvent::decode(&second.event.data).expect("decode").user_id, 2);
        second.release();
    }

    // Let the async commit land and the group rebalance.
    tokio::time::sleep(Duration::from_secs(8)).await;

    let mut stream = bus.subscribe(&["redelivery"]).await.expect("resubscribe");
    let again = next_delivery(&mut stream).await;
    assert_eq!(RegistrationEvent::decode(&again.event.data).expect("decode").user_id, 2);
    again.ack();
}
