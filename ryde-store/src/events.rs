use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};
use ryde_booking::{BookingEvent, EventSink};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(topic, key, partition = delivery.partition, offset = delivery.offset, "Event delivered");
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, key, error = %e, "Failed to publish event");
                Err(e)
            }
        }
    }
}

/// Lifecycle events keyed by booking id, so one booking's events stay ordered.
#[async_trait]
impl EventSink for EventProducer {
    async fn emit(&self, event: BookingEvent) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(topic = event.topic(), error = %e, "Failed to serialize event");
                return;
            }
        };
        // delivery failures are already logged; the transition stands regardless
        let _ = self.publish(event.topic(), &event.booking_id().to_string(), &payload).await;
    }
}
