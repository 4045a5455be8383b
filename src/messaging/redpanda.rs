use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying how many times an exhausted message was delivered.
pub const DELIVERY_ATTEMPTS_HEADER: &str = "x-delivery-attempts";
/// Header carrying the last failure reason of an exhausted message.
pub const LAST_ERROR_HEADER: &str = "x-last-error";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to create producer: {0}")]
    Create(#[source] KafkaError),

    #[error("failed to publish to {topic}: {source}")]
    Send {
        topic: String,
        #[source]
        source: KafkaError,
    },
}

/// Producer side of the broker: publishes orders and forwards messages that
/// ran out of delivery attempts to a dead-letter topic.
pub struct RedpandaClient {
    producer: FutureProducer,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(PublishError::Create)?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.send(topic, key, record).await
    }

    pub async fn dead_letter(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        attempts: u32,
        last_error: &str,
    ) -> Result<(), PublishError> {
        let attempts = attempts.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: DELIVERY_ATTEMPTS_HEADER,
                value: Some(attempts.as_str()),
            })
            .insert(Header {
                key: LAST_ERROR_HEADER,
                value: Some(last_error),
            });

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(headers);
        self.send(topic, key, record).await
    }

    async fn send(
        &self,
        topic: &str,
        key: &str,
        record: FutureRecord<'_, str, [u8]>,
    ) -> Result<(), PublishError> {
        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok(_) => {
                tracing::info!(topic = %topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err((e, _)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Redpanda");
                Err(PublishError::Send {
                    topic: topic.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Wait for queued messages to leave the producer.
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(Timeout::After(timeout)) {
            tracing::warn!(error = %e, "Producer flush did not complete");
        }
    }
}
