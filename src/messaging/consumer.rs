use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{BorrowedMessage, Message, OwnedMessage};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::store::OrderRepository;

use super::ingest::OrderIngestor;
use super::offsets::OffsetTracker;
use super::redelivery::{deliver, DeliveryReport, RedeliveryPolicy};
use super::redpanda::RedpandaClient;

// ============================================================================
// Order Consumer
// ============================================================================
//
// Pulls order messages from the broker, runs each through the ingestor under
// the redelivery policy, and only then lets its offset become committable.
// Offsets are stored manually (`enable.auto.offset.store=false`) and flushed
// by the periodic auto-commit.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("failed to create consumer: {0}")]
    Create(#[source] KafkaError),

    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: KafkaError,
    },

    #[error("consumer task for {topic} ended abnormally: {reason}")]
    Join { topic: String, reason: String },
}

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Only messages published after subscribing. Joins a one-off consumer
    /// group so no backlog is replayed on restart.
    New,
    /// Resume from the stable group's committed offsets.
    Resume,
}

impl FromStr for DeliverPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(DeliverPolicy::New),
            "resume" => Ok(DeliverPolicy::Resume),
            other => Err(format!("unknown deliver policy '{}', expected 'new' or 'resume'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub deliver_policy: DeliverPolicy,
    pub max_in_flight: usize,
    pub redelivery: RedeliveryPolicy,
    pub dead_letter_topic: Option<String>,
}

impl ConsumerSettings {
    fn effective_group_id(&self) -> String {
        match self.deliver_policy {
            DeliverPolicy::New => format!("{}-{}", self.group_id, uuid::Uuid::new_v4()),
            DeliverPolicy::Resume => self.group_id.clone(),
        }
    }
}

pub struct OrderConsumer<R, C> {
    consumer: Arc<StreamConsumer>,
    settings: ConsumerSettings,
    ingestor: Arc<OrderIngestor<R, C>>,
    metrics: Arc<Metrics>,
    producer: Option<Arc<RedpandaClient>>,
    offsets: OffsetTracker,
}

impl<R, C> OrderConsumer<R, C>
where
    R: OrderRepository + 'static,
    C: OrderCache + 'static,
{
    pub fn new(
        settings: ConsumerSettings,
        ingestor: Arc<OrderIngestor<R, C>>,
        metrics: Arc<Metrics>,
        producer: Option<Arc<RedpandaClient>>,
    ) -> Result<Self, ConsumerError> {
        let group_id = settings.effective_group_id();
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(ConsumerError::Create)?;

        tracing::info!(
            group_id = %group_id,
            deliver_policy = ?settings.deliver_policy,
            "Created order consumer"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            settings,
            ingestor,
            metrics,
            producer,
            offsets: OffsetTracker::new(),
        })
    }

    /// Start consuming in the background. Dropping the returned handle
    /// without calling `unsubscribe` also stops the loop.
    pub fn subscribe(self) -> Result<Subscription, ConsumerError> {
        let topic = self.settings.topic.clone();
        self.consumer
            .subscribe(&[topic.as_str()])
            .map_err(|source| ConsumerError::Subscribe {
                topic: topic.clone(),
                source,
            })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(stop_rx));

        tracing::info!(topic = %topic, "Subscribed to order topic");
        Ok(Subscription {
            topic,
            stop: Some(stop_tx),
            handle,
        })
    }

    async fn run(self, stop: oneshot::Receiver<()>) {
        let consumer = Arc::clone(&self.consumer);
        let this = &self;

        consumer
            .stream()
            .take_until(stop)
            .for_each_concurrent(self.settings.max_in_flight.max(1), |message| {
                // Tracked before the handler future runs so offsets enter in
                // receive order.
                let message = message.map(|m| this.track(m));
                async move {
                    match message {
                        Ok(message) => this.handle(message).await,
                        Err(e) => tracing::warn!(error = %e, "Kafka consumer error"),
                    }
                }
            })
            .await;

        if let Err(e) = consumer.commit_consumer_state(CommitMode::Sync) {
            // NoOffset: nothing was stored since the last commit.
            if !matches!(e, KafkaError::ConsumerCommit(rdkafka::types::RDKafkaErrorCode::NoOffset)) {
                tracing::warn!(error = %e, "Final offset commit failed");
            }
        }
        consumer.unsubscribe();
        tracing::info!(topic = %self.settings.topic, "Order consumer stopped");
    }

    fn track(&self, message: BorrowedMessage<'_>) -> OwnedMessage {
        self.offsets
            .begin(message.topic(), message.partition(), message.offset());
        message.detach()
    }

    async fn handle(&self, message: OwnedMessage) {
        let started = Instant::now();
        let payload: Arc<[u8]> = Arc::from(message.payload().unwrap_or_default());
        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();

        let ingestor = Arc::clone(&self.ingestor);
        let metrics = Arc::clone(&self.metrics);
        let report = deliver(&self.settings.redelivery, |attempt| {
            let ingestor = Arc::clone(&ingestor);
            let metrics = Arc::clone(&metrics);
            let payload = Arc::clone(&payload);
            async move {
                let outcome = ingestor.ingest(&payload).await;
                metrics.record_attempt(outcome.label());
                tracing::debug!(attempt, outcome = outcome.label(), "Delivery attempt finished");
                outcome
            }
        })
        .await;

        self.metrics
            .record_delivery(report.attempts(), report.is_acked(), started.elapsed().as_secs_f64());

        match report {
            DeliveryReport::Acked { attempts, outcome } => {
                tracing::info!(
                    key = %key,
                    offset = message.offset(),
                    attempts,
                    "Message acknowledged: {}",
                    outcome
                );
            }
            DeliveryReport::Exhausted { attempts, last_failure } => {
                self.hand_off(&key, &payload, attempts, &last_failure.to_string())
                    .await;
            }
        }

        self.acknowledge(&message);
    }

    /// The message's fate once it has used up every delivery.
    async fn hand_off(&self, key: &str, payload: &[u8], attempts: u32, last_error: &str) {
        let (Some(producer), Some(topic)) = (&self.producer, &self.settings.dead_letter_topic) else {
            tracing::error!(key = %key, attempts, error = %last_error, "Dropping message after final delivery");
            self.metrics.record_dead_letter("dropped");
            return;
        };

        match producer.dead_letter(topic, key, payload, attempts, last_error).await {
            Ok(()) => {
                tracing::warn!(key = %key, attempts, dead_letter_topic = %topic, "Message dead-lettered");
                self.metrics.record_dead_letter("forwarded");
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to dead-letter message, dropping it");
                self.metrics.record_dead_letter("dropped");
            }
        }
    }

    fn acknowledge(&self, message: &OwnedMessage) {
        let Some(next) = self
            .offsets
            .complete(message.topic(), message.partition(), message.offset())
        else {
            return;
        };

        if let Err(e) = self.store_offset(message.topic(), message.partition(), next) {
            tracing::warn!(
                error = %e,
                topic = %message.topic(),
                partition = message.partition(),
                offset = next,
                "Failed to store consumer offset"
            );
        }
    }

    fn store_offset(&self, topic: &str, partition: i32, next: i64) -> KafkaResult<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(next))?;
        self.consumer.store_offsets(&tpl)
    }
}

/// Handle to a running consumer loop.
pub struct Subscription {
    topic: String,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop pulling new messages and wait for in-flight ones to reach a
    /// terminal disposition. Deliveries that missed their ack deadline are
    /// waited for too, so nothing touches the store after this returns.
    pub async fn unsubscribe(mut self) -> Result<(), ConsumerError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        (&mut self.handle).await.map_err(|e| ConsumerError::Join {
            topic: self.topic.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(topic = %self.topic, "Unsubscribed from order topic");
        Ok(())
    }
}
